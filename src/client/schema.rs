//! Schema normalization at the upstream boundary (`spec.md` §4.1)
//!
//! Upstream payloads are loosely typed — ids arrive as either strings or
//! numbers, related entities arrive as either a bare name or a nested
//! object. These types absorb that variance with custom `Deserialize`
//! impls so everything past this module is concrete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Accepts a JSON string or number and coerces it to `String`.
pub fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Same as [`string_or_number`] but for an optional field.
pub fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string, number, or null, got {other}"
        ))),
    }
}

/// Accepts either a bare string name or an object with a `name` field, and
/// normalizes both to the plain name string. Used for the `agent` and
/// `contact` fields embedded in a chat payload.
pub fn name_or_object<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Object(map)) => Ok(map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string, object, or null, got {other}"
        ))),
    }
}

/// Normalizes a raw upstream status string against the fixed mapping in
/// `spec.md` §4.1: exact canonical values pass through; lower/mixed case
/// with spaces or underscores is folded; legacy aliases map to their
/// current equivalent; unknown values fall back to `OPENED` with a warning.
pub fn normalize_status(raw: &str) -> String {
    let folded = raw.trim().to_uppercase().replace([' ', '-'], "_");
    match folded.as_str() {
        "BOT_CHATTING" | "OPENED" | "PICKED_UP" | "RESPONDED_BY_AGENT" | "CLOSED"
        | "COMPLETING_POLL" | "COMPLETED_POLL" | "ABANDONED_POLL" => folded,
        "OPEN" => "PICKED_UP".to_string(),
        "PENDING" => "OPENED".to_string(),
        "FINISHED" => "CLOSED".to_string(),
        other => {
            tracing::warn!(status = other, "unknown chat status, defaulting to OPENED");
            "OPENED".to_string()
        }
    }
}

/// A tag as it arrives embedded in a contact payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagInput {
    pub name: String,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// A contact payload once coerced into a concrete shape. Still "raw" in the
/// sense that it hasn't been reconciled against the stored entity yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedContact {
    #[serde(rename = "contact_id", deserialize_with = "string_or_number")]
    pub contact_id: String,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub landline: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub identification: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub custom_attributes: Value,
    #[serde(default)]
    pub tags: Vec<TagInput>,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A minimal contact stub as it can appear embedded in a chat payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactStubInput {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
}

/// A message as it arrives embedded in a chat payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInput {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "type")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub incoming: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub broadcasted: bool,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
}

/// A chat payload once coerced into a concrete shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedChat {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "name_or_object")]
    pub agent: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactStubInput>,
    #[serde(default, deserialize_with = "name_or_object")]
    pub department: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(deserialize_with = "status_field")]
    pub status: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub response_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<Value>,
    #[serde(default)]
    pub poll_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub poll_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub poll_abandoned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub poll_response: Option<Value>,
    #[serde(default)]
    pub messages: Vec<MessageInput>,
}

fn status_field<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(normalize_status(&raw))
}

/// Parses `duration` as either `H:M:S[:ms]` or a bare number of seconds, per
/// `spec.md` §4.5.2.
pub fn parse_duration_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let parts: Vec<&str> = s.split(':').collect();
            match parts.as_slice() {
                [h, m, sec] => {
                    let (h, m, sec) = (h.parse::<i64>().ok()?, m.parse::<i64>().ok()?, sec.parse::<i64>().ok()?);
                    Some(h * 3600 + m * 60 + sec)
                }
                [h, m, sec, _ms] => {
                    let (h, m, sec) = (h.parse::<i64>().ok()?, m.parse::<i64>().ok()?, sec.parse::<i64>().ok()?);
                    Some(h * 3600 + m * 60 + sec)
                }
                _ => s.parse::<i64>().ok(),
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_normalizes_canonical_and_legacy_aliases() {
        assert_eq!(normalize_status("CLOSED"), "CLOSED");
        assert_eq!(normalize_status("open"), "PICKED_UP");
        assert_eq!(normalize_status("pending"), "OPENED");
        assert_eq!(normalize_status("Finished"), "CLOSED");
        assert_eq!(normalize_status("picked up"), "PICKED_UP");
        assert_eq!(normalize_status("totally-unknown"), "OPENED");
    }

    #[test]
    fn status_normalization_is_idempotent() {
        for raw in ["CLOSED", "OPENED", "PICKED_UP", "RESPONDED_BY_AGENT"] {
            assert_eq!(normalize_status(&normalize_status(raw)), normalize_status(raw));
        }
    }

    #[test]
    fn duration_parses_hms_and_seconds() {
        assert_eq!(parse_duration_seconds(&Value::from("1:02:03")), Some(3723));
        assert_eq!(parse_duration_seconds(&Value::from("1:02:03:500")), Some(3723));
        assert_eq!(parse_duration_seconds(&Value::from(90)), Some(90));
    }

    #[test]
    fn contact_id_coerces_number_to_string() {
        let json = serde_json::json!({"contact_id": 42, "fullname": "Ana"});
        let contact: NormalizedContact = serde_json::from_value(json).unwrap();
        assert_eq!(contact.contact_id, "42");
    }

    #[test]
    fn chat_agent_accepts_bare_string_or_object() {
        let json = serde_json::json!({
            "id": "c1", "status": "OPENED", "created_at": "2026-01-01T00:00:00Z",
            "agent": "Maria"
        });
        let chat: NormalizedChat = serde_json::from_value(json).unwrap();
        assert_eq!(chat.agent.as_deref(), Some("Maria"));

        let json = serde_json::json!({
            "id": "c2", "status": "OPENED", "created_at": "2026-01-01T00:00:00Z",
            "agent": {"name": "Maria", "id": 9}
        });
        let chat: NormalizedChat = serde_json::from_value(json).unwrap();
        assert_eq!(chat.agent.as_deref(), Some("Maria"));
    }
}
