//! Change detection (C5)
//!
//! Pure, side-effect-free field diffs between a stored entity and an
//! incoming record. No database access here, so every rule is exhaustively
//! unit-testable in isolation from the transform engine that calls it.

use serde_json::Value;

use crate::models::{Agent, Chat, Contact, Department};

/// The result of diffing one entity: which fields differ, and (for chats)
/// whether the status changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub has_changes: bool,
    pub changed_fields: Vec<String>,
    pub old_values: serde_json::Map<String, Value>,
    pub new_values: serde_json::Map<String, Value>,
    pub status_changed: bool,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
}

impl ChangeSet {
    fn unchanged() -> Self {
        Self::default()
    }
}

/// Compares two optional strings with null/empty-string normalization:
/// `None` and `Some("")` are treated as equivalent, per `spec.md` §4.5.3.
fn opt_str_eq(a: Option<&str>, b: Option<&str>) -> bool {
    let norm = |v: Option<&str>| v.filter(|s| !s.is_empty());
    norm(a) == norm(b)
}

/// A single field comparison, recorded into the changeset if it differs.
struct FieldDiff<'a> {
    name: &'a str,
    old: Value,
    new: Value,
    changed: bool,
}

fn collect(changes: Vec<FieldDiff>) -> ChangeSet {
    let mut set = ChangeSet::unchanged();
    for diff in changes {
        if diff.changed {
            set.has_changes = true;
            set.changed_fields.push(diff.name.to_string());
            set.old_values.insert(diff.name.to_string(), diff.old);
            set.new_values.insert(diff.name.to_string(), diff.new);
        }
    }
    set
}

/// Canonical (sorted-key) JSON string, used to compare opaque fields like
/// `customAttributes`, `tags`, and `pollResponse` by value rather than by
/// incidental key ordering.
pub fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted: Vec<(String, Value)> = map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                sorted.sort_by(|a, b| a.0.cmp(&b.0));
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

pub struct ContactUpdate<'a> {
    pub mobile: Option<&'a str>,
    pub landline: Option<&'a str>,
    pub email: Option<&'a str>,
    pub identification: Option<&'a str>,
    pub address: Option<&'a str>,
    pub city: Option<&'a str>,
    pub country: Option<&'a str>,
    pub company: Option<&'a str>,
    pub custom_attributes: &'a Value,
    pub merchant_id: Option<&'a str>,
}

/// Field-level diff between a stored `Contact` and an incoming update. Used
/// only once a contact's `syncSource` is already `contacts_api`/`upgraded`
/// (see `spec.md` §4.5.1 step 5) — the stub-upgrade path always counts as a
/// change regardless of this function's result.
pub fn diff_contact(existing: &Contact, update: &ContactUpdate) -> ChangeSet {
    collect(vec![
        FieldDiff {
            name: "mobile",
            old: existing.mobile.clone().into(),
            new: update.mobile.into(),
            changed: !opt_str_eq(existing.mobile.as_deref(), update.mobile),
        },
        FieldDiff {
            name: "landline",
            old: existing.landline.clone().into(),
            new: update.landline.into(),
            changed: !opt_str_eq(existing.landline.as_deref(), update.landline),
        },
        FieldDiff {
            name: "email",
            old: existing.email.clone().into(),
            new: update.email.into(),
            changed: !opt_str_eq(existing.email.as_deref(), update.email),
        },
        FieldDiff {
            name: "identification",
            old: existing.identification.clone().into(),
            new: update.identification.into(),
            changed: !opt_str_eq(existing.identification.as_deref(), update.identification),
        },
        FieldDiff {
            name: "address",
            old: existing.address.clone().into(),
            new: update.address.into(),
            changed: !opt_str_eq(existing.address.as_deref(), update.address),
        },
        FieldDiff {
            name: "city",
            old: existing.city.clone().into(),
            new: update.city.into(),
            changed: !opt_str_eq(existing.city.as_deref(), update.city),
        },
        FieldDiff {
            name: "country",
            old: existing.country.clone().into(),
            new: update.country.into(),
            changed: !opt_str_eq(existing.country.as_deref(), update.country),
        },
        FieldDiff {
            name: "company",
            old: existing.company.clone().into(),
            new: update.company.into(),
            changed: !opt_str_eq(existing.company.as_deref(), update.company),
        },
        FieldDiff {
            name: "custom_attributes",
            old: existing.custom_attributes.clone(),
            new: update.custom_attributes.clone(),
            changed: canonical_json(&existing.custom_attributes) != canonical_json(update.custom_attributes),
        },
        FieldDiff {
            name: "merchant_id",
            old: existing.merchant_id.clone().into(),
            new: update.merchant_id.into(),
            changed: !opt_str_eq(existing.merchant_id.as_deref(), update.merchant_id),
        },
    ])
}

pub struct ChatUpdate<'a> {
    pub agent_id: Option<&'a str>,
    pub contact_id: Option<&'a str>,
    pub department_id: Option<&'a str>,
    pub status: &'a str,
    pub alias: Option<&'a str>,
    pub tags: &'a [String],
    pub opened_at: Option<chrono::DateTime<chrono::Utc>>,
    pub picked_up_at: Option<chrono::DateTime<chrono::Utc>>,
    pub response_at: Option<chrono::DateTime<chrono::Utc>>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub poll_response: Option<&'a Value>,
}

/// Field-level diff between a stored `Chat` and an incoming update,
/// including the `statusChanged`/`previousStatus`/`newStatus` triple
/// `spec.md` §4.5.2 uses to drive `ChatStatusHistory` writes.
pub fn diff_chat(existing: &Chat, update: &ChatUpdate) -> ChangeSet {
    let ts_eq = |a: Option<chrono::DateTime<chrono::Utc>>, b: Option<chrono::DateTime<chrono::Utc>>| a == b;
    let tags_eq = existing.tags.as_slice() == update.tags;

    let mut set = collect(vec![
        FieldDiff {
            name: "agent_id",
            old: existing.agent_id.clone().into(),
            new: update.agent_id.into(),
            changed: existing.agent_id.as_deref() != update.agent_id,
        },
        FieldDiff {
            name: "contact_id",
            old: existing.contact_id.clone().into(),
            new: update.contact_id.into(),
            changed: existing.contact_id.as_deref() != update.contact_id,
        },
        FieldDiff {
            name: "department_id",
            old: existing.department_id.clone().into(),
            new: update.department_id.into(),
            changed: existing.department_id.as_deref() != update.department_id,
        },
        FieldDiff {
            name: "status",
            old: existing.status.as_str().into(),
            new: update.status.into(),
            changed: existing.status.as_str() != update.status,
        },
        FieldDiff {
            name: "alias",
            old: existing.alias.clone().into(),
            new: update.alias.into(),
            changed: !opt_str_eq(existing.alias.as_deref(), update.alias),
        },
        FieldDiff {
            name: "tags",
            old: Value::from(existing.tags.clone()),
            new: Value::from(update.tags.to_vec()),
            changed: !tags_eq,
        },
        FieldDiff {
            name: "opened_at",
            old: existing.opened_at.map(|t| t.to_rfc3339()).into(),
            new: update.opened_at.map(|t| t.to_rfc3339()).into(),
            changed: !ts_eq(existing.opened_at, update.opened_at),
        },
        FieldDiff {
            name: "picked_up_at",
            old: existing.picked_up_at.map(|t| t.to_rfc3339()).into(),
            new: update.picked_up_at.map(|t| t.to_rfc3339()).into(),
            changed: !ts_eq(existing.picked_up_at, update.picked_up_at),
        },
        FieldDiff {
            name: "response_at",
            old: existing.response_at.map(|t| t.to_rfc3339()).into(),
            new: update.response_at.map(|t| t.to_rfc3339()).into(),
            changed: !ts_eq(existing.response_at, update.response_at),
        },
        FieldDiff {
            name: "closed_at",
            old: existing.closed_at.map(|t| t.to_rfc3339()).into(),
            new: update.closed_at.map(|t| t.to_rfc3339()).into(),
            changed: !ts_eq(existing.closed_at, update.closed_at),
        },
        FieldDiff {
            name: "poll_response",
            old: existing
                .poll_response
                .as_deref()
                .and_then(|s| serde_json::from_str::<Value>(s).ok())
                .unwrap_or(Value::Null),
            new: update.poll_response.cloned().unwrap_or(Value::Null),
            changed: canonical_json(
                &existing
                    .poll_response
                    .as_deref()
                    .and_then(|s| serde_json::from_str::<Value>(s).ok())
                    .unwrap_or(Value::Null),
            ) != canonical_json(&update.poll_response.cloned().unwrap_or(Value::Null)),
        },
    ]);

    set.status_changed = existing.status.as_str() != update.status;
    if set.status_changed {
        set.previous_status = Some(existing.status.as_str().to_string());
        set.new_status = Some(update.status.to_string());
    }

    set
}

pub struct AgentUpdate<'a> {
    pub name: &'a str,
    pub username: Option<&'a str>,
    pub email: Option<&'a str>,
    pub is_active: bool,
}

pub fn diff_agent(existing: &Agent, update: &AgentUpdate) -> ChangeSet {
    collect(vec![
        FieldDiff {
            name: "name",
            old: existing.name.clone().into(),
            new: update.name.into(),
            changed: existing.name != update.name,
        },
        FieldDiff {
            name: "username",
            old: existing.username.clone().into(),
            new: update.username.into(),
            changed: !opt_str_eq(existing.username.as_deref(), update.username),
        },
        FieldDiff {
            name: "email",
            old: existing.email.clone().into(),
            new: update.email.into(),
            changed: !opt_str_eq(existing.email.as_deref(), update.email),
        },
        FieldDiff {
            name: "is_active",
            old: existing.is_active.into(),
            new: update.is_active.into(),
            changed: existing.is_active != update.is_active,
        },
    ])
}

pub struct DepartmentUpdate<'a> {
    pub name: &'a str,
    pub is_active: bool,
    pub is_leaf: bool,
}

pub fn diff_department(existing: &Department, update: &DepartmentUpdate) -> ChangeSet {
    collect(vec![
        FieldDiff {
            name: "name",
            old: existing.name.clone().into(),
            new: update.name.into(),
            changed: existing.name != update.name,
        },
        FieldDiff {
            name: "is_active",
            old: existing.is_active.into(),
            new: update.is_active.into(),
            changed: existing.is_active != update.is_active,
        },
        FieldDiff {
            name: "is_leaf",
            old: existing.is_leaf.into(),
            new: update.is_leaf.into(),
            changed: existing.is_leaf != update.is_leaf,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatDirection, ChatProvider, ChatStatus, SyncSource};
    use chrono::Utc;

    fn sample_contact() -> Contact {
        Contact::new_stub("u1".to_string(), "John".to_string(), Utc::now())
    }

    #[test]
    fn identical_contact_update_has_no_changes() {
        let mut existing = sample_contact();
        existing.mobile = Some("+1".to_string());
        let update = ContactUpdate {
            mobile: Some("+1"),
            landline: None,
            email: None,
            identification: None,
            address: None,
            city: None,
            country: None,
            company: None,
            custom_attributes: &existing.custom_attributes,
            merchant_id: None,
        };
        let changes = diff_contact(&existing, &update);
        assert!(!changes.has_changes);
    }

    #[test]
    fn null_and_empty_string_are_equivalent() {
        let mut existing = sample_contact();
        existing.mobile = Some(String::new());
        let update = ContactUpdate {
            mobile: None,
            landline: None,
            email: None,
            identification: None,
            address: None,
            city: None,
            country: None,
            company: None,
            custom_attributes: &existing.custom_attributes,
            merchant_id: None,
        };
        let changes = diff_contact(&existing, &update);
        assert!(!changes.has_changes);
    }

    #[test]
    fn mobile_change_is_detected() {
        let existing = sample_contact();
        let update = ContactUpdate {
            mobile: Some("+19999"),
            landline: None,
            email: None,
            identification: None,
            address: None,
            city: None,
            country: None,
            company: None,
            custom_attributes: &existing.custom_attributes,
            merchant_id: None,
        };
        let changes = diff_contact(&existing, &update);
        assert!(changes.has_changes);
        assert!(changes.changed_fields.contains(&"mobile".to_string()));
    }

    #[test]
    fn status_change_is_flagged_with_previous_and_new() {
        let existing = Chat::new("c1".to_string(), ChatProvider::Whatsapp, ChatDirection::Incoming, Utc::now());
        assert_eq!(existing.status, ChatStatus::Opened);

        let update = ChatUpdate {
            agent_id: None,
            contact_id: None,
            department_id: None,
            status: "PICKED_UP",
            alias: None,
            tags: &[],
            opened_at: None,
            picked_up_at: None,
            response_at: None,
            closed_at: None,
            poll_response: None,
        };
        let changes = diff_chat(&existing, &update);
        assert!(changes.status_changed);
        assert_eq!(changes.previous_status.as_deref(), Some("OPENED"));
        assert_eq!(changes.new_status.as_deref(), Some("PICKED_UP"));
    }

    #[test]
    fn canonical_json_ignores_key_order() {
        let a: Value = serde_json::json!({"b": 1, "a": 2});
        let b: Value = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn stub_sync_source_is_chat_embedded() {
        assert_eq!(sample_contact().sync_source, SyncSource::ChatEmbedded);
    }
}
