//! Contact entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a contact's data last came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSource {
    /// Created as a stub embedded in a chat payload
    ChatEmbedded,
    /// Created directly from the contacts endpoint
    ContactsApi,
    /// Started as a stub, later upgraded from the contacts endpoint
    Upgraded,
}

impl SyncSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSource::ChatEmbedded => "chat_embedded",
            SyncSource::ContactsApi => "contacts_api",
            SyncSource::Upgraded => "upgraded",
        }
    }
}

impl std::str::FromStr for SyncSource {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat_embedded" => Ok(SyncSource::ChatEmbedded),
            "contacts_api" => Ok(SyncSource::ContactsApi),
            "upgraded" => Ok(SyncSource::Upgraded),
            other => Err(crate::error::Error::Other(format!(
                "invalid sync_source: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for SyncSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry in a contact's ordered tag history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactTag {
    pub name: String,
    pub assigned_at: Option<DateTime<Utc>>,
}

/// A normalized, authoritative contact record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub upstream_id: String,
    pub full_name: String,
    pub mobile: Option<String>,
    pub landline: Option<String>,
    pub email: Option<String>,
    pub identification: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub company: Option<String>,
    pub custom_attributes: serde_json::Value,
    pub tags: Vec<ContactTag>,
    pub merchant_id: Option<String>,
    pub upstream_created_at: Option<DateTime<Utc>>,
    pub upstream_updated_at: Option<DateTime<Utc>>,
    pub sync_source: SyncSource,
    pub needs_full_sync: bool,
    pub last_sync_at: DateTime<Utc>,
}

impl Contact {
    /// A brand-new stub contact created while transforming a chat.
    pub fn new_stub(upstream_id: String, full_name: String, now: DateTime<Utc>) -> Self {
        Self {
            id: crate::ids::generate_id(crate::ids::CONTACT_PREFIX, &[&upstream_id]),
            upstream_id,
            full_name,
            mobile: None,
            landline: None,
            email: None,
            identification: None,
            address: None,
            city: None,
            country: None,
            company: None,
            custom_attributes: serde_json::Value::Null,
            tags: Vec::new(),
            merchant_id: None,
            upstream_created_at: None,
            upstream_updated_at: None,
            sync_source: SyncSource::ChatEmbedded,
            needs_full_sync: true,
            last_sync_at: now,
        }
    }
}
