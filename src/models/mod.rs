//! Normalized and staging entity types
//!
//! Raw payloads from the upstream are opaque `serde_json::Value` documents
//! validated at the client boundary (see `crate::client::schema`); once they
//! cross into these types every field is concrete and enumerated.

mod agent;
mod chat;
mod contact;
mod department;
mod logs;
mod message;
mod raw;
mod status_history;
mod sync_state;

pub use agent::Agent;
pub use chat::{Chat, ChatDirection, ChatProvider, ChatStatus};
pub use contact::{Contact, ContactTag, SyncSource};
pub use department::Department;
pub use logs::{LogStatus, RunLog};
pub use message::{Message, MessageType};
pub use raw::{ProcessingStatus, RawChat, RawContact};
pub use status_history::ChatStatusHistory;
pub use sync_state::{SyncCheckpoint, SyncState};

/// The entity family a run operates over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Contacts,
    Chats,
    All,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contacts => "contacts",
            EntityType::Chats => "chats",
            EntityType::All => "all",
        }
    }

    /// Whether an `ExtractLog`/`TransformLog` for `logged` entity type
    /// satisfies a selection for `self`.
    pub fn matches(&self, logged: &str) -> bool {
        match self {
            EntityType::All => true,
            other => other.as_str() == logged,
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contacts" => Ok(EntityType::Contacts),
            "chats" => Ok(EntityType::Chats),
            "all" => Ok(EntityType::All),
            other => Err(crate::error::Error::InvalidInput(format!(
                "Invalid entity type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
