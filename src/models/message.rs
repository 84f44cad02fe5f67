//! Message entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "image" | "photo" => MessageType::Image,
            "file" | "document" => MessageType::File,
            _ => MessageType::Text,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single chat message. `id` is a stable hash of `chat_id + timestamp +
/// index`, so re-running transform on the same raw chat never inserts a
/// duplicate (see `crate::ids::message_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub text: Option<String>,
    pub message_type: MessageType,
    pub incoming: bool,
    pub timestamp: DateTime<Utc>,
    pub caption: Option<String>,
    pub image_url: Option<String>,
    pub file_url: Option<String>,
}
