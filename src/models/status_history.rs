//! Append-only chat status audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStatusHistory {
    pub id: String,
    pub chat_id: String,
    pub previous_status: String,
    pub new_status: String,
    pub changed_at: DateTime<Utc>,
    pub sync_id: Option<String>,
    pub transform_id: Option<String>,
}

impl ChatStatusHistory {
    pub fn new(
        chat_id: String,
        previous_status: String,
        new_status: String,
        changed_at: DateTime<Utc>,
        sync_id: Option<String>,
        transform_id: Option<String>,
    ) -> Self {
        Self {
            id: crate::ids::generate_id(
                crate::ids::STATUS_HISTORY_PREFIX,
                &[&chat_id, &previous_status, &new_status, &changed_at.to_rfc3339()],
            ),
            chat_id,
            previous_status,
            new_status,
            changed_at,
            sync_id,
            transform_id,
        }
    }
}
