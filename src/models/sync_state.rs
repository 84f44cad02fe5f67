//! Sync-state & checkpoint persistence (C9)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-water mark for a given entity type: the last successfully synced
/// position, used to resolve the next run's date window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub entity_type: String,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub last_synced_id: Option<String>,
    pub last_sync_offset: Option<i64>,
    pub sync_status: String,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(entity_type: String, updated_at: DateTime<Utc>) -> Self {
        Self {
            entity_type,
            last_sync_timestamp: None,
            last_synced_id: None,
            last_sync_offset: None,
            sync_status: "idle".to_string(),
            updated_at,
        }
    }
}

/// A mid-run resumption point and final tally for one extract/transform
/// run, so a cancelled or crashed run can restart without re-fetching pages
/// that already landed in raw staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub id: String,
    pub sync_id: String,
    pub entity_type: String,
    pub last_page: i32,
    pub last_cursor: Option<String>,
    pub total_records: i64,
    pub processed_records: i64,
    pub successful_records: i64,
    pub failed_records: i64,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

impl SyncCheckpoint {
    pub fn new(sync_id: String, entity_type: String, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: crate::ids::generate_id(crate::ids::CHECKPOINT_PREFIX, &[&sync_id, &entity_type]),
            sync_id,
            entity_type,
            last_page: 0,
            last_cursor: None,
            total_records: 0,
            processed_records: 0,
            successful_records: 0,
            failed_records: 0,
            status: "running".to_string(),
            updated_at,
        }
    }
}
