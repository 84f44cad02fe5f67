//! Raw staging rows (C3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a staged raw row as it moves through transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ProcessingStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "processed" => Ok(ProcessingStatus::Processed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(crate::error::Error::Other(format!(
                "invalid processing_status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A contact payload exactly as extracted, before transform normalizes it.
/// Mutated only by the Transform Engine (`processing_status`,
/// `processing_attempt`, `processing_error`, `processed_at`); the Extract
/// Engine only ever inserts these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawContact {
    pub id: String,
    pub sync_id: String,
    pub upstream_id: String,
    pub raw_json: serde_json::Value,
    pub api_page: i32,
    pub api_offset: i32,
    pub fetched_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub processing_attempt: i32,
    pub processing_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RawContact {
    pub fn new(
        sync_id: String,
        upstream_id: String,
        raw_json: serde_json::Value,
        api_page: i32,
        api_offset: i32,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::ids::generate_id(crate::ids::RAW_CONTACT_PREFIX, &[&sync_id, &upstream_id, &api_page.to_string(), &api_offset.to_string()]),
            sync_id,
            upstream_id,
            raw_json,
            api_page,
            api_offset,
            fetched_at,
            processing_status: ProcessingStatus::Pending,
            processing_attempt: 0,
            processing_error: None,
            processed_at: None,
        }
    }
}

/// A chat payload exactly as extracted, including any embedded messages and
/// contact stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChat {
    pub id: String,
    pub sync_id: String,
    pub upstream_id: String,
    pub raw_json: serde_json::Value,
    pub api_page: i32,
    pub api_offset: i32,
    pub fetched_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
    pub processing_attempt: i32,
    pub processing_error: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl RawChat {
    pub fn new(
        sync_id: String,
        upstream_id: String,
        raw_json: serde_json::Value,
        api_page: i32,
        api_offset: i32,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: crate::ids::generate_id(crate::ids::RAW_CHAT_PREFIX, &[&sync_id, &upstream_id, &api_page.to_string(), &api_offset.to_string()]),
            sync_id,
            upstream_id,
            raw_json,
            api_page,
            api_offset,
            fetched_at,
            processing_status: ProcessingStatus::Pending,
            processing_attempt: 0,
            processing_error: None,
            processed_at: None,
        }
    }
}
