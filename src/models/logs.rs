//! Extract/transform run logs (C4, C7 observability)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Running => "running",
            LogStatus::Completed => "completed",
            LogStatus::Failed => "failed",
            LogStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for LogStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(LogStatus::Running),
            "completed" => Ok(LogStatus::Completed),
            "failed" => Ok(LogStatus::Failed),
            "cancelled" => Ok(LogStatus::Cancelled),
            other => Err(crate::error::Error::Other(format!("invalid log status: {other}"))),
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single extract or transform run, keyed by `sync_id` so the
/// `CancellationManager` (C8) and the CLI's `status` subcommand can look it
/// up while it's in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    pub id: String,
    pub sync_id: String,
    pub run_kind: String,
    pub entity_type: String,
    pub status: LogStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_fetched: i64,
    pub records_processed: i64,
    pub records_created: i64,
    pub records_updated: i64,
    pub records_skipped: i64,
    pub records_failed: i64,
    pub pages_fetched: i64,
    pub truncated: bool,
    /// Opaque summary (quality/performance/date-window stats for extract;
    /// contact filter echo, batch mode for transform), canonical JSON.
    pub metadata: serde_json::Value,
    pub error_class: Option<String>,
    pub error_message: Option<String>,
}

impl RunLog {
    pub fn start(sync_id: String, run_kind: &str, entity_type: &str, prefix: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            id: crate::ids::generate_id(prefix, &[&sync_id, run_kind, entity_type, &started_at.to_rfc3339()]),
            sync_id,
            run_kind: run_kind.to_string(),
            entity_type: entity_type.to_string(),
            status: LogStatus::Running,
            started_at,
            completed_at: None,
            records_fetched: 0,
            records_processed: 0,
            records_created: 0,
            records_updated: 0,
            records_skipped: 0,
            records_failed: 0,
            pages_fetched: 0,
            truncated: false,
            metadata: serde_json::Value::Null,
            error_class: None,
            error_message: None,
        }
    }

    pub fn finish_ok(&mut self, completed_at: DateTime<Utc>) {
        self.status = LogStatus::Completed;
        self.completed_at = Some(completed_at);
    }

    pub fn finish_err(&mut self, completed_at: DateTime<Utc>, err: &crate::error::Error) {
        self.status = if matches!(err, crate::error::Error::Cancelled) {
            LogStatus::Cancelled
        } else {
            LogStatus::Failed
        };
        self.completed_at = Some(completed_at);
        self.error_class = Some(err.class().to_string());
        self.error_message = Some(err.to_string());
    }
}
