//! Extract/transform run-log persistence
//!
//! `extract_logs` and `transform_logs` share an identical shape (`RunLog`);
//! this is the one place that knows how to persist either, selected by
//! table name so the Extract and Transform engines don't duplicate the SQL.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::models::{LogStatus, RunLog};

pub struct RunLogStore<'a> {
    pool: &'a SqlitePool,
    table: &'static str,
}

impl<'a> RunLogStore<'a> {
    pub fn extract_logs(pool: &'a SqlitePool) -> Self {
        Self { pool, table: "extract_logs" }
    }

    pub fn transform_logs(pool: &'a SqlitePool) -> Self {
        Self { pool, table: "transform_logs" }
    }

    pub async fn insert(&self, log: &RunLog) -> Result<()> {
        let sql = format!(
            r#"INSERT INTO {} (id, sync_id, run_kind, entity_type, status, started_at, completed_at,
                 records_fetched, records_processed, records_created, records_updated, records_skipped, records_failed,
                 pages_fetched, truncated, metadata, error_class, error_message)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            self.table
        );
        sqlx::query(&sql)
            .bind(&log.id)
            .bind(&log.sync_id)
            .bind(&log.run_kind)
            .bind(&log.entity_type)
            .bind(log.status.as_str())
            .bind(log.started_at.to_rfc3339())
            .bind(log.completed_at.map(|t| t.to_rfc3339()))
            .bind(log.records_fetched)
            .bind(log.records_processed)
            .bind(log.records_created)
            .bind(log.records_updated)
            .bind(log.records_skipped)
            .bind(log.records_failed)
            .bind(log.pages_fetched)
            .bind(log.truncated)
            .bind(log.metadata.to_string())
            .bind(&log.error_class)
            .bind(&log.error_message)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn update(&self, log: &RunLog) -> Result<()> {
        let sql = format!(
            r#"UPDATE {} SET status = ?, completed_at = ?, records_fetched = ?, records_processed = ?,
                 records_created = ?, records_updated = ?, records_skipped = ?, records_failed = ?,
                 pages_fetched = ?, truncated = ?, metadata = ?, error_class = ?, error_message = ?
               WHERE id = ?"#,
            self.table
        );
        sqlx::query(&sql)
            .bind(log.status.as_str())
            .bind(log.completed_at.map(|t| t.to_rfc3339()))
            .bind(log.records_fetched)
            .bind(log.records_processed)
            .bind(log.records_created)
            .bind(log.records_updated)
            .bind(log.records_skipped)
            .bind(log.records_failed)
            .bind(log.pages_fetched)
            .bind(log.truncated)
            .bind(log.metadata.to_string())
            .bind(&log.error_class)
            .bind(&log.error_message)
            .bind(&log.id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Most recent runs, newest first, for the CLI `status` subcommand.
    pub async fn recent(&self, limit: i64) -> Result<Vec<RunLog>> {
        let sql = format!(
            r#"SELECT id, sync_id, run_kind, entity_type, status, started_at, completed_at,
                 records_fetched, records_processed, records_created, records_updated, records_skipped, records_failed,
                 pages_fetched, truncated, metadata, error_class, error_message
               FROM {} ORDER BY started_at DESC LIMIT ?"#,
            self.table
        );
        let rows = sqlx::query_as::<_, RunLogRow>(&sql).bind(limit).fetch_all(self.pool).await?;
        rows.into_iter().map(RunLogRow::into_model).collect()
    }

    /// Whether any run over `sync_id` for this table completed for the
    /// given entity type (or `all`) — used by the Transform Engine's
    /// batch-agnostic raw-row selection.
    pub async fn is_completed_for(&self, sync_id: &str, entity_type: &str) -> Result<bool> {
        let sql = format!(
            "SELECT status FROM {} WHERE sync_id = ? AND entity_type IN (?, 'all')",
            self.table
        );
        let status: Option<String> = sqlx::query_scalar(&sql)
            .bind(sync_id)
            .bind(entity_type)
            .fetch_optional(self.pool)
            .await?;
        Ok(status.as_deref() == Some(LogStatus::Completed.as_str()))
    }
}

#[derive(sqlx::FromRow)]
struct RunLogRow {
    id: String,
    sync_id: String,
    run_kind: String,
    entity_type: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    records_fetched: i64,
    records_processed: i64,
    records_created: i64,
    records_updated: i64,
    records_skipped: i64,
    records_failed: i64,
    pages_fetched: i64,
    truncated: bool,
    metadata: String,
    error_class: Option<String>,
    error_message: Option<String>,
}

impl RunLogRow {
    fn into_model(self) -> Result<RunLog> {
        Ok(RunLog {
            id: self.id,
            sync_id: self.sync_id,
            run_kind: self.run_kind,
            entity_type: self.entity_type,
            status: self.status.parse()?,
            started_at: parse_ts(&self.started_at)?,
            completed_at: self.completed_at.map(|s| parse_ts(&s)).transpose()?,
            records_fetched: self.records_fetched,
            records_processed: self.records_processed,
            records_created: self.records_created,
            records_updated: self.records_updated,
            records_skipped: self.records_skipped,
            records_failed: self.records_failed,
            pages_fetched: self.pages_fetched,
            truncated: self.truncated,
            metadata: serde_json::from_str(&self.metadata)?,
            error_class: self.error_class,
            error_message: self.error_message,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    s.parse().map_err(|e: chrono::ParseError| Error::Database(e.to_string()))
}
