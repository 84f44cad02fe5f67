//! Sync-state & checkpoint persistence (C9)
//!
//! Thin query layer over `sync_state`/`sync_checkpoints`. The Extract Engine
//! reads `SyncState.last_sync_timestamp` to resolve the default date window
//! and writes a fresh `SyncCheckpoint` as pages land, so a cancelled or
//! crashed run can tell where it left off.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{SyncCheckpoint, SyncState};

pub struct SyncStateStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SyncStateStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, entity_type: &str) -> Result<Option<SyncState>> {
        let row = sqlx::query_as::<_, SyncStateRow>(
            "SELECT * FROM sync_state WHERE entity_type = ?",
        )
        .bind(entity_type)
        .fetch_optional(self.pool)
        .await?;
        row.map(SyncStateRow::into_model).transpose()
    }

    pub async fn upsert(&self, state: &SyncState) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO sync_state (entity_type, last_sync_timestamp, last_synced_id, last_sync_offset, sync_status, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT (entity_type) DO UPDATE SET
                 last_sync_timestamp = excluded.last_sync_timestamp,
                 last_synced_id = excluded.last_synced_id,
                 last_sync_offset = excluded.last_sync_offset,
                 sync_status = excluded.sync_status,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&state.entity_type)
        .bind(state.last_sync_timestamp.map(|t| t.to_rfc3339()))
        .bind(&state.last_synced_id)
        .bind(state.last_sync_offset)
        .bind(&state.sync_status)
        .bind(state.updated_at.to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_checkpoint(&self, sync_id: &str, entity_type: &str) -> Result<Option<SyncCheckpoint>> {
        let row = sqlx::query_as::<_, SyncCheckpointRow>(
            "SELECT * FROM sync_checkpoints WHERE sync_id = ? AND entity_type = ?",
        )
        .bind(sync_id)
        .bind(entity_type)
        .fetch_optional(self.pool)
        .await?;
        row.map(SyncCheckpointRow::into_model).transpose()
    }

    pub async fn upsert_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO sync_checkpoints
                 (id, sync_id, entity_type, last_page, last_cursor, total_records, processed_records, successful_records, failed_records, status, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (sync_id, entity_type) DO UPDATE SET
                 last_page = excluded.last_page,
                 last_cursor = excluded.last_cursor,
                 total_records = excluded.total_records,
                 processed_records = excluded.processed_records,
                 successful_records = excluded.successful_records,
                 failed_records = excluded.failed_records,
                 status = excluded.status,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&checkpoint.id)
        .bind(&checkpoint.sync_id)
        .bind(&checkpoint.entity_type)
        .bind(checkpoint.last_page)
        .bind(&checkpoint.last_cursor)
        .bind(checkpoint.total_records)
        .bind(checkpoint.processed_records)
        .bind(checkpoint.successful_records)
        .bind(checkpoint.failed_records)
        .bind(&checkpoint.status)
        .bind(checkpoint.updated_at.to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Convenience used by the Extract Engine after a successful run.
    pub async fn mark_synced(&self, entity_type: &str, last_sync_timestamp: chrono::DateTime<Utc>) -> Result<()> {
        let mut state = self.get(entity_type).await?.unwrap_or_else(|| SyncState::new(entity_type.to_string(), Utc::now()));
        state.last_sync_timestamp = Some(last_sync_timestamp);
        state.sync_status = "idle".to_string();
        state.updated_at = Utc::now();
        self.upsert(&state).await
    }
}

#[derive(sqlx::FromRow)]
struct SyncStateRow {
    entity_type: String,
    last_sync_timestamp: Option<String>,
    last_synced_id: Option<String>,
    last_sync_offset: Option<i64>,
    sync_status: String,
    updated_at: String,
}

impl SyncStateRow {
    fn into_model(self) -> Result<SyncState> {
        Ok(SyncState {
            entity_type: self.entity_type,
            last_sync_timestamp: self
                .last_sync_timestamp
                .map(|s| s.parse())
                .transpose()
                .map_err(|e: chrono::ParseError| crate::error::Error::Database(e.to_string()))?,
            last_synced_id: self.last_synced_id,
            last_sync_offset: self.last_sync_offset,
            sync_status: self.sync_status,
            updated_at: self
                .updated_at
                .parse()
                .map_err(|e: chrono::ParseError| crate::error::Error::Database(e.to_string()))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SyncCheckpointRow {
    id: String,
    sync_id: String,
    entity_type: String,
    last_page: i32,
    last_cursor: Option<String>,
    total_records: i64,
    processed_records: i64,
    successful_records: i64,
    failed_records: i64,
    status: String,
    updated_at: String,
}

impl SyncCheckpointRow {
    fn into_model(self) -> Result<SyncCheckpoint> {
        Ok(SyncCheckpoint {
            id: self.id,
            sync_id: self.sync_id,
            entity_type: self.entity_type,
            last_page: self.last_page,
            last_cursor: self.last_cursor,
            total_records: self.total_records,
            processed_records: self.processed_records,
            successful_records: self.successful_records,
            failed_records: self.failed_records,
            status: self.status,
            updated_at: self
                .updated_at
                .parse()
                .map_err(|e: chrono::ParseError| crate::error::Error::Database(e.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let db = test_db().await;
        let store = SyncStateStore::new(db.pool());
        let mut state = SyncState::new("contacts".to_string(), Utc::now());
        state.last_sync_timestamp = Some(Utc::now());
        store.upsert(&state).await.unwrap();

        let fetched = store.get("contacts").await.unwrap().unwrap();
        assert_eq!(fetched.entity_type, "contacts");
        assert!(fetched.last_sync_timestamp.is_some());
    }

    #[tokio::test]
    async fn checkpoint_upsert_updates_in_place() {
        let db = test_db().await;
        let store = SyncStateStore::new(db.pool());
        let mut checkpoint = SyncCheckpoint::new("sync-1".to_string(), "contacts".to_string(), Utc::now());
        checkpoint.last_page = 1;
        store.upsert_checkpoint(&checkpoint).await.unwrap();

        checkpoint.last_page = 2;
        checkpoint.processed_records = 50;
        store.upsert_checkpoint(&checkpoint).await.unwrap();

        let fetched = store.get_checkpoint("sync-1", "contacts").await.unwrap().unwrap();
        assert_eq!(fetched.last_page, 2);
        assert_eq!(fetched.processed_records, 50);
    }

    #[tokio::test]
    async fn mark_synced_creates_state_when_absent() {
        let db = test_db().await;
        let store = SyncStateStore::new(db.pool());
        let now = Utc::now();
        store.mark_synced("chats", now).await.unwrap();

        let fetched = store.get("chats").await.unwrap().unwrap();
        assert_eq!(fetched.sync_status, "idle");
        assert!(fetched.last_sync_timestamp.is_some());
    }
}
