//! Raw staging store (C3)
//!
//! Append-only by the Extract Engine; `processing_status` is mutated only
//! by the Transform Engine. Natural-key uniqueness is `(sync_id,
//! upstream_id)` — `upstream_id` alone repeats across runs because history
//! is preserved.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{RawChat, RawContact};

pub struct StagingStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StagingStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a page of raw contacts, skipping rows whose `(sync_id,
    /// upstream_id)` already exist.
    pub async fn insert_contacts(&self, rows: &[RawContact]) -> Result<u64> {
        let mut inserted = 0u64;
        for row in rows {
            let result = sqlx::query(
                r#"INSERT INTO raw_contacts
                    (id, sync_id, upstream_id, raw_json, api_page, api_offset, fetched_at, processing_status, processing_attempt)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
                   ON CONFLICT (sync_id, upstream_id) DO NOTHING"#,
            )
            .bind(&row.id)
            .bind(&row.sync_id)
            .bind(&row.upstream_id)
            .bind(row.raw_json.to_string())
            .bind(row.api_page)
            .bind(row.api_offset)
            .bind(row.fetched_at.to_rfc3339())
            .bind(row.processing_status.as_str())
            .execute(self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    pub async fn insert_chats(&self, rows: &[RawChat]) -> Result<u64> {
        let mut inserted = 0u64;
        for row in rows {
            let result = sqlx::query(
                r#"INSERT INTO raw_chats
                    (id, sync_id, upstream_id, raw_json, api_page, api_offset, fetched_at, processing_status, processing_attempt)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
                   ON CONFLICT (sync_id, upstream_id) DO NOTHING"#,
            )
            .bind(&row.id)
            .bind(&row.sync_id)
            .bind(&row.upstream_id)
            .bind(row.raw_json.to_string())
            .bind(row.api_page)
            .bind(row.api_offset)
            .bind(row.fetched_at.to_rfc3339())
            .bind(row.processing_status.as_str())
            .execute(self.pool)
            .await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    /// Legacy mode: only pending rows from one extract's `sync_id`.
    pub async fn pending_contacts_for_sync(&self, sync_id: &str) -> Result<Vec<RawContact>> {
        let rows = sqlx::query_as::<_, RawContactRow>(
            "SELECT * FROM raw_contacts WHERE sync_id = ? AND processing_status = 'pending' ORDER BY fetched_at ASC",
        )
        .bind(sync_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(RawContactRow::into_model).collect()
    }

    /// Batch-agnostic default mode: every pending row whose extract
    /// completed, for the given entity type (or all entity types).
    pub async fn pending_contacts_batch_agnostic(&self) -> Result<Vec<RawContact>> {
        let rows = sqlx::query_as::<_, RawContactRow>(
            r#"SELECT rc.* FROM raw_contacts rc
               WHERE rc.processing_status = 'pending'
                 AND rc.sync_id IN (
                   SELECT sync_id FROM extract_logs
                   WHERE status = 'completed' AND entity_type IN ('contacts', 'all')
                 )
               ORDER BY rc.fetched_at ASC"#,
        )
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(RawContactRow::into_model).collect()
    }

    pub async fn pending_chats_for_sync(&self, sync_id: &str) -> Result<Vec<RawChat>> {
        let rows = sqlx::query_as::<_, RawChatRow>(
            "SELECT * FROM raw_chats WHERE sync_id = ? AND processing_status = 'pending' ORDER BY fetched_at ASC",
        )
        .bind(sync_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(RawChatRow::into_model).collect()
    }

    pub async fn pending_chats_batch_agnostic(&self) -> Result<Vec<RawChat>> {
        let rows = sqlx::query_as::<_, RawChatRow>(
            r#"SELECT rc.* FROM raw_chats rc
               WHERE rc.processing_status = 'pending'
                 AND rc.sync_id IN (
                   SELECT sync_id FROM extract_logs
                   WHERE status = 'completed' AND entity_type IN ('chats', 'all')
                 )
               ORDER BY rc.fetched_at ASC"#,
        )
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(RawChatRow::into_model).collect()
    }

    pub async fn mark_contact_processed(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE raw_contacts SET processing_status = 'processed', processed_at = ?, processing_attempt = processing_attempt + 1 WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_contact_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE raw_contacts SET processing_status = 'failed', processing_error = ?, processing_attempt = processing_attempt + 1 WHERE id = ?",
        )
        .bind(error)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_chat_processed(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE raw_chats SET processing_status = 'processed', processed_at = ?, processing_attempt = processing_attempt + 1 WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_chat_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE raw_chats SET processing_status = 'failed', processing_error = ?, processing_attempt = processing_attempt + 1 WHERE id = ?",
        )
        .bind(error)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct RawContactRow {
    id: String,
    sync_id: String,
    upstream_id: String,
    raw_json: String,
    api_page: i32,
    api_offset: i32,
    fetched_at: String,
    processing_status: String,
    processing_attempt: i32,
    processing_error: Option<String>,
    processed_at: Option<String>,
}

impl RawContactRow {
    fn into_model(self) -> Result<RawContact> {
        Ok(RawContact {
            id: self.id,
            sync_id: self.sync_id,
            upstream_id: self.upstream_id,
            raw_json: serde_json::from_str(&self.raw_json)?,
            api_page: self.api_page,
            api_offset: self.api_offset,
            fetched_at: self.fetched_at.parse().map_err(|e| crate::error::Error::Database(format!("bad fetched_at: {e}")))?,
            processing_status: self.processing_status.parse()?,
            processing_attempt: self.processing_attempt,
            processing_error: self.processing_error,
            processed_at: self.processed_at.map(|s| s.parse()).transpose().map_err(|e: chrono::ParseError| crate::error::Error::Database(e.to_string()))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RawChatRow {
    id: String,
    sync_id: String,
    upstream_id: String,
    raw_json: String,
    api_page: i32,
    api_offset: i32,
    fetched_at: String,
    processing_status: String,
    processing_attempt: i32,
    processing_error: Option<String>,
    processed_at: Option<String>,
}

impl RawChatRow {
    fn into_model(self) -> Result<RawChat> {
        Ok(RawChat {
            id: self.id,
            sync_id: self.sync_id,
            upstream_id: self.upstream_id,
            raw_json: serde_json::from_str(&self.raw_json)?,
            api_page: self.api_page,
            api_offset: self.api_offset,
            fetched_at: self.fetched_at.parse().map_err(|e| crate::error::Error::Database(format!("bad fetched_at: {e}")))?,
            processing_status: self.processing_status.parse()?,
            processing_attempt: self.processing_attempt,
            processing_error: self.processing_error,
            processed_at: self.processed_at.map(|s| s.parse()).transpose().map_err(|e: chrono::ParseError| crate::error::Error::Database(e.to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use serde_json::json;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn insert_skips_duplicate_natural_key() {
        let db = test_db().await;
        let store = StagingStore::new(db.pool());

        let row = RawContact::new("sync-1".to_string(), "u1".to_string(), json!({"contact_id": "u1"}), 1, 0, Utc::now());
        let inserted = store.insert_contacts(&[row.clone()]).await.unwrap();
        assert_eq!(inserted, 1);

        let dup = RawContact::new("sync-1".to_string(), "u1".to_string(), json!({"contact_id": "u1", "fullname": "changed"}), 1, 0, Utc::now());
        let inserted_again = store.insert_contacts(&[dup]).await.unwrap();
        assert_eq!(inserted_again, 0);
    }

    #[tokio::test]
    async fn pending_rows_ordered_by_fetched_at() {
        let db = test_db().await;
        let store = StagingStore::new(db.pool());

        let earlier = Utc::now();
        let later = earlier + chrono::Duration::seconds(5);
        let row_a = RawContact::new("sync-1".to_string(), "a".to_string(), json!({"contact_id": "a"}), 1, 0, later);
        let row_b = RawContact::new("sync-1".to_string(), "b".to_string(), json!({"contact_id": "b"}), 1, 1, earlier);
        store.insert_contacts(&[row_a, row_b]).await.unwrap();

        let pending = store.pending_contacts_for_sync("sync-1").await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].upstream_id, "b");
        assert_eq!(pending[1].upstream_id, "a");
    }

    #[tokio::test]
    async fn mark_processed_updates_status() {
        let db = test_db().await;
        let store = StagingStore::new(db.pool());
        let row = RawContact::new("sync-1".to_string(), "u1".to_string(), json!({"contact_id": "u1"}), 1, 0, Utc::now());
        store.insert_contacts(&[row.clone()]).await.unwrap();

        store.mark_contact_processed(&row.id).await.unwrap();
        let pending = store.pending_contacts_for_sync("sync-1").await.unwrap();
        assert!(pending.is_empty());
    }
}
