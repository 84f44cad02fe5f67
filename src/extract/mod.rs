//! Extract Engine (C4)
//!
//! Pages through the upstream export endpoints via the rate-limited queue,
//! batch-inserts each page into raw staging, and tracks the running
//! counters that land in the finished `ExtractLog`'s `metadata`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::client::{ChatsParams, ContactsParams, UpstreamClient};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::ids::EXTRACT_LOG_PREFIX;
use crate::models::{EntityType, RawChat, RawContact, RunLog};
use crate::queue::RateLimitedQueue;
use crate::runlog::RunLogStore;
use crate::staging::StagingStore;
use crate::sync_state::SyncStateStore;

const DEFAULT_WINDOWED_MAX_PAGES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRangePreset {
    OneDay,
    SevenDays,
    ThirtyDays,
    NinetyDays,
    Custom,
    Full,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub mobile: Option<String>,
    pub upstream_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub batch_size: i64,
    pub full_sync: bool,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub time_range_preset: Option<TimeRangePreset>,
    pub max_pages: Option<u32>,
    pub contact_filter: Option<ContactFilter>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            full_sync: false,
            date_range: None,
            time_range_preset: None,
            max_pages: None,
            contact_filter: None,
        }
    }
}

#[derive(Default)]
struct ContactCounters {
    total: i64,
    with_mobile: i64,
    with_email: i64,
    with_identification: i64,
    with_custom_attributes: i64,
    earliest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
}

impl ContactCounters {
    fn observe(&mut self, contact: &crate::client::schema::NormalizedContact) {
        self.total += 1;
        if contact.mobile.is_some() {
            self.with_mobile += 1;
        }
        if contact.email.is_some() {
            self.with_email += 1;
        }
        if contact.identification.is_some() {
            self.with_identification += 1;
        }
        if !contact.custom_attributes.is_null() {
            self.with_custom_attributes += 1;
        }
        for ts in [contact.created_at, contact.updated_at].into_iter().flatten() {
            self.earliest = Some(self.earliest.map_or(ts, |e| e.min(ts)));
            self.latest = Some(self.latest.map_or(ts, |l| l.max(ts)));
        }
    }

    fn to_metadata(&self, pages: i64, truncated: bool) -> serde_json::Value {
        json!({
            "quality": {
                "with_mobile": self.with_mobile,
                "with_email": self.with_email,
                "with_identification": self.with_identification,
                "with_custom_attributes": self.with_custom_attributes,
            },
            "date_window_seen": { "earliest": self.earliest, "latest": self.latest },
            "performance": { "pages_fetched": pages },
            "truncated": truncated,
        })
    }
}

#[derive(Default)]
struct ChatCounters {
    total: i64,
    with_agent: i64,
    with_contact: i64,
    with_department: i64,
    with_messages: i64,
    total_messages: i64,
    provider_histogram: HashMap<String, i64>,
    status_histogram: HashMap<String, i64>,
    earliest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
}

impl ChatCounters {
    fn observe(&mut self, chat: &crate::client::schema::NormalizedChat) {
        self.total += 1;
        if chat.agent.is_some() {
            self.with_agent += 1;
        }
        if chat.contact.is_some() {
            self.with_contact += 1;
        }
        if chat.department.is_some() {
            self.with_department += 1;
        }
        if !chat.messages.is_empty() {
            self.with_messages += 1;
            self.total_messages += chat.messages.len() as i64;
        }
        let provider = chat.provider.clone().unwrap_or_else(|| "livechat".to_string());
        *self.provider_histogram.entry(provider).or_insert(0) += 1;
        *self.status_histogram.entry(chat.status.clone()).or_insert(0) += 1;

        self.earliest = Some(self.earliest.map_or(chat.created_at, |e| e.min(chat.created_at)));
        self.latest = Some(self.latest.map_or(chat.created_at, |l| l.max(chat.created_at)));
    }

    fn to_metadata(&self, pages: i64, truncated: bool) -> serde_json::Value {
        let avg_messages = if self.total > 0 {
            self.total_messages as f64 / self.total as f64
        } else {
            0.0
        };
        json!({
            "quality": {
                "with_agent": self.with_agent,
                "with_contact": self.with_contact,
                "with_department": self.with_department,
                "with_messages": self.with_messages,
                "avg_messages_per_chat": avg_messages,
            },
            "provider_histogram": self.provider_histogram,
            "status_histogram": self.status_histogram,
            "date_window_seen": { "earliest": self.earliest, "latest": self.latest },
            "performance": { "pages_fetched": pages },
            "truncated": truncated,
        })
    }
}

pub struct ExtractEngine {
    client: Arc<UpstreamClient>,
    queue: Arc<RateLimitedQueue>,
    db: Database,
}

impl ExtractEngine {
    pub fn new(client: Arc<UpstreamClient>, queue: Arc<RateLimitedQueue>, db: Database) -> Self {
        Self { client, queue, db }
    }

    /// Dispatch to `contacts`, `chats`, or both for `all`.
    pub async fn run(
        &self,
        sync_id: &str,
        entity_type: EntityType,
        options: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<RunLog>> {
        let mut logs = Vec::new();
        if matches!(entity_type, EntityType::Contacts | EntityType::All) {
            logs.push(self.run_contacts(sync_id, options, cancel).await?);
        }
        if matches!(entity_type, EntityType::Chats | EntityType::All) {
            logs.push(self.run_chats(sync_id, options, cancel).await?);
        }
        Ok(logs)
    }

    fn resolve_window(&self, options: &ExtractOptions, last_sync_timestamp: Option<DateTime<Utc>>) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let now = Utc::now();
        if let Some(preset) = options.time_range_preset {
            return match preset {
                TimeRangePreset::Full => (None, None),
                TimeRangePreset::OneDay => (Some((now - ChronoDuration::days(1)).date_naive()), Some(now.date_naive())),
                TimeRangePreset::SevenDays => (Some((now - ChronoDuration::days(7)).date_naive()), Some(now.date_naive())),
                TimeRangePreset::ThirtyDays => (Some((now - ChronoDuration::days(30)).date_naive()), Some(now.date_naive())),
                TimeRangePreset::NinetyDays => (Some((now - ChronoDuration::days(90)).date_naive()), Some(now.date_naive())),
                TimeRangePreset::Custom => options
                    .date_range
                    .map(|(from, to)| (Some(from), Some(to)))
                    .unwrap_or((None, None)),
            };
        }
        if let Some((from, to)) = options.date_range {
            return (Some(from), Some(to));
        }
        if options.full_sync {
            return (None, None);
        }
        (last_sync_timestamp.map(|t| t.date_naive()), None)
    }

    fn max_pages(&self, options: &ExtractOptions) -> u32 {
        options.max_pages.unwrap_or(if options.full_sync { u32::MAX } else { DEFAULT_WINDOWED_MAX_PAGES })
    }

    pub async fn run_contacts(&self, sync_id: &str, options: &ExtractOptions, cancel: &CancellationToken) -> Result<RunLog> {
        let started_at = Utc::now();
        let mut log = RunLog::start(sync_id.to_string(), "extract", "contacts", EXTRACT_LOG_PREFIX, started_at);
        let log_store = RunLogStore::extract_logs(self.db.pool());
        log_store.insert(&log).await?;

        let result = self.run_contacts_inner(sync_id, options, cancel, &mut log).await;

        match result {
            Ok(()) => {
                log.finish_ok(Utc::now());
                log_store.update(&log).await?;
                SyncStateStore::new(self.db.pool()).mark_synced("contacts", Utc::now()).await?;
            }
            Err(err) => {
                log.finish_err(Utc::now(), &err);
                log_store.update(&log).await?;
                if !matches!(err, Error::Cancelled) {
                    return Err(err);
                }
            }
        }
        Ok(log)
    }

    async fn run_contacts_inner(
        &self,
        sync_id: &str,
        options: &ExtractOptions,
        cancel: &CancellationToken,
        log: &mut RunLog,
    ) -> Result<()> {
        let sync_state = SyncStateStore::new(self.db.pool()).get("contacts").await?;
        let (updated_from, updated_to) = self.resolve_window(options, sync_state.and_then(|s| s.last_sync_timestamp));
        let max_pages = self.max_pages(options);
        let staging = StagingStore::new(self.db.pool());

        let mut counters = ContactCounters::default();
        let mut offset = 0i64;
        let mut page_no = 1u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if page_no > max_pages {
                log.truncated = true;
                break;
            }

            let params = ContactsParams {
                offset,
                limit: options.batch_size,
                updated_from,
                updated_to,
            };
            let client = self.client.clone();
            let (page, _timing) = self
                .queue
                .execute(cancel, || {
                    let client = client.clone();
                    let params = params.clone();
                    async move { client.get_contacts(&params).await }
                })
                .await?;

            if page.data.is_empty() {
                break;
            }

            let fetched_at = Utc::now();
            let mut rows = Vec::with_capacity(page.data.len());
            for (idx, contact) in page.data.iter().enumerate() {
                if let Some(filter) = &options.contact_filter {
                    if let Some(mobile) = &filter.mobile {
                        if contact.mobile.as_deref() != Some(mobile.as_str()) {
                            continue;
                        }
                    }
                    if let Some(upstream_id) = &filter.upstream_id {
                        if &contact.contact_id != upstream_id {
                            continue;
                        }
                    }
                }
                counters.observe(contact);
                let raw_json = serde_json::to_value(contact)?;
                rows.push(RawContact::new(
                    sync_id.to_string(),
                    contact.contact_id.clone(),
                    raw_json,
                    page_no as i32,
                    (offset as usize + idx) as i32,
                    fetched_at,
                ));
            }
            let inserted = staging.insert_contacts(&rows).await?;

            log.records_fetched += page.data.len() as i64;
            log.records_created += inserted as i64;
            log.pages_fetched += 1;

            if !page.pagination.has_next_page {
                break;
            }
            offset += page.data.len() as i64;
            page_no += 1;
        }

        log.metadata = counters.to_metadata(log.pages_fetched, log.truncated);
        Ok(())
    }

    pub async fn run_chats(&self, sync_id: &str, options: &ExtractOptions, cancel: &CancellationToken) -> Result<RunLog> {
        let started_at = Utc::now();
        let mut log = RunLog::start(sync_id.to_string(), "extract", "chats", EXTRACT_LOG_PREFIX, started_at);
        let log_store = RunLogStore::extract_logs(self.db.pool());
        log_store.insert(&log).await?;

        let result = self.run_chats_inner(sync_id, options, cancel, &mut log).await;

        match result {
            Ok(()) => {
                log.finish_ok(Utc::now());
                log_store.update(&log).await?;
                SyncStateStore::new(self.db.pool()).mark_synced("chats", Utc::now()).await?;
            }
            Err(err) => {
                log.finish_err(Utc::now(), &err);
                log_store.update(&log).await?;
                if !matches!(err, Error::Cancelled) {
                    return Err(err);
                }
            }
        }
        Ok(log)
    }

    async fn run_chats_inner(
        &self,
        sync_id: &str,
        options: &ExtractOptions,
        cancel: &CancellationToken,
        log: &mut RunLog,
    ) -> Result<()> {
        let sync_state = SyncStateStore::new(self.db.pool()).get("chats").await?;
        let (date_range_from, date_range_to) = self.resolve_window(options, sync_state.and_then(|s| s.last_sync_timestamp));
        let max_pages = self.max_pages(options);
        let staging = StagingStore::new(self.db.pool());

        let mut counters = ChatCounters::default();
        let mut offset = 0i64;
        let mut page_no = 1u32;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if page_no > max_pages {
                log.truncated = true;
                break;
            }

            let params = ChatsParams {
                offset,
                limit: options.batch_size,
                date_range_from,
                date_range_to,
            };
            let client = self.client.clone();
            let (page, _timing) = self
                .queue
                .execute(cancel, || {
                    let client = client.clone();
                    let params = params.clone();
                    async move { client.get_chats(&params).await }
                })
                .await?;

            if page.data.is_empty() {
                break;
            }

            let fetched_at = Utc::now();
            let mut rows = Vec::with_capacity(page.data.len());
            for (idx, chat) in page.data.iter().enumerate() {
                counters.observe(chat);
                let raw_json = serde_json::to_value(chat)?;
                rows.push(RawChat::new(
                    sync_id.to_string(),
                    chat.id.clone(),
                    raw_json,
                    page_no as i32,
                    (offset as usize + idx) as i32,
                    fetched_at,
                ));
            }
            let inserted = staging.insert_chats(&rows).await?;

            log.records_fetched += page.data.len() as i64;
            log.records_created += inserted as i64;
            log.pages_fetched += 1;

            if !page.pagination.has_next_page {
                break;
            }
            offset += page.data.len() as i64;
            page_no += 1;
        }

        log.metadata = counters.to_metadata(log.pages_fetched, log.truncated);
        Ok(())
    }
}
