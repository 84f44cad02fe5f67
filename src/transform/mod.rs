//! Transform Engine (C7)
//!
//! Reads pending raw rows out of staging, reconciles them against the
//! normalized entities, and recomputes SLA metrics on every chat change.
//! Per-record isolation: one bad raw row is marked `failed` and the run
//! continues (`spec.md` §4.5).

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::change_detection::{diff_chat, diff_contact, AgentUpdate, ChatUpdate, ContactUpdate, DepartmentUpdate, diff_agent, diff_department};
use crate::client::schema::{self, NormalizedChat, NormalizedContact};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::ids::{self, TRANSFORM_LOG_PREFIX};
use crate::models::{
    Agent, Chat, ChatDirection, ChatProvider, ChatStatus, ChatStatusHistory, Contact, ContactTag, Department, EntityType,
    Message, MessageType, RawChat, RawContact, RunLog, SyncSource,
};
use crate::repository::EntityRepository;
use crate::runlog::RunLogStore;
use crate::sla::{MessageTiming, SlaCalculator};
use crate::staging::StagingStore;

const BROADCAST_TAG_MARKERS: [&str; 4] = ["broadcast", "campaign", "mass_message", "bulk"];

#[derive(Debug, Clone, Default)]
pub struct TransformOptions {
    pub extract_sync_id: Option<String>,
    pub user_id: Option<String>,
}

pub struct TransformEngine {
    db: Database,
    sla: Arc<SlaCalculator>,
}

impl TransformEngine {
    pub fn new(db: Database, sla: Arc<SlaCalculator>) -> Self {
        Self { db, sla }
    }

    pub async fn run(
        &self,
        sync_id: &str,
        entity_type: EntityType,
        options: &TransformOptions,
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

    pub async fn run_contacts(&self, sync_id: &str, options: &TransformOptions, cancel: &CancellationToken) -> Result<RunLog> {
        let started_at = Utc::now();
        let mut log = RunLog::start(sync_id.to_string(), "transform", "contacts", TRANSFORM_LOG_PREFIX, started_at);
        let log_store = RunLogStore::transform_logs(self.db.pool());
        log_store.insert(&log).await?;

        let result = self.run_contacts_inner(options, cancel, &mut log).await;
        match result {
            Ok(()) => log.finish_ok(Utc::now()),
            Err(err) => {
                log.finish_err(Utc::now(), &err);
                log_store.update(&log).await?;
                if !matches!(err, Error::Cancelled) {
                    return Err(err);
                }
                return Ok(log);
            }
        }
        log_store.update(&log).await?;
        Ok(log)
    }

    async fn run_contacts_inner(&self, options: &TransformOptions, cancel: &CancellationToken, log: &mut RunLog) -> Result<()> {
        let staging = StagingStore::new(self.db.pool());
        let rows = match &options.extract_sync_id {
            Some(sync_id) => staging.pending_contacts_for_sync(sync_id).await?,
            None => staging.pending_contacts_batch_agnostic().await?,
        };

        let repo = EntityRepository::new(self.db.pool());
        for row in rows {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            log.records_fetched += 1;
            match self.transform_contact_row(&repo, &row).await {
                Ok(Outcome::Created) => {
                    log.records_created += 1;
                    log.records_processed += 1;
                }
                Ok(Outcome::Updated) => {
                    log.records_updated += 1;
                    log.records_processed += 1;
                }
                Ok(Outcome::Skipped) => {
                    log.records_skipped += 1;
                    log.records_processed += 1;
                }
                Err(err) => {
                    log.records_failed += 1;
                    staging.mark_contact_failed(&row.id, &err.to_string()).await?;
                    continue;
                }
            }
            staging.mark_contact_processed(&row.id).await?;
        }
        Ok(())
    }

    async fn transform_contact_row(&self, repo: &EntityRepository<'_>, row: &RawContact) -> Result<Outcome> {
        let contact: NormalizedContact = serde_json::from_value(row.raw_json.clone())
            .map_err(|e| Error::Schema(format!("missing or invalid contact_id: {e}")))?;

        let now = Utc::now();
        match repo.get_contact_by_upstream(&contact.contact_id).await? {
            None => {
                let record = build_contact(&contact, now, SyncSource::ContactsApi, false);
                repo.insert_contact(&record).await?;
                Ok(Outcome::Created)
            }
            Some(existing) if existing.sync_source == SyncSource::ChatEmbedded => {
                let mut merged = existing;
                merge_api_wins(&mut merged, &contact);
                merged.sync_source = SyncSource::Upgraded;
                merged.needs_full_sync = false;
                merged.last_sync_at = now;
                repo.update_contact(&merged).await?;
                Ok(Outcome::Updated)
            }
            Some(existing) => {
                let tags = contact.tags.iter().map(|t| t.name.clone()).collect::<Vec<_>>().join(",");
                let update = ContactUpdate {
                    mobile: contact.mobile.as_deref(),
                    landline: contact.landline.as_deref(),
                    email: contact.email.as_deref(),
                    identification: contact.identification.as_deref(),
                    address: contact.address.as_deref(),
                    city: contact.city.as_deref(),
                    country: contact.country.as_deref(),
                    company: contact.company.as_deref(),
                    custom_attributes: &contact.custom_attributes,
                    merchant_id: contact.merchant_id.as_deref(),
                };
                let _ = &tags;
                let changes = diff_contact(&existing, &update);
                if !changes.has_changes {
                    return Ok(Outcome::Skipped);
                }
                let mut updated = existing;
                apply_contact_update(&mut updated, &contact);
                updated.last_sync_at = now;
                repo.update_contact(&updated).await?;
                Ok(Outcome::Updated)
            }
        }
    }

    pub async fn run_chats(&self, sync_id: &str, options: &TransformOptions, cancel: &CancellationToken) -> Result<RunLog> {
        let started_at = Utc::now();
        let mut log = RunLog::start(sync_id.to_string(), "transform", "chats", TRANSFORM_LOG_PREFIX, started_at);
        let log_store = RunLogStore::transform_logs(self.db.pool());
        log_store.insert(&log).await?;

        let result = self.run_chats_inner(sync_id, options, cancel, &mut log).await;
        match result {
            Ok(()) => log.finish_ok(Utc::now()),
            Err(err) => {
                log.finish_err(Utc::now(), &err);
                log_store.update(&log).await?;
                if !matches!(err, Error::Cancelled) {
                    return Err(err);
                }
                return Ok(log);
            }
        }
        log_store.update(&log).await?;
        Ok(log)
    }

    async fn run_chats_inner(&self, sync_id: &str, options: &TransformOptions, cancel: &CancellationToken, log: &mut RunLog) -> Result<()> {
        let staging = StagingStore::new(self.db.pool());
        let rows = match &options.extract_sync_id {
            Some(sid) => staging.pending_chats_for_sync(sid).await?,
            None => staging.pending_chats_batch_agnostic().await?,
        };

        let repo = EntityRepository::new(self.db.pool());
        for row in rows {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            log.records_fetched += 1;
            match self.transform_chat_row(&repo, &row, sync_id).await {
                Ok(Outcome::Created) => {
                    log.records_created += 1;
                    log.records_processed += 1;
                }
                Ok(Outcome::Updated) => {
                    log.records_updated += 1;
                    log.records_processed += 1;
                }
                Ok(Outcome::Skipped) => {
                    log.records_skipped += 1;
                    log.records_processed += 1;
                }
                Err(err) => {
                    log.records_failed += 1;
                    staging.mark_chat_failed(&row.id, &err.to_string()).await?;
                    continue;
                }
            }
            staging.mark_chat_processed(&row.id).await?;
        }
        Ok(())
    }

    async fn transform_chat_row(&self, repo: &EntityRepository<'_>, row: &RawChat, sync_id: &str) -> Result<Outcome> {
        let chat_in: NormalizedChat = serde_json::from_value(row.raw_json.clone())
            .map_err(|e| Error::Schema(format!("invalid chat payload: {e}")))?;
        let now = Utc::now();

        let agent_id = match &chat_in.agent {
            Some(name) => Some(self.upsert_agent_stub(repo, name).await?),
            None => None,
        };
        let department_id = match &chat_in.department {
            Some(name) => Some(self.upsert_department_stub(repo, name).await?),
            None => None,
        };
        let contact_id = match &chat_in.contact {
            Some(stub) => Some(self.upsert_contact_stub(repo, stub, now).await?),
            None => None,
        };

        let provider = chat_in
            .provider
            .as_deref()
            .and_then(|p| p.parse::<ChatProvider>().ok())
            .unwrap_or(ChatProvider::Livechat);
        let status = ChatStatus::parse(&chat_in.status)?;
        let duration_seconds = chat_in.duration.as_ref().and_then(schema::parse_duration_seconds);

        let poll_started_at = chat_in.poll_started_at;
        let poll_completed_at = if status == ChatStatus::CompletedPoll { chat_in.poll_completed_at } else { None };
        let poll_abandoned_at = if status == ChatStatus::AbandonedPoll { chat_in.poll_abandoned_at } else { None };
        let poll_response = chat_in.poll_response.as_ref().map(|v| v.to_string());

        let existing = repo.get_chat_by_upstream(&chat_in.id).await?;
        let outcome = match existing {
            None => {
                let direction = detect_direction(&chat_in);
                let mut chat = Chat::new(chat_in.id.clone(), provider, direction, chat_in.created_at);
                chat.agent_id = agent_id;
                chat.contact_id = contact_id;
                chat.department_id = department_id;
                chat.status = status;
                chat.alias = chat_in.alias.clone();
                chat.tags = chat_in.tags.clone();
                chat.opened_at = chat_in.opened_at;
                chat.picked_up_at = chat_in.picked_up_at;
                chat.response_at = chat_in.response_at;
                chat.closed_at = chat_in.closed_at;
                chat.duration_seconds = duration_seconds;
                chat.poll_started_at = poll_started_at;
                chat.poll_completed_at = poll_completed_at;
                chat.poll_abandoned_at = poll_abandoned_at;
                chat.poll_response = poll_response;

                self.recompute_sla(&mut chat, &chat_in).await?;
                repo.insert_chat(&chat).await?;
                self.insert_new_messages(repo, &chat.id, &chat_in).await?;
                Outcome::Created
            }
            Some(mut chat) => {
                let update = ChatUpdate {
                    agent_id: agent_id.as_deref(),
                    contact_id: contact_id.as_deref(),
                    department_id: department_id.as_deref(),
                    status: status.as_str(),
                    alias: chat_in.alias.as_deref(),
                    tags: &chat_in.tags,
                    opened_at: chat_in.opened_at,
                    picked_up_at: chat_in.picked_up_at,
                    response_at: chat_in.response_at,
                    closed_at: chat_in.closed_at,
                    poll_response: chat_in.poll_response.as_ref(),
                };
                let changes = diff_chat(&chat, &update);
                if !changes.has_changes {
                    let messages_inserted = self.insert_new_messages(repo, &chat.id, &chat_in).await?;
                    if messages_inserted {
                        self.recompute_sla(&mut chat, &chat_in).await?;
                        repo.update_chat(&chat).await?;
                    }
                    return Ok(Outcome::Skipped);
                }

                chat.agent_id = agent_id;
                chat.contact_id = contact_id;
                chat.department_id = department_id;
                chat.status = status;
                chat.alias = chat_in.alias.clone();
                chat.tags = chat_in.tags.clone();
                chat.opened_at = chat_in.opened_at;
                chat.picked_up_at = chat_in.picked_up_at;
                chat.response_at = chat_in.response_at;
                chat.closed_at = chat_in.closed_at;
                chat.duration_seconds = duration_seconds;
                chat.poll_started_at = poll_started_at;
                chat.poll_completed_at = poll_completed_at;
                chat.poll_abandoned_at = poll_abandoned_at;
                chat.poll_response = poll_response;

                if matches!(chat.direction, ChatDirection::Outgoing | ChatDirection::OutgoingBroadcast)
                    && chat_in.messages.iter().any(|m| m.incoming)
                {
                    chat.direction = ChatDirection::Incoming;
                }

                self.recompute_sla(&mut chat, &chat_in).await?;
                repo.update_chat(&chat).await?;
                self.insert_new_messages(repo, &chat.id, &chat_in).await?;

                if changes.status_changed {
                    let entry = ChatStatusHistory::new(
                        chat.id.clone(),
                        changes.previous_status.unwrap_or_default(),
                        changes.new_status.unwrap_or_default(),
                        now,
                        Some(sync_id.to_string()),
                        None,
                    );
                    repo.insert_status_history(&entry).await?;
                }
                Outcome::Updated
            }
        };

        Ok(outcome)
    }

    async fn recompute_sla(&self, chat: &mut Chat, chat_in: &NormalizedChat) -> Result<()> {
        let timings: Vec<MessageTiming> = chat_in
            .messages
            .iter()
            .map(|m| MessageTiming { incoming: m.incoming, timestamp: m.timestamp })
            .collect();
        let metrics = self.sla.compute(chat, &timings, None)?;
        chat.pickup_seconds = metrics.pickup_seconds;
        chat.business_pickup_seconds = metrics.business_pickup_seconds;
        chat.first_response_seconds = metrics.first_response_seconds;
        chat.business_first_response_seconds = metrics.business_first_response_seconds;
        chat.avg_response_seconds = metrics.avg_response_seconds;
        chat.business_avg_response_seconds = metrics.business_avg_response_seconds;
        chat.resolution_seconds = metrics.resolution_seconds;
        chat.business_resolution_seconds = metrics.business_resolution_seconds;
        chat.sla_pickup_met = metrics.pickup_met;
        chat.sla_first_response_met = metrics.first_response_met;
        chat.sla_avg_response_met = metrics.avg_response_met;
        chat.sla_resolution_met = metrics.resolution_met;
        chat.sla_overall_met = metrics.overall_met();
        Ok(())
    }

    /// Inserts any messages in `chat_in` not already stored, returning
    /// whether anything new was inserted — callers use this to decide
    /// whether a chat otherwise unchanged still needs its SLA recomputed.
    async fn insert_new_messages(&self, repo: &EntityRepository<'_>, chat_id: &str, chat_in: &NormalizedChat) -> Result<bool> {
        let mut inserted_any = false;
        for (index, message) in chat_in.messages.iter().enumerate() {
            let id = ids::message_id(chat_id, &message.timestamp.to_rfc3339(), index);
            if repo.message_exists(&id).await? {
                continue;
            }
            let record = Message {
                id,
                chat_id: chat_id.to_string(),
                text: message.text.clone(),
                message_type: message.message_type.as_deref().map(MessageType::parse).unwrap_or(MessageType::Text),
                incoming: message.incoming,
                timestamp: message.timestamp,
                caption: message.caption.clone(),
                image_url: message.image_url.clone(),
                file_url: message.file_url.clone(),
            };
            repo.insert_message(&record).await?;
            inserted_any = true;
        }
        Ok(inserted_any)
    }

    async fn upsert_agent_stub(&self, repo: &EntityRepository<'_>, name: &str) -> Result<String> {
        match repo.get_agent_by_upstream(name).await? {
            Some(existing) => {
                let update = AgentUpdate { name, username: existing.username.as_deref(), email: existing.email.as_deref(), is_active: true };
                if diff_agent(&existing, &update).has_changes {
                    let mut updated = existing;
                    updated.name = name.to_string();
                    repo.upsert_agent(&updated).await?;
                    Ok(updated.id)
                } else {
                    Ok(existing.id)
                }
            }
            None => {
                let agent = Agent::new(name.to_string(), name.to_string());
                repo.upsert_agent(&agent).await?;
                Ok(agent.id)
            }
        }
    }

    async fn upsert_department_stub(&self, repo: &EntityRepository<'_>, name: &str) -> Result<String> {
        match repo.get_department_by_upstream(name).await? {
            Some(existing) => {
                let update = DepartmentUpdate { name, is_active: existing.is_active, is_leaf: existing.is_leaf };
                if diff_department(&existing, &update).has_changes {
                    let mut updated = existing;
                    updated.name = name.to_string();
                    repo.upsert_department(&updated).await?;
                    Ok(updated.id)
                } else {
                    Ok(existing.id)
                }
            }
            None => {
                let department = Department::new(name.to_string(), name.to_string());
                repo.upsert_department(&department).await?;
                Ok(department.id)
            }
        }
    }

    /// Contacts extracted while transforming a chat are always stubs: never
    /// overwrite an `contacts_api`/`upgraded` contact, just link by id.
    async fn upsert_contact_stub(&self, repo: &EntityRepository<'_>, stub: &schema::ContactStubInput, now: chrono::DateTime<Utc>) -> Result<String> {
        match repo.get_contact_by_upstream(&stub.id).await? {
            Some(existing) if existing.sync_source != SyncSource::ChatEmbedded => Ok(existing.id),
            Some(mut existing) => {
                let changed = !opt_str_eq(existing.full_name.as_str(), stub.fullname.as_deref().unwrap_or_default())
                    || existing.mobile.as_deref() != stub.mobile.as_deref();
                if changed {
                    if let Some(name) = &stub.fullname {
                        existing.full_name = name.clone();
                    }
                    if stub.mobile.is_some() {
                        existing.mobile = stub.mobile.clone();
                    }
                    existing.last_sync_at = now;
                    repo.update_contact(&existing).await?;
                }
                Ok(existing.id)
            }
            None => {
                let mut contact = Contact::new_stub(stub.id.clone(), stub.fullname.clone().unwrap_or_default(), now);
                contact.mobile = stub.mobile.clone();
                repo.insert_contact(&contact).await?;
                Ok(contact.id)
            }
        }
    }
}

fn opt_str_eq(a: &str, b: &str) -> bool {
    a == b
}

enum Outcome {
    Created,
    Updated,
    Skipped,
}

fn build_contact(input: &NormalizedContact, now: chrono::DateTime<Utc>, sync_source: SyncSource, needs_full_sync: bool) -> Contact {
    Contact {
        id: ids::generate_id(ids::CONTACT_PREFIX, &[&input.contact_id]),
        upstream_id: input.contact_id.clone(),
        full_name: input.fullname.clone().unwrap_or_default(),
        mobile: input.mobile.clone(),
        landline: input.landline.clone(),
        email: input.email.clone(),
        identification: input.identification.clone(),
        address: input.address.clone(),
        city: input.city.clone(),
        country: input.country.clone(),
        company: input.company.clone(),
        custom_attributes: input.custom_attributes.clone(),
        tags: input.tags.iter().map(|t| ContactTag { name: t.name.clone(), assigned_at: t.assigned_at }).collect(),
        merchant_id: input.merchant_id.clone(),
        upstream_created_at: input.created_at,
        upstream_updated_at: input.updated_at,
        sync_source,
        needs_full_sync,
        last_sync_at: now,
    }
}

/// Stub-upgrade merge: API wins, preserve existing when the incoming field
/// is null (`spec.md` §4.5.1 step 4).
fn merge_api_wins(existing: &mut Contact, incoming: &NormalizedContact) {
    if let Some(v) = &incoming.fullname {
        existing.full_name = v.clone();
    }
    if incoming.mobile.is_some() {
        existing.mobile = incoming.mobile.clone();
    }
    if incoming.landline.is_some() {
        existing.landline = incoming.landline.clone();
    }
    if incoming.email.is_some() {
        existing.email = incoming.email.clone();
    }
    if incoming.identification.is_some() {
        existing.identification = incoming.identification.clone();
    }
    if incoming.address.is_some() {
        existing.address = incoming.address.clone();
    }
    if incoming.city.is_some() {
        existing.city = incoming.city.clone();
    }
    if incoming.country.is_some() {
        existing.country = incoming.country.clone();
    }
    if incoming.company.is_some() {
        existing.company = incoming.company.clone();
    }
    if !incoming.custom_attributes.is_null() {
        existing.custom_attributes = incoming.custom_attributes.clone();
    }
    if !incoming.tags.is_empty() {
        existing.tags = incoming.tags.iter().map(|t| ContactTag { name: t.name.clone(), assigned_at: t.assigned_at }).collect();
    }
    if incoming.merchant_id.is_some() {
        existing.merchant_id = incoming.merchant_id.clone();
    }
    if incoming.created_at.is_some() {
        existing.upstream_created_at = incoming.created_at;
    }
    if incoming.updated_at.is_some() {
        existing.upstream_updated_at = incoming.updated_at;
    }
}

fn apply_contact_update(existing: &mut Contact, incoming: &NormalizedContact) {
    existing.full_name = incoming.fullname.clone().unwrap_or_else(|| existing.full_name.clone());
    existing.mobile = incoming.mobile.clone();
    existing.landline = incoming.landline.clone();
    existing.email = incoming.email.clone();
    existing.identification = incoming.identification.clone();
    existing.address = incoming.address.clone();
    existing.city = incoming.city.clone();
    existing.country = incoming.country.clone();
    existing.company = incoming.company.clone();
    existing.custom_attributes = incoming.custom_attributes.clone();
    existing.tags = incoming.tags.iter().map(|t| ContactTag { name: t.name.clone(), assigned_at: t.assigned_at }).collect();
    existing.merchant_id = incoming.merchant_id.clone();
}

/// Direction detection, applied only on insert (`spec.md` §4.5.2 step 4).
fn detect_direction(chat_in: &NormalizedChat) -> ChatDirection {
    let Some(first) = chat_in.messages.iter().min_by_key(|m| m.timestamp) else {
        return ChatDirection::Incoming;
    };
    if first.incoming {
        return ChatDirection::Incoming;
    }
    let tags_indicate_broadcast = chat_in
        .tags
        .iter()
        .any(|t| BROADCAST_TAG_MARKERS.iter().any(|marker| t.to_lowercase().contains(marker)));
    if first.broadcasted || tags_indicate_broadcast {
        ChatDirection::OutgoingBroadcast
    } else {
        ChatDirection::Outgoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawChat;
    use crate::sla::{OfficeHoursConfig, StaticHolidayCalendar};
    use crate::sla::SlaConfig;
    use serde_json::json;

    async fn test_engine() -> (Database, TransformEngine) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        let sla = Arc::new(SlaCalculator::new(
            SlaConfig::default(),
            OfficeHoursConfig::default(),
            Box::new(StaticHolidayCalendar::default()),
        ));
        let engine = TransformEngine::new(db.clone(), sla);
        (db, engine)
    }

    #[tokio::test]
    async fn contact_insert_happy_path() {
        let (db, engine) = test_engine().await;
        let staging = StagingStore::new(db.pool());
        let row = RawContact::new(
            "sync-1".to_string(),
            "c1".to_string(),
            json!({"contact_id": "c1", "fullname": "Ana Lopez", "mobile": "+111"}),
            1,
            0,
            Utc::now(),
        );
        staging.insert_contacts(&[row]).await.unwrap();

        let cancel = CancellationToken::new();
        let options = TransformOptions { extract_sync_id: Some("sync-1".to_string()), user_id: None };
        let log = engine.run_contacts("sync-1", &options, &cancel).await.unwrap();
        assert_eq!(log.status, crate::models::LogStatus::Completed);
        assert_eq!(log.records_created, 1);

        let repo = EntityRepository::new(db.pool());
        let contact = repo.get_contact_by_upstream("c1").await.unwrap().unwrap();
        assert_eq!(contact.full_name, "Ana Lopez");
        assert_eq!(contact.sync_source, SyncSource::ContactsApi);
        assert!(!contact.needs_full_sync);
    }

    #[tokio::test]
    async fn chat_embedded_stub_upgrades_on_contacts_api_sync() {
        let (db, engine) = test_engine().await;
        let repo = EntityRepository::new(db.pool());
        let stub = Contact::new_stub("c1".to_string(), "Stub Name".to_string(), Utc::now());
        repo.insert_contact(&stub).await.unwrap();

        let staging = StagingStore::new(db.pool());
        let row = RawContact::new(
            "sync-1".to_string(),
            "c1".to_string(),
            json!({"contact_id": "c1", "fullname": "Ana Lopez", "email": "ana@example.com"}),
            1,
            0,
            Utc::now(),
        );
        staging.insert_contacts(&[row]).await.unwrap();

        let cancel = CancellationToken::new();
        let options = TransformOptions { extract_sync_id: Some("sync-1".to_string()), user_id: None };
        let log = engine.run_contacts("sync-1", &options, &cancel).await.unwrap();
        assert_eq!(log.records_updated, 1);

        let upgraded = repo.get_contact_by_upstream("c1").await.unwrap().unwrap();
        assert_eq!(upgraded.full_name, "Ana Lopez");
        assert_eq!(upgraded.email.as_deref(), Some("ana@example.com"));
        assert_eq!(upgraded.sync_source, SyncSource::Upgraded);
        assert!(!upgraded.needs_full_sync);
    }

    #[tokio::test]
    async fn chat_status_transition_appends_history() {
        let (db, engine) = test_engine().await;
        let staging = StagingStore::new(db.pool());
        let cancel = CancellationToken::new();
        let options = TransformOptions { extract_sync_id: Some("sync-1".to_string()), user_id: None };

        let created_at = Utc::now();
        let opened = RawChat::new(
            "sync-1".to_string(),
            "chat-1".to_string(),
            json!({
                "id": "chat-1", "status": "OPENED", "created_at": created_at.to_rfc3339(),
                "messages": [{"incoming": true, "timestamp": created_at.to_rfc3339()}],
            }),
            1,
            0,
            Utc::now(),
        );
        staging.insert_chats(&[opened]).await.unwrap();
        engine.run_chats("sync-1", &options, &cancel).await.unwrap();

        let closed = RawChat::new(
            "sync-1".to_string(),
            "chat-1".to_string(),
            json!({
                "id": "chat-1", "status": "CLOSED", "created_at": created_at.to_rfc3339(),
                "closed_at": Utc::now().to_rfc3339(),
                "messages": [{"incoming": true, "timestamp": created_at.to_rfc3339()}],
            }),
            2,
            0,
            Utc::now(),
        );
        staging.insert_chats(&[closed]).await.unwrap();
        let log = engine.run_chats("sync-1", &options, &cancel).await.unwrap();
        assert_eq!(log.records_updated, 1);

        let repo = EntityRepository::new(db.pool());
        let chat = repo.get_chat_by_upstream("chat-1").await.unwrap().unwrap();
        assert_eq!(chat.status, ChatStatus::Closed);
        assert_eq!(chat.original_direction, ChatDirection::Incoming);

        let history_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_status_history WHERE chat_id = ?")
            .bind(&chat.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(history_count, 1);
    }

    #[tokio::test]
    async fn cancellation_mid_run_marks_log_cancelled_without_propagating_error() {
        let (db, engine) = test_engine().await;
        let staging = StagingStore::new(db.pool());
        let row = RawContact::new(
            "sync-1".to_string(),
            "c1".to_string(),
            json!({"contact_id": "c1", "fullname": "Ana"}),
            1,
            0,
            Utc::now(),
        );
        staging.insert_contacts(&[row]).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = TransformOptions { extract_sync_id: Some("sync-1".to_string()), user_id: None };
        let log = engine.run_contacts("sync-1", &options, &cancel).await.unwrap();
        assert_eq!(log.status, crate::models::LogStatus::Cancelled);
        assert_eq!(log.records_created, 0);
    }

    #[tokio::test]
    async fn message_only_retransform_recomputes_sla() {
        let (db, engine) = test_engine().await;
        let staging = StagingStore::new(db.pool());
        let cancel = CancellationToken::new();
        let options = TransformOptions { extract_sync_id: Some("sync-1".to_string()), user_id: None };

        let opened_at = Utc::now();
        let customer_message_at = opened_at;
        let first = RawChat::new(
            "sync-1".to_string(),
            "chat-1".to_string(),
            json!({
                "id": "chat-1", "status": "OPENED", "created_at": opened_at.to_rfc3339(),
                "opened_at": opened_at.to_rfc3339(),
                "messages": [{"incoming": true, "timestamp": customer_message_at.to_rfc3339()}],
            }),
            1,
            0,
            Utc::now(),
        );
        staging.insert_chats(&[first]).await.unwrap();
        let log = engine.run_chats("sync-1", &options, &cancel).await.unwrap();
        assert_eq!(log.records_created, 1);

        let repo = EntityRepository::new(db.pool());
        let chat = repo.get_chat_by_upstream("chat-1").await.unwrap().unwrap();
        assert_eq!(chat.avg_response_seconds, None);

        // Second raw chat: every `ChatUpdate`-tracked field is identical to
        // the first (status/opened_at/agent/contact/department/alias/tags/
        // picked_up_at/response_at/closed_at/poll_response all absent or
        // equal), so `diff_chat` reports `has_changes = false`. Only the
        // message list differs — an agent reply is now present.
        let agent_message_at = customer_message_at + chrono::Duration::seconds(90);
        let second = RawChat::new(
            "sync-1".to_string(),
            "chat-1".to_string(),
            json!({
                "id": "chat-1", "status": "OPENED", "created_at": opened_at.to_rfc3339(),
                "opened_at": opened_at.to_rfc3339(),
                "messages": [
                    {"incoming": true, "timestamp": customer_message_at.to_rfc3339()},
                    {"incoming": false, "timestamp": agent_message_at.to_rfc3339()},
                ],
            }),
            2,
            0,
            Utc::now(),
        );
        staging.insert_chats(&[second]).await.unwrap();
        let log = engine.run_chats("sync-1", &options, &cancel).await.unwrap();
        assert_eq!(log.records_updated, 0);
        assert_eq!(log.records_skipped, 1);

        let chat = repo.get_chat_by_upstream("chat-1").await.unwrap().unwrap();
        assert_eq!(chat.avg_response_seconds, Some(90));

        let message_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
            .bind(&chat.id)
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(message_count, 2);
    }
}
