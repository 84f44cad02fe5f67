//! Normalized-entity persistence
//!
//! The Transform Engine's only way of reading and writing `agents`,
//! `departments`, `contacts`, `chats`, `messages`, and
//! `chat_status_history`. Upserts are explicit insert-vs-update (the
//! transform engine always knows which it needs, from a prior lookup) rather
//! than blind `ON CONFLICT` upserts, since most of these paths need to run
//! change detection against the existing row first.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{Error, Result};
use crate::models::{Agent, Chat, ChatDirection, ChatProvider, ChatStatus, ChatStatusHistory, Contact, ContactTag, Department, Message, MessageType, SyncSource};

pub struct EntityRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> EntityRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_agent_by_upstream(&self, upstream_id: &str) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE upstream_id = ?")
            .bind(upstream_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(AgentRow::into_model))
    }

    pub async fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO agents (id, upstream_id, name, username, email, is_active)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT (upstream_id) DO UPDATE SET
                 name = excluded.name, username = excluded.username, email = excluded.email, is_active = excluded.is_active"#,
        )
        .bind(&agent.id)
        .bind(&agent.upstream_id)
        .bind(&agent.name)
        .bind(&agent.username)
        .bind(&agent.email)
        .bind(agent.is_active)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_department_by_upstream(&self, upstream_code: &str) -> Result<Option<Department>> {
        let row = sqlx::query_as::<_, DepartmentRow>("SELECT * FROM departments WHERE upstream_code = ?")
            .bind(upstream_code)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(DepartmentRow::into_model))
    }

    pub async fn upsert_department(&self, department: &Department) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO departments (id, upstream_code, name, is_active, is_leaf)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (upstream_code) DO UPDATE SET
                 name = excluded.name, is_active = excluded.is_active, is_leaf = excluded.is_leaf"#,
        )
        .bind(&department.id)
        .bind(&department.upstream_code)
        .bind(&department.name)
        .bind(department.is_active)
        .bind(department.is_leaf)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_contact_by_upstream(&self, upstream_id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE upstream_id = ?")
            .bind(upstream_id)
            .fetch_optional(self.pool)
            .await?;
        row.map(ContactRow::into_model).transpose()
    }

    pub async fn insert_contact(&self, contact: &Contact) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO contacts
                 (id, upstream_id, full_name, mobile, landline, email, identification, address, city, country, company,
                  custom_attributes, tags, merchant_id, upstream_created_at, upstream_updated_at, sync_source, needs_full_sync, last_sync_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&contact.id)
        .bind(&contact.upstream_id)
        .bind(&contact.full_name)
        .bind(&contact.mobile)
        .bind(&contact.landline)
        .bind(&contact.email)
        .bind(&contact.identification)
        .bind(&contact.address)
        .bind(&contact.city)
        .bind(&contact.country)
        .bind(&contact.company)
        .bind(contact.custom_attributes.to_string())
        .bind(serde_json::to_string(&contact.tags)?)
        .bind(&contact.merchant_id)
        .bind(contact.upstream_created_at.map(|t| t.to_rfc3339()))
        .bind(contact.upstream_updated_at.map(|t| t.to_rfc3339()))
        .bind(contact.sync_source.as_str())
        .bind(contact.needs_full_sync)
        .bind(contact.last_sync_at.to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_contact(&self, contact: &Contact) -> Result<()> {
        sqlx::query(
            r#"UPDATE contacts SET full_name = ?, mobile = ?, landline = ?, email = ?, identification = ?, address = ?,
                 city = ?, country = ?, company = ?, custom_attributes = ?, tags = ?, merchant_id = ?,
                 upstream_created_at = ?, upstream_updated_at = ?, sync_source = ?, needs_full_sync = ?, last_sync_at = ?
               WHERE id = ?"#,
        )
        .bind(&contact.full_name)
        .bind(&contact.mobile)
        .bind(&contact.landline)
        .bind(&contact.email)
        .bind(&contact.identification)
        .bind(&contact.address)
        .bind(&contact.city)
        .bind(&contact.country)
        .bind(&contact.company)
        .bind(contact.custom_attributes.to_string())
        .bind(serde_json::to_string(&contact.tags)?)
        .bind(&contact.merchant_id)
        .bind(contact.upstream_created_at.map(|t| t.to_rfc3339()))
        .bind(contact.upstream_updated_at.map(|t| t.to_rfc3339()))
        .bind(contact.sync_source.as_str())
        .bind(contact.needs_full_sync)
        .bind(contact.last_sync_at.to_rfc3339())
        .bind(&contact.id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_chat_by_upstream(&self, upstream_id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query_as::<_, ChatRow>("SELECT * FROM chats WHERE upstream_id = ?")
            .bind(upstream_id)
            .fetch_optional(self.pool)
            .await?;
        row.map(ChatRow::into_model).transpose()
    }

    pub async fn insert_chat(&self, chat: &Chat) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO chats
                 (id, upstream_id, agent_id, contact_id, department_id, provider, status, alias, tags, direction, original_direction,
                  created_at, opened_at, picked_up_at, response_at, closed_at, duration_seconds,
                  poll_started_at, poll_completed_at, poll_abandoned_at, poll_response,
                  pickup_seconds, business_pickup_seconds, first_response_seconds, business_first_response_seconds,
                  avg_response_seconds, business_avg_response_seconds, resolution_seconds, business_resolution_seconds,
                  sla_pickup_met, sla_first_response_met, sla_avg_response_met, sla_resolution_met, sla_overall_met)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&chat.id)
        .bind(&chat.upstream_id)
        .bind(&chat.agent_id)
        .bind(&chat.contact_id)
        .bind(&chat.department_id)
        .bind(chat.provider.as_str())
        .bind(chat.status.as_str())
        .bind(&chat.alias)
        .bind(serde_json::to_string(&chat.tags)?)
        .bind(chat.direction.as_str())
        .bind(chat.original_direction.as_str())
        .bind(chat.created_at.to_rfc3339())
        .bind(chat.opened_at.map(|t| t.to_rfc3339()))
        .bind(chat.picked_up_at.map(|t| t.to_rfc3339()))
        .bind(chat.response_at.map(|t| t.to_rfc3339()))
        .bind(chat.closed_at.map(|t| t.to_rfc3339()))
        .bind(chat.duration_seconds)
        .bind(chat.poll_started_at.map(|t| t.to_rfc3339()))
        .bind(chat.poll_completed_at.map(|t| t.to_rfc3339()))
        .bind(chat.poll_abandoned_at.map(|t| t.to_rfc3339()))
        .bind(&chat.poll_response)
        .bind(chat.pickup_seconds)
        .bind(chat.business_pickup_seconds)
        .bind(chat.first_response_seconds)
        .bind(chat.business_first_response_seconds)
        .bind(chat.avg_response_seconds)
        .bind(chat.business_avg_response_seconds)
        .bind(chat.resolution_seconds)
        .bind(chat.business_resolution_seconds)
        .bind(chat.sla_pickup_met)
        .bind(chat.sla_first_response_met)
        .bind(chat.sla_avg_response_met)
        .bind(chat.sla_resolution_met)
        .bind(chat.sla_overall_met)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_chat(&self, chat: &Chat) -> Result<()> {
        sqlx::query(
            r#"UPDATE chats SET agent_id = ?, contact_id = ?, department_id = ?, provider = ?, status = ?, alias = ?, tags = ?,
                 direction = ?, created_at = ?, opened_at = ?, picked_up_at = ?, response_at = ?, closed_at = ?, duration_seconds = ?,
                 poll_started_at = ?, poll_completed_at = ?, poll_abandoned_at = ?, poll_response = ?,
                 pickup_seconds = ?, business_pickup_seconds = ?, first_response_seconds = ?, business_first_response_seconds = ?,
                 avg_response_seconds = ?, business_avg_response_seconds = ?, resolution_seconds = ?, business_resolution_seconds = ?,
                 sla_pickup_met = ?, sla_first_response_met = ?, sla_avg_response_met = ?, sla_resolution_met = ?, sla_overall_met = ?
               WHERE id = ?"#,
        )
        .bind(&chat.agent_id)
        .bind(&chat.contact_id)
        .bind(&chat.department_id)
        .bind(chat.provider.as_str())
        .bind(chat.status.as_str())
        .bind(&chat.alias)
        .bind(serde_json::to_string(&chat.tags)?)
        .bind(chat.direction.as_str())
        .bind(chat.created_at.to_rfc3339())
        .bind(chat.opened_at.map(|t| t.to_rfc3339()))
        .bind(chat.picked_up_at.map(|t| t.to_rfc3339()))
        .bind(chat.response_at.map(|t| t.to_rfc3339()))
        .bind(chat.closed_at.map(|t| t.to_rfc3339()))
        .bind(chat.duration_seconds)
        .bind(chat.poll_started_at.map(|t| t.to_rfc3339()))
        .bind(chat.poll_completed_at.map(|t| t.to_rfc3339()))
        .bind(chat.poll_abandoned_at.map(|t| t.to_rfc3339()))
        .bind(&chat.poll_response)
        .bind(chat.pickup_seconds)
        .bind(chat.business_pickup_seconds)
        .bind(chat.first_response_seconds)
        .bind(chat.business_first_response_seconds)
        .bind(chat.avg_response_seconds)
        .bind(chat.business_avg_response_seconds)
        .bind(chat.resolution_seconds)
        .bind(chat.business_resolution_seconds)
        .bind(chat.sla_pickup_met)
        .bind(chat.sla_first_response_met)
        .bind(chat.sla_avg_response_met)
        .bind(chat.sla_resolution_met)
        .bind(chat.sla_overall_met)
        .bind(&chat.id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_status_history(&self, entry: &ChatStatusHistory) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO chat_status_history (id, chat_id, previous_status, new_status, changed_at, sync_id, transform_id)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.id)
        .bind(&entry.chat_id)
        .bind(&entry.previous_status)
        .bind(&entry.new_status)
        .bind(entry.changed_at.to_rfc3339())
        .bind(&entry.sync_id)
        .bind(&entry.transform_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn message_exists(&self, id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE id = ?")
            .bind(id)
            .fetch_one(self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn insert_message(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO messages (id, chat_id, text, message_type, incoming, timestamp, caption, image_url, file_url)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (id) DO NOTHING"#,
        )
        .bind(&message.id)
        .bind(&message.chat_id)
        .bind(&message.text)
        .bind(message.message_type.as_str())
        .bind(message.incoming)
        .bind(message.timestamp.to_rfc3339())
        .bind(&message.caption)
        .bind(&message.image_url)
        .bind(&message.file_url)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE chat_id = ? ORDER BY timestamp ASC")
            .bind(chat_id)
            .fetch_all(self.pool)
            .await?;
        rows.into_iter().map(MessageRow::into_model).collect()
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    s.parse().map_err(|e: chrono::ParseError| Error::Database(e.to_string()))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.map(|s| parse_ts(&s)).transpose()
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    upstream_id: String,
    name: String,
    username: Option<String>,
    email: Option<String>,
    is_active: bool,
}

impl AgentRow {
    fn into_model(self) -> Agent {
        Agent {
            id: self.id,
            upstream_id: self.upstream_id,
            name: self.name,
            username: self.username,
            email: self.email,
            is_active: self.is_active,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DepartmentRow {
    id: String,
    upstream_code: String,
    name: String,
    is_active: bool,
    is_leaf: bool,
}

impl DepartmentRow {
    fn into_model(self) -> Department {
        Department {
            id: self.id,
            upstream_code: self.upstream_code,
            name: self.name,
            is_active: self.is_active,
            is_leaf: self.is_leaf,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: String,
    upstream_id: String,
    full_name: String,
    mobile: Option<String>,
    landline: Option<String>,
    email: Option<String>,
    identification: Option<String>,
    address: Option<String>,
    city: Option<String>,
    country: Option<String>,
    company: Option<String>,
    custom_attributes: String,
    tags: String,
    merchant_id: Option<String>,
    upstream_created_at: Option<String>,
    upstream_updated_at: Option<String>,
    sync_source: String,
    needs_full_sync: bool,
    last_sync_at: String,
}

impl ContactRow {
    fn into_model(self) -> Result<Contact> {
        Ok(Contact {
            id: self.id,
            upstream_id: self.upstream_id,
            full_name: self.full_name,
            mobile: self.mobile,
            landline: self.landline,
            email: self.email,
            identification: self.identification,
            address: self.address,
            city: self.city,
            country: self.country,
            company: self.company,
            custom_attributes: serde_json::from_str(&self.custom_attributes)?,
            tags: serde_json::from_str::<Vec<ContactTag>>(&self.tags)?,
            merchant_id: self.merchant_id,
            upstream_created_at: parse_opt_ts(self.upstream_created_at)?,
            upstream_updated_at: parse_opt_ts(self.upstream_updated_at)?,
            sync_source: self.sync_source.parse::<SyncSource>()?,
            needs_full_sync: self.needs_full_sync,
            last_sync_at: parse_ts(&self.last_sync_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChatRow {
    id: String,
    upstream_id: String,
    agent_id: Option<String>,
    contact_id: Option<String>,
    department_id: Option<String>,
    provider: String,
    status: String,
    alias: Option<String>,
    tags: String,
    direction: String,
    original_direction: String,
    created_at: String,
    opened_at: Option<String>,
    picked_up_at: Option<String>,
    response_at: Option<String>,
    closed_at: Option<String>,
    duration_seconds: Option<i64>,
    poll_started_at: Option<String>,
    poll_completed_at: Option<String>,
    poll_abandoned_at: Option<String>,
    poll_response: Option<String>,
    pickup_seconds: Option<i64>,
    business_pickup_seconds: Option<i64>,
    first_response_seconds: Option<i64>,
    business_first_response_seconds: Option<i64>,
    avg_response_seconds: Option<i64>,
    business_avg_response_seconds: Option<i64>,
    resolution_seconds: Option<i64>,
    business_resolution_seconds: Option<i64>,
    sla_pickup_met: Option<bool>,
    sla_first_response_met: Option<bool>,
    sla_avg_response_met: Option<bool>,
    sla_resolution_met: Option<bool>,
    sla_overall_met: Option<bool>,
}

impl ChatRow {
    fn into_model(self) -> Result<Chat> {
        Ok(Chat {
            id: self.id,
            upstream_id: self.upstream_id,
            agent_id: self.agent_id,
            contact_id: self.contact_id,
            department_id: self.department_id,
            provider: self.provider.parse::<ChatProvider>().map_err(|e| Error::Database(e.to_string()))?,
            status: ChatStatus::parse(&self.status)?,
            alias: self.alias,
            tags: serde_json::from_str(&self.tags)?,
            direction: self.direction.parse::<ChatDirection>()?,
            original_direction: self.original_direction.parse::<ChatDirection>()?,
            created_at: parse_ts(&self.created_at)?,
            opened_at: parse_opt_ts(self.opened_at)?,
            picked_up_at: parse_opt_ts(self.picked_up_at)?,
            response_at: parse_opt_ts(self.response_at)?,
            closed_at: parse_opt_ts(self.closed_at)?,
            duration_seconds: self.duration_seconds,
            poll_started_at: parse_opt_ts(self.poll_started_at)?,
            poll_completed_at: parse_opt_ts(self.poll_completed_at)?,
            poll_abandoned_at: parse_opt_ts(self.poll_abandoned_at)?,
            poll_response: self.poll_response,
            pickup_seconds: self.pickup_seconds,
            business_pickup_seconds: self.business_pickup_seconds,
            first_response_seconds: self.first_response_seconds,
            business_first_response_seconds: self.business_first_response_seconds,
            avg_response_seconds: self.avg_response_seconds,
            business_avg_response_seconds: self.business_avg_response_seconds,
            resolution_seconds: self.resolution_seconds,
            business_resolution_seconds: self.business_resolution_seconds,
            sla_pickup_met: self.sla_pickup_met,
            sla_first_response_met: self.sla_first_response_met,
            sla_avg_response_met: self.sla_avg_response_met,
            sla_resolution_met: self.sla_resolution_met,
            sla_overall_met: self.sla_overall_met,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    chat_id: String,
    text: Option<String>,
    message_type: String,
    incoming: bool,
    timestamp: String,
    caption: Option<String>,
    image_url: Option<String>,
    file_url: Option<String>,
}

impl MessageRow {
    fn into_model(self) -> Result<Message> {
        Ok(Message {
            id: self.id,
            chat_id: self.chat_id,
            text: self.text,
            message_type: MessageType::parse(&self.message_type),
            incoming: self.incoming,
            timestamp: parse_ts(&self.timestamp)?,
            caption: self.caption,
            image_url: self.image_url,
            file_url: self.file_url,
        })
    }
}
