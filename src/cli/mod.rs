//! CLI & bootstrap (C0)
//!
//! Parses operator commands, builds the shared `AppConfig`/`Database`/
//! `UpstreamClient`, initializes tracing, and wires C1-C9 together. Mirrors
//! the teacher's CLI entrypoint: flat `clap` derive, one `run()` that
//! dispatches to a handler per subcommand.

use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::cancellation::CancellationManager;
use crate::client::UpstreamClient;
use crate::config::AppConfig;
use crate::database::Database;
use crate::error::Result;
use crate::extract::{ContactFilter, ExtractEngine, ExtractOptions, TimeRangePreset};
use crate::models::EntityType;
use crate::queue::RateLimitedQueue;
use crate::runlog::RunLogStore;
use crate::sla::{SlaCalculator, StaticHolidayCalendar};
use crate::transform::{TransformEngine, TransformOptions};

#[derive(Parser)]
#[command(name = "chatsync", about = "Mirrors a conversational-messaging platform into a local analytics store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Page the upstream export endpoints into raw staging
    Extract {
        #[arg(value_enum)]
        entity: EntityArg,
        /// Ignore `SyncState` and page from the beginning of time
        #[arg(long)]
        full_sync: bool,
        /// Named window shortcut instead of an explicit date range
        #[arg(long, value_enum)]
        window: Option<WindowArg>,
        #[arg(long)]
        max_pages: Option<u32>,
        /// Only keep contacts with this mobile number (contacts only)
        #[arg(long)]
        mobile: Option<String>,
    },
    /// Reconcile staged raw rows into normalized entities
    Transform {
        #[arg(value_enum)]
        entity: EntityArg,
        /// Legacy mode: only rows from this extract's sync id
        #[arg(long)]
        extract_sync_id: Option<String>,
    },
    /// Show the most recent extract/transform runs
    Status {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EntityArg {
    Contacts,
    Chats,
    All,
}

impl From<EntityArg> for EntityType {
    fn from(value: EntityArg) -> Self {
        match value {
            EntityArg::Contacts => EntityType::Contacts,
            EntityArg::Chats => EntityType::Chats,
            EntityArg::All => EntityType::All,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum WindowArg {
    OneDay,
    SevenDays,
    ThirtyDays,
    NinetyDays,
    Full,
}

impl From<WindowArg> for TimeRangePreset {
    fn from(value: WindowArg) -> Self {
        match value {
            WindowArg::OneDay => TimeRangePreset::OneDay,
            WindowArg::SevenDays => TimeRangePreset::SevenDays,
            WindowArg::ThirtyDays => TimeRangePreset::ThirtyDays,
            WindowArg::NinetyDays => TimeRangePreset::NinetyDays,
            WindowArg::Full => TimeRangePreset::Full,
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_env()?;
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    match cli.command {
        Command::Extract { entity, full_sync, window, max_pages, mobile } => {
            run_extract(&config, db, entity.into(), full_sync, window, max_pages, mobile).await
        }
        Command::Transform { entity, extract_sync_id } => run_transform(&config, db, entity.into(), extract_sync_id).await,
        Command::Status { limit } => run_status(db, limit).await,
    }
}

async fn run_extract(
    config: &AppConfig,
    db: Database,
    entity: EntityType,
    full_sync: bool,
    window: Option<WindowArg>,
    max_pages: Option<u32>,
    mobile: Option<String>,
) -> Result<()> {
    let client = UpstreamClient::new(&config.upstream)?;
    let queue = RateLimitedQueue::new(config.queue.clone());
    let engine = ExtractEngine::new(client, queue, db);

    let manager = CancellationManager::new();
    let sync_id = Uuid::new_v4().to_string();
    let cancel = manager.register(&sync_id).await;

    let options = ExtractOptions {
        batch_size: config.upstream.batch_size as i64,
        full_sync,
        date_range: None,
        time_range_preset: window.map(Into::into),
        max_pages,
        contact_filter: mobile.map(|mobile| ContactFilter { mobile: Some(mobile), upstream_id: None }),
    };

    let logs = engine.run(&sync_id, entity, &options, &cancel).await;
    manager.unregister(&sync_id).await;

    let logs = logs?;
    for log in &logs {
        tracing::info!(
            sync_id = %log.sync_id,
            entity_type = %log.entity_type,
            status = %log.status,
            fetched = log.records_fetched,
            created = log.records_created,
            "extract run finished"
        );
    }
    Ok(())
}

async fn run_transform(config: &AppConfig, db: Database, entity: EntityType, extract_sync_id: Option<String>) -> Result<()> {
    let sla = Arc::new(SlaCalculator::new(
        config.sla.clone(),
        config.office_hours.clone(),
        Box::new(StaticHolidayCalendar::default()),
    ));
    let engine = TransformEngine::new(db, sla);

    let manager = CancellationManager::new();
    let sync_id = Uuid::new_v4().to_string();
    let cancel = manager.register(&sync_id).await;

    let options = TransformOptions { extract_sync_id, user_id: None };
    let logs = engine.run(&sync_id, entity, &options, &cancel).await;
    manager.unregister(&sync_id).await;

    let logs = logs?;
    for log in &logs {
        tracing::info!(
            sync_id = %log.sync_id,
            entity_type = %log.entity_type,
            status = %log.status,
            processed = log.records_processed,
            created = log.records_created,
            updated = log.records_updated,
            failed = log.records_failed,
            "transform run finished"
        );
    }
    Ok(())
}

async fn run_status(db: Database, limit: i64) -> Result<()> {
    let extract_logs = RunLogStore::extract_logs(db.pool()).recent(limit).await?;
    let transform_logs = RunLogStore::transform_logs(db.pool()).recent(limit).await?;

    println!("extract runs:");
    for log in &extract_logs {
        println!(
            "  {} [{}] {} status={} fetched={} created={} updated={} failed={}",
            log.started_at.to_rfc3339(),
            log.sync_id,
            log.entity_type,
            log.status,
            log.records_fetched,
            log.records_created,
            log.records_updated,
            log.records_failed,
        );
    }

    println!("transform runs:");
    for log in &transform_logs {
        println!(
            "  {} [{}] {} status={} processed={} created={} updated={} failed={}",
            log.started_at.to_rfc3339(),
            log.sync_id,
            log.entity_type,
            log.status,
            log.records_processed,
            log.records_created,
            log.records_updated,
            log.records_failed,
        );
    }

    Ok(())
}
