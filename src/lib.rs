//! messenger-monitor -- execution history and dashboard summaries for
//! message-queue workers.
//!
//! This crate provides the history query engine (specifications, snapshots,
//! aggregation), a SQLite-backed record store, and the dashboard assembler
//! that combines history with worker, transport and schedule state.

pub mod config;
pub mod dashboard;
pub mod format;
pub mod history;
pub mod monitor;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;

use crate::config::{LoggingConfig, MonitorConfig, StorageConfig};
use crate::dashboard::Dashboard;
use crate::format::{CronHumanizer, HumanFormatter, NextRunCron, PlainCron, PlainFormatter, TimeFormatter};
use crate::monitor::{ConfiguredSchedules, StaticMonitor};
use crate::storage::SqliteStore;

/// Install the global tracing subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Open the configured SQLite history store.
pub fn open_store(storage: &StorageConfig) -> Result<SqliteStore> {
    let pool = storage::open_pool(&storage.path, storage.pool_size)?;
    Ok(SqliteStore::new(pool))
}

/// Compose a dashboard from configuration. Fails here, once, if anything
/// required is missing or invalid.
pub fn build_dashboard(config: &MonitorConfig) -> Result<Dashboard> {
    let store = Arc::new(open_store(&config.storage)?);
    let monitor = Arc::new(StaticMonitor::from_config(&config.transports));

    let formatter: Arc<dyn TimeFormatter> = if config.dashboard.humanize {
        Arc::new(HumanFormatter)
    } else {
        Arc::new(PlainFormatter)
    };
    let cron: Arc<dyn CronHumanizer> = if config.dashboard.cron_next_run {
        Arc::new(NextRunCron)
    } else {
        Arc::new(PlainCron)
    };

    let mut builder = Dashboard::builder()
        .store(store)
        .workers(monitor.clone())
        .transports(monitor)
        .formatter(formatter)
        .cron_humanizer(cron)
        .recent_limit(i64::from(config.dashboard.recent_limit))
        .query_timeout(config.storage.query_timeout());

    if let Some(schedules) = &config.schedules {
        builder = builder.schedules(Arc::new(ConfiguredSchedules::new(schedules)?));
    }

    Ok(builder.build()?)
}
