//! Dashboard assembly -- combines history snapshots with live worker,
//! transport and schedule state into view models.

pub mod view;

pub use self::view::{HistoryPage, MessageRow, Overview, ScheduleRow, SchedulesView, SnapshotSummary};

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::format::{CronHumanizer, PlainCron, PlainFormatter, TimeFormatter};
use crate::history::{HistoryError, Snapshot, Specification, Store, TimeAnchor};
use crate::monitor::{ScheduleMonitor, TransportMonitor, WorkerMonitor};

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("{0} must be configured to use the dashboard")]
    NotConfigured(&'static str),

    #[error("no schedules configured")]
    EmptyResult,

    #[error("schedule '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Collects the dashboard's collaborators; `build` checks them once.
pub struct DashboardBuilder {
    store: Option<Arc<dyn Store>>,
    workers: Option<Arc<dyn WorkerMonitor>>,
    transports: Option<Arc<dyn TransportMonitor>>,
    schedules: Option<Arc<dyn ScheduleMonitor>>,
    formatter: Option<Arc<dyn TimeFormatter>>,
    cron: Option<Arc<dyn CronHumanizer>>,
    recent_limit: i64,
    query_timeout: Option<Duration>,
}

impl DashboardBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            workers: None,
            transports: None,
            schedules: None,
            formatter: None,
            cron: None,
            recent_limit: 15,
            query_timeout: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn workers(mut self, workers: Arc<dyn WorkerMonitor>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn transports(mut self, transports: Arc<dyn TransportMonitor>) -> Self {
        self.transports = Some(transports);
        self
    }

    /// Optional; without it the schedules view reports `NotConfigured`.
    pub fn schedules(mut self, schedules: Arc<dyn ScheduleMonitor>) -> Self {
        self.schedules = Some(schedules);
        self
    }

    pub fn formatter(mut self, formatter: Arc<dyn TimeFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn cron_humanizer(mut self, cron: Arc<dyn CronHumanizer>) -> Self {
        self.cron = Some(cron);
        self
    }

    pub fn recent_limit(mut self, n: i64) -> Self {
        self.recent_limit = n;
        self
    }

    pub fn query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Dashboard, DashboardError> {
        let store = self.store.ok_or(DashboardError::NotConfigured("storage"))?;
        let workers = self.workers.ok_or(DashboardError::NotConfigured("worker monitor"))?;
        let transports = self
            .transports
            .ok_or(DashboardError::NotConfigured("transport monitor"))?;
        let recent = Specification::new().limit(self.recent_limit)?;

        Ok(Dashboard {
            store,
            workers,
            transports,
            schedules: self.schedules,
            formatter: self.formatter.unwrap_or_else(|| Arc::new(PlainFormatter)),
            cron: self.cron.unwrap_or_else(|| Arc::new(PlainCron)),
            recent,
            query_timeout: self.query_timeout,
        })
    }
}

impl Default for DashboardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles dashboard views. Cheap to clone and share between requests.
#[derive(Clone)]
pub struct Dashboard {
    store: Arc<dyn Store>,
    workers: Arc<dyn WorkerMonitor>,
    transports: Arc<dyn TransportMonitor>,
    schedules: Option<Arc<dyn ScheduleMonitor>>,
    formatter: Arc<dyn TimeFormatter>,
    cron: Arc<dyn CronHumanizer>,
    recent: Specification,
    query_timeout: Option<Duration>,
}

impl Dashboard {
    pub fn builder() -> DashboardBuilder {
        DashboardBuilder::new()
    }

    /// Evaluate `spec` on the blocking pool, bounded by the query timeout.
    pub async fn snapshot(&self, spec: Specification) -> Result<Snapshot, HistoryError> {
        let store = self.store.clone();
        let now = Utc::now();
        let deadline = self.query_timeout.map(|t| Instant::now() + t);

        tokio::task::spawn_blocking(move || match deadline {
            Some(deadline) => spec.snapshot_with_deadline(store.as_ref(), now, deadline),
            None => spec.snapshot_at(store.as_ref(), now),
        })
        .await
        .map_err(|e| HistoryError::StoreUnavailable(format!("history query task failed: {}", e)))?
    }

    /// Last-day summary, the most recent messages, and live state.
    pub async fn overview(&self) -> Result<Overview, DashboardError> {
        let (last_day, recent) = tokio::try_join!(
            self.snapshot(Specification::new().from(TimeAnchor::ONE_DAY_AGO).counts_only()),
            self.snapshot(self.recent.clone()),
        )?;
        let now = last_day.taken_at();

        let schedules = self.schedules.as_ref().map(|monitor| {
            monitor
                .schedules(now)
                .iter()
                .map(|s| ScheduleRow::build(s, self.formatter.as_ref(), self.cron.as_ref(), now))
                .collect::<Vec<_>>()
        });

        let overview = Overview {
            generated_at: now,
            workers: self.workers.workers(),
            transports: self.transports.transports(),
            last_day: SnapshotSummary::build(&last_day, self.formatter.as_ref()),
            recent: MessageRow::from_snapshot(&recent, self.formatter.as_ref()),
            schedules,
        };
        info!(
            last_day_total = overview.last_day.total,
            recent = overview.recent.len(),
            "dashboard overview assembled"
        );
        Ok(overview)
    }

    /// Summary and records for an arbitrary specification.
    pub async fn history(&self, spec: Specification) -> Result<HistoryPage, DashboardError> {
        let snapshot = self.snapshot(spec).await?;
        debug!(total = snapshot.total(), "history page assembled");
        Ok(HistoryPage {
            summary: SnapshotSummary::build(&snapshot, self.formatter.as_ref()),
            messages: MessageRow::from_snapshot(&snapshot, self.formatter.as_ref()),
        })
    }

    /// One schedule (the first when `name` is `None`) with its recent history.
    pub async fn schedules(&self, name: Option<&str>) -> Result<SchedulesView, DashboardError> {
        let monitor = self
            .schedules
            .as_ref()
            .ok_or(DashboardError::NotConfigured("scheduler"))?;
        let now = Utc::now();

        let all = monitor.schedules(now);
        if all.is_empty() {
            return Err(DashboardError::EmptyResult);
        }
        let selected = monitor
            .get(name, now)
            .ok_or_else(|| DashboardError::NotFound(name.unwrap_or_default().to_string()))?;

        let base = Specification::new().with_tag(selected.history_tag());
        let recent_limit = self.recent.limit_value().unwrap_or(15) as i64;
        let (last_day, recent) = tokio::try_join!(
            self.snapshot(base.from(TimeAnchor::ONE_DAY_AGO).counts_only()),
            self.snapshot(base.limit(recent_limit)?),
        )?;

        Ok(SchedulesView {
            schedules: all
                .iter()
                .map(|s| ScheduleRow::build(s, self.formatter.as_ref(), self.cron.as_ref(), now))
                .collect(),
            selected: ScheduleRow::build(&selected, self.formatter.as_ref(), self.cron.as_ref(), now),
            last_day: SnapshotSummary::build(&last_day, self.formatter.as_ref()),
            recent: MessageRow::from_snapshot(&recent, self.formatter.as_ref()),
        })
    }
}
