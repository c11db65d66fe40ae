//! Live-state collaborators: workers, transports and schedules.
//!
//! The dashboard only consumes summaries; how they are gathered (process
//! registries, broker APIs) is up to the implementor.

pub mod schedule;

pub use self::schedule::{ConfiguredSchedules, ScheduleMonitor, ScheduleSummary};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::TransportConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Processing,
}

/// A running consumer process.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub id: String,
    pub state: WorkerState,
    pub transports: Vec<String>,
    pub messages_handled: u64,
    pub running_since: DateTime<Utc>,
}

/// A transport and its current backlog, when the transport can report one.
#[derive(Debug, Clone, Serialize)]
pub struct TransportSummary {
    pub name: String,
    pub queued: Option<u64>,
    pub workers: u32,
}

pub trait WorkerMonitor: Send + Sync {
    fn workers(&self) -> Vec<WorkerSummary>;
}

pub trait TransportMonitor: Send + Sync {
    fn transports(&self) -> Vec<TransportSummary>;
}

/// Fixed summaries, e.g. transports declared in configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMonitor {
    workers: Vec<WorkerSummary>,
    transports: Vec<TransportSummary>,
}

impl StaticMonitor {
    pub fn new(workers: Vec<WorkerSummary>, transports: Vec<TransportSummary>) -> Self {
        Self {
            workers,
            transports,
        }
    }

    /// Declared transports with no live backlog information and no workers.
    pub fn from_config(transports: &[TransportConfig]) -> Self {
        Self {
            workers: Vec::new(),
            transports: transports
                .iter()
                .map(|t| TransportSummary {
                    name: t.name.clone(),
                    queued: None,
                    workers: 0,
                })
                .collect(),
        }
    }
}

impl WorkerMonitor for StaticMonitor {
    fn workers(&self) -> Vec<WorkerSummary> {
        self.workers.clone()
    }
}

impl TransportMonitor for StaticMonitor {
    fn transports(&self) -> Vec<TransportSummary> {
        self.transports.clone()
    }
}
