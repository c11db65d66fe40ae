use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde::Serialize;

use crate::config::ScheduleConfig;

/// A recurring task and when it fires next.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSummary {
    pub name: String,
    /// Trigger description as the scheduler prints it.
    pub trigger: String,
    pub cron: String,
    pub message_type: String,
    pub transport: String,
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduleSummary {
    /// Tag carried by history records dispatched from this schedule.
    pub fn history_tag(&self) -> String {
        format!("schedule:{}", self.name)
    }
}

pub trait ScheduleMonitor: Send + Sync {
    fn schedules(&self, now: DateTime<Utc>) -> Vec<ScheduleSummary>;

    /// Look up a schedule by name; `None` selects the first one.
    fn get(&self, name: Option<&str>, now: DateTime<Utc>) -> Option<ScheduleSummary> {
        let mut all = self.schedules(now).into_iter();
        match name {
            Some(name) => all.find(|s| s.name == name),
            None => all.next(),
        }
    }
}

/// Schedules declared in configuration. Cron expressions are validated once,
/// at construction.
pub struct ConfiguredSchedules {
    entries: Vec<(ScheduleConfig, CronSchedule)>,
}

impl ConfiguredSchedules {
    pub fn new(configs: &[ScheduleConfig]) -> Result<Self> {
        let mut entries = Vec::with_capacity(configs.len());
        for cfg in configs {
            let schedule = CronSchedule::from_str(&cfg.cron).map_err(|e| {
                anyhow::anyhow!(
                    "Invalid cron expression '{}' for schedule '{}': {}",
                    cfg.cron,
                    cfg.name,
                    e
                )
            })?;
            entries.push((cfg.clone(), schedule));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ScheduleMonitor for ConfiguredSchedules {
    fn schedules(&self, now: DateTime<Utc>) -> Vec<ScheduleSummary> {
        self.entries
            .iter()
            .map(|(cfg, schedule)| ScheduleSummary {
                name: cfg.name.clone(),
                trigger: format!("cron: {}", cfg.cron),
                cron: cfg.cron.clone(),
                message_type: cfg.message_type.clone(),
                transport: cfg.transport.clone(),
                next_run: schedule.after(&now).next(),
            })
            .collect()
    }
}
