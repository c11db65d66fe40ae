//! Serializable view models handed to whatever renders the dashboard.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::format::{CronHumanizer, TimeFormatter};
use crate::history::{Aggregator, ExecutionRecord, Snapshot, Status, StatusCounts};
use crate::monitor::{ScheduleSummary, TransportSummary, WorkerSummary};

#[derive(Debug, Serialize)]
pub struct Overview {
    pub generated_at: DateTime<Utc>,
    pub workers: Vec<WorkerSummary>,
    pub transports: Vec<TransportSummary>,
    pub last_day: SnapshotSummary,
    pub recent: Vec<MessageRow>,
    /// `None` when no scheduler is configured.
    pub schedules: Option<Vec<ScheduleRow>>,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub summary: SnapshotSummary,
    pub messages: Vec<MessageRow>,
}

#[derive(Debug, Serialize)]
pub struct SchedulesView {
    pub schedules: Vec<ScheduleRow>,
    pub selected: ScheduleRow,
    pub last_day: SnapshotSummary,
    pub recent: Vec<MessageRow>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    pub total: u64,
    pub counts: StatusCounts,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub average_duration: Option<String>,
    pub average_wait: Option<String>,
    /// Only defined for snapshots with a lower time bound.
    pub per_hour: Option<f64>,
    pub by_message_type: Vec<MessageTypeRow>,
}

#[derive(Debug, Serialize)]
pub struct MessageTypeRow {
    pub message_type: String,
    pub counts: StatusCounts,
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub message_type: String,
    pub transport: String,
    pub status: Status,
    pub attempt: u32,
    pub enqueued: String,
    pub duration: Option<String>,
    pub error: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleRow {
    pub name: String,
    pub trigger: String,
    pub message_type: String,
    pub transport: String,
    pub next_run: Option<String>,
}

impl SnapshotSummary {
    pub fn build(snapshot: &Snapshot, formatter: &dyn TimeFormatter) -> Self {
        let per_hour = snapshot
            .window_duration()
            .and_then(|window| Aggregator::throughput(snapshot, window).ok())
            .map(|per_second| per_second * 3600.0);

        Self {
            total: snapshot.total(),
            counts: *snapshot.counts(),
            success_rate: Aggregator::success_rate(snapshot),
            failure_rate: Aggregator::failure_rate(snapshot),
            average_duration: Aggregator::average_duration(snapshot)
                .map(|d| formatter.format_duration(d)),
            average_wait: Aggregator::average_wait_time(snapshot)
                .map(|d| formatter.format_duration(d)),
            per_hour,
            by_message_type: snapshot
                .by_message_type()
                .iter()
                .map(|(message_type, counts)| MessageTypeRow {
                    message_type: message_type.clone(),
                    counts: *counts,
                    total: counts.total(),
                })
                .collect(),
        }
    }
}

impl MessageRow {
    pub fn build(record: &ExecutionRecord, formatter: &dyn TimeFormatter, now: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            message_type: record.message_type.clone(),
            transport: record.transport.clone(),
            status: record.status,
            attempt: record.attempt,
            enqueued: formatter.format_time(record.enqueued_at, now),
            duration: record.handling_time().map(|d| formatter.format_duration(d)),
            error: record.error.clone(),
            tags: record.tags.clone(),
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot, formatter: &dyn TimeFormatter) -> Vec<Self> {
        snapshot
            .messages()
            .map(|record| Self::build(record, formatter, snapshot.taken_at()))
            .collect()
    }
}

impl ScheduleRow {
    pub fn build(
        schedule: &ScheduleSummary,
        formatter: &dyn TimeFormatter,
        cron: &dyn CronHumanizer,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: schedule.name.clone(),
            trigger: cron.humanize(&schedule.trigger, &schedule.cron, now),
            message_type: schedule.message_type.clone(),
            transport: schedule.transport.clone(),
            next_run: schedule.next_run.map(|t| formatter.format_time(t, now)),
        }
    }
}
