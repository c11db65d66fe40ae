//! Message execution history -- records, query specifications, snapshots.
//!
//! Workers append one [`ExecutionRecord`] per message attempt and complete it
//! once. Readers describe what they want with a [`Specification`], evaluate it
//! against a [`Store`] into a frozen [`Snapshot`], and derive statistics from
//! that snapshot with the [`Aggregator`].

pub mod aggregator;
pub mod memory;
pub mod snapshot;
pub mod specification;

pub use self::aggregator::Aggregator;
pub use self::memory::MemoryStore;
pub use self::snapshot::Snapshot;
pub use self::specification::{Order, Specification, TimeAnchor};

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("query exceeded its deadline")]
    Timeout,

    #[error("record {0} not found")]
    NotFound(i64),
}

/// Outcome of a single message processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Processing,
    Success,
    Failed,
    Retried,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Pending,
        Status::Processing,
        Status::Success,
        Status::Failed,
        Status::Retried,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Retried => "retried",
        }
    }

    /// Terminal outcomes freeze the record.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failed | Status::Retried)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| HistoryError::InvalidArgument(format!("unknown status '{}'", s)))
    }
}

/// One persisted message processing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub message_type: String,
    pub transport: String,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: Status,
    pub error: Option<String>,
    pub attempt: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ExecutionRecord {
    /// A freshly enqueued attempt that no worker has picked up yet.
    pub fn pending(
        id: i64,
        message_type: impl Into<String>,
        transport: impl Into<String>,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            message_type: message_type.into(),
            transport: transport.into(),
            enqueued_at,
            started_at: None,
            finished_at: None,
            status: Status::Pending,
            error: None,
            attempt: 1,
            tags: Vec::new(),
        }
    }

    /// Time spent in the handler, when both ends are known.
    pub fn handling_time(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Time spent waiting on the transport before a worker picked it up.
    pub fn wait_time(&self) -> Option<chrono::Duration> {
        self.started_at.map(|start| start - self.enqueued_at)
    }

    /// Check the record-level rules every store enforces on append.
    pub fn validate(&self) -> Result<(), HistoryError> {
        if self.attempt == 0 {
            return Err(HistoryError::InvalidArgument(
                "attempt numbers start at 1".to_string(),
            ));
        }
        if self.message_type.is_empty() || self.transport.is_empty() {
            return Err(HistoryError::InvalidArgument(
                "message type and transport must not be empty".to_string(),
            ));
        }
        check_error_summary(self.status, self.error.as_deref())?;
        if let (Some(start), Some(end)) = (self.started_at, self.finished_at) {
            if end < start {
                return Err(HistoryError::InvalidArgument(format!(
                    "record {} finishes before it starts",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Tags as every store keeps them: sorted, without duplicates.
    pub(crate) fn normalize_tags(&mut self) {
        self.tags.sort();
        self.tags.dedup();
    }

    fn matches(&self, query: &Query) -> bool {
        query.from.map_or(true, |from| self.enqueued_at >= from)
            && query.to.map_or(true, |to| self.enqueued_at < to)
            && query.status.map_or(true, |status| self.status == status)
            && query
                .transport
                .as_deref()
                .map_or(true, |t| self.transport == t)
            && query
                .message_type
                .as_deref()
                .map_or(true, |m| self.message_type == m)
            && query
                .tag
                .as_deref()
                .map_or(true, |tag| self.tags.iter().any(|t| t == tag))
    }
}

/// An error summary is present iff the outcome is `failed`.
pub(crate) fn check_error_summary(status: Status, error: Option<&str>) -> Result<(), HistoryError> {
    match (status, error) {
        (Status::Failed, None) => Err(HistoryError::InvalidArgument(
            "failed outcomes require an error summary".to_string(),
        )),
        (Status::Failed, Some(_)) | (_, None) => Ok(()),
        (other, Some(_)) => Err(HistoryError::InvalidArgument(format!(
            "'{}' outcomes cannot carry an error summary",
            other
        ))),
    }
}

/// Per-status counters. The total is always the sum of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub success: u64,
    pub failed: u64,
    pub retried: u64,
}

impl StatusCounts {
    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Pending => self.pending,
            Status::Processing => self.processing,
            Status::Success => self.success,
            Status::Failed => self.failed,
            Status::Retried => self.retried,
        }
    }

    pub fn add(&mut self, status: Status, n: u64) {
        match status {
            Status::Pending => self.pending += n,
            Status::Processing => self.processing += n,
            Status::Success => self.success += n,
            Status::Failed => self.failed += n,
            Status::Retried => self.retried += n,
        }
    }

    pub fn total(&self) -> u64 {
        Status::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// Running sum of durations, kept in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationTotals {
    pub count: u64,
    pub total_ms: i64,
}

impl DurationTotals {
    pub fn record(&mut self, d: chrono::Duration) {
        self.count += 1;
        self.total_ms += d.num_milliseconds();
    }

    pub fn mean(&self) -> Option<chrono::Duration> {
        if self.count == 0 {
            return None;
        }
        Some(chrono::Duration::milliseconds(
            self.total_ms / self.count as i64,
        ))
    }
}

/// A specification compiled against a concrete instant, ready for a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<Status>,
    pub transport: Option<String>,
    pub message_type: Option<String>,
    pub tag: Option<String>,
    pub order: Order,
    pub limit: Option<usize>,
    pub deadline: Option<Instant>,
}

impl Query {
    /// Fail with `Timeout` once the deadline has passed.
    pub fn check_deadline(&self) -> Result<(), HistoryError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(HistoryError::Timeout),
            _ => Ok(()),
        }
    }
}

/// Everything a store returns for one query, read at a single point in time.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Ordered, limit-applied records.
    pub records: Vec<ExecutionRecord>,
    /// Counts over the full matched set (pre-limit).
    pub counts: StatusCounts,
    pub by_message_type: BTreeMap<String, StatusCounts>,
    pub handling: DurationTotals,
    pub waiting: DurationTotals,
}

/// Persistence of execution records.
///
/// `query` must be a single consistent read: its counts and records never
/// observe a partially applied write.
pub trait Store: Send + Sync {
    fn query(&self, query: &Query) -> Result<QueryResult, HistoryError>;

    fn append(&self, record: &ExecutionRecord) -> Result<(), HistoryError>;

    /// Apply the single completion update of a record. Atomic per record.
    fn mark_complete(
        &self,
        id: i64,
        outcome: Status,
        finished_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), HistoryError>;

    fn get(&self, id: i64) -> Result<ExecutionRecord, HistoryError>;
}

/// Sort records newest- or oldest-first, ties broken by ascending id.
pub(crate) fn sort_records(records: &mut [ExecutionRecord], order: Order) {
    records.sort_by(|a, b| {
        let by_time = match order {
            Order::Ascending => a.enqueued_at.cmp(&b.enqueued_at),
            Order::Descending => b.enqueued_at.cmp(&a.enqueued_at),
        };
        by_time.then(a.id.cmp(&b.id))
    });
}

/// Filter, count and truncate an in-memory copy of the record set.
pub(crate) fn evaluate(
    records: Vec<ExecutionRecord>,
    query: &Query,
) -> Result<QueryResult, HistoryError> {
    let mut result = QueryResult::default();
    let mut matched = Vec::new();

    for (i, record) in records.into_iter().enumerate() {
        if i % 1024 == 0 {
            query.check_deadline()?;
        }
        if !record.matches(query) {
            continue;
        }
        result.counts.add(record.status, 1);
        result
            .by_message_type
            .entry(record.message_type.clone())
            .or_default()
            .add(record.status, 1);
        if let Some(d) = record.handling_time() {
            result.handling.record(d);
        }
        if let Some(d) = record.wait_time() {
            result.waiting.record(d);
        }
        matched.push(record);
    }

    sort_records(&mut matched, query.order);
    if let Some(limit) = query.limit {
        matched.truncate(limit);
    }
    result.records = matched;
    Ok(result)
}
