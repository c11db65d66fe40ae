//! Frozen, point-in-time results of a specification.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::{DurationTotals, ExecutionRecord, QueryResult, Status, StatusCounts};

/// The materialized result of evaluating a specification once.
///
/// All data is fetched when the snapshot is taken; nothing here touches the
/// store again, so repeated reads always agree with each other.
#[derive(Debug, Clone)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    records: Vec<ExecutionRecord>,
    counts: StatusCounts,
    by_message_type: BTreeMap<String, StatusCounts>,
    handling: DurationTotals,
    waiting: DurationTotals,
}

impl Snapshot {
    pub(crate) fn new(
        taken_at: DateTime<Utc>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        result: QueryResult,
    ) -> Self {
        Self {
            taken_at,
            from,
            to,
            records: result.records,
            counts: result.counts,
            by_message_type: result.by_message_type,
            handling: result.handling,
            waiting: result.waiting,
        }
    }

    /// Matched records, ordered and limit-applied. Each call starts over.
    pub fn messages(&self) -> impl Iterator<Item = &ExecutionRecord> + '_ {
        self.records.iter()
    }

    /// Count of the full matched set (before any limit) with this outcome.
    pub fn count_by_status(&self, status: Status) -> u64 {
        self.counts.get(status)
    }

    pub fn total(&self) -> u64 {
        self.counts.total()
    }

    pub fn counts(&self) -> &StatusCounts {
        &self.counts
    }

    pub fn by_message_type(&self) -> &BTreeMap<String, StatusCounts> {
        &self.by_message_type
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Resolved time bounds: inclusive start, exclusive end.
    pub fn window(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.from, self.to)
    }

    /// Length of the resolved window, with an open end treated as `taken_at`.
    /// `None` when there is no lower bound.
    pub fn window_duration(&self) -> Option<chrono::Duration> {
        let from = self.from?;
        let to = self.to.unwrap_or(self.taken_at);
        Some(to - from)
    }

    pub(crate) fn handling(&self) -> &DurationTotals {
        &self.handling
    }

    pub(crate) fn waiting(&self) -> &DurationTotals {
        &self.waiting
    }
}
