//! Immutable, chainable query descriptors over execution history.

use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use super::{HistoryError, Query, Snapshot, Status, Store};

/// A point in time, either absolute or resolved when the query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAnchor {
    At(DateTime<Utc>),
    Now,
    OneDayAgo,
}

impl TimeAnchor {
    pub const NOW: TimeAnchor = TimeAnchor::Now;
    pub const ONE_DAY_AGO: TimeAnchor = TimeAnchor::OneDayAgo;

    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeAnchor::At(t) => *t,
            TimeAnchor::Now => now,
            TimeAnchor::OneDayAgo => now - chrono::Duration::days(1),
        }
    }
}

impl From<DateTime<Utc>> for TimeAnchor {
    fn from(t: DateTime<Utc>) -> Self {
        TimeAnchor::At(t)
    }
}

/// Ordering by enqueue time. Equal timestamps always fall back to ascending id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    Ascending,
    #[default]
    Descending,
}

/// Describes which execution records to fetch.
///
/// Every builder method returns a new value, so a base specification can be
/// shared and narrowed for several queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Specification {
    from: Option<TimeAnchor>,
    to: Option<TimeAnchor>,
    status: Option<Status>,
    transport: Option<String>,
    message_type: Option<String>,
    tag: Option<String>,
    order: Order,
    limit: Option<usize>,
    counts_only: bool,
}

impl Specification {
    /// Match everything, newest first, no limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inclusive lower bound on enqueue time.
    #[must_use]
    pub fn from(&self, anchor: impl Into<TimeAnchor>) -> Self {
        Self {
            from: Some(anchor.into()),
            ..self.clone()
        }
    }

    /// Exclusive upper bound on enqueue time.
    #[must_use]
    pub fn to(&self, anchor: impl Into<TimeAnchor>) -> Self {
        Self {
            to: Some(anchor.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_status(&self, status: Status) -> Self {
        Self {
            status: Some(status),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn successes(&self) -> Self {
        self.with_status(Status::Success)
    }

    #[must_use]
    pub fn failures(&self) -> Self {
        self.with_status(Status::Failed)
    }

    #[must_use]
    pub fn with_transport(&self, name: impl Into<String>) -> Self {
        Self {
            transport: Some(name.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_message_type(&self, message_type: impl Into<String>) -> Self {
        Self {
            message_type: Some(message_type.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn ascending(&self) -> Self {
        Self {
            order: Order::Ascending,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn descending(&self) -> Self {
        Self {
            order: Order::Descending,
            ..self.clone()
        }
    }

    /// Cap the number of returned records. `n` must be positive.
    pub fn limit(&self, n: i64) -> Result<Self, HistoryError> {
        if n <= 0 {
            return Err(HistoryError::InvalidArgument(format!(
                "limit must be a positive integer, got {}",
                n
            )));
        }
        let n = usize::try_from(n)
            .map_err(|_| HistoryError::InvalidArgument(format!("limit {} is too large", n)))?;
        Ok(Self {
            limit: Some(n),
            ..self.clone()
        })
    }

    /// Aggregate without listing records; the snapshot keeps its counts and
    /// averages but `messages()` is empty.
    #[must_use]
    pub fn counts_only(&self) -> Self {
        Self {
            counts_only: true,
            ..self.clone()
        }
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Resolve symbolic anchors against `now` and produce a store query.
    /// Time bounds are truncated to whole milliseconds, the precision records
    /// are persisted at, so every store draws the same boundary.
    pub fn compile(&self, now: DateTime<Utc>, deadline: Option<Instant>) -> Query {
        Query {
            from: self.from.map(|a| a.resolve(now).trunc_subsecs(3)),
            to: self.to.map(|a| a.resolve(now).trunc_subsecs(3)),
            status: self.status,
            transport: self.transport.clone(),
            message_type: self.message_type.clone(),
            tag: self.tag.clone(),
            order: self.order,
            limit: if self.counts_only { Some(0) } else { self.limit },
            deadline,
        }
    }

    /// Evaluate against the store at the current instant.
    pub fn snapshot(&self, store: &dyn Store) -> Result<Snapshot, HistoryError> {
        self.snapshot_at(store, Utc::now())
    }

    /// Evaluate with symbolic anchors resolved against `now`.
    pub fn snapshot_at(&self, store: &dyn Store, now: DateTime<Utc>) -> Result<Snapshot, HistoryError> {
        self.execute(store, now, None)
    }

    /// Evaluate, failing with `Timeout` if the store cannot answer before `deadline`.
    pub fn snapshot_with_deadline(
        &self,
        store: &dyn Store,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<Snapshot, HistoryError> {
        self.execute(store, now, Some(deadline))
    }

    fn execute(
        &self,
        store: &dyn Store,
        now: DateTime<Utc>,
        deadline: Option<Instant>,
    ) -> Result<Snapshot, HistoryError> {
        let query = self.compile(now, deadline);
        let result = store.query(&query)?;
        debug!(
            matched = result.counts.total(),
            returned = result.records.len(),
            "history snapshot taken"
        );
        Ok(Snapshot::new(now, query.from, query.to, result))
    }
}
