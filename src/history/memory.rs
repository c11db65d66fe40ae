//! In-memory record store for tests and single-process embedding.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{check_error_summary, evaluate, ExecutionRecord, HistoryError, Query, QueryResult, Status, Store};

#[derive(Default)]
struct Inner {
    records: Vec<ExecutionRecord>,
    index: HashMap<i64, usize>,
}

/// A [`Store`] backed by a vector behind a read-write lock.
///
/// Queries copy the record set under the read lock and filter the copy, so a
/// concurrent completion is either entirely visible or not at all.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn query(&self, query: &Query) -> Result<QueryResult, HistoryError> {
        query.check_deadline()?;
        let copy = self.inner.read().records.clone();
        evaluate(copy, query)
    }

    fn append(&self, record: &ExecutionRecord) -> Result<(), HistoryError> {
        record.validate()?;
        let mut inner = self.inner.write();
        if inner.index.contains_key(&record.id) {
            return Err(HistoryError::InvalidArgument(format!(
                "record {} already exists",
                record.id
            )));
        }
        let mut stored = record.clone();
        stored.normalize_tags();
        let pos = inner.records.len();
        inner.records.push(stored);
        inner.index.insert(record.id, pos);
        Ok(())
    }

    fn mark_complete(
        &self,
        id: i64,
        outcome: Status,
        finished_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), HistoryError> {
        if !outcome.is_terminal() {
            return Err(HistoryError::InvalidArgument(format!(
                "'{}' is not a completion outcome",
                outcome
            )));
        }
        check_error_summary(outcome, error)?;

        let mut inner = self.inner.write();
        let pos = *inner.index.get(&id).ok_or(HistoryError::NotFound(id))?;
        let record = &mut inner.records[pos];
        if record.status.is_terminal() {
            return Err(HistoryError::InvalidArgument(format!(
                "record {} is already {}",
                id, record.status
            )));
        }
        if let Some(start) = record.started_at {
            if finished_at < start {
                return Err(HistoryError::InvalidArgument(format!(
                    "record {} cannot finish before it starts",
                    id
                )));
            }
        }
        record.status = outcome;
        record.finished_at = Some(finished_at);
        record.error = error.map(str::to_string);
        Ok(())
    }

    fn get(&self, id: i64) -> Result<ExecutionRecord, HistoryError> {
        let inner = self.inner.read();
        inner
            .index
            .get(&id)
            .map(|pos| inner.records[*pos].clone())
            .ok_or(HistoryError::NotFound(id))
    }
}
