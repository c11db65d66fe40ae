//! SQLite-backed execution record store.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, info};

use super::Pool;
use crate::history::{
    check_error_summary, ExecutionRecord, HistoryError, Order, Query, QueryResult, Status, Store,
};

const RECORD_COLUMNS: &str =
    "m.id, m.message_type, m.transport, m.enqueued_at, m.started_at, m.finished_at, m.status, m.error, m.attempt";

/// Rows stepped between deadline checks.
const DEADLINE_CHECK_INTERVAL: usize = 256;

/// Record ids bound per tag lookup. SQLite caps host parameters per statement.
const TAG_BATCH: usize = 500;

impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        HistoryError::StoreUnavailable(e.to_string())
    }
}

/// Execution history persisted in SQLite.
///
/// Each query runs inside one read transaction; under WAL every statement in
/// it sees the same database snapshot, so counts and records always agree.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn get_pool(&self) -> &Pool {
        &self.pool
    }

    fn connection(
        &self,
        deadline: Option<Instant>,
    ) -> Result<r2d2::PooledConnection<r2d2_sqlite::SqliteConnectionManager>, HistoryError> {
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(HistoryError::Timeout);
                }
                self.pool.get_timeout(remaining).map_err(|_| HistoryError::Timeout)
            }
            None => self
                .pool
                .get()
                .map_err(|e| HistoryError::StoreUnavailable(e.to_string())),
        }
    }
}

fn millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, HistoryError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| HistoryError::StoreUnavailable(format!("corrupt timestamp {}", ms)))
}

/// Build the shared `WHERE` clause for a query, with positional values.
fn filter_clause(query: &Query) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(from) = query.from {
        values.push(Value::Integer(millis(from)));
        conditions.push(format!("m.enqueued_at >= ?{}", values.len()));
    }
    if let Some(to) = query.to {
        values.push(Value::Integer(millis(to)));
        conditions.push(format!("m.enqueued_at < ?{}", values.len()));
    }
    if let Some(status) = query.status {
        values.push(Value::Text(status.as_str().to_string()));
        conditions.push(format!("m.status = ?{}", values.len()));
    }
    if let Some(transport) = &query.transport {
        values.push(Value::Text(transport.clone()));
        conditions.push(format!("m.transport = ?{}", values.len()));
    }
    if let Some(message_type) = &query.message_type {
        values.push(Value::Text(message_type.clone()));
        conditions.push(format!("m.message_type = ?{}", values.len()));
    }
    if let Some(tag) = &query.tag {
        values.push(Value::Text(tag.clone()));
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM message_tags t WHERE t.message_id = m.id AND t.tag = ?{})",
            values.len()
        ));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, values)
}

struct RawRecord {
    id: i64,
    message_type: String,
    transport: String,
    enqueued_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    status: String,
    error: Option<String>,
    attempt: i64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            message_type: row.get(1)?,
            transport: row.get(2)?,
            enqueued_at: row.get(3)?,
            started_at: row.get(4)?,
            finished_at: row.get(5)?,
            status: row.get(6)?,
            error: row.get(7)?,
            attempt: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, HistoryError> {
        Ok(ExecutionRecord {
            id: self.id,
            message_type: self.message_type,
            transport: self.transport,
            enqueued_at: from_millis(self.enqueued_at)?,
            started_at: self.started_at.map(from_millis).transpose()?,
            finished_at: self.finished_at.map(from_millis).transpose()?,
            status: self.status.parse()?,
            error: self.error,
            attempt: u32::try_from(self.attempt).map_err(|_| {
                HistoryError::StoreUnavailable(format!("corrupt attempt number {}", self.attempt))
            })?,
            tags: Vec::new(),
        })
    }
}

/// Attach tags to already-loaded records, `TAG_BATCH` ids per statement.
fn load_tags(conn: &rusqlite::Connection, records: &mut [ExecutionRecord]) -> Result<(), HistoryError> {
    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    for chunk in records.chunks(TAG_BATCH) {
        let placeholders = (1..=chunk.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(",");
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT message_id, tag FROM message_tags WHERE message_id IN ({}) ORDER BY tag",
            placeholders
        ))?;
        let rows = stmt.query_map(params_from_iter(chunk.iter().map(|r| r.id)), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for r in rows {
            let (id, tag) = r?;
            tags.entry(id).or_default().push(tag);
        }
    }
    for record in records.iter_mut() {
        if let Some(t) = tags.remove(&record.id) {
            record.tags = t;
        }
    }
    Ok(())
}

impl Store for SqliteStore {
    fn query(&self, query: &Query) -> Result<QueryResult, HistoryError> {
        let mut conn = self.connection(query.deadline)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let (clause, values) = filter_clause(query);
        let mut result = QueryResult::default();

        // 1. Counts over the full matched set
        {
            let mut stmt = tx.prepare(&format!(
                "SELECT m.message_type, m.status, COUNT(*) FROM messages m {} GROUP BY m.message_type, m.status",
                clause
            ))?;
            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            while let Some(row) = rows.next()? {
                let message_type: String = row.get(0)?;
                let status: Status = row.get::<_, String>(1)?.parse()?;
                let n = row.get::<_, i64>(2)? as u64;
                result.counts.add(status, n);
                result
                    .by_message_type
                    .entry(message_type)
                    .or_default()
                    .add(status, n);
            }
        }
        query.check_deadline()?;

        // 2. Duration totals over the full matched set
        {
            let sql = format!(
                "SELECT
                    COALESCE(SUM(CASE WHEN m.started_at IS NOT NULL AND m.finished_at IS NOT NULL THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(m.finished_at - m.started_at), 0),
                    COALESCE(SUM(CASE WHEN m.started_at IS NOT NULL THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(m.started_at - m.enqueued_at), 0)
                 FROM messages m {}",
                clause
            );
            let (handled, handled_ms, started, waited_ms) =
                tx.query_row(&sql, params_from_iter(values.iter()), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?;
            result.handling.count = handled as u64;
            result.handling.total_ms = handled_ms;
            result.waiting.count = started as u64;
            result.waiting.total_ms = waited_ms;
        }
        query.check_deadline()?;

        // 3. Ordered, limited records (skipped for count-only queries)
        if query.limit != Some(0) {
            let direction = match query.order {
                Order::Ascending => "ASC",
                Order::Descending => "DESC",
            };
            let limit = query
                .limit
                .map(|n| format!(" LIMIT {}", n))
                .unwrap_or_default();
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM messages m {} ORDER BY m.enqueued_at {}, m.id ASC{}",
                RECORD_COLUMNS, clause, direction, limit
            ))?;
            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            let mut stepped = 0usize;
            while let Some(row) = rows.next()? {
                stepped += 1;
                if stepped % DEADLINE_CHECK_INTERVAL == 0 {
                    query.check_deadline()?;
                }
                result.records.push(RawRecord::from_row(row)?.into_record()?);
            }
        }

        load_tags(&tx, &mut result.records)?;
        tx.commit()?;

        debug!(
            matched = result.counts.total(),
            returned = result.records.len(),
            "sqlite history query complete"
        );
        Ok(result)
    }

    fn append(&self, record: &ExecutionRecord) -> Result<(), HistoryError> {
        record.validate()?;
        let mut conn = self.connection(None)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let inserted = tx.execute(
            "INSERT INTO messages (id, message_type, transport, enqueued_at, started_at, finished_at, status, error, attempt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.message_type,
                record.transport,
                millis(record.enqueued_at),
                record.started_at.map(millis),
                record.finished_at.map(millis),
                record.status.as_str(),
                record.error,
                record.attempt,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(HistoryError::InvalidArgument(format!(
                    "record {} already exists",
                    record.id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO message_tags (message_id, tag) VALUES (?1, ?2)")?;
            for tag in &record.tags {
                stmt.execute(params![record.id, tag])?;
            }
        }

        tx.commit()?;
        debug!(id = record.id, message_type = %record.message_type, transport = %record.transport, "execution record appended");
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

        let mut conn = self.connection(None)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: Option<(String, Option<i64>)> = tx
            .query_row(
                "SELECT status, started_at FROM messages WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (status, started_at) = current.ok_or(HistoryError::NotFound(id))?;
        let status: Status = status.parse()?;
        if status.is_terminal() {
            return Err(HistoryError::InvalidArgument(format!(
                "record {} is already {}",
                id, status
            )));
        }
        if started_at.is_some_and(|start| millis(finished_at) < start) {
            return Err(HistoryError::InvalidArgument(format!(
                "record {} cannot finish before it starts",
                id
            )));
        }

        tx.execute(
            "UPDATE messages SET status = ?1, finished_at = ?2, error = ?3 WHERE id = ?4",
            params![outcome.as_str(), millis(finished_at), error, id],
        )?;
        tx.commit()?;

        info!(id, outcome = %outcome, "execution record completed");
        Ok(())
    }

    fn get(&self, id: i64) -> Result<ExecutionRecord, HistoryError> {
        let conn = self.connection(None)?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM messages m WHERE m.id = ?1", RECORD_COLUMNS),
                params![id],
                RawRecord::from_row,
            )
            .optional()?
            .ok_or(HistoryError::NotFound(id))?;
        let mut records = vec![raw.into_record()?];
        load_tags(&conn, &mut records)?;
        Ok(records.remove(0))
    }
}
