use super::{HistoryError, Snapshot, Status};

/// Derived statistics over a snapshot. Pure functions, no I/O.
pub struct Aggregator;

impl Aggregator {
    /// Share of attempts that succeeded. An empty snapshot has had no
    /// failures, so it reports `1.0`.
    pub fn success_rate(snapshot: &Snapshot) -> f64 {
        let total = snapshot.total();
        if total == 0 {
            return 1.0;
        }
        snapshot.count_by_status(Status::Success) as f64 / total as f64
    }

    pub fn failure_rate(snapshot: &Snapshot) -> f64 {
        let total = snapshot.total();
        if total == 0 {
            return 0.0;
        }
        snapshot.count_by_status(Status::Failed) as f64 / total as f64
    }

    /// Mean handler time over records with both a start and an end.
    /// `None` means no such record exists, which is not the same as zero.
    pub fn average_duration(snapshot: &Snapshot) -> Option<chrono::Duration> {
        snapshot.handling().mean()
    }

    /// Mean time between enqueue and a worker picking the message up.
    pub fn average_wait_time(snapshot: &Snapshot) -> Option<chrono::Duration> {
        snapshot.waiting().mean()
    }

    /// Attempts per second over `window`.
    pub fn throughput(snapshot: &Snapshot, window: chrono::Duration) -> Result<f64, HistoryError> {
        if window <= chrono::Duration::zero() {
            return Err(HistoryError::InvalidArgument(format!(
                "throughput window must be positive, got {}ms",
                window.num_milliseconds()
            )));
        }
        let seconds = window.num_milliseconds() as f64 / 1000.0;
        Ok(snapshot.total() as f64 / seconds)
    }
}
