//! History engine behaviour, exercised against both record stores.

use chrono::{DateTime, Duration, TimeZone, Utc};
use messenger_monitor::history::{
    Aggregator, ExecutionRecord, HistoryError, MemoryStore, Specification, Status, Store, TimeAnchor,
};
use messenger_monitor::storage::{self, SqliteStore};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
}

fn sqlite_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let pool = storage::open_pool(&dir.path().join("history.db"), 2).unwrap();
    (dir, SqliteStore::new(pool))
}

/// Run `check` once per store implementation.
fn for_each_store(check: impl Fn(&dyn Store)) {
    let memory = MemoryStore::new();
    check(&memory);

    let (_dir, sqlite) = sqlite_store();
    check(&sqlite);
}

fn record(id: i64, status: Status, enqueued_at: DateTime<Utc>) -> ExecutionRecord {
    let mut r = ExecutionRecord::pending(id, "SendEmail", "async", enqueued_at);
    if status != Status::Pending {
        r.started_at = Some(enqueued_at + Duration::seconds(1));
    }
    if status.is_terminal() {
        r.finished_at = Some(enqueued_at + Duration::seconds(3));
    }
    if status == Status::Failed {
        r.error = Some("SMTP connection refused".to_string());
    }
    r.status = status;
    r
}

fn seed_mixed(store: &dyn Store) {
    let now = base_time();
    let statuses = [
        Status::Success,
        Status::Success,
        Status::Failed,
        Status::Retried,
        Status::Processing,
        Status::Pending,
        Status::Success,
    ];
    for (i, status) in statuses.iter().enumerate() {
        store
            .append(&record(i as i64 + 1, *status, now - Duration::minutes(i as i64 + 1)))
            .unwrap();
    }
}

#[test]
fn test_total_equals_sum_of_status_counts() {
    for_each_store(|store| {
        seed_mixed(store);
        let snapshot = Specification::new().snapshot_at(store, base_time()).unwrap();
        let sum: u64 = Status::ALL.iter().map(|s| snapshot.count_by_status(*s)).sum();
        assert_eq!(snapshot.total(), sum);
        assert_eq!(snapshot.total(), 7);
        assert_eq!(snapshot.count_by_status(Status::Success), 3);
        assert_eq!(snapshot.count_by_status(Status::Failed), 1);
    });
}

#[test]
fn test_limit_caps_records_but_not_counts() {
    for_each_store(|store| {
        seed_mixed(store);
        let snapshot = Specification::new()
            .limit(2)
            .unwrap()
            .snapshot_at(store, base_time())
            .unwrap();
        assert_eq!(snapshot.messages().count(), 2);
        assert_eq!(snapshot.total(), 7);

        let ids: Vec<i64> = snapshot.messages().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2], "newest first");
    });
}

#[test]
fn test_limit_larger_than_matches_returns_all() {
    for_each_store(|store| {
        for id in 1..=3 {
            store
                .append(&record(id, Status::Success, base_time() - Duration::minutes(id)))
                .unwrap();
        }
        let snapshot = Specification::new()
            .limit(5)
            .unwrap()
            .snapshot_at(store, base_time())
            .unwrap();
        assert_eq!(snapshot.messages().count(), 3);
    });
}

#[test]
fn test_invalid_limits_rejected() {
    assert!(matches!(
        Specification::new().limit(0),
        Err(HistoryError::InvalidArgument(_))
    ));
    assert!(matches!(
        Specification::new().limit(-1),
        Err(HistoryError::InvalidArgument(_))
    ));
}

#[test]
fn test_one_day_window() {
    for_each_store(|store| {
        let now = base_time();
        store
            .append(&record(1, Status::Success, now - Duration::days(2)))
            .unwrap();
        store
            .append(&record(2, Status::Success, now - Duration::hours(12)))
            .unwrap();
        store
            .append(&record(3, Status::Failed, now - Duration::hours(1)))
            .unwrap();

        let snapshot = Specification::new()
            .from(TimeAnchor::ONE_DAY_AGO)
            .snapshot_at(store, now)
            .unwrap();
        let ids: Vec<i64> = snapshot.messages().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(snapshot.total(), 2);
        assert_eq!(snapshot.window_duration(), Some(Duration::days(1)));
    });
}

#[test]
fn test_upper_bound_is_exclusive() {
    for_each_store(|store| {
        let now = base_time();
        store.append(&record(1, Status::Success, now - Duration::hours(2))).unwrap();
        store.append(&record(2, Status::Success, now - Duration::hours(1))).unwrap();

        let snapshot = Specification::new()
            .to(now - Duration::hours(1))
            .snapshot_at(store, now)
            .unwrap();
        let ids: Vec<i64> = snapshot.messages().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    });
}

#[test]
fn test_same_timestamp_ordered_by_ascending_id() {
    for_each_store(|store| {
        let t = base_time() - Duration::minutes(5);
        store.append(&record(9, Status::Success, t)).unwrap();
        store.append(&record(4, Status::Success, t)).unwrap();
        store
            .append(&record(1, Status::Success, t - Duration::minutes(1)))
            .unwrap();

        let newest_first = Specification::new().snapshot_at(store, base_time()).unwrap();
        let ids: Vec<i64> = newest_first.messages().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 9, 1]);

        let oldest_first = Specification::new()
            .ascending()
            .snapshot_at(store, base_time())
            .unwrap();
        let ids: Vec<i64> = oldest_first.messages().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4, 9]);
    });
}

#[test]
fn test_filters_narrow_by_exact_match() {
    for_each_store(|store| {
        let now = base_time();
        let mut email = record(1, Status::Success, now - Duration::minutes(1));
        email.tags = vec!["schedule:nightly".to_string()];
        store.append(&email).unwrap();

        let mut sms = record(2, Status::Failed, now - Duration::minutes(2));
        sms.message_type = "SendSms".to_string();
        sms.transport = "priority".to_string();
        store.append(&sms).unwrap();

        let base = Specification::new();
        let by_type = base.with_message_type("SendSms").snapshot_at(store, now).unwrap();
        assert_eq!(by_type.total(), 1);
        assert_eq!(by_type.messages().next().unwrap().id, 2);

        let by_transport = base.with_transport("async").snapshot_at(store, now).unwrap();
        assert_eq!(by_transport.total(), 1);
        assert_eq!(by_transport.messages().next().unwrap().id, 1);

        let failures = base.failures().snapshot_at(store, now).unwrap();
        assert_eq!(failures.total(), 1);
        assert_eq!(failures.count_by_status(Status::Success), 0);

        let tagged = base.with_tag("schedule:nightly").snapshot_at(store, now).unwrap();
        let only: Vec<_> = tagged.messages().collect();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].tags, vec!["schedule:nightly".to_string()]);

        let none = base.with_transport("asyn").snapshot_at(store, now).unwrap();
        assert_eq!(none.total(), 0);
        assert_eq!(none.messages().count(), 0);

        let all = base.snapshot_at(store, now).unwrap();
        assert_eq!(all.total(), 2, "base specification is unchanged");
        assert_eq!(all.by_message_type().len(), 2);
        assert_eq!(all.by_message_type()["SendSms"].failed, 1);
    });
}

#[test]
fn test_aggregates_over_store() {
    for_each_store(|store| {
        let now = base_time();
        for id in 1..=3 {
            store
                .append(&record(id, Status::Success, now - Duration::minutes(id)))
                .unwrap();
        }
        store.append(&record(4, Status::Failed, now - Duration::minutes(4))).unwrap();

        let snapshot = Specification::new().snapshot_at(store, now).unwrap();
        assert_eq!(Aggregator::success_rate(&snapshot), 0.75);
        assert_eq!(Aggregator::average_duration(&snapshot), Some(Duration::seconds(2)));
        assert_eq!(Aggregator::average_wait_time(&snapshot), Some(Duration::seconds(1)));
    });
}

#[test]
fn test_average_duration_undefined_for_unfinished_work() {
    for_each_store(|store| {
        let now = base_time();
        store.append(&record(1, Status::Pending, now - Duration::minutes(1))).unwrap();
        store
            .append(&record(2, Status::Processing, now - Duration::minutes(2)))
            .unwrap();

        let snapshot = Specification::new().snapshot_at(store, now).unwrap();
        assert_eq!(Aggregator::average_duration(&snapshot), None);
        assert_eq!(Aggregator::success_rate(&Specification::new()
            .successes()
            .snapshot_at(store, now)
            .unwrap()), 1.0);
    });
}

#[test]
fn test_snapshot_is_frozen() {
    for_each_store(|store| {
        let now = base_time();
        store
            .append(&record(1, Status::Processing, now - Duration::minutes(3)))
            .unwrap();

        let snapshot = Specification::new().snapshot_at(store, now).unwrap();
        let first: Vec<ExecutionRecord> = snapshot.messages().cloned().collect();

        store.append(&record(2, Status::Pending, now - Duration::minutes(1))).unwrap();
        store.mark_complete(1, Status::Success, now, None).unwrap();

        let second: Vec<ExecutionRecord> = snapshot.messages().cloned().collect();
        assert_eq!(first, second);
        assert_eq!(snapshot.total(), 1);
        assert_eq!(second[0].status, Status::Processing);
    });
}

#[test]
fn test_completion_rules() {
    for_each_store(|store| {
        let now = base_time();
        store
            .append(&record(1, Status::Processing, now - Duration::minutes(1)))
            .unwrap();

        assert!(matches!(
            store.mark_complete(1, Status::Failed, now, None),
            Err(HistoryError::InvalidArgument(_))
        ));
        store
            .mark_complete(1, Status::Failed, now, Some("handler panicked"))
            .unwrap();

        let stored = store.get(1).unwrap();
        assert_eq!(stored.status, Status::Failed);
        assert_eq!(stored.finished_at, Some(now));
        assert_eq!(stored.error.as_deref(), Some("handler panicked"));

        assert!(matches!(
            store.mark_complete(1, Status::Success, now, None),
            Err(HistoryError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.mark_complete(42, Status::Success, now, None),
            Err(HistoryError::NotFound(42))
        ));
        assert!(matches!(store.get(42), Err(HistoryError::NotFound(42))));
    });
}

#[test]
fn test_duplicate_append_rejected() {
    for_each_store(|store| {
        let r = record(1, Status::Pending, base_time());
        store.append(&r).unwrap();
        assert!(matches!(
            store.append(&r),
            Err(HistoryError::InvalidArgument(_))
        ));
    });
}

#[test]
fn test_expired_deadline_is_a_timeout() {
    for_each_store(|store| {
        seed_mixed(store);
        let result = Specification::new().snapshot_with_deadline(
            store,
            base_time(),
            std::time::Instant::now(),
        );
        assert!(matches!(result, Err(HistoryError::Timeout)));
    });
}

#[test]
fn test_sqlite_failure_is_not_an_empty_snapshot() {
    let (_dir, store) = sqlite_store();
    store
        .get_pool()
        .get()
        .unwrap()
        .execute_batch("DROP TABLE message_tags; DROP TABLE messages;")
        .unwrap();

    let result = Specification::new().snapshot(&store);
    assert!(matches!(result, Err(HistoryError::StoreUnavailable(_))));
}

#[test]
fn test_sqlite_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.db");
    {
        let store = SqliteStore::new(storage::open_pool(&path, 1).unwrap());
        let mut r = record(1, Status::Success, base_time());
        r.tags = vec!["b".to_string(), "a".to_string()];
        r.attempt = 2;
        store.append(&r).unwrap();
    }

    let store = SqliteStore::new(storage::open_pool(&path, 1).unwrap());
    let stored = store.get(1).unwrap();
    assert_eq!(stored.attempt, 2);
    assert_eq!(stored.tags, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(stored.enqueued_at, base_time());
}

#[test]
fn test_sqlite_large_result_sets() {
    const MANY: i64 = 33_000;
    let (_dir, store) = sqlite_store();
    let newest = base_time().timestamp_millis() - 1_000;
    {
        let mut conn = store.get_pool().get().unwrap();
        let tx = conn.transaction().unwrap();
        {
            let mut message = tx
                .prepare(
                    "INSERT INTO messages (id, message_type, transport, enqueued_at, status)
                     VALUES (?1, 'SendEmail', 'async', ?2, 'pending')",
                )
                .unwrap();
            let mut tag = tx
                .prepare("INSERT INTO message_tags (message_id, tag) VALUES (?1, 'bulk')")
                .unwrap();
            for id in 1..=MANY {
                message.execute(rusqlite::params![id, newest - id * 100]).unwrap();
                tag.execute([id]).unwrap();
            }
        }
        tx.commit().unwrap();
    }

    let last_day = Specification::new().from(TimeAnchor::ONE_DAY_AGO);
    let snapshot = last_day.snapshot_at(&store, base_time()).unwrap();
    assert_eq!(snapshot.total(), MANY as u64);
    assert_eq!(snapshot.messages().count(), MANY as usize);
    assert!(snapshot.messages().all(|r| r.tags == ["bulk"]));

    let counts = last_day.counts_only().snapshot_at(&store, base_time()).unwrap();
    assert_eq!(counts.count_by_status(Status::Pending), MANY as u64);
    assert_eq!(counts.messages().count(), 0);
}

#[test]
fn test_counts_only_keeps_aggregates() {
    for_each_store(|store| {
        seed_mixed(store);
        let full = Specification::new().snapshot_at(store, base_time()).unwrap();
        let counts = Specification::new().counts_only().snapshot_at(store, base_time()).unwrap();
        assert_eq!(counts.messages().count(), 0);
        assert_eq!(counts.counts(), full.counts());
        assert_eq!(
            Aggregator::average_duration(&counts),
            Aggregator::average_duration(&full)
        );
    });
}

#[test]
fn test_sub_millisecond_boundary_agrees_across_stores() {
    for_each_store(|store| {
        let day_ago = base_time() - Duration::days(1);
        store
            .append(&record(1, Status::Pending, day_ago + Duration::microseconds(300)))
            .unwrap();
        store
            .append(&record(2, Status::Pending, day_ago - Duration::milliseconds(1)))
            .unwrap();

        let now = base_time() + Duration::microseconds(700);
        let snapshot = Specification::new()
            .from(TimeAnchor::ONE_DAY_AGO)
            .snapshot_at(store, now)
            .unwrap();
        let ids: Vec<i64> = snapshot.messages().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);
    });
}

#[test]
fn test_tags_round_trip_sorted_and_unique() {
    for_each_store(|store| {
        let mut r = record(1, Status::Pending, base_time());
        r.tags = vec!["tenant:b".to_string(), "billing".to_string(), "tenant:b".to_string()];
        store.append(&r).unwrap();

        let expected = vec!["billing".to_string(), "tenant:b".to_string()];
        assert_eq!(store.get(1).unwrap().tags, expected);
        let snapshot = Specification::new().snapshot_at(store, base_time()).unwrap();
        assert_eq!(snapshot.messages().next().unwrap().tags, expected);
    });
}
