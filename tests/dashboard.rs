use std::sync::Arc;

use chrono::{Duration, Utc};
use messenger_monitor::config::{ScheduleConfig, TransportConfig};
use messenger_monitor::dashboard::{Dashboard, DashboardError};
use messenger_monitor::history::{ExecutionRecord, MemoryStore, Specification, Status, Store};
use messenger_monitor::monitor::{ConfiguredSchedules, StaticMonitor};

fn schedule(name: &str) -> ScheduleConfig {
    ScheduleConfig {
        name: name.to_string(),
        cron: "0 0 3 * * *".to_string(),
        message_type: "PurgeExpiredTokens".to_string(),
        transport: "scheduler_default".to_string(),
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();

    let mut old = ExecutionRecord::pending(1, "SendEmail", "async", now - Duration::days(2));
    old.status = Status::Success;
    old.started_at = Some(old.enqueued_at);
    old.finished_at = Some(old.enqueued_at + Duration::seconds(1));
    store.append(&old).unwrap();

    for id in 2..=4 {
        let mut r = ExecutionRecord::pending(id, "SendEmail", "async", now - Duration::hours(id));
        r.status = Status::Success;
        r.started_at = Some(r.enqueued_at + Duration::seconds(1));
        r.finished_at = Some(r.enqueued_at + Duration::seconds(3));
        store.append(&r).unwrap();
    }

    let mut failed = ExecutionRecord::pending(5, "PurgeExpiredTokens", "scheduler_default", now - Duration::minutes(5));
    failed.status = Status::Failed;
    failed.started_at = Some(failed.enqueued_at);
    failed.finished_at = Some(failed.enqueued_at + Duration::seconds(2));
    failed.error = Some("lock wait timeout".to_string());
    failed.tags = vec!["schedule:nightly-purge".to_string()];
    store.append(&failed).unwrap();

    store
}

fn dashboard(store: Arc<MemoryStore>, schedules: Option<Vec<ScheduleConfig>>) -> Dashboard {
    let monitor = Arc::new(StaticMonitor::from_config(&[TransportConfig {
        name: "async".to_string(),
    }]));
    let mut builder = Dashboard::builder()
        .store(store)
        .workers(monitor.clone())
        .transports(monitor)
        .recent_limit(3);
    if let Some(configs) = schedules {
        builder = builder.schedules(Arc::new(ConfiguredSchedules::new(&configs).unwrap()));
    }
    builder.build().unwrap()
}

#[test]
fn test_build_requires_store() {
    let monitor = Arc::new(StaticMonitor::default());
    let result = Dashboard::builder()
        .workers(monitor.clone())
        .transports(monitor)
        .build();
    assert!(matches!(result, Err(DashboardError::NotConfigured("storage"))));
}

#[test]
fn test_build_rejects_bad_recent_limit() {
    let monitor = Arc::new(StaticMonitor::default());
    let result = Dashboard::builder()
        .store(Arc::new(MemoryStore::new()))
        .workers(monitor.clone())
        .transports(monitor)
        .recent_limit(0)
        .build();
    assert!(matches!(result, Err(DashboardError::History(_))));
}

#[tokio::test]
async fn test_overview_combines_last_day_and_recent() {
    let dashboard = dashboard(seeded_store(), None);
    let overview = dashboard.overview().await.unwrap();

    assert_eq!(overview.last_day.total, 4);
    assert_eq!(overview.last_day.counts.success, 3);
    assert_eq!(overview.last_day.counts.failed, 1);
    assert_eq!(overview.last_day.success_rate, 0.75);
    assert!(overview.last_day.per_hour.is_some());

    let ids: Vec<i64> = overview.recent.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![5, 2, 3]);
    assert_eq!(overview.transports.len(), 1);
    assert!(overview.schedules.is_none());
}

#[tokio::test]
async fn test_history_page_for_specification() {
    let dashboard = dashboard(seeded_store(), None);
    let page = dashboard
        .history(Specification::new().failures())
        .await
        .unwrap();

    assert_eq!(page.summary.total, 1);
    assert_eq!(page.summary.failure_rate, 1.0);
    assert!(page.summary.per_hour.is_none());
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].error.as_deref(), Some("lock wait timeout"));
}

#[tokio::test]
async fn test_schedules_not_configured() {
    let dashboard = dashboard(seeded_store(), None);
    let result = dashboard.schedules(None).await;
    assert!(matches!(result, Err(DashboardError::NotConfigured(_))));
}

#[tokio::test]
async fn test_schedules_empty_is_distinct() {
    let dashboard = dashboard(seeded_store(), Some(Vec::new()));
    let result = dashboard.schedules(None).await;
    assert!(matches!(result, Err(DashboardError::EmptyResult)));
}

#[tokio::test]
async fn test_schedules_unknown_name() {
    let dashboard = dashboard(seeded_store(), Some(vec![schedule("nightly-purge")]));
    let result = dashboard.schedules(Some("weekly-report")).await;
    assert!(matches!(result, Err(DashboardError::NotFound(name)) if name == "weekly-report"));
}

#[tokio::test]
async fn test_schedules_defaults_to_first_with_its_history() {
    let configs = vec![schedule("nightly-purge"), schedule("weekly-report")];
    let dashboard = dashboard(seeded_store(), Some(configs));

    let view = dashboard.schedules(None).await.unwrap();
    assert_eq!(view.schedules.len(), 2);
    assert_eq!(view.selected.name, "nightly-purge");
    assert!(view.selected.next_run.is_some());
    assert_eq!(view.last_day.total, 1);
    assert_eq!(view.recent.len(), 1);
    assert_eq!(view.recent[0].id, 5);

    let weekly = dashboard.schedules(Some("weekly-report")).await.unwrap();
    assert_eq!(weekly.last_day.total, 0);
    assert!(weekly.recent.is_empty());
}
