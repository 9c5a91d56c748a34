use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use retention_core::{AppError, AppResult};
use retention_domain::{CalendarWatchSubscription, ProjectId, RetainedTable, RetentionPolicy};

use super::RetentionCleaner;
use crate::renewal_queue::{RenewalSubscription, renewal_queue};
use crate::retention_ports::{RetentionSession, RetentionStore};

#[derive(Default)]
struct TestTables {
    notifications: Vec<(u64, DateTime<Utc>)>,
    auditables: Vec<(u64, DateTime<Utc>)>,
    shared_items: Vec<(u64, DateTime<Utc>)>,
    subscriptions: Vec<CalendarWatchSubscription>,
}

#[derive(Default)]
struct TestStore {
    tables: Arc<Mutex<TestTables>>,
    failing_table: Arc<Mutex<Option<RetainedTable>>>,
    sessions_opened: AtomicUsize,
    unavailable: AtomicBool,
}

struct TestSession {
    tables: Arc<Mutex<TestTables>>,
    failing_table: Option<RetainedTable>,
}

impl TestStore {
    fn with_tables(configure: impl FnOnce(&mut TestTables)) -> Arc<Self> {
        let store = Self::default();
        if let Ok(mut tables) = store.tables.lock() {
            configure(&mut tables);
        }
        Arc::new(store)
    }

    fn fail_on(&self, table: RetainedTable) {
        if let Ok(mut failing_table) = self.failing_table.lock() {
            *failing_table = Some(table);
        }
    }

    fn ids(&self, table: RetainedTable) -> Vec<u64> {
        let Ok(tables) = self.tables.lock() else {
            return Vec::new();
        };
        let rows = match table {
            RetainedTable::Notifications => &tables.notifications,
            RetainedTable::Auditables => &tables.auditables,
            RetainedTable::PublicProjectItems => &tables.shared_items,
            RetainedTable::GoogleCalendarProjects => {
                return tables.subscriptions.iter().map(|row| row.id).collect();
            }
        };
        rows.iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl RetentionStore for TestStore {
    async fn open_session(&self) -> AppResult<Box<dyn RetentionSession>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("connection refused".to_owned()));
        }

        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        let failing_table = *self
            .failing_table
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock test store: {error}")))?;

        Ok(Box::new(TestSession {
            tables: self.tables.clone(),
            failing_table,
        }))
    }
}

impl TestSession {
    fn check(&self, table: RetainedTable) -> AppResult<()> {
        if self.failing_table == Some(table) {
            return Err(AppError::Schema(format!(
                "relation \"{}\" does not exist",
                table.as_str()
            )));
        }
        Ok(())
    }

    fn tables(&self) -> AppResult<std::sync::MutexGuard<'_, TestTables>> {
        self.tables
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock test tables: {error}")))
    }
}

fn retain_before(rows: &mut Vec<(u64, DateTime<Utc>)>, instant: DateTime<Utc>) -> u64 {
    let before = rows.len();
    rows.retain(|(_, timestamp)| *timestamp >= instant);
    (before - rows.len()) as u64
}

#[async_trait]
impl RetentionSession for TestSession {
    async fn delete_updated_before(
        &mut self,
        table: RetainedTable,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.check(table)?;
        let mut tables = self.tables()?;
        match table {
            RetainedTable::Notifications => Ok(retain_before(&mut tables.notifications, cutoff)),
            RetainedTable::Auditables => Ok(retain_before(&mut tables.auditables, cutoff)),
            other => Err(AppError::Validation(format!(
                "table '{other}' is not pruned by updated_at"
            ))),
        }
    }

    async fn delete_shared_items_expired_before(
        &mut self,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.check(RetainedTable::PublicProjectItems)?;
        let mut tables = self.tables()?;
        Ok(retain_before(&mut tables.shared_items, now))
    }

    async fn find_subscriptions_expiring_before(
        &mut self,
        horizon: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarWatchSubscription>> {
        self.check(RetainedTable::GoogleCalendarProjects)?;
        let tables = self.tables()?;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|subscription| subscription.expires_before(horizon))
            .cloned()
            .collect())
    }

    async fn count_rows(&mut self, table: RetainedTable) -> AppResult<u64> {
        self.check(table)?;
        let tables = self.tables()?;
        let count = match table {
            RetainedTable::Notifications => tables.notifications.len(),
            RetainedTable::Auditables => tables.auditables.len(),
            RetainedTable::PublicProjectItems => tables.shared_items.len(),
            RetainedTable::GoogleCalendarProjects => tables.subscriptions.len(),
        };
        Ok(count as u64)
    }
}

fn subscription(id: u64, project_id: u64, expiration: DateTime<Utc>) -> CalendarWatchSubscription {
    let now = Utc::now();
    CalendarWatchSubscription {
        id,
        created_at: now - TimeDelta::days(7),
        updated_at: now - TimeDelta::days(7),
        channel: format!("channel-{id}"),
        channel_id: id,
        project_id: ProjectId::new(project_id),
        token: "token".to_owned(),
        owner: "alice".to_owned(),
        expiration,
    }
}

fn cleaner_for(store: Arc<TestStore>) -> (RetentionCleaner, RenewalSubscription) {
    let Ok((publisher, subscription)) = renewal_queue(16) else {
        panic!("queue should be created");
    };
    (RetentionCleaner::new(store, publisher), subscription)
}

async fn drain(mut subscription: RenewalSubscription) -> Vec<ProjectId> {
    let mut received = Vec::new();
    while let Some(project_id) = subscription.next().await {
        received.push(project_id);
    }
    received
}

#[tokio::test]
async fn clean_deletes_only_notifications_past_the_retention_window() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.notifications = vec![(1, now - TimeDelta::days(40)), (2, now - TimeDelta::days(1))];
    });
    let (cleaner, _subscription) = cleaner_for(store.clone());

    let report = cleaner.clean(30).await;

    assert!(report.is_ok());
    assert_eq!(
        report.map(|report| report.notifications_deleted).ok(),
        Some(1)
    );
    assert_eq!(store.ids(RetainedTable::Notifications), vec![2]);
}

#[tokio::test]
async fn clean_prunes_audit_entries_by_updated_at() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.auditables = vec![
            (10, now - TimeDelta::days(31)),
            (11, now - TimeDelta::days(29)),
            (12, now),
        ];
    });
    let (cleaner, _subscription) = cleaner_for(store.clone());

    let report = cleaner.clean(30).await;

    assert_eq!(report.map(|report| report.audit_entries_deleted).ok(), Some(1));
    assert_eq!(store.ids(RetainedTable::Auditables), vec![11, 12]);
}

#[tokio::test]
async fn shared_items_expire_against_now_not_the_retention_window() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.shared_items = vec![
            (20, now - TimeDelta::minutes(5)),
            (21, now + TimeDelta::days(2)),
        ];
    });
    let (cleaner, _subscription) = cleaner_for(store.clone());

    // A year-long window would keep item 20 if it were retention-relative.
    let report = cleaner.clean(365).await;

    assert_eq!(report.map(|report| report.shared_items_deleted).ok(), Some(1));
    assert_eq!(store.ids(RetainedTable::PublicProjectItems), vec![21]);
}

#[tokio::test]
async fn expiring_subscription_is_signalled_before_close() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.subscriptions = vec![subscription(1, 42, now + TimeDelta::hours(12))];
    });
    let (cleaner, subscription) = cleaner_for(store.clone());

    let report = cleaner.clean(30).await;
    assert!(report.is_ok());
    cleaner.close();

    assert_eq!(drain(subscription).await, vec![ProjectId::new(42)]);
    assert_eq!(store.ids(RetainedTable::GoogleCalendarProjects), vec![1]);
}

#[tokio::test]
async fn renewal_horizon_defaults_to_one_day() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.subscriptions = vec![
            subscription(1, 100, now - TimeDelta::hours(1)),
            subscription(2, 200, now + TimeDelta::hours(23)),
            subscription(3, 300, now + TimeDelta::hours(36)),
        ];
    });
    let (cleaner, subscription) = cleaner_for(store);

    let report = cleaner.clean(30).await;
    assert_eq!(
        report.map(|report| report.renewal_signals).ok(),
        Some(vec![ProjectId::new(100), ProjectId::new(200)])
    );
    cleaner.close();

    assert_eq!(
        drain(subscription).await,
        vec![ProjectId::new(100), ProjectId::new(200)]
    );
}

#[tokio::test]
async fn custom_renewal_horizon_widens_the_scan() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.subscriptions = vec![subscription(3, 300, now + TimeDelta::hours(36))];
    });
    let (cleaner, _subscription) = cleaner_for(store);
    let cleaner = cleaner.with_renewal_horizon(TimeDelta::days(2));

    let report = cleaner.clean(30).await;

    assert_eq!(
        report.map(|report| report.renewal_signals).ok(),
        Some(vec![ProjectId::new(300)])
    );
}

#[tokio::test]
async fn second_pass_deletes_nothing_but_signals_again() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.notifications = vec![(1, now - TimeDelta::days(40))];
        tables.auditables = vec![(2, now - TimeDelta::days(40))];
        tables.shared_items = vec![(3, now - TimeDelta::days(1))];
        tables.subscriptions = vec![subscription(4, 7, now + TimeDelta::hours(2))];
    });
    let (cleaner, subscription) = cleaner_for(store);

    let first = cleaner.clean(30).await;
    assert_eq!(first.map(|report| report.total_deleted()).ok(), Some(3));

    let second = cleaner.clean(30).await;
    assert!(second.is_ok());
    let second = second.unwrap_or_else(|_| unreachable!());
    assert!(!second.has_deletions());
    assert_eq!(second.renewal_signals, vec![ProjectId::new(7)]);

    cleaner.close();
    assert_eq!(
        drain(subscription).await,
        vec![ProjectId::new(7), ProjectId::new(7)]
    );
}

#[tokio::test]
async fn one_session_serves_the_whole_pass() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.notifications = vec![(1, now - TimeDelta::days(40))];
        tables.subscriptions = vec![subscription(4, 7, now)];
    });
    let (cleaner, _subscription) = cleaner_for(store.clone());

    assert!(cleaner.clean(30).await.is_ok());
    assert_eq!(store.sessions_opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_action_leaves_earlier_deletions_applied() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.notifications = vec![(1, now - TimeDelta::days(40))];
        tables.auditables = vec![(2, now - TimeDelta::days(40))];
        tables.shared_items = vec![(3, now - TimeDelta::days(1))];
        tables.subscriptions = vec![subscription(4, 7, now)];
    });
    store.fail_on(RetainedTable::Auditables);
    let (cleaner, mut subscription) = cleaner_for(store.clone());

    let result = cleaner.clean(30).await;

    assert!(matches!(result, Err(AppError::Schema(_))));
    assert!(store.ids(RetainedTable::Notifications).is_empty());
    assert_eq!(store.ids(RetainedTable::Auditables), vec![2]);
    assert_eq!(store.ids(RetainedTable::PublicProjectItems), vec![3]);
    assert_eq!(subscription.try_next(), None);
}

#[tokio::test]
async fn unreachable_store_surfaces_a_retriable_error() {
    let store = TestStore::with_tables(|_| {});
    store.unavailable.store(true, Ordering::SeqCst);
    let (cleaner, _subscription) = cleaner_for(store);

    let result = cleaner.clean(30).await;

    assert!(result.as_ref().is_err_and(AppError::is_retriable));
}

#[tokio::test]
async fn negative_retention_is_rejected_before_touching_the_store() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.notifications = vec![(1, now - TimeDelta::days(1))];
    });
    let (cleaner, _subscription) = cleaner_for(store.clone());

    let result = cleaner.clean(-5).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(store.sessions_opened.load(Ordering::SeqCst), 0);
    assert_eq!(store.ids(RetainedTable::Notifications), vec![1]);
}

#[tokio::test]
async fn closed_renewer_fails_the_pass_permanently() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.subscriptions = vec![subscription(4, 7, now)];
    });
    let (cleaner, subscription) = cleaner_for(store);
    drop(subscription);

    let result = cleaner.clean(30).await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    assert!(!result.as_ref().is_err_and(AppError::is_retriable));
}

#[tokio::test]
async fn count_for_table_distinguishes_zero_from_unavailable() {
    let now = Utc::now();
    let store = TestStore::with_tables(|tables| {
        tables.auditables = vec![(1, now), (2, now)];
    });
    let (cleaner, _subscription) = cleaner_for(store.clone());

    assert_eq!(cleaner.count_for_table("notifications").await, Some(0));
    assert_eq!(cleaner.count_for_table("auditables").await, Some(2));
    assert_eq!(cleaner.count_for_table("users").await, None);

    store.unavailable.store(true, Ordering::SeqCst);
    assert_eq!(cleaner.count_for_table("notifications").await, None);
}

#[tokio::test]
async fn count_for_table_reports_query_failure_as_none() {
    let store = TestStore::with_tables(|_| {});
    store.fail_on(RetainedTable::PublicProjectItems);
    let (cleaner, _subscription) = cleaner_for(store);

    assert_eq!(cleaner.count_for_table("public_project_items").await, None);
}

#[tokio::test]
async fn rows_exactly_at_a_cutoff_are_kept() {
    let Some(now) = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).single() else {
        panic!("fixed instant should be valid");
    };
    let stale_before = now - TimeDelta::days(30);
    let store = TestStore::with_tables(|tables| {
        tables.notifications = vec![
            (1, stale_before - TimeDelta::seconds(1)),
            (2, stale_before),
        ];
        tables.auditables = vec![(3, stale_before)];
        tables.shared_items = vec![(4, now - TimeDelta::seconds(1)), (5, now)];
        tables.subscriptions = vec![
            subscription(6, 60, now + TimeDelta::days(1)),
            subscription(7, 70, now + TimeDelta::days(1) - TimeDelta::seconds(1)),
        ];
    });
    let (cleaner, _subscription) = cleaner_for(store.clone());
    let Ok(policy) = RetentionPolicy::new(30) else {
        panic!("policy should be valid");
    };

    let report = cleaner.run_pass(policy, now).await;

    assert!(report.is_ok());
    let report = report.unwrap_or_else(|_| unreachable!());
    assert_eq!(report.cutoffs.stale_before, stale_before);
    assert_eq!(report.renewal_signals, vec![ProjectId::new(70)]);
    assert_eq!(store.ids(RetainedTable::Notifications), vec![2]);
    assert_eq!(store.ids(RetainedTable::Auditables), vec![3]);
    assert_eq!(store.ids(RetainedTable::PublicProjectItems), vec![5]);
}
