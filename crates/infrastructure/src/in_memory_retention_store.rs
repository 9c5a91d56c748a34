use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use retention_application::{RetentionSession, RetentionStore};
use retention_core::{AppError, AppResult};
use retention_domain::{
    AuditEntry, CalendarWatchSubscription, RetainedTable, SharedProjectItem, UserNotification,
};
use tokio::sync::RwLock;


#[derive(Debug, Default)]
struct InMemoryTables {
    notifications: RwLock<Vec<UserNotification>>,
    auditables: RwLock<Vec<AuditEntry>>,
    public_project_items: RwLock<Vec<SharedProjectItem>>,
    google_calendar_projects: RwLock<Vec<CalendarWatchSubscription>>,
}

/// In-memory retention store implementation.
///
/// Rows keep insertion order, which stands in for the store's natural scan
/// order.
#[derive(Debug)]
pub struct InMemoryRetentionStore {
    tables: Arc<InMemoryTables>,
    available: AtomicBool,
}

impl Default for InMemoryRetentionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRetentionStore {
    /// Creates an empty, reachable in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Arc::new(InMemoryTables::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Makes subsequent `open_session` calls fail as if the store were down.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Inserts a notification row.
    pub async fn insert_notification(&self, notification: UserNotification) {
        self.tables.notifications.write().await.push(notification);
    }

    /// Inserts an audit entry row.
    pub async fn insert_audit_entry(&self, entry: AuditEntry) {
        self.tables.auditables.write().await.push(entry);
    }

    /// Inserts a shared project item row.
    pub async fn insert_shared_item(&self, item: SharedProjectItem) {
        self.tables.public_project_items.write().await.push(item);
    }

    /// Inserts a calendar watch subscription row.
    pub async fn insert_subscription(&self, subscription: CalendarWatchSubscription) {
        self.tables
            .google_calendar_projects
            .write()
            .await
            .push(subscription);
    }

    /// Returns identifiers of the rows currently stored in `table`.
    pub async fn row_ids(&self, table: RetainedTable) -> Vec<u64> {
        match table {
            RetainedTable::Notifications => {
                let rows = self.tables.notifications.read().await;
                rows.iter().map(|row| row.id).collect()
            }
            RetainedTable::Auditables => {
                let rows = self.tables.auditables.read().await;
                rows.iter().map(|row| row.id).collect()
            }
            RetainedTable::PublicProjectItems => {
                let rows = self.tables.public_project_items.read().await;
                rows.iter().map(|row| row.id).collect()
            }
            RetainedTable::GoogleCalendarProjects => {
                let rows = self.tables.google_calendar_projects.read().await;
                rows.iter().map(|row| row.id).collect()
            }
        }
    }
}

#[async_trait]
impl RetentionStore for InMemoryRetentionStore {
    async fn open_session(&self) -> AppResult<Box<dyn RetentionSession>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable(
                "in-memory retention store is marked unavailable".to_owned(),
            ));
        }

        Ok(Box::new(InMemoryRetentionSession {
            tables: self.tables.clone(),
        }))
    }
}

struct InMemoryRetentionSession {
    tables: Arc<InMemoryTables>,
}

fn remove_matching<T>(rows: &mut Vec<T>, is_stale: impl Fn(&T) -> bool) -> u64 {
    let before = rows.len();
    rows.retain(|row| !is_stale(row));
    u64::try_from(before - rows.len()).unwrap_or(u64::MAX)
}

#[async_trait]
impl RetentionSession for InMemoryRetentionSession {
    async fn delete_updated_before(
        &mut self,
        table: RetainedTable,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        match table {
            RetainedTable::Notifications => {
                let mut rows = self.tables.notifications.write().await;
                Ok(remove_matching(&mut *rows, |row| row.updated_at < cutoff))
            }
            RetainedTable::Auditables => {
                let mut rows = self.tables.auditables.write().await;
                Ok(remove_matching(&mut *rows, |row| row.updated_at < cutoff))
            }
            other => Err(AppError::Validation(format!(
                "table '{other}' is not pruned by updated_at"
            ))),
        }
    }

    async fn delete_shared_items_expired_before(
        &mut self,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut rows = self.tables.public_project_items.write().await;
        Ok(remove_matching(&mut *rows, |row| row.is_expired_at(now)))
    }

    async fn find_subscriptions_expiring_before(
        &mut self,
        horizon: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarWatchSubscription>> {
        let rows = self.tables.google_calendar_projects.read().await;
        Ok(rows
            .iter()
            .filter(|subscription| subscription.expires_before(horizon))
            .cloned()
            .collect())
    }

    async fn count_rows(&mut self, table: RetainedTable) -> AppResult<u64> {
        let count = match table {
            RetainedTable::Notifications => self.tables.notifications.read().await.len(),
            RetainedTable::Auditables => self.tables.auditables.read().await.len(),
            RetainedTable::PublicProjectItems => {
                self.tables.public_project_items.read().await.len()
            }
            RetainedTable::GoogleCalendarProjects => {
                self.tables.google_calendar_projects.read().await.len()
            }
        };

        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}
