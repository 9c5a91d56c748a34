//! Storage ports used by the retention cleaner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use retention_core::AppResult;
use retention_domain::{CalendarWatchSubscription, RetainedTable};

/// Store port that hands out scoped sessions.
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Acquires one connection scope.
    ///
    /// The connection is released when the returned session is dropped,
    /// whichever action last used it.
    async fn open_session(&self) -> AppResult<Box<dyn RetentionSession>>;
}

/// One connection scope against the retained tables.
///
/// Every statement runs in its own implicit transaction; a failure in one
/// call never rolls back an earlier one.
#[async_trait]
pub trait RetentionSession: Send {
    /// Deletes rows of a retention-pruned table whose `updated_at` is before
    /// `cutoff`. Returns the number of deleted rows.
    async fn delete_updated_before(
        &mut self,
        table: RetainedTable,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Deletes shared project items whose `expiration_time` is before `now`.
    async fn delete_shared_items_expired_before(&mut self, now: DateTime<Utc>)
    -> AppResult<u64>;

    /// Lists calendar watch subscriptions whose `expiration` is before
    /// `horizon`, in the store's natural order.
    async fn find_subscriptions_expiring_before(
        &mut self,
        horizon: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarWatchSubscription>>;

    /// Counts the rows currently stored in `table`.
    async fn count_rows(&mut self, table: RetainedTable) -> AppResult<u64>;
}
