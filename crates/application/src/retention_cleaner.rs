//! Retention pass over notifications, audit entries, shared items and
//! calendar watch subscriptions.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{Instrument, Span, debug, info, info_span, warn};

use retention_core::AppResult;
use retention_domain::{
    DEFAULT_RENEWAL_HORIZON_HOURS, ProjectId, RetainedTable, RetentionCutoffs, RetentionPolicy,
};

use crate::renewal_queue::RenewalPublisher;
use crate::retention_ports::{RetentionSession, RetentionStore};

#[cfg(test)]
mod tests;

/// Outcome of one retention pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    /// Instants the pass compared rows against.
    pub cutoffs: RetentionCutoffs,
    /// Notifications deleted by `updated_at`.
    pub notifications_deleted: u64,
    /// Audit entries deleted by `updated_at`.
    pub audit_entries_deleted: u64,
    /// Shared project items deleted by `expiration_time`.
    pub shared_items_deleted: u64,
    /// Projects signalled for calendar watch renewal, in emission order.
    pub renewal_signals: Vec<ProjectId>,
}

impl RetentionReport {
    fn new(cutoffs: RetentionCutoffs) -> Self {
        Self {
            cutoffs,
            notifications_deleted: 0,
            audit_entries_deleted: 0,
            shared_items_deleted: 0,
            renewal_signals: Vec::new(),
        }
    }

    /// Total number of rows deleted across all tables.
    #[must_use]
    pub fn total_deleted(&self) -> u64 {
        self.notifications_deleted + self.audit_entries_deleted + self.shared_items_deleted
    }

    /// Returns true when the pass deleted at least one row.
    #[must_use]
    pub fn has_deletions(&self) -> bool {
        self.total_deleted() > 0
    }
}

/// Application service running retention passes and emitting renewal
/// signals.
///
/// The cleaner is the sole producer on its renewal queue; [`Self::close`]
/// retires it and closes the queue.
pub struct RetentionCleaner {
    store: Arc<dyn RetentionStore>,
    publisher: RenewalPublisher,
    renewal_horizon: TimeDelta,
    span: Span,
}

impl RetentionCleaner {
    /// Creates a cleaner over `store` publishing into `publisher`.
    #[must_use]
    pub fn new(store: Arc<dyn RetentionStore>, publisher: RenewalPublisher) -> Self {
        Self {
            store,
            publisher,
            renewal_horizon: TimeDelta::hours(DEFAULT_RENEWAL_HORIZON_HOURS),
            span: info_span!("retention_cleaner"),
        }
    }

    /// Overrides how far ahead subscriptions count as expiring soon.
    #[must_use]
    pub fn with_renewal_horizon(mut self, renewal_horizon: TimeDelta) -> Self {
        self.renewal_horizon = renewal_horizon;
        self
    }

    /// Records every event of this cleaner inside `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Runs one retention pass keeping `max_retention_days` days of
    /// notifications and audit entries.
    ///
    /// Actions run in a fixed order on a single session and stop at the
    /// first failure. Deletions that already ran stay applied.
    pub async fn clean(&self, max_retention_days: i64) -> AppResult<RetentionReport> {
        let span = self.span.clone();
        async {
            let policy = RetentionPolicy::new(max_retention_days)?
                .with_renewal_horizon(self.renewal_horizon)?;
            self.run_pass(policy, Utc::now()).await
        }
        .instrument(span)
        .await
    }

    /// Returns the current row count of `table_name`.
    ///
    /// `None` means the count is unavailable: the name is not a retained
    /// table, the session could not be opened, or the query failed.
    pub async fn count_for_table(&self, table_name: &str) -> Option<u64> {
        let span = self.span.clone();
        async {
            let table = match table_name.parse::<RetainedTable>() {
                Ok(table) => table,
                Err(error) => {
                    warn!(table = table_name, error = %error, "count requested for unknown table");
                    return None;
                }
            };

            let count = match self.store.open_session().await {
                Ok(mut session) => session.count_rows(table).await,
                Err(error) => Err(error),
            };

            match count {
                Ok(count) => {
                    info!(table = %table, count, "counted table rows");
                    Some(count)
                }
                Err(error) => {
                    warn!(table = %table, error = %error, "failed to count table rows");
                    None
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Retires the cleaner and closes its renewal queue.
    pub fn close(self) {
        let _entered = self.span.enter();
        info!("renewal queue closed");
        drop(self.publisher);
    }

    async fn run_pass(
        &self,
        policy: RetentionPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<RetentionReport> {
        let cutoffs = policy.cutoffs_at(now)?;
        info!(
            max_retention_days = policy.max_retention().num_days(),
            started_at = %cutoffs.now.to_rfc3339(),
            stale_before = %cutoffs.stale_before.to_rfc3339(),
            renew_before = %cutoffs.renew_before.to_rfc3339(),
            "retention pass started"
        );

        let mut report = RetentionReport::new(cutoffs);
        let mut session = self.store.open_session().await?;

        report.notifications_deleted = delete_stale(
            session.as_mut(),
            RetainedTable::Notifications,
            cutoffs.stale_before,
        )
        .await?;
        report.audit_entries_deleted = delete_stale(
            session.as_mut(),
            RetainedTable::Auditables,
            cutoffs.stale_before,
        )
        .await?;
        report.shared_items_deleted =
            delete_expired_shared_items(session.as_mut(), cutoffs.now).await?;

        let expiring = session
            .find_subscriptions_expiring_before(cutoffs.renew_before)
            .await
            .inspect_err(|error| {
                warn!(
                    table = %RetainedTable::GoogleCalendarProjects,
                    error = %error,
                    "failed to scan expiring calendar watches"
                );
            })?;
        // Publishing may wait on the renewer; do not pin a connection meanwhile.
        drop(session);

        for subscription in expiring {
            info!(
                owner = %subscription.owner,
                subscription_id = subscription.id,
                project_id = %subscription.project_id,
                expiration = %subscription.expiration.to_rfc3339(),
                "calendar watch expiring, signalling renewal"
            );
            self.publisher.publish(subscription.project_id).await?;
            report.renewal_signals.push(subscription.project_id);
        }

        info!(
            notifications = report.notifications_deleted,
            audit_entries = report.audit_entries_deleted,
            shared_items = report.shared_items_deleted,
            renewals = report.renewal_signals.len(),
            "retention pass complete"
        );

        Ok(report)
    }
}

async fn delete_stale(
    session: &mut dyn RetentionSession,
    table: RetainedTable,
    cutoff: DateTime<Utc>,
) -> AppResult<u64> {
    let deleted = session
        .delete_updated_before(table, cutoff)
        .await
        .inspect_err(|error| {
            warn!(table = %table, error = %error, "failed to delete stale rows");
        })?;

    if deleted > 0 {
        info!(table = %table, cutoff = %cutoff.to_rfc3339(), deleted, "deleted stale rows");
    } else {
        debug!(table = %table, cutoff = %cutoff.to_rfc3339(), "no stale rows");
    }

    Ok(deleted)
}

async fn delete_expired_shared_items(
    session: &mut dyn RetentionSession,
    now: DateTime<Utc>,
) -> AppResult<u64> {
    let table = RetainedTable::PublicProjectItems;
    let deleted = session
        .delete_shared_items_expired_before(now)
        .await
        .inspect_err(|error| {
            warn!(table = %table, error = %error, "failed to delete expired shared items");
        })?;

    if deleted > 0 {
        info!(
            table = %table,
            expired_before = %now.to_rfc3339(),
            deleted,
            "deleted expired shared items"
        );
    } else {
        debug!(table = %table, "no expired shared items");
    }

    Ok(deleted)
}
