//! Cutoff arithmetic for one retention pass.

use chrono::{DateTime, TimeDelta, Utc};
use retention_core::{AppError, AppResult};

/// Default look-ahead for calendar watch renewal.
pub const DEFAULT_RENEWAL_HORIZON_HOURS: i64 = 24;

/// Validated retention window and renewal look-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    max_retention: TimeDelta,
    renewal_horizon: TimeDelta,
}

/// Instants a single pass compares rows against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCutoffs {
    /// Pass start time. Shared items expiring before it are deleted.
    pub now: DateTime<Utc>,
    /// Notifications and audit entries last touched before it are deleted.
    pub stale_before: DateTime<Utc>,
    /// Subscriptions expiring before it are signalled for renewal.
    pub renew_before: DateTime<Utc>,
}

impl RetentionPolicy {
    /// Creates a policy keeping rows for `max_retention_days` days with the
    /// default renewal horizon.
    pub fn new(max_retention_days: i64) -> AppResult<Self> {
        if max_retention_days < 0 {
            return Err(AppError::Validation(format!(
                "max retention days must not be negative, got {max_retention_days}"
            )));
        }

        let max_retention = TimeDelta::try_days(max_retention_days).ok_or_else(|| {
            AppError::Validation(format!(
                "max retention days {max_retention_days} is out of range"
            ))
        })?;

        Ok(Self {
            max_retention,
            renewal_horizon: TimeDelta::hours(DEFAULT_RENEWAL_HORIZON_HOURS),
        })
    }

    /// Replaces the renewal look-ahead.
    pub fn with_renewal_horizon(mut self, renewal_horizon: TimeDelta) -> AppResult<Self> {
        if renewal_horizon < TimeDelta::zero() {
            return Err(AppError::Validation(
                "renewal horizon must not be negative".to_owned(),
            ));
        }

        self.renewal_horizon = renewal_horizon;
        Ok(self)
    }

    /// Returns the retention window.
    #[must_use]
    pub fn max_retention(&self) -> TimeDelta {
        self.max_retention
    }

    /// Returns the renewal look-ahead.
    #[must_use]
    pub fn renewal_horizon(&self) -> TimeDelta {
        self.renewal_horizon
    }

    /// Computes the cutoffs for a pass starting at `now`.
    pub fn cutoffs_at(&self, now: DateTime<Utc>) -> AppResult<RetentionCutoffs> {
        let stale_before = now.checked_sub_signed(self.max_retention).ok_or_else(|| {
            AppError::Validation(format!(
                "retention cutoff underflows when subtracting {} days from {now}",
                self.max_retention.num_days()
            ))
        })?;
        let renew_before = now.checked_add_signed(self.renewal_horizon).ok_or_else(|| {
            AppError::Validation(format!(
                "renewal horizon overflows when adding {} hours to {now}",
                self.renewal_horizon.num_hours()
            ))
        })?;

        Ok(RetentionCutoffs {
            now,
            stale_before,
            renew_before,
        })
    }
}
