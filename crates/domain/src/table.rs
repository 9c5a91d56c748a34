//! Tables the retention sweep reads and prunes.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use retention_core::AppError;
use serde::{Deserialize, Serialize};

/// Tables touched by the retention sweep.
///
/// The storage names are part of the external schema contract and must not
/// change without a coordinated migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainedTable {
    /// User notifications, pruned by `updated_at`.
    Notifications,
    /// Project audit trail, pruned by `updated_at`.
    Auditables,
    /// Publicly shared notes and tasks, pruned by `expiration_time`.
    PublicProjectItems,
    /// Calendar watch subscriptions, scanned by `expiration` and never pruned.
    GoogleCalendarProjects,
}

impl RetainedTable {
    /// Returns the storage table name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notifications => "notifications",
            Self::Auditables => "auditables",
            Self::PublicProjectItems => "public_project_items",
            Self::GoogleCalendarProjects => "google_calendar_projects",
        }
    }

    /// Returns the single timestamp column that governs this table.
    #[must_use]
    pub fn timestamp_column(&self) -> &'static str {
        match self {
            Self::Notifications | Self::Auditables => "updated_at",
            Self::PublicProjectItems => "expiration_time",
            Self::GoogleCalendarProjects => "expiration",
        }
    }

    /// Returns true for tables pruned against the retention cutoff.
    #[must_use]
    pub fn is_retention_pruned(&self) -> bool {
        matches!(self, Self::Notifications | Self::Auditables)
    }

    /// Returns all retained tables in sweep order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[RetainedTable] = &[
            RetainedTable::Notifications,
            RetainedTable::Auditables,
            RetainedTable::PublicProjectItems,
            RetainedTable::GoogleCalendarProjects,
        ];

        ALL
    }
}

impl Display for RetainedTable {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for RetainedTable {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "notifications" => Ok(Self::Notifications),
            "auditables" => Ok(Self::Auditables),
            "public_project_items" => Ok(Self::PublicProjectItems),
            "google_calendar_projects" => Ok(Self::GoogleCalendarProjects),
            _ => Err(AppError::Validation(format!(
                "unknown retained table '{value}'"
            ))),
        }
    }
}
