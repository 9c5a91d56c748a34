//! Record kinds stored in the retained tables.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a journal project, carried on the renewal queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectId(u64);

impl ProjectId {
    /// Creates a project identifier from its stored value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for ProjectId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Activity recorded against a project item (`auditables`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Row identifier.
    pub id: u64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last touch time; governs retention.
    pub updated_at: DateTime<Utc>,
    /// Human readable activity label.
    pub activity: String,
    /// User or system that performed the activity.
    pub originator: String,
    /// Owning project.
    pub project_id: ProjectId,
    /// When the activity happened.
    pub activity_time: DateTime<Utc>,
    /// Action code.
    pub action: u32,
    /// Project item the activity targeted.
    pub project_item_id: u64,
}

/// Standing webhook subscription to an external calendar
/// (`google_calendar_projects`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarWatchSubscription {
    /// Row identifier.
    pub id: u64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last touch time.
    pub updated_at: DateTime<Utc>,
    /// Channel name registered with the calendar provider.
    pub channel: String,
    /// Channel identifier registered with the calendar provider.
    pub channel_id: u64,
    /// Project the calendar is linked to.
    pub project_id: ProjectId,
    /// Provider auth token.
    pub token: String,
    /// Owning user.
    pub owner: String,
    /// When the provider stops delivering events for this channel.
    pub expiration: DateTime<Utc>,
}

impl CalendarWatchSubscription {
    /// Returns true when the subscription lapses before `horizon`.
    #[must_use]
    pub fn expires_before(&self, horizon: DateTime<Utc>) -> bool {
        self.expiration < horizon
    }
}

/// Notification delivered to a user (`notifications`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotification {
    /// Row identifier.
    pub id: u64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last touch time; governs retention.
    pub updated_at: DateTime<Utc>,
    /// Serialized set of actions the recipient can take.
    pub actions: String,
    /// Notification body.
    pub content: String,
    /// Identifier of the content the notification refers to.
    pub content_id: u64,
    /// Deep link into the application.
    pub link: String,
    /// Sender.
    pub originator: String,
    /// Recipient.
    pub target_user: String,
    /// Notification title.
    pub title: String,
    /// Notification type label.
    pub notification_type: String,
}

/// Publicly shared note or task with its own expiry (`public_project_items`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedProjectItem {
    /// Row identifier.
    pub id: u64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last touch time.
    pub updated_at: DateTime<Utc>,
    /// Absolute expiry of the share link; governs deletion.
    pub expiration_time: DateTime<Utc>,
    /// User who published the share.
    pub username: String,
    /// Shared note, when the item is a note.
    pub note_id: Option<u64>,
    /// Shared task, when the item is a task.
    pub task_id: Option<u64>,
}

impl SharedProjectItem {
    /// Returns true when the share link has lapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time < now
    }
}
