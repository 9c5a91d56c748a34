//! Domain entities and invariants for the retention sweep.

#![forbid(unsafe_code)]

mod policy;
mod records;
mod table;

pub use policy::{DEFAULT_RENEWAL_HORIZON_HOURS, RetentionCutoffs, RetentionPolicy};
pub use records::{
    AuditEntry, CalendarWatchSubscription, ProjectId, SharedProjectItem, UserNotification,
};
pub use table::RetainedTable;
