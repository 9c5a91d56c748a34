//! Application services and ports for the retention sweep.

#![forbid(unsafe_code)]

mod renewal_queue;
mod retention_cleaner;
mod retention_ports;

pub use renewal_queue::{RenewalPublisher, RenewalSubscription, renewal_queue};
pub use retention_cleaner::{RetentionCleaner, RetentionReport};
pub use retention_ports::{RetentionSession, RetentionStore};
