//! Infrastructure adapters for the retention store port.

#![forbid(unsafe_code)]

mod in_memory_retention_store;
mod postgres_retention_store;

pub use in_memory_retention_store::InMemoryRetentionStore;
pub use postgres_retention_store::PostgresRetentionStore;

/// Migrations creating the retained tables and their timestamp indexes.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
