//! PostgreSQL-backed retention store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::debug;

use retention_application::{RetentionSession, RetentionStore};
use retention_core::{AppError, AppResult};
use retention_domain::{CalendarWatchSubscription, ProjectId, RetainedTable};


/// PostgreSQL implementation of the retention store port.
#[derive(Clone)]
pub struct PostgresRetentionStore {
    pool: PgPool,
}

impl PostgresRetentionStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RetentionStore for PostgresRetentionStore {
    async fn open_session(&self) -> AppResult<Box<dyn RetentionSession>> {
        let connection = self
            .pool
            .acquire()
            .await
            .map_err(|error| map_sqlx_error("failed to acquire retention connection", error))?;

        debug!(pool_size = self.pool.size(), "acquired retention connection");
        Ok(Box::new(PostgresRetentionSession { connection }))
    }
}

/// Session pinned to one pooled connection; returned to the pool on drop.
struct PostgresRetentionSession {
    connection: PoolConnection<Postgres>,
}

#[derive(Debug, FromRow)]
struct CalendarWatchRow {
    id: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    channel: String,
    channel_id: i64,
    project_id: i64,
    token: String,
    owner: String,
    expiration: DateTime<Utc>,
}

#[async_trait]
impl RetentionSession for PostgresRetentionSession {
    async fn delete_updated_before(
        &mut self,
        table: RetainedTable,
        cutoff: DateTime<Utc>,
    ) -> AppResult<u64> {
        if !table.is_retention_pruned() {
            return Err(AppError::Validation(format!(
                "table '{table}' is not pruned by updated_at"
            )));
        }

        // Table names come from a closed enum, never from callers.
        let statement = format!(
            "DELETE FROM {} WHERE {} < $1",
            table.as_str(),
            table.timestamp_column()
        );
        let result = sqlx::query(statement.as_str())
            .bind(cutoff)
            .execute(&mut *self.connection)
            .await
            .map_err(|error| {
                map_sqlx_error(&format!("failed to delete stale rows from {table}"), error)
            })?;

        debug!(table = %table, rows = result.rows_affected(), "executed updated_at delete");
        Ok(result.rows_affected())
    }

    async fn delete_shared_items_expired_before(
        &mut self,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let table = RetainedTable::PublicProjectItems;
        let statement = format!(
            "DELETE FROM {} WHERE {} < $1",
            table.as_str(),
            table.timestamp_column()
        );
        let result = sqlx::query(statement.as_str())
            .bind(now)
            .execute(&mut *self.connection)
            .await
            .map_err(|error| {
                map_sqlx_error("failed to delete expired public project items", error)
            })?;

        debug!(table = %table, rows = result.rows_affected(), "executed expiration_time delete");
        Ok(result.rows_affected())
    }

    async fn find_subscriptions_expiring_before(
        &mut self,
        horizon: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarWatchSubscription>> {
        let rows = sqlx::query_as::<_, CalendarWatchRow>(
            r#"
            SELECT
                id,
                created_at,
                updated_at,
                channel,
                channel_id,
                project_id,
                token,
                owner,
                expiration
            FROM google_calendar_projects
            WHERE expiration < $1
            "#,
        )
        .bind(horizon)
        .fetch_all(&mut *self.connection)
        .await
        .map_err(|error| map_sqlx_error("failed to list expiring calendar watches", error))?;

        rows.into_iter()
            .map(CalendarWatchRow::into_subscription)
            .collect()
    }

    async fn count_rows(&mut self, table: RetainedTable) -> AppResult<u64> {
        let statement = format!("SELECT COUNT(*) FROM {}", table.as_str());
        let count = sqlx::query_scalar::<_, i64>(statement.as_str())
            .fetch_one(&mut *self.connection)
            .await
            .map_err(|error| map_sqlx_error(&format!("failed to count rows in {table}"), error))?;

        u64::try_from(count)
            .map_err(|_| AppError::Internal(format!("negative row count {count} for {table}")))
    }
}

impl CalendarWatchRow {
    fn into_subscription(self) -> AppResult<CalendarWatchSubscription> {
        Ok(CalendarWatchSubscription {
            id: unsigned_column("id", self.id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            channel: self.channel,
            channel_id: unsigned_column("channel_id", self.channel_id)?,
            project_id: ProjectId::new(unsigned_column("project_id", self.project_id)?),
            token: self.token,
            owner: self.owner,
            expiration: self.expiration,
        })
    }
}

fn unsigned_column(column: &str, value: i64) -> AppResult<u64> {
    u64::try_from(value).map_err(|_| {
        AppError::Schema(format!(
            "google_calendar_projects.{column} holds negative value {value}"
        ))
    })
}

/// Classifies a driver error as retriable, schema, or internal.
fn map_sqlx_error(context: &str, error: sqlx::Error) -> AppError {
    let message = format!("{context}: {error}");
    match &error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => AppError::Unavailable(message),
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. } => AppError::Schema(message),
        sqlx::Error::Database(database_error) => match database_error.code().as_deref() {
            // undefined_table, undefined_column
            Some("42P01" | "42703") => AppError::Schema(message),
            // admin shutdown, cannot connect now, too many connections,
            // serialization failure, deadlock
            Some("57P01" | "57P03" | "53300" | "40001" | "40P01") => {
                AppError::Unavailable(message)
            }
            Some(code) if code.starts_with("08") => AppError::Unavailable(message),
            _ => AppError::Internal(message),
        },
        _ => AppError::Internal(message),
    }
}
