//! Journal retention sweep worker runtime.

#![forbid(unsafe_code)]

mod worker_config;

use std::env;
use std::sync::Arc;

use retention_application::{RenewalSubscription, RetentionCleaner, renewal_queue};
use retention_core::{AppError, AppResult};
use retention_infrastructure::{MIGRATOR, PostgresRetentionStore};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
    let config = WorkerConfig::load()?;
    let pool = connect_pool(&config).await?;

    if migrate_only {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|error| AppError::Schema(format!("failed to run migrations: {error}")))?;
        info!("retention tables migrated");
        return Ok(());
    }

    let (publisher, subscription) = renewal_queue(config.queue_capacity)?;
    let mut renewer = tokio::spawn(forward_renewal_requests(subscription));

    let cleaner = RetentionCleaner::new(Arc::new(PostgresRetentionStore::new(pool)), publisher)
        .with_renewal_horizon(config.renewal_horizon())
        .with_span(info_span!(
            "retention_cleaner",
            max_retention_days = config.max_retention_days
        ));

    info!(
        max_retention_days = config.max_retention_days,
        interval_seconds = config.interval_seconds,
        renewal_horizon_hours = config.renewal_horizon_hours,
        queue_capacity = config.queue_capacity,
        run_once = config.run_once,
        "retention-worker started"
    );

    let (outcome, renewer_result) = tokio::select! {
        outcome = run_schedule(&cleaner, &config) => (outcome, None),
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            (Ok(()), None)
        }
        finished = &mut renewer => (
            Err(AppError::Internal(
                "renewal forwarding stopped while the worker was running".to_owned(),
            )),
            Some(finished),
        ),
    };
    cleaner.close();

    let renewer_result = match renewer_result {
        Some(finished) => finished,
        None => renewer.await,
    };
    match renewer_result {
        Ok(forwarded) => info!(forwarded, "renewal forwarding stopped"),
        Err(error) => warn!(error = %error, "renewal forwarding task failed"),
    }

    if let Err(error) = &outcome {
        error!(kind = error.kind(), error = %error, "retention worker stopped");
    }
    outcome
}

async fn connect_pool(config: &WorkerConfig) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to connect to database: {error}")))
}

/// Runs retention passes on the configured interval.
///
/// Retriable failures wait for the next tick; any other failure stops the
/// worker with that error. A pass that overruns the interval delays the next
/// one instead of triggering a burst.
async fn run_schedule(cleaner: &RetentionCleaner, config: &WorkerConfig) -> AppResult<()> {
    let mut interval = tokio::time::interval(config.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match cleaner.clean(config.max_retention_days).await {
            Ok(report) => {
                if report.has_deletions() || !report.renewal_signals.is_empty() {
                    info!(
                        deleted = report.total_deleted(),
                        renewals = report.renewal_signals.len(),
                        "retention pass finished"
                    );
                } else {
                    debug!("retention pass finished, nothing to do");
                }
            }
            Err(error) if error.is_retriable() && !config.run_once => {
                warn!(
                    kind = error.kind(),
                    error = %error,
                    "retention pass failed, retrying on next tick"
                );
            }
            Err(error) => return Err(error),
        }

        if config.run_once {
            return Ok(());
        }
    }
}

/// Hands renewal signals to the calendar renewer until the queue closes.
async fn forward_renewal_requests(mut subscription: RenewalSubscription) -> u64 {
    let mut forwarded = 0_u64;
    while let Some(project_id) = subscription.next().await {
        forwarded = forwarded.saturating_add(1);
        info!(project_id = %project_id, "calendar watch renewal requested");
    }
    forwarded
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
