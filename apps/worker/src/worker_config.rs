use std::env;
use std::time::Duration;

use chrono::TimeDelta;
use retention_core::{AppError, AppResult};

/// Runtime configuration for the retention worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_retention_days: i64,
    pub interval_seconds: u64,
    pub renewal_horizon_hours: i64,
    pub queue_capacity: usize,
    pub max_connections: u32,
    pub run_once: bool,
}

impl WorkerConfig {
    /// Loads configuration from process environment variables.
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns a variable's value
    /// when set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;
        let max_retention_days = parse_var(&lookup, "RETENTION_MAX_DAYS", 30_i64)?;
        let interval_seconds = parse_var(&lookup, "RETENTION_INTERVAL_SECONDS", 86_400_u64)?;
        let renewal_horizon_hours = parse_var(&lookup, "RETENTION_RENEWAL_HORIZON_HOURS", 24_i64)?;
        let queue_capacity = parse_var(&lookup, "RETENTION_QUEUE_CAPACITY", 64_usize)?;
        let max_connections = parse_var(&lookup, "RETENTION_DB_MAX_CONNECTIONS", 2_u32)?;
        let run_once = lookup("RETENTION_RUN_ONCE")
            .map(|value| value.trim().eq_ignore_ascii_case("true") || value.trim() == "1")
            .unwrap_or(false);

        if max_retention_days < 0 {
            return Err(AppError::Validation(
                "RETENTION_MAX_DAYS must not be negative".to_owned(),
            ));
        }

        if interval_seconds == 0 {
            return Err(AppError::Validation(
                "RETENTION_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if renewal_horizon_hours <= 0 || TimeDelta::try_hours(renewal_horizon_hours).is_none() {
            return Err(AppError::Validation(format!(
                "RETENTION_RENEWAL_HORIZON_HOURS must be a positive hour count, got {renewal_horizon_hours}"
            )));
        }

        if queue_capacity == 0 {
            return Err(AppError::Validation(
                "RETENTION_QUEUE_CAPACITY must be greater than zero".to_owned(),
            ));
        }

        if max_connections == 0 {
            return Err(AppError::Validation(
                "RETENTION_DB_MAX_CONNECTIONS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            max_retention_days,
            interval_seconds,
            renewal_horizon_hours,
            queue_capacity,
            max_connections,
            run_once,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn renewal_horizon(&self) -> TimeDelta {
        TimeDelta::try_hours(self.renewal_horizon_hours).unwrap_or(TimeDelta::days(1))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
