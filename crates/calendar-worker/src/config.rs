// Worker configuration loaded from environment variables

use std::time::Duration;

use anyhow::{Context, Result};
use calendar_queue::QueueConfig;
use calendar_storage::StorageConfig;

use crate::scheduler::{Retention, SchedulerConfig};

/// Settings shared by the scheduler and sender binaries
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
}

impl WorkerConfig {
    /// Load configuration, reading a `.env` file first if present
    ///
    /// - `STORAGE_BACKEND`, `DATABASE_URL`: event store
    /// - `QUEUE_BACKEND`, `QUEUE_NAME`, `QUEUE_ACK_MODE`: notification channel
    /// - `SCHEDULER_PERIOD_SECS` (default 60)
    /// - `RETENTION_DAYS` (default one calendar year)
    /// - `SHUTDOWN_GRACE_SECS` (default 5)
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let storage = StorageConfig::from_env().context("Invalid storage configuration")?;
        let queue = QueueConfig::from_env().context("Invalid queue configuration")?;

        let mut scheduler = SchedulerConfig::default();
        if let Some(secs) = parse_env::<u64>("SCHEDULER_PERIOD_SECS")? {
            anyhow::ensure!(secs > 0, "SCHEDULER_PERIOD_SECS must be positive");
            scheduler.period = Duration::from_secs(secs);
        }
        if let Some(days) = parse_env::<u32>("RETENTION_DAYS")? {
            scheduler.retention = Retention::Days(days);
        }
        if let Some(secs) = parse_env::<u64>("SHUTDOWN_GRACE_SECS")? {
            scheduler.shutdown_grace = Duration::from_secs(secs);
        }

        Ok(Self {
            storage,
            queue,
            scheduler,
        })
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} has an invalid value: {value}")),
        _ => Ok(None),
    }
}
