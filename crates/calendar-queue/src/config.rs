// Queue backend selection from the environment

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::channel::{AckMode, ChannelError, NotificationConsumer, NotificationProducer};
use crate::memory::InMemoryQueue;
use crate::poller::PollerConfig;
use crate::postgres::PostgresQueue;

/// Default queue name
pub const DEFAULT_QUEUE_NAME: &str = "notification";

/// Which channel implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// In-process queue; producer and consumer must share one process
    InMemory,
    Postgres,
}

impl FromStr for QueueBackend {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "inmemory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "sql" => Ok(Self::Postgres),
            other => Err(ChannelError::Config {
                kind: "queue backend",
                value: other.to_string(),
            }),
        }
    }
}

/// Channel settings
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    pub name: String,
    pub ack_mode: AckMode,
    /// Required for [`QueueBackend::Postgres`]
    pub database_url: Option<String>,
    pub poller: PollerConfig,
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::InMemory,
            name: DEFAULT_QUEUE_NAME.to_string(),
            ack_mode: AckMode::Auto,
            database_url: None,
            poller: PollerConfig::default(),
            visibility_timeout: Duration::from_secs(60),
        }
    }
}

impl QueueConfig {
    /// Read `QUEUE_BACKEND`, `QUEUE_NAME`, `QUEUE_ACK_MODE`,
    /// `QUEUE_VISIBILITY_TIMEOUT_SECS` and `DATABASE_URL`
    ///
    /// The backend defaults to `postgres` when `DATABASE_URL` is set and to
    /// `memory` otherwise.
    pub fn from_env() -> Result<Self, ChannelError> {
        let database_url = std::env::var("DATABASE_URL").ok();

        let backend = match std::env::var("QUEUE_BACKEND") {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ if database_url.is_some() => QueueBackend::Postgres,
            _ => QueueBackend::InMemory,
        };

        let name = std::env::var("QUEUE_NAME")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());

        let ack_mode = match std::env::var("QUEUE_ACK_MODE") {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => AckMode::default(),
        };

        let visibility_timeout = std::env::var("QUEUE_VISIBILITY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Ok(Self {
            backend,
            name,
            ack_mode,
            database_url,
            poller: PollerConfig::default(),
            visibility_timeout,
        })
    }
}

/// A configured queue that hands out producer and consumer handles
///
/// Handles of an in-memory queue share one FIFO, so a scheduler and a
/// sender running in the same process see each other's messages.
#[derive(Debug, Clone)]
pub enum Queue {
    InMemory(InMemoryQueue),
    Postgres(PostgresQueue),
}

impl Queue {
    pub fn from_config(config: &QueueConfig) -> Result<Self, ChannelError> {
        match config.backend {
            QueueBackend::InMemory => {
                info!(queue = %config.name, ack_mode = %config.ack_mode, "Using in-memory notification queue");
                Ok(Self::InMemory(InMemoryQueue::new(
                    config.name.clone(),
                    config.ack_mode,
                )))
            }
            QueueBackend::Postgres => {
                let database_url = config.database_url.clone().ok_or(ChannelError::Config {
                    kind: "setting",
                    value: "DATABASE_URL is required for the postgres queue".to_string(),
                })?;
                info!(queue = %config.name, ack_mode = %config.ack_mode, "Using PostgreSQL notification queue");
                Ok(Self::Postgres(
                    PostgresQueue::new(database_url, config.name.clone())
                        .with_ack_mode(config.ack_mode)
                        .with_poller(config.poller.clone())
                        .with_visibility_timeout(config.visibility_timeout),
                ))
            }
        }
    }

    pub fn producer(&self) -> Result<Arc<dyn NotificationProducer>, ChannelError> {
        Ok(match self {
            Self::InMemory(queue) => Arc::new(queue.producer()),
            Self::Postgres(queue) => Arc::new(queue.producer()?),
        })
    }

    pub fn consumer(&self) -> Result<Arc<dyn NotificationConsumer>, ChannelError> {
        Ok(match self {
            Self::InMemory(queue) => Arc::new(queue.consumer()),
            Self::Postgres(queue) => Arc::new(queue.consumer()?),
        })
    }
}
