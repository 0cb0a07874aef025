// Storage backend selection
// Decision: Trait objects over enum dispatch, callers only ever hold Arc<dyn EventStore>
//
// The backend is picked once at startup from the environment; everything
// downstream is written against the EventStore contract.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use super::memory::InMemoryEventStore;
use super::postgres::PostgresEventStore;
use super::store::{EventStore, StoreError};

/// Configuration error raised while reading backend settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown storage backend: {0} (expected \"memory\" or \"sql\")")]
    UnknownBackend(String),

    #[error("{0} must be set for the sql storage backend")]
    Missing(&'static str),
}

/// Which EventStore implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Process-local map, lost on restart (dev mode)
    #[default]
    InMemory,
    /// PostgreSQL database (production)
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" | "inmemory" => Ok(Self::InMemory),
            "sql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Resolved storage settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres { database_url: String },
}

impl StorageConfig {
    /// Read `STORAGE_BACKEND` (default `memory`) and, for `sql`, `DATABASE_URL`
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("STORAGE_BACKEND") {
            Ok(value) if !value.trim().is_empty() => value.parse()?,
            _ => StorageBackend::default(),
        };

        match backend {
            StorageBackend::InMemory => Ok(Self::InMemory),
            StorageBackend::Postgres => {
                let database_url = std::env::var("DATABASE_URL")
                    .map_err(|_| ConfigError::Missing("DATABASE_URL"))?;
                Ok(Self::Postgres { database_url })
            }
        }
    }

    pub fn backend(&self) -> StorageBackend {
        match self {
            Self::InMemory => StorageBackend::InMemory,
            Self::Postgres { .. } => StorageBackend::Postgres,
        }
    }
}

/// Build and connect the configured store
pub async fn create_store(config: &StorageConfig) -> Result<Arc<dyn EventStore>, StoreError> {
    let store: Arc<dyn EventStore> = match config {
        StorageConfig::InMemory => {
            info!("Using in-memory event store (dev mode)");
            Arc::new(InMemoryEventStore::new())
        }
        StorageConfig::Postgres { database_url } => {
            info!("Using PostgreSQL event store");
            Arc::new(PostgresEventStore::from_url(database_url)?)
        }
    };

    store.connect().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(
            "memory".parse::<StorageBackend>().unwrap(),
            StorageBackend::InMemory
        );
        assert_eq!(
            "SQL".parse::<StorageBackend>().unwrap(),
            StorageBackend::Postgres
        );
        assert_eq!(
            " postgres ".parse::<StorageBackend>().unwrap(),
            StorageBackend::Postgres
        );
        assert!(matches!(
            "redis".parse::<StorageBackend>(),
            Err(ConfigError::UnknownBackend(name)) if name == "redis"
        ));
    }

    #[test]
    fn test_config_backend() {
        assert_eq!(StorageConfig::InMemory.backend(), StorageBackend::InMemory);
        let pg = StorageConfig::Postgres {
            database_url: "postgres://localhost/calendar".into(),
        };
        assert_eq!(pg.backend(), StorageBackend::Postgres);
    }

    #[tokio::test]
    async fn test_create_in_memory_store() {
        let store = create_store(&StorageConfig::InMemory).await.unwrap();
        assert!(store.get_all_events(1).await.unwrap().is_empty());
        store.close().await.unwrap();
        store.close().await.unwrap();
    }
}
