//! Event persistence for the calendar service
//!
//! - [`EventStore`]: the storage contract shared by the API, scheduler and sender
//! - [`InMemoryEventStore`]: process-local backend for development and tests
//! - [`PostgresEventStore`]: PostgreSQL backend with embedded migrations
//! - [`create_store`]: picks a backend from [`StorageConfig`]

pub mod backend;
mod memory;
mod postgres;
mod store;

pub use backend::{create_store, ConfigError, StorageBackend, StorageConfig};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, StoreError};
