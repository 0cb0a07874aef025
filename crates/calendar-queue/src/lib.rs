//! Notification channel between the scheduler and the sender
//!
//! The scheduler publishes [`calendar_core::NotificationMsg`] records through a
//! [`NotificationProducer`]; the sender receives them as [`Delivery`] values
//! from a [`NotificationConsumer`]. Messages travel as JSON
//! (`application/json`).
//!
//! Backends:
//! - [`InMemoryQueue`]: one process, used in tests and the combined worker
//! - [`PostgresQueue`]: `notification_queue` table shared across processes

pub mod channel;
pub mod codec;
pub mod config;
pub mod memory;
pub mod poller;
pub mod postgres;

pub use channel::{AckMode, ChannelError, Delivery, NotificationConsumer, NotificationProducer};
pub use config::{Queue, QueueBackend, QueueConfig, DEFAULT_QUEUE_NAME};
pub use memory::{InMemoryConsumer, InMemoryProducer, InMemoryQueue};
pub use poller::{Backoff, PollerConfig};
pub use postgres::{PostgresConsumer, PostgresProducer, PostgresQueue};
