//! Producer and consumer contracts of the notification channel

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use calendar_core::NotificationMsg;

/// Transport failure of the notification channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// `connect` was never called on this handle
    #[error("channel is not connected")]
    NotConnected,

    /// The handle was closed
    #[error("channel is closed")]
    Closed,

    #[error("failed to encode notification: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode notification: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("queue database error: {0}")]
    Database(String),

    #[error("unknown {kind}: {value}")]
    Config { kind: &'static str, value: String },
}

/// When a received message counts as handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Removed from the queue on receipt; a crash before handling drops it
    #[default]
    Auto,
    /// Kept in flight until [`NotificationConsumer::ack`]; redelivered otherwise
    Manual,
}

impl FromStr for AckMode {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => Err(ChannelError::Config {
                kind: "ack mode",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// A received notification together with its acknowledgement handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Backend-specific tag passed back to `ack`
    pub tag: i64,
    pub msg: NotificationMsg,
    /// The message was handed out before and not acknowledged
    pub redelivered: bool,
}

/// Publishing side, used by the scheduler
#[async_trait]
pub trait NotificationProducer: Send + Sync + 'static {
    /// Declare the queue; must precede `publish`
    async fn connect(&self) -> Result<(), ChannelError>;

    async fn publish(&self, msg: &NotificationMsg) -> Result<(), ChannelError>;

    /// Release the connection; calling it twice is not an error
    async fn close(&self) -> Result<(), ChannelError>;
}

/// Receiving side, used by the sender
#[async_trait]
pub trait NotificationConsumer: Send + Sync + 'static {
    /// Declare the queue and start consuming; must precede `recv`
    async fn connect(&self) -> Result<(), ChannelError>;

    /// Wait for the next decodable message
    ///
    /// Returns `Ok(None)` once the consumer is closed. Payloads that fail to
    /// decode are logged and skipped.
    async fn recv(&self) -> Result<Option<Delivery>, ChannelError>;

    /// Confirm a delivery; a no-op in [`AckMode::Auto`]
    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError>;

    /// Stop consuming and wake any pending `recv`; calling it twice is not an error
    async fn close(&self) -> Result<(), ChannelError>;

    fn ack_mode(&self) -> AckMode;
}

/// Connection state of a single producer or consumer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Link {
    #[default]
    Disconnected,
    Connected,
    Closed,
}

impl Link {
    pub(crate) fn ensure_open(self) -> Result<(), ChannelError> {
        match self {
            Self::Disconnected => Err(ChannelError::NotConnected),
            Self::Connected => Ok(()),
            Self::Closed => Err(ChannelError::Closed),
        }
    }
}
