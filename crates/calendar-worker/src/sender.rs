//! Reminder sender
//!
//! Consumes reminder messages and records their delivery by marking the
//! event notified. Delivering to an end user is out of scope; a log line
//! stands in for it.

use std::sync::Arc;
use std::time::Duration;

use calendar_queue::{AckMode, ChannelError, Delivery, NotificationConsumer};
use calendar_storage::{EventStore, StoreError};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::shutdown::{close_with_grace, is_set, ShutdownError};

/// Pause after a transient receive error
const RECV_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("failed to mark event {event_id} notified: {source}")]
    Store {
        event_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("failed to acknowledge delivery {tag}: {source}")]
    Ack {
        tag: i64,
        #[source]
        source: ChannelError,
    },

    #[error("failed to receive: {0}")]
    Receive(#[source] ChannelError),

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// What happened to a handled delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// The event is now marked notified
    Marked,
    /// The event no longer exists; the message was dropped
    Missing,
}

/// Consumer loop marking events notified
pub struct Sender {
    store: Arc<dyn EventStore>,
    consumer: Arc<dyn NotificationConsumer>,
    shutdown_grace: Duration,
}

impl Sender {
    /// Create a sender over a connected store and consumer
    pub fn new(
        store: Arc<dyn EventStore>,
        consumer: Arc<dyn NotificationConsumer>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            store,
            consumer,
            shutdown_grace,
        }
    }

    /// Mark the delivery's event notified, then acknowledge it
    ///
    /// An event that was deleted in the meantime is acknowledged so the
    /// message is not redelivered forever. Any other store error leaves the
    /// delivery unacknowledged.
    #[instrument(skip(self, delivery), fields(event_id = delivery.msg.id, tag = delivery.tag))]
    pub async fn handle(&self, delivery: &Delivery) -> Result<Handled, SenderError> {
        let msg = &delivery.msg;

        let handled = match self.store.update_event_notified(msg.id).await {
            Ok(()) => {
                info!(
                    user_id = msg.user_id,
                    title = %msg.title,
                    date = %msg.date,
                    redelivered = delivery.redelivered,
                    "Reminder sent"
                );
                Handled::Marked
            }
            Err(StoreError::NotFound(_)) => {
                warn!("Event no longer exists, dropping reminder");
                Handled::Missing
            }
            Err(source) => {
                return Err(SenderError::Store {
                    event_id: msg.id,
                    source,
                });
            }
        };

        if self.consumer.ack_mode() == AckMode::Manual {
            self.consumer
                .ack(delivery)
                .await
                .map_err(|source| SenderError::Ack {
                    tag: delivery.tag,
                    source,
                })?;
        }

        Ok(handled)
    }

    /// Receive and handle messages until `shutdown` flips or the consumer closes
    ///
    /// Handling errors are logged and the loop keeps going. On shutdown the
    /// consumer is closed first so a message already claimed by `recv` is
    /// still handled before the store goes away.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SenderError> {
        info!(ack_mode = %self.consumer.ack_mode(), "Sender started");
        let mut fatal = None;

        loop {
            if is_set(&shutdown) {
                info!("Shutdown requested");
                break;
            }

            let mut recv = self.consumer.recv();
            let received = tokio::select! {
                received = &mut recv => received,
                _ = shutdown.changed() => {
                    info!("Shutdown requested, closing consumer");
                    if let Err(e) = close_with_grace("consumer", self.shutdown_grace, self.consumer.close()).await {
                        warn!(error = %e, "consumer did not close cleanly");
                    }
                    recv.await
                }
            };

            match received {
                Ok(Some(delivery)) => {
                    if let Err(e) = self.handle(&delivery).await {
                        error!(error = %e, "Failed to handle reminder");
                    }
                }
                Ok(None) => {
                    debug!("consumer closed");
                    break;
                }
                Err(e @ (ChannelError::NotConnected | ChannelError::Closed)) => {
                    error!(error = %e, "Consumer unusable, stopping sender");
                    fatal = Some(SenderError::Receive(e));
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to receive reminder");
                    let interrupted = tokio::select! {
                        _ = tokio::time::sleep(RECV_RETRY_DELAY) => false,
                        _ = shutdown.changed() => true,
                    };
                    if interrupted {
                        info!("Shutdown requested during receive retry");
                        break;
                    }
                }
            }
        }

        info!("Sender stopping");
        let closed = self.shutdown().await;
        match fatal {
            Some(e) => Err(e),
            None => closed,
        }
    }

    /// Close the consumer, then the store, each bounded by the grace period
    pub async fn shutdown(&self) -> Result<(), SenderError> {
        let consumer =
            close_with_grace("consumer", self.shutdown_grace, self.consumer.close()).await;
        let store = close_with_grace("store", self.shutdown_grace, self.store.close()).await;

        consumer.and(store)?;
        info!("Sender stopped");
        Ok(())
    }
}
