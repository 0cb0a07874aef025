// Graceful shutdown helpers shared by the scheduler and the sender
// Decision: Every close step gets its own deadline; a slow step never blocks the next one

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Failure of one step of an ordered shutdown
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShutdownError {
    #[error("closing {step} timed out after {grace:?}")]
    Timeout { step: &'static str, grace: Duration },

    #[error("closing {step} failed: {message}")]
    Close { step: &'static str, message: String },
}

/// Run one close step, bounded by `grace`
///
/// Failures are logged here; the caller decides whether to keep going.
pub async fn close_with_grace<F, E>(
    step: &'static str,
    grace: Duration,
    close: F,
) -> Result<(), ShutdownError>
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(grace, close).await {
        Ok(Ok(())) => {
            debug!(step, "closed");
            Ok(())
        }
        Ok(Err(e)) => {
            warn!(step, error = %e, "close failed");
            Err(ShutdownError::Close {
                step,
                message: e.to_string(),
            })
        }
        Err(_) => {
            warn!(step, grace_ms = grace.as_millis() as u64, "close timed out");
            Err(ShutdownError::Timeout { step, grace })
        }
    }
}

/// Flip a watch flag on ctrl-c or SIGTERM
///
/// The returned receiver starts at `false` and becomes `true` once a signal
/// arrives. The sender half is kept alive by the listener task.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal");
        tx.send_replace(true);
        // Hold the sender so receivers do not observe a closed channel
        tx.closed().await;
    });
    rx
}

/// Resolve once `flag` is set or its sender is gone
///
/// Adapts a [`shutdown_signal`] receiver to APIs that take a shutdown future.
pub async fn wait_for_shutdown(mut flag: watch::Receiver<bool>) {
    let _ = flag.wait_for(|stop| *stop).await;
}

pub(crate) fn is_set(flag: &watch::Receiver<bool>) -> bool {
    *flag.borrow()
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable, listening for ctrl-c only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_close_ok() {
        let result =
            close_with_grace("store", Duration::from_secs(1), async { Ok::<_, String>(()) }).await;
        assert_eq!(result, Ok(()));
    }

    #[tokio::test]
    async fn test_close_error_is_reported() {
        let result = close_with_grace("producer", Duration::from_secs(1), async {
            Err::<(), _>("broken pipe")
        })
        .await;
        assert_eq!(
            result,
            Err(ShutdownError::Close {
                step: "producer",
                message: "broken pipe".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves_on_flag() {
        let (tx, rx) = watch::channel(false);
        let waiting = tokio::spawn(wait_for_shutdown(rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_times_out() {
        let grace = Duration::from_millis(50);
        let result = close_with_grace("consumer", grace, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, String>(())
        })
        .await;
        assert_eq!(
            result,
            Err(ShutdownError::Timeout {
                step: "consumer",
                grace
            })
        );
    }
}
