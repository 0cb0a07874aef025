//! Queue polling with exponential backoff
//!
//! The PostgreSQL consumer has no push notifications, so an idle consumer
//! polls with a growing interval and snaps back to the minimum as soon as a
//! message is claimed.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

/// Polling configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Poll interval right after a message was found
    pub min_interval: Duration,

    /// Upper bound for the idle poll interval
    pub max_interval: Duration,

    /// Growth factor applied after each empty poll
    pub backoff_multiplier: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            backoff_multiplier: 1.5,
        }
    }
}

impl PollerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Set backoff multiplier (clamped to at least 1.0)
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }
}

/// Adaptive wait between polls
#[derive(Debug)]
pub struct Backoff {
    config: PollerConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: PollerConfig) -> Self {
        let current = config.min_interval;
        Self { config, current }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// A message was found: poll again quickly
    pub fn reset(&mut self) {
        self.current = self.config.min_interval;
    }

    /// Nothing found: wait longer next time
    pub fn increase(&mut self) {
        let next =
            Duration::from_secs_f64(self.current.as_secs_f64() * self.config.backoff_multiplier);
        self.current = next.min(self.config.max_interval);
        trace!(
            interval_ms = self.current.as_millis() as u64,
            "empty poll, backing off"
        );
    }

    /// Sleep for the current interval
    ///
    /// Returns `true` if `closed` flipped while waiting.
    pub async fn wait(&self, closed: &mut watch::Receiver<bool>) -> bool {
        let already_closed = *closed.borrow();
        if already_closed {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.current) => false,
            _ = closed.changed() => {
                debug!("close signalled during poll wait");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_to_max_and_resets() {
        let config = PollerConfig::new()
            .with_min_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(300))
            .with_backoff_multiplier(2.0);
        let mut backoff = Backoff::new(config);

        assert_eq!(backoff.current(), Duration::from_millis(100));
        backoff.increase();
        assert_eq!(backoff.current(), Duration::from_millis(200));
        backoff.increase();
        assert_eq!(backoff.current(), Duration::from_millis(300));
        backoff.increase();
        assert_eq!(backoff.current(), Duration::from_millis(300));

        backoff.reset();
        assert_eq!(backoff.current(), Duration::from_millis(100));
    }

    #[test]
    fn test_multiplier_clamped() {
        let config = PollerConfig::new().with_backoff_multiplier(0.5);
        assert_eq!(config.backoff_multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_wait_returns_early_on_close() {
        let backoff = Backoff::new(PollerConfig::new().with_min_interval(Duration::from_secs(30)));
        let (tx, mut rx) = watch::channel(false);

        let waiter = tokio::spawn(async move { backoff.wait(&mut rx).await });
        tx.send(true).unwrap();

        let closed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(closed);
    }

    #[tokio::test]
    async fn test_wait_sleeps_when_open() {
        let backoff = Backoff::new(PollerConfig::new().with_min_interval(Duration::from_millis(5)));
        let (_tx, mut rx) = watch::channel(false);
        assert!(!backoff.wait(&mut rx).await);
    }
}
