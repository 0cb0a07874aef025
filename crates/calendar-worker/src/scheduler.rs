//! Reminder scheduler
//!
//! Every period the scheduler scans the store for reminders that are due,
//! publishes one [`NotificationMsg`] per event and then purges events that
//! ended before the retention cutoff.
//!
//! ```text
//!        tick                 all published          purge done
//! Idle ───────▶ Scanning ───▶ Publishing ──────────▶ Purging ───────▶ Idle
//!   │
//!   └── shutdown ──▶ Stopped
//! ```
//!
//! The scheduler never marks events as notified. An event whose message was
//! published but not yet handled by the sender is found again on the next
//! tick, so delivery is at-least-once.

use std::sync::Arc;
use std::time::Duration;

use calendar_core::NotificationMsg;
use calendar_queue::{ChannelError, NotificationProducer};
use calendar_storage::{EventStore, StoreError};
use chrono::{DateTime, Months, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::shutdown::{close_with_grace, is_set, ShutdownError};

/// How long finished events are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retention {
    /// One calendar year before the tick instant
    #[default]
    OneYear,
    Days(u32),
}

impl Retention {
    /// Events whose `off_time` lies before the returned instant are purged
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::OneYear => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            Self::Days(days) => chrono::Duration::try_days(i64::from(*days))
                .and_then(|age| now.checked_sub_signed(age))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time between ticks
    pub period: Duration,
    pub retention: Retention,
    /// Upper bound for each close step on shutdown
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            retention: Retention::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scanning,
    Publishing,
    Purging,
    Stopped,
}

/// Outcome of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Events whose reminder was due
    pub due: usize,
    pub published: usize,
    /// Purged event count, `None` if the purge failed
    pub purged: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to scan due reminders: {0}")]
    Scan(#[source] StoreError),

    #[error("failed to publish reminder for event {event_id}: {source}")]
    Publish {
        event_id: i64,
        #[source]
        source: ChannelError,
    },

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

/// Periodic producer of reminder messages
pub struct Scheduler {
    store: Arc<dyn EventStore>,
    producer: Arc<dyn NotificationProducer>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// Create a scheduler over a connected store and producer
    pub fn new(
        store: Arc<dyn EventStore>,
        producer: Arc<dyn NotificationProducer>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            producer,
            config,
            state: Mutex::new(SchedulerState::Idle),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock() = state;
    }

    /// Run one scan, publish and purge cycle as of `now`
    ///
    /// The first publish failure aborts the tick; the unpublished events are
    /// still unnotified and are picked up again by the next tick. A purge
    /// failure is logged and reported as `purged: None`.
    #[instrument(skip(self))]
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let result = self.run_tick(now).await;
        self.set_state(SchedulerState::Idle);
        result
    }

    async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let mut report = TickReport::default();

        self.set_state(SchedulerState::Scanning);
        let due = self
            .store
            .get_events_day_of_notice(now)
            .await
            .map_err(SchedulerError::Scan)?;
        report.due = due.len();

        self.set_state(SchedulerState::Publishing);
        for event in &due {
            let msg = NotificationMsg::from(event);
            self.producer
                .publish(&msg)
                .await
                .map_err(|source| SchedulerError::Publish {
                    event_id: event.id,
                    source,
                })?;
            report.published += 1;
            debug!(event_id = event.id, user_id = event.user_id, "published reminder");
        }

        self.set_state(SchedulerState::Purging);
        let cutoff = self.config.retention.cutoff(now);
        report.purged = match self.store.delete_events_older_date(cutoff).await {
            Ok(purged) => Some(purged),
            Err(e) => {
                warn!(error = %e, cutoff = %cutoff, "retention purge failed");
                None
            }
        };

        Ok(report)
    }

    /// Tick every period until `shutdown` flips, then close the producer and the store
    ///
    /// Tick errors are logged and the loop keeps going.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), SchedulerError> {
        info!(
            period_secs = self.config.period.as_secs(),
            retention = ?self.config.retention,
            "Scheduler started"
        );

        let mut interval = tokio::time::interval(self.config.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first scan happens one period in
        interval.tick().await;

        while !is_set(&shutdown) {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(report) if report.due > 0 || report.purged.unwrap_or(0) > 0 => {
                            info!(
                                published = report.published,
                                purged = ?report.purged,
                                "Scheduler tick finished"
                            );
                        }
                        Ok(_) => debug!("Scheduler tick found nothing to do"),
                        Err(e) => error!(error = %e, "Scheduler tick failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("shutdown sender dropped");
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopping");
        self.shutdown().await
    }

    /// Close the producer, then the store, each bounded by the grace period
    ///
    /// Both steps always run; the first failure is returned.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        let grace = self.config.shutdown_grace;
        let producer = close_with_grace("producer", grace, self.producer.close()).await;
        let store = close_with_grace("store", grace, self.store.close()).await;
        self.set_state(SchedulerState::Stopped);

        producer.and(store)?;
        info!("Scheduler stopped");
        Ok(())
    }
}
