//! Background processes of the calendar service
//!
//! - [`Scheduler`]: publishes due reminders and purges expired events
//! - [`Sender`]: consumes reminders and marks events notified
//!
//! The two only share the event store and the notification channel; they
//! can run as separate processes or side by side in one.

pub mod config;
pub mod scheduler;
pub mod sender;
pub mod shutdown;

pub use config::WorkerConfig;
pub use scheduler::{
    Retention, Scheduler, SchedulerConfig, SchedulerError, SchedulerState, TickReport,
};
pub use sender::{Handled, Sender, SenderError};
pub use shutdown::{close_with_grace, shutdown_signal, wait_for_shutdown, ShutdownError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
