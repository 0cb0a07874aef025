// Reminder scheduler process
// Decision: The scheduler owns the producer side only; marking events notified is the sender's job

use anyhow::{Context, Result};
use calendar_queue::{NotificationProducer, Queue};
use calendar_storage::create_store;
use calendar_worker::{init_tracing, shutdown_signal, Scheduler, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("calendar_worker=debug,calendar_storage=info,calendar_queue=info");
    tracing::info!("calendar-scheduler starting...");

    let config = WorkerConfig::from_env()?;
    tracing::info!(
        storage = ?config.storage.backend(),
        queue = ?config.queue.backend,
        queue_name = %config.queue.name,
        period_secs = config.scheduler.period.as_secs(),
        "Configuration loaded"
    );

    let store = create_store(&config.storage)
        .await
        .context("Failed to connect to event store")?;

    let queue = Queue::from_config(&config.queue).context("Failed to configure queue")?;
    let producer = queue.producer().context("Failed to create producer")?;
    producer
        .connect()
        .await
        .context("Failed to declare notification queue")?;

    let scheduler = Scheduler::new(store, producer, config.scheduler);
    scheduler
        .run(shutdown_signal())
        .await
        .context("Scheduler shutdown failed")?;

    tracing::info!("calendar-scheduler stopped");
    Ok(())
}
