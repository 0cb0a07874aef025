// Scheduler and sender in one process
// Decision: Both loops share one store and one queue, so the in-memory backends work end to end

use anyhow::{Context, Result};
use calendar_queue::{NotificationConsumer, NotificationProducer, Queue};
use calendar_storage::create_store;
use calendar_worker::{init_tracing, shutdown_signal, Scheduler, Sender, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("calendar_worker=debug,calendar_storage=info,calendar_queue=info");
    tracing::info!("calendar-worker starting...");

    let config = WorkerConfig::from_env()?;
    tracing::info!(
        storage = ?config.storage.backend(),
        queue = ?config.queue.backend,
        queue_name = %config.queue.name,
        "Configuration loaded"
    );

    let store = create_store(&config.storage)
        .await
        .context("Failed to connect to event store")?;

    let queue = Queue::from_config(&config.queue).context("Failed to configure queue")?;
    let producer = queue.producer().context("Failed to create producer")?;
    let consumer = queue.consumer().context("Failed to create consumer")?;
    producer
        .connect()
        .await
        .context("Failed to declare notification queue")?;
    consumer
        .connect()
        .await
        .context("Failed to declare notification queue")?;

    let scheduler = Scheduler::new(store.clone(), producer, config.scheduler.clone());
    let sender = Sender::new(store, consumer, config.scheduler.shutdown_grace);

    let shutdown = shutdown_signal();
    let (scheduled, sent) = tokio::join!(scheduler.run(shutdown.clone()), sender.run(shutdown));

    // Both loops close the shared store; the second close is a no-op
    scheduled.context("Scheduler shutdown failed")?;
    sent.context("Sender stopped with an error")?;

    tracing::info!("calendar-worker stopped");
    Ok(())
}
