// Reminder sender process

use anyhow::{Context, Result};
use calendar_queue::{NotificationConsumer, Queue};
use calendar_storage::create_store;
use calendar_worker::{init_tracing, shutdown_signal, Sender, WorkerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("calendar_worker=debug,calendar_storage=info,calendar_queue=info");
    tracing::info!("calendar-sender starting...");

    let config = WorkerConfig::from_env()?;
    tracing::info!(
        storage = ?config.storage.backend(),
        queue = ?config.queue.backend,
        queue_name = %config.queue.name,
        ack_mode = %config.queue.ack_mode,
        "Configuration loaded"
    );

    let store = create_store(&config.storage)
        .await
        .context("Failed to connect to event store")?;

    let queue = Queue::from_config(&config.queue).context("Failed to configure queue")?;
    let consumer = queue.consumer().context("Failed to create consumer")?;
    consumer
        .connect()
        .await
        .context("Failed to declare notification queue")?;

    let sender = Sender::new(store, consumer, config.scheduler.shutdown_grace);
    sender
        .run(shutdown_signal())
        .await
        .context("Sender stopped with an error")?;

    tracing::info!("calendar-sender stopped");
    Ok(())
}
