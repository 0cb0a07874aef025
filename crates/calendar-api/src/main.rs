// Calendar API server
// Decision: The listener stops accepting on SIGINT/SIGTERM, drains in-flight requests,
// then closes the store within SHUTDOWN_GRACE_SECS

use anyhow::{Context, Result};
use calendar_api::{build_router, ApiConfig, Calendar};
use calendar_storage::create_store;
use calendar_worker::{close_with_grace, shutdown_signal, wait_for_shutdown};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calendar_api=debug,calendar_storage=info,calendar_worker=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;
    info!(
        backend = ?config.storage.backend(),
        addr = %config.addr,
        "Starting calendar API"
    );

    let store = create_store(&config.storage)
        .await
        .context("Failed to connect to event store")?;
    let calendar = Calendar::new(store.clone()).with_timeout(config.request_timeout);

    let app = build_router(calendar);

    let shutdown = shutdown_signal();

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    info!("API listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .context("Server error")?;

    info!("Server stopped, closing event store");
    if close_with_grace("store", config.shutdown_grace, store.close())
        .await
        .is_ok()
    {
        info!("Event store closed");
    }

    Ok(())
}
