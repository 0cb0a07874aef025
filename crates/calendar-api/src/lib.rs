//! HTTP API of the calendar service
//!
//! Thin axum layer over the [`Calendar`] facade. Storage is injected as an
//! `Arc<dyn EventStore>`, so the same router runs against the in-memory
//! backend in tests and PostgreSQL in production.

pub mod calendar;
pub mod config;
pub mod error;
pub mod events;

pub use calendar::{Calendar, CalendarError, DEFAULT_TIMEOUT};
pub use config::ApiConfig;
pub use error::{ApiError, ErrorResponse};
pub use events::ListResponse;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full application router
pub fn build_router(calendar: Calendar) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(events::routes(events::AppState { calendar }))
        .layer(TraceLayer::new_for_http())
}
