// HTTP error mapping
// Decision: Error bodies are {"error": "..."} with the offending field for validation failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use calendar_storage::StoreError;
use serde::Serialize;

use crate::calendar::CalendarError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ErrorResponse {
    fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            field: None,
        }
    }
}

impl CalendarError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Store(StoreError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for CalendarError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation(e) | Self::Store(StoreError::Validation(e)) => ErrorResponse {
                error: e.to_string(),
                field: Some(e.field()),
            },
            Self::Store(StoreError::Database(_)) => {
                tracing::error!(error = %self, "Store failure");
                ErrorResponse::new("internal server error")
            }
            other => ErrorResponse::new(other),
        };
        (status, Json(body)).into_response()
    }
}

/// Error returned by route handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    /// Malformed path or query parameter
    #[error("{0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Calendar(e) => e.into_response(),
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
            }
        }
    }
}
