// Event HTTP routes

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use calendar_core::Event;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::Calendar;
use crate::error::ApiError;

/// App state for event routes
#[derive(Clone)]
pub struct AppState {
    pub calendar: Calendar,
}

/// Response wrapper for list endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// `?date=` parameter of the day/week/month views
///
/// Accepts an RFC 3339 instant or a plain `YYYY-MM-DD` date (midnight UTC).
#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: String,
}

impl DateQuery {
    fn parse(&self) -> Result<DateTime<Utc>, ApiError> {
        let raw = self.date.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            return Ok(instant.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(|day| day.and_time(NaiveTime::default()).and_utc())
            .map_err(|_| {
                ApiError::BadRequest(format!(
                    "wrong date: {raw:?}, expected RFC 3339 or YYYY-MM-DD"
                ))
            })
    }
}

/// Create event routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/events", post(create_event))
        .route(
            "/v1/events/{id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/v1/users/{user_id}/events", get(list_events))
        .route("/v1/users/{user_id}/events/day", get(list_events_day))
        .route("/v1/users/{user_id}/events/week", get(list_events_week))
        .route("/v1/users/{user_id}/events/month", get(list_events_month))
        .with_state(state)
}

/// POST /v1/events - Create a new event
pub async fn create_event(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let event = state.calendar.insert_event(event).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /v1/events/{id} - Get event by ID
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Event>, ApiError> {
    let event = state.calendar.get_event_by_id(id).await?;
    Ok(Json(event))
}

/// PUT /v1/events/{id} - Replace an event; the path id wins over the body
pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(mut event): Json<Event>,
) -> Result<Json<Event>, ApiError> {
    event.id = id;
    state.calendar.update_event(event).await?;
    let event = state.calendar.get_event_by_id(id).await?;
    Ok(Json(event))
}

/// DELETE /v1/events/{id} - Delete an event (idempotent)
pub async fn delete_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.calendar.delete_event(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/users/{user_id}/events - All events of a user
pub async fn list_events(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<ListResponse<Event>>, ApiError> {
    let events = state.calendar.get_all_events(user_id).await?;
    Ok(Json(events.into()))
}

/// GET /v1/users/{user_id}/events/day?date= - Events of one calendar day
pub async fn list_events_day(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<DateQuery>,
) -> Result<Json<ListResponse<Event>>, ApiError> {
    let events = state
        .calendar
        .get_all_events_day(user_id, query.parse()?)
        .await?;
    Ok(Json(events.into()))
}

/// GET /v1/users/{user_id}/events/week?date= - Events of the week containing the date
pub async fn list_events_week(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<DateQuery>,
) -> Result<Json<ListResponse<Event>>, ApiError> {
    let events = state
        .calendar
        .get_all_events_week(user_id, query.parse()?)
        .await?;
    Ok(Json(events.into()))
}

/// GET /v1/users/{user_id}/events/month?date= - Events of the month containing the date
pub async fn list_events_month(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<DateQuery>,
) -> Result<Json<ListResponse<Event>>, ApiError> {
    let events = state
        .calendar
        .get_all_events_month(user_id, query.parse()?)
        .await?;
    Ok(Json(events.into()))
}
