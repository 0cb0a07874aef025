//! EventStore trait definition

use async_trait::async_trait;
use calendar_core::{Event, ValidationError};
use chrono::{DateTime, Utc};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Event violates a structural invariant
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Interval overlaps another event of the same user
    #[error("date is busy: overlaps event {conflicting_id} of user {user_id}")]
    Conflict { user_id: i64, conflicting_id: i64 },

    /// Event not found
    #[error("event not found: {0}")]
    NotFound(i64),

    /// Database error
    #[error("database error: {0}")]
    Database(String),
}

/// Durable storage of calendar events
///
/// Owns conflict detection, range queries and the notified flag. Every
/// backend must give callers identical results for every method.
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Establish the backend connection (no-op for in-process backends)
    async fn connect(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Release the backend connection; calling it twice is not an error
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    // =========================================================================
    // Calendar Operations
    // =========================================================================

    /// Validate, conflict-check and persist a new event
    ///
    /// Any id carried by `event` is ignored; returns the assigned id.
    async fn insert_event(&self, event: &Event) -> Result<i64, StoreError>;

    /// Replace an existing event, re-checking all invariants
    ///
    /// The conflict check excludes the event's own previous interval.
    async fn update_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Remove an event; deleting an unknown id succeeds
    async fn delete_event(&self, id: i64) -> Result<(), StoreError>;

    /// Fetch one event
    async fn get_event_by_id(&self, id: i64) -> Result<Event, StoreError>;

    /// All events of a user, in no particular order
    async fn get_all_events(&self, user_id: i64) -> Result<Vec<Event>, StoreError>;

    /// Events of a user whose start or end lies within `[begin, end]`
    async fn get_all_range(
        &self,
        user_id: i64,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;

    /// Fail with [`StoreError::Conflict`] if `[on_time, off_time]` overlaps
    /// any event of `user_id` other than `exclude_id`
    async fn is_busy_date_time_range(
        &self,
        exclude_id: i64,
        user_id: i64,
        on_time: DateTime<Utc>,
        off_time: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    // =========================================================================
    // Producer Operations (scheduler)
    // =========================================================================

    /// Events whose reminder is due at `as_of` and not yet delivered
    async fn get_events_day_of_notice(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError>;

    /// Purge events that ended before `cutoff`, returning how many were removed
    async fn delete_events_older_date(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    // =========================================================================
    // Consumer Operations (sender)
    // =========================================================================

    /// Mark the event's reminder as delivered; repeated calls succeed
    async fn update_event_notified(&self, id: i64) -> Result<(), StoreError>;
}
