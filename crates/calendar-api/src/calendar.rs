//! Calendar facade
//!
//! Validates requests before they reach storage and bounds every store
//! round trip with a timeout. Day, week and month views are translated into
//! range queries here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use calendar_core::{
    day_bounds, month_bounds, validate_event, validate_update, week_bounds, Event,
    ValidationError,
};
use calendar_storage::{EventStore, StoreError};
use chrono::{DateTime, Utc};
use tracing::{instrument, warn};

/// Upper bound for a single store call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(StoreError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl From<StoreError> for CalendarError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => Self::Validation(v),
            other => Self::Store(other),
        }
    }
}

/// Application-level entry point to the event store
#[derive(Clone)]
pub struct Calendar {
    store: Arc<dyn EventStore>,
    timeout: Duration,
}

impl Calendar {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, CalendarError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(CalendarError::from),
            Err(_) => {
                warn!(operation, timeout_ms = self.timeout.as_millis() as u64, "store call timed out");
                Err(CalendarError::Timeout {
                    operation,
                    after: self.timeout,
                })
            }
        }
    }

    fn require_user(user_id: i64) -> Result<(), CalendarError> {
        if user_id == 0 {
            return Err(ValidationError::MissingUserId.into());
        }
        Ok(())
    }

    /// Create an event and return it with its assigned id
    ///
    /// Any client-supplied id is ignored.
    #[instrument(skip(self, event), fields(user_id = event.user_id))]
    pub async fn insert_event(&self, mut event: Event) -> Result<Event, CalendarError> {
        validate_event(&event)?;
        event.id = 0;
        event.notified = false;

        let id = self
            .bounded("insert_event", self.store.insert_event(&event))
            .await?;
        event.id = id;
        Ok(event)
    }

    #[instrument(skip(self, event), fields(id = event.id, user_id = event.user_id))]
    pub async fn update_event(&self, event: Event) -> Result<(), CalendarError> {
        validate_update(&event)?;
        self.bounded("update_event", self.store.update_event(&event))
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_event(&self, id: i64) -> Result<(), CalendarError> {
        self.bounded("delete_event", self.store.delete_event(id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_event_by_id(&self, id: i64) -> Result<Event, CalendarError> {
        if id == 0 {
            return Err(ValidationError::MissingId.into());
        }
        self.bounded("get_event_by_id", self.store.get_event_by_id(id))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_all_events(&self, user_id: i64) -> Result<Vec<Event>, CalendarError> {
        Self::require_user(user_id)?;
        self.bounded("get_all_events", self.store.get_all_events(user_id))
            .await
    }

    /// Events touching the calendar day that contains `date`
    #[instrument(skip(self))]
    pub async fn get_all_events_day(
        &self,
        user_id: i64,
        date: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        Self::require_user(user_id)?;
        let (begin, end) = day_bounds(date);
        self.bounded("get_all_events_day", self.store.get_all_range(user_id, begin, end))
            .await
    }

    /// Events touching the Monday-to-Sunday week that contains `date`
    #[instrument(skip(self))]
    pub async fn get_all_events_week(
        &self,
        user_id: i64,
        date: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        Self::require_user(user_id)?;
        let (begin, end) = week_bounds(date);
        self.bounded("get_all_events_week", self.store.get_all_range(user_id, begin, end))
            .await
    }

    /// Events touching the month that contains `date`
    #[instrument(skip(self))]
    pub async fn get_all_events_month(
        &self,
        user_id: i64,
        date: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        Self::require_user(user_id)?;
        let (begin, end) = month_bounds(date);
        self.bounded("get_all_events_month", self.store.get_all_range(user_id, begin, end))
            .await
    }
}
