//! In-memory implementation of EventStore

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use calendar_core::{
    intervals_conflict, touches_range, validate_event, validate_update, Event,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::store::*;

/// In-memory implementation of EventStore
///
/// A single reader/writer lock guards the whole map: inserts, updates,
/// deletes and the notified flag take the write lock, scans take the read
/// lock. Conflict check and write happen under the same write lock, so
/// in-process writers cannot double-book a slot.
///
/// Ids come from a sequence owned by the instance, so independent stores
/// (one per test, say) never interfere.
///
/// # Example
///
/// ```
/// use calendar_storage::InMemoryEventStore;
///
/// let store = InMemoryEventStore::new();
/// assert_eq!(store.len(), 0);
/// ```
pub struct InMemoryEventStore {
    events: RwLock<HashMap<i64, Event>>,
    next_id: AtomicI64,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(0),
        }
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Id of the first event of `user_id` (other than `exclude_id`) overlapping the interval
fn find_conflict(
    events: &HashMap<i64, Event>,
    exclude_id: i64,
    user_id: i64,
    on_time: DateTime<Utc>,
    off_time: DateTime<Utc>,
) -> Option<i64> {
    events
        .values()
        .find(|e| {
            e.user_id == user_id
                && e.id != exclude_id
                && intervals_conflict(e.on_time, e.off_time, on_time, off_time)
        })
        .map(|e| e.id)
}

fn conflict_check(
    events: &HashMap<i64, Event>,
    exclude_id: i64,
    user_id: i64,
    on_time: DateTime<Utc>,
    off_time: DateTime<Utc>,
) -> Result<(), StoreError> {
    match find_conflict(events, exclude_id, user_id, on_time, off_time) {
        Some(conflicting_id) => Err(StoreError::Conflict {
            user_id,
            conflicting_id,
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert_event(&self, event: &Event) -> Result<i64, StoreError> {
        validate_event(event)?;

        let mut events = self.events.write();
        // id 0 never belongs to a stored event, so nothing is excluded
        conflict_check(&events, 0, event.user_id, event.on_time, event.off_time)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        events.insert(
            id,
            Event {
                id,
                notified: false,
                ..event.clone()
            },
        );

        debug!(id, user_id = event.user_id, "inserted event");
        Ok(id)
    }

    async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
        validate_update(event)?;

        let mut events = self.events.write();
        let previous = events
            .get(&event.id)
            .ok_or(StoreError::NotFound(event.id))?;

        conflict_check(
            &events,
            event.id,
            event.user_id,
            event.on_time,
            event.off_time,
        )?;

        // A moved reminder must be delivered again
        let notified = previous.notified && previous.notify_time == event.notify_time;
        events.insert(
            event.id,
            Event {
                notified,
                ..event.clone()
            },
        );

        debug!(id = event.id, "updated event");
        Ok(())
    }

    async fn delete_event(&self, id: i64) -> Result<(), StoreError> {
        if self.events.write().remove(&id).is_some() {
            debug!(id, "deleted event");
        }
        Ok(())
    }

    async fn get_event_by_id(&self, id: i64) -> Result<Event, StoreError> {
        self.events
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn get_all_events(&self, user_id: i64) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_all_range(
        &self,
        user_id: i64,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.user_id == user_id && touches_range(e.on_time, e.off_time, begin, end))
            .cloned()
            .collect())
    }

    async fn is_busy_date_time_range(
        &self,
        exclude_id: i64,
        user_id: i64,
        on_time: DateTime<Utc>,
        off_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let events = self.events.read();
        conflict_check(&events, exclude_id, user_id, on_time, off_time)
    }

    async fn get_events_day_of_notice(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .events
            .read()
            .values()
            .filter(|e| e.is_due(as_of))
            .cloned()
            .collect())
    }

    async fn delete_events_older_date(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|_, e| e.off_time >= cutoff);
        let deleted = (before - events.len()) as u64;

        if deleted > 0 {
            debug!(deleted, %cutoff, "purged expired events");
        }
        Ok(deleted)
    }

    async fn update_event_notified(&self, id: i64) -> Result<(), StoreError> {
        let mut events = self.events.write();
        let event = events.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        event.notified = true;
        Ok(())
    }
}
