//! End-to-end reminder pipeline over the in-memory store and queue
//!
//! Run with: cargo test -p calendar-worker --test pipeline_test

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calendar_core::Event;
use calendar_queue::{AckMode, InMemoryQueue, NotificationConsumer, NotificationProducer};
use calendar_storage::{EventStore, InMemoryEventStore, StoreError};
use calendar_worker::{Handled, Scheduler, SchedulerConfig, Sender, SenderError};
use chrono::{DateTime, TimeZone, Utc};

fn day0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 0, 0, 0).unwrap()
}

fn days(n: i64) -> chrono::Duration {
    chrono::Duration::days(n)
}

struct Pipeline {
    store: Arc<dyn EventStore>,
    queue: InMemoryQueue,
    scheduler: Scheduler,
    sender: Sender,
    consumer: Arc<dyn NotificationConsumer>,
}

async fn pipeline(store: Arc<dyn EventStore>, ack_mode: AckMode) -> Pipeline {
    let queue = InMemoryQueue::new("notification", ack_mode);
    let producer: Arc<dyn NotificationProducer> = Arc::new(queue.producer());
    let consumer: Arc<dyn NotificationConsumer> = Arc::new(queue.consumer());
    producer.connect().await.unwrap();
    consumer.connect().await.unwrap();

    Pipeline {
        scheduler: Scheduler::new(store.clone(), producer, SchedulerConfig::default()),
        sender: Sender::new(store.clone(), consumer.clone(), Duration::from_secs(1)),
        store,
        queue,
        consumer,
    }
}

#[test_log::test(tokio::test)]
async fn test_due_reminder_is_published_and_marked() {
    let p = pipeline(Arc::new(InMemoryEventStore::new()), AckMode::Auto).await;

    let event = Event::new(1, "quarterly review", day0(), day0() + days(7))
        .with_description("room 4")
        .with_notify_time(day0() + days(6));
    let id = p.store.insert_event(&event).await.unwrap();

    let report = p.scheduler.tick(day0() + days(6)).await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(p.queue.len(), 1);

    let delivery = p.consumer.recv().await.unwrap().unwrap();
    assert_eq!(delivery.msg.id, id);
    assert_eq!(delivery.msg.title, "quarterly review");
    assert_eq!(delivery.msg.date, day0());
    assert_eq!(delivery.msg.user_id, 1);

    assert_eq!(p.sender.handle(&delivery).await.unwrap(), Handled::Marked);
    assert!(p.store.get_event_by_id(id).await.unwrap().notified);

    // Nothing left to publish afterwards
    let report = p.scheduler.tick(day0() + days(6)).await.unwrap();
    assert_eq!(report.due, 0);
    assert!(p.queue.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_old_events_are_purged() {
    let p = pipeline(Arc::new(InMemoryEventStore::new()), AckMode::Auto).await;

    let long_ago = day0() - days(400);
    for offset in [0, 7] {
        let on = long_ago + days(offset);
        p.store
            .insert_event(&Event::new(1, "old", on, on + chrono::Duration::hours(2)))
            .await
            .unwrap();
    }
    let keep = p
        .store
        .insert_event(&Event::new(1, "recent", day0(), day0() + days(1)))
        .await
        .unwrap();

    let report = p.scheduler.tick(day0()).await.unwrap();
    assert_eq!(report.purged, Some(2));

    let remaining = p.store.get_all_events(1).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, keep);
}

/// Store whose first `update_event_notified` calls fail with a transport error
struct FlakyStore {
    inner: InMemoryEventStore,
    failures_left: AtomicUsize,
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn insert_event(&self, event: &Event) -> Result<i64, StoreError> {
        self.inner.insert_event(event).await
    }

    async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
        self.inner.update_event(event).await
    }

    async fn delete_event(&self, id: i64) -> Result<(), StoreError> {
        self.inner.delete_event(id).await
    }

    async fn get_event_by_id(&self, id: i64) -> Result<Event, StoreError> {
        self.inner.get_event_by_id(id).await
    }

    async fn get_all_events(&self, user_id: i64) -> Result<Vec<Event>, StoreError> {
        self.inner.get_all_events(user_id).await
    }

    async fn get_all_range(
        &self,
        user_id: i64,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        self.inner.get_all_range(user_id, begin, end).await
    }

    async fn is_busy_date_time_range(
        &self,
        exclude_id: i64,
        user_id: i64,
        on_time: DateTime<Utc>,
        off_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .is_busy_date_time_range(exclude_id, user_id, on_time, off_time)
            .await
    }

    async fn get_events_day_of_notice(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        self.inner.get_events_day_of_notice(as_of).await
    }

    async fn delete_events_older_date(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.inner.delete_events_older_date(cutoff).await
    }

    async fn update_event_notified(&self, id: i64) -> Result<(), StoreError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Database("connection reset".into()));
        }
        self.inner.update_event_notified(id).await
    }
}

#[test_log::test(tokio::test)]
async fn test_manual_ack_redelivers_after_store_failure() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryEventStore::new(),
        failures_left: AtomicUsize::new(1),
    });
    let p = pipeline(store, AckMode::Manual).await;

    let event = Event::new(3, "standup", day0(), day0() + chrono::Duration::minutes(15))
        .with_notify_time(day0());
    let id = p.store.insert_event(&event).await.unwrap();
    p.scheduler.tick(day0()).await.unwrap();

    let first = p.consumer.recv().await.unwrap().unwrap();
    let err = p.sender.handle(&first).await.unwrap_err();
    assert!(matches!(err, SenderError::Store { event_id, .. } if event_id == id));
    assert_eq!(p.queue.in_flight(), 1);
    assert!(!p.store.get_event_by_id(id).await.unwrap().notified);

    // The broker hands the unacknowledged message out again
    assert_eq!(p.queue.requeue_unacked(), 1);
    let second = p.consumer.recv().await.unwrap().unwrap();
    assert!(second.redelivered);
    assert_eq!(p.sender.handle(&second).await.unwrap(), Handled::Marked);
    assert_eq!(p.queue.in_flight(), 0);
    assert!(p.store.get_event_by_id(id).await.unwrap().notified);
}

#[test_log::test(tokio::test)]
async fn test_deleted_event_does_not_block_queue() {
    let p = pipeline(Arc::new(InMemoryEventStore::new()), AckMode::Manual).await;

    let event = Event::new(4, "cancelled", day0(), day0() + days(1)).with_notify_time(day0());
    let id = p.store.insert_event(&event).await.unwrap();
    p.scheduler.tick(day0()).await.unwrap();
    p.store.delete_event(id).await.unwrap();

    let delivery = p.consumer.recv().await.unwrap().unwrap();
    assert_eq!(p.sender.handle(&delivery).await.unwrap(), Handled::Missing);
    assert_eq!(p.queue.requeue_unacked(), 0);
}
