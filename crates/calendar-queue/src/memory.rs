//! In-process notification queue
//!
//! A single FIFO shared by any number of producer and consumer handles in
//! one process. Payloads are stored encoded, so consumers exercise the same
//! decode path as the PostgreSQL backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use calendar_core::NotificationMsg;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::channel::{
    AckMode, ChannelError, Delivery, Link, NotificationConsumer, NotificationProducer,
};
use crate::codec;

#[derive(Debug, Clone)]
struct Message {
    tag: i64,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    in_flight: HashMap<i64, Message>,
    next_tag: i64,
}

#[derive(Debug)]
struct Shared {
    name: String,
    ack_mode: AckMode,
    state: Mutex<QueueState>,
    available: Notify,
}

/// Shared in-memory queue handing out producer and consumer handles
#[derive(Debug, Clone)]
pub struct InMemoryQueue {
    shared: Arc<Shared>,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>, ack_mode: AckMode) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                ack_mode,
                state: Mutex::new(QueueState::default()),
                available: Notify::new(),
            }),
        }
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            shared: self.shared.clone(),
            link: Mutex::new(Link::default()),
        }
    }

    pub fn consumer(&self) -> InMemoryConsumer {
        InMemoryConsumer {
            shared: self.shared.clone(),
            link: Mutex::new(Link::default()),
        }
    }

    /// Messages waiting to be received
    pub fn len(&self) -> usize {
        self.shared.state.lock().ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages received in manual mode and not yet acknowledged
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight.len()
    }

    /// Enqueue an already-encoded payload
    pub fn push_raw(&self, payload: Vec<u8>) {
        self.shared.push(payload);
    }

    /// Return every unacknowledged message to the head of the queue
    ///
    /// Stands in for a broker noticing that a consumer went away.
    pub fn requeue_unacked(&self) -> usize {
        let mut state = self.shared.state.lock();
        let mut pending: Vec<Message> = state.in_flight.drain().map(|(_, m)| m).collect();
        pending.sort_by_key(|m| std::cmp::Reverse(m.tag));

        let count = pending.len();
        for mut message in pending {
            message.redelivered = true;
            state.ready.push_front(message);
        }
        drop(state);

        if count > 0 {
            debug!(queue = %self.shared.name, count, "requeued unacknowledged messages");
            self.shared.available.notify_waiters();
        }
        count
    }
}

impl Shared {
    fn push(&self, payload: Vec<u8>) {
        {
            let mut state = self.state.lock();
            state.next_tag += 1;
            let tag = state.next_tag;
            state.ready.push_back(Message {
                tag,
                payload,
                redelivered: false,
            });
        }
        self.available.notify_one();
    }

    /// Pop the next decodable message, discarding undecodable ones
    fn take(&self) -> Option<Delivery> {
        let mut state = self.state.lock();
        while let Some(message) = state.ready.pop_front() {
            match codec::decode(&message.payload) {
                Ok(msg) => {
                    let delivery = Delivery {
                        tag: message.tag,
                        msg,
                        redelivered: message.redelivered,
                    };
                    if self.ack_mode == AckMode::Manual {
                        state.in_flight.insert(message.tag, message);
                    }
                    return Some(delivery);
                }
                Err(e) => {
                    warn!(queue = %self.name, tag = message.tag, error = %e, "dropping malformed message");
                }
            }
        }
        None
    }
}

/// Publishing handle of an [`InMemoryQueue`]
#[derive(Debug)]
pub struct InMemoryProducer {
    shared: Arc<Shared>,
    link: Mutex<Link>,
}

#[async_trait]
impl NotificationProducer for InMemoryProducer {
    async fn connect(&self) -> Result<(), ChannelError> {
        let mut link = self.link.lock();
        if *link == Link::Closed {
            return Err(ChannelError::Closed);
        }
        *link = Link::Connected;
        Ok(())
    }

    async fn publish(&self, msg: &NotificationMsg) -> Result<(), ChannelError> {
        self.link.lock().ensure_open()?;
        let payload = codec::encode(msg)?;
        self.shared.push(payload);
        debug!(queue = %self.shared.name, id = msg.id, "published notification");
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        *self.link.lock() = Link::Closed;
        Ok(())
    }
}

/// Receiving handle of an [`InMemoryQueue`]
#[derive(Debug)]
pub struct InMemoryConsumer {
    shared: Arc<Shared>,
    link: Mutex<Link>,
}

#[async_trait]
impl NotificationConsumer for InMemoryConsumer {
    async fn connect(&self) -> Result<(), ChannelError> {
        let mut link = self.link.lock();
        if *link == Link::Closed {
            return Err(ChannelError::Closed);
        }
        *link = Link::Connected;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Delivery>, ChannelError> {
        loop {
            // Registered before the checks so a publish or close in between is not missed
            let available = self.shared.available.notified();

            let link = *self.link.lock();
            match link {
                Link::Disconnected => return Err(ChannelError::NotConnected),
                Link::Closed => return Ok(None),
                Link::Connected => {}
            }

            if let Some(delivery) = self.shared.take() {
                return Ok(Some(delivery));
            }

            available.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.link.lock().ensure_open()?;
        if self.shared.ack_mode == AckMode::Manual
            && self.shared.state.lock().in_flight.remove(&delivery.tag).is_none()
        {
            debug!(tag = delivery.tag, "ack for unknown delivery tag");
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        *self.link.lock() = Link::Closed;
        self.shared.available.notify_waiters();
        Ok(())
    }

    fn ack_mode(&self) -> AckMode {
        self.shared.ack_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn msg(id: i64) -> NotificationMsg {
        NotificationMsg {
            id,
            title: format!("event {id}"),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            user_id: 1,
        }
    }

    async fn connected(queue: &InMemoryQueue) -> (InMemoryProducer, InMemoryConsumer) {
        let producer = queue.producer();
        let consumer = queue.consumer();
        producer.connect().await.unwrap();
        consumer.connect().await.unwrap();
        (producer, consumer)
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = InMemoryQueue::new("notification", AckMode::Auto);
        let (producer, consumer) = connected(&queue).await;

        for id in 1..=3 {
            producer.publish(&msg(id)).await.unwrap();
        }
        assert_eq!(queue.len(), 3);

        for id in 1..=3 {
            let delivery = consumer.recv().await.unwrap().unwrap();
            assert_eq!(delivery.msg, msg(id));
            assert!(!delivery.redelivered);
            consumer.ack(&delivery).await.unwrap();
        }
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_requires_connect() {
        let queue = InMemoryQueue::new("notification", AckMode::Auto);
        let producer = queue.producer();
        let consumer = queue.consumer();

        assert!(matches!(
            producer.publish(&msg(1)).await,
            Err(ChannelError::NotConnected)
        ));
        assert!(matches!(consumer.recv().await, Err(ChannelError::NotConnected)));
    }

    #[tokio::test]
    async fn test_closed_handles() {
        let queue = InMemoryQueue::new("notification", AckMode::Auto);
        let (producer, consumer) = connected(&queue).await;

        producer.close().await.unwrap();
        producer.close().await.unwrap();
        assert!(matches!(
            producer.publish(&msg(1)).await,
            Err(ChannelError::Closed)
        ));
        assert!(matches!(producer.connect().await, Err(ChannelError::Closed)));

        consumer.close().await.unwrap();
        assert_eq!(consumer.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_wakes_pending_recv() {
        let queue = InMemoryQueue::new("notification", AckMode::Auto);
        let consumer = Arc::new(queue.consumer());
        consumer.connect().await.unwrap();

        let waiting = {
            let consumer = consumer.clone();
            tokio::spawn(async move { consumer.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        consumer.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("recv should return after close")
            .unwrap();
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recv_waits_for_publish() {
        let queue = InMemoryQueue::new("notification", AckMode::Auto);
        let (producer, consumer) = connected(&queue).await;

        let waiting = tokio::spawn(async move { consumer.recv().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.publish(&msg(42)).await.unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.msg.id, 42);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let queue = InMemoryQueue::new("notification", AckMode::Manual);
        let (producer, consumer) = connected(&queue).await;

        queue.push_raw(b"{broken".to_vec());
        producer.publish(&msg(5)).await.unwrap();

        let delivery = consumer.recv().await.unwrap().unwrap();
        assert_eq!(delivery.msg.id, 5);
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_manual_ack_redelivers_unacked() {
        let queue = InMemoryQueue::new("notification", AckMode::Manual);
        let (producer, consumer) = connected(&queue).await;

        producer.publish(&msg(1)).await.unwrap();
        producer.publish(&msg(2)).await.unwrap();

        let first = consumer.recv().await.unwrap().unwrap();
        let second = consumer.recv().await.unwrap().unwrap();
        consumer.ack(&second).await.unwrap();
        assert_eq!(queue.in_flight(), 1);

        assert_eq!(queue.requeue_unacked(), 1);
        let again = consumer.recv().await.unwrap().unwrap();
        assert_eq!(again.msg, first.msg);
        assert!(again.redelivered);

        consumer.ack(&again).await.unwrap();
        assert_eq!(queue.requeue_unacked(), 0);
    }

    #[tokio::test]
    async fn test_auto_ack_never_redelivers() {
        let queue = InMemoryQueue::new("notification", AckMode::Auto);
        let (producer, consumer) = connected(&queue).await;

        producer.publish(&msg(1)).await.unwrap();
        let _ = consumer.recv().await.unwrap().unwrap();

        assert_eq!(queue.in_flight(), 0);
        assert_eq!(queue.requeue_unacked(), 0);
        assert!(queue.is_empty());
    }
}
