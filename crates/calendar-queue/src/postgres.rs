//! PostgreSQL-backed notification queue
//!
//! Messages live in the `notification_queue` table, keyed by queue name.
//! Consumers claim rows with `FOR UPDATE SKIP LOCKED`, so any number of
//! senders can share one queue without double delivery:
//!
//! - Auto ack: the claim deletes the row
//! - Manual ack: the claim marks the row `claimed`; `ack` deletes it and a
//!   claim older than the visibility timeout is handed out again

use std::time::Duration;

use async_trait::async_trait;
use calendar_core::{NotificationMsg, CONTENT_TYPE};
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::{
    AckMode, ChannelError, Delivery, Link, NotificationConsumer, NotificationProducer,
};
use crate::codec;
use crate::poller::{Backoff, PollerConfig};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS notification_queue (
    id BIGSERIAL PRIMARY KEY,
    queue_name TEXT NOT NULL,
    payload BYTEA NOT NULL,
    content_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ready',
    delivery_count INTEGER NOT NULL DEFAULT 0,
    enqueued_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    claimed_at TIMESTAMPTZ
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_notification_queue_claim
    ON notification_queue (queue_name, status, id)
"#;

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> ChannelError {
    move |e| {
        error!("Failed to {}: {}", context, e);
        ChannelError::Database(e.to_string())
    }
}

/// Connection settings shared by producer and consumer handles
#[derive(Debug, Clone)]
pub struct PostgresQueue {
    database_url: String,
    name: String,
    ack_mode: AckMode,
    poller: PollerConfig,
    visibility_timeout: Duration,
}

impl PostgresQueue {
    pub fn new(database_url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            name: name.into(),
            ack_mode: AckMode::default(),
            poller: PollerConfig::default(),
            visibility_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = poller;
        self
    }

    /// How long a manual-mode claim may stay unacknowledged before redelivery
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    fn pool(&self) -> Result<PgPool, ChannelError> {
        PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy(&self.database_url)
            .map_err(db_error("configure queue pool"))
    }

    /// Publishing handle with its own connection pool
    pub fn producer(&self) -> Result<PostgresProducer, ChannelError> {
        Ok(PostgresProducer {
            pool: self.pool()?,
            name: self.name.clone(),
            link: Mutex::new(Link::default()),
        })
    }

    /// Receiving handle with its own connection pool
    pub fn consumer(&self) -> Result<PostgresConsumer, ChannelError> {
        let (closed_tx, closed_rx) = watch::channel(false);
        Ok(PostgresConsumer {
            pool: self.pool()?,
            name: self.name.clone(),
            ack_mode: self.ack_mode,
            poller: self.poller.clone(),
            visibility_timeout: self.visibility_timeout,
            link: Mutex::new(Link::default()),
            closed_tx,
            closed_rx,
        })
    }
}

/// Create the queue table if it does not exist yet
async fn declare(pool: &PgPool, name: &str) -> Result<(), ChannelError> {
    sqlx::query(CREATE_TABLE)
        .execute(pool)
        .await
        .map_err(db_error("declare notification queue"))?;
    sqlx::query(CREATE_INDEX)
        .execute(pool)
        .await
        .map_err(db_error("declare notification queue index"))?;

    info!(queue = %name, "declared notification queue");
    Ok(())
}

fn connect_link(link: &Mutex<Link>) -> Result<bool, ChannelError> {
    match *link.lock() {
        Link::Closed => Err(ChannelError::Closed),
        Link::Connected => Ok(false),
        Link::Disconnected => Ok(true),
    }
}

/// Publishing handle of a [`PostgresQueue`]
pub struct PostgresProducer {
    pool: PgPool,
    name: String,
    link: Mutex<Link>,
}

impl PostgresProducer {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl NotificationProducer for PostgresProducer {
    #[instrument(skip(self), fields(queue = %self.name))]
    async fn connect(&self) -> Result<(), ChannelError> {
        if connect_link(&self.link)? {
            declare(&self.pool, &self.name).await?;
            *self.link.lock() = Link::Connected;
        }
        Ok(())
    }

    #[instrument(skip(self, msg), fields(queue = %self.name, id = msg.id))]
    async fn publish(&self, msg: &NotificationMsg) -> Result<(), ChannelError> {
        let link = *self.link.lock();
        link.ensure_open()?;
        let payload = codec::encode(msg)?;

        sqlx::query(
            r#"
            INSERT INTO notification_queue (queue_name, payload, content_type)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&self.name)
        .bind(payload)
        .bind(CONTENT_TYPE)
        .execute(&self.pool)
        .await
        .map_err(db_error("publish notification"))?;

        debug!("published notification");
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        *self.link.lock() = Link::Closed;
        self.pool.close().await;
        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ClaimedRow {
    id: i64,
    payload: Vec<u8>,
    delivery_count: i32,
}

/// Receiving handle of a [`PostgresQueue`]
pub struct PostgresConsumer {
    pool: PgPool,
    name: String,
    ack_mode: AckMode,
    poller: PollerConfig,
    visibility_timeout: Duration,
    link: Mutex<Link>,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl PostgresConsumer {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// Claim the oldest available row, if any
    #[instrument(skip(self), fields(queue = %self.name, ack_mode = %self.ack_mode))]
    async fn claim(&self) -> Result<Option<ClaimedRow>, ChannelError> {
        let query = match self.ack_mode {
            AckMode::Auto => sqlx::query_as::<_, ClaimedRow>(
                r#"
                DELETE FROM notification_queue
                WHERE id = (
                    SELECT id FROM notification_queue
                    WHERE queue_name = $1 AND status = 'ready'
                    ORDER BY id
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, payload, delivery_count
                "#,
            )
            .bind(&self.name),
            AckMode::Manual => sqlx::query_as::<_, ClaimedRow>(
                r#"
                UPDATE notification_queue
                SET status = 'claimed',
                    claimed_at = NOW(),
                    delivery_count = delivery_count + 1
                WHERE id = (
                    SELECT id FROM notification_queue
                    WHERE queue_name = $1
                      AND (
                        status = 'ready'
                        OR (status = 'claimed' AND claimed_at < NOW() - make_interval(secs => $2))
                      )
                    ORDER BY id
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, payload, delivery_count
                "#,
            )
            .bind(&self.name)
            .bind(self.visibility_timeout.as_secs_f64()),
        };

        query
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("claim notification"))
    }

    async fn delete(&self, id: i64) -> Result<(), ChannelError> {
        sqlx::query("DELETE FROM notification_queue WHERE id = $1 AND queue_name = $2")
            .bind(id)
            .bind(&self.name)
            .execute(&self.pool)
            .await
            .map_err(db_error("acknowledge notification"))?;
        Ok(())
    }
}

#[async_trait]
impl NotificationConsumer for PostgresConsumer {
    #[instrument(skip(self), fields(queue = %self.name))]
    async fn connect(&self) -> Result<(), ChannelError> {
        if connect_link(&self.link)? {
            declare(&self.pool, &self.name).await?;
            *self.link.lock() = Link::Connected;
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Delivery>, ChannelError> {
        let mut closed = self.closed_rx.clone();
        let mut backoff = Backoff::new(self.poller.clone());

        loop {
            let link = *self.link.lock();
            match link {
                Link::Disconnected => return Err(ChannelError::NotConnected),
                Link::Closed => return Ok(None),
                Link::Connected => {}
            }

            let claimed = match self.claim().await {
                Ok(claimed) => claimed,
                // close() shuts the pool underneath an in-progress claim
                Err(_) if self.is_closed() => return Ok(None),
                Err(e) => return Err(e),
            };

            match claimed {
                Some(row) => match codec::decode(&row.payload) {
                    Ok(msg) => {
                        return Ok(Some(Delivery {
                            tag: row.id,
                            msg,
                            redelivered: row.delivery_count > 1,
                        }));
                    }
                    Err(e) => {
                        warn!(queue = %self.name, tag = row.id, error = %e, "dropping malformed message");
                        if self.ack_mode == AckMode::Manual {
                            self.delete(row.id).await?;
                        }
                        backoff.reset();
                    }
                },
                None => {
                    if backoff.wait(&mut closed).await {
                        return Ok(None);
                    }
                    backoff.increase();
                }
            }
        }
    }

    #[instrument(skip(self, delivery), fields(queue = %self.name, tag = delivery.tag))]
    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        let link = *self.link.lock();
        link.ensure_open()?;
        if self.ack_mode == AckMode::Manual {
            self.delete(delivery.tag).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ChannelError> {
        *self.link.lock() = Link::Closed;
        self.closed_tx.send_replace(true);
        self.pool.close().await;
        Ok(())
    }

    fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }
}
