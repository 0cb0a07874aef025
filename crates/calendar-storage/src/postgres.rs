//! PostgreSQL implementation of EventStore
//!
//! Production persistence using PostgreSQL with:
//! - Embedded sqlx migrations applied on connect
//! - One statement per round trip for every contract method
//! - The shared closed-interval predicate for conflict detection
//!
//! The conflict check and the following insert/update are separate
//! statements, so two concurrent writers for the same user can both pass
//! the check. Callers that need strict exclusion across processes must
//! serialize writes per user.

use async_trait::async_trait;
use calendar_core::{intervals_conflict, validate_event, validate_update, Event};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, error, instrument};

use super::store::*;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Row shape of the `events` table
#[derive(Debug, Clone, FromRow)]
struct EventRow {
    id: i64,
    user_id: i64,
    title: String,
    description: String,
    on_time: DateTime<Utc>,
    off_time: DateTime<Utc>,
    notify_time: Option<DateTime<Utc>>,
    notified: bool,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            on_time: row.on_time,
            off_time: row.off_time,
            notify_time: row.notify_time,
            notified: row.notified,
        }
    }
}

#[derive(Debug, FromRow)]
struct IntervalRow {
    id: i64,
    on_time: DateTime<Utc>,
    off_time: DateTime<Utc>,
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| {
        error!("Failed to {}: {}", context, e);
        StoreError::Database(e.to_string())
    }
}

/// PostgreSQL implementation of EventStore
///
/// # Example
///
/// ```ignore
/// use calendar_storage::{EventStore, PostgresEventStore};
///
/// let store = PostgresEventStore::from_url("postgres://localhost/calendar")?;
/// store.connect().await?;
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a store over an existing connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a store whose pool connects on first use
    pub fn from_url(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_lazy(database_url)
            .map_err(db_error("configure connection pool"))?;
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_exists(&self, id: i64) -> Result<(), StoreError> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM events WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("look up event"))?;

        found.map(|_| ()).ok_or(StoreError::NotFound(id))
    }
}

const EVENT_COLUMNS: &str =
    "id, user_id, title, description, on_time, off_time, notify_time, notified";

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self))]
    async fn connect(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await.map_err(|e| {
            error!("Failed to run migrations: {}", e);
            StoreError::Database(e.to_string())
        })?;

        debug!("connected to event database");
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        debug!("closed event database pool");
        Ok(())
    }

    #[instrument(skip(self, event), fields(user_id = event.user_id))]
    async fn insert_event(&self, event: &Event) -> Result<i64, StoreError> {
        validate_event(event)?;
        self.is_busy_date_time_range(0, event.user_id, event.on_time, event.off_time)
            .await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO events (user_id, title, description, on_time, off_time, notify_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(event.user_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.on_time)
        .bind(event.off_time)
        .bind(event.notify_time)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("insert event"))?;

        debug!(id, "inserted event");
        Ok(id)
    }

    #[instrument(skip(self, event), fields(id = event.id, user_id = event.user_id))]
    async fn update_event(&self, event: &Event) -> Result<(), StoreError> {
        validate_update(event)?;
        self.ensure_exists(event.id).await?;
        self.is_busy_date_time_range(event.id, event.user_id, event.on_time, event.off_time)
            .await?;

        // SET expressions see the old row, so `notified` compares against the previous reminder
        let result = sqlx::query(
            r#"
            UPDATE events
            SET user_id = $2,
                title = $3,
                description = $4,
                on_time = $5,
                off_time = $6,
                notified = notified AND notify_time IS NOT DISTINCT FROM $7,
                notify_time = $7
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(event.user_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.on_time)
        .bind(event.off_time)
        .bind(event.notify_time)
        .execute(&self.pool)
        .await
        .map_err(db_error("update event"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(event.id));
        }

        debug!("updated event");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_event(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("delete event"))?;

        if result.rows_affected() > 0 {
            debug!(id, "deleted event");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_event_by_id(&self, id: i64) -> Result<Event, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get event"))?
        .ok_or(StoreError::NotFound(id))?;

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn get_all_events(&self, user_id: i64) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list events"))?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_all_range(
        &self,
        user_id: i64,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE user_id = $1
              AND (on_time BETWEEN $2 AND $3 OR off_time BETWEEN $2 AND $3)
            "#
        ))
        .bind(user_id)
        .bind(begin)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("query event range"))?;

        Ok(rows.into_iter().map(Event::from).collect())
    }

    #[instrument(skip(self))]
    async fn is_busy_date_time_range(
        &self,
        exclude_id: i64,
        user_id: i64,
        on_time: DateTime<Utc>,
        off_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        // The WHERE clause narrows candidates; the shared predicate decides
        let candidates = sqlx::query_as::<_, IntervalRow>(
            r#"
            SELECT id, on_time, off_time
            FROM events
            WHERE user_id = $1
              AND id <> $2
              AND on_time <= $4
              AND off_time >= $3
            "#,
        )
        .bind(user_id)
        .bind(exclude_id)
        .bind(on_time)
        .bind(off_time)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("check busy range"))?;

        match candidates
            .iter()
            .find(|c| intervals_conflict(c.on_time, c.off_time, on_time, off_time))
        {
            Some(c) => Err(StoreError::Conflict {
                user_id,
                conflicting_id: c.id,
            }),
            None => Ok(()),
        }
    }

    #[instrument(skip(self))]
    async fn get_events_day_of_notice(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE notified = FALSE
              AND notify_time IS NOT NULL
              AND notify_time <= $1
            "#
        ))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("scan due reminders"))?;

        if !rows.is_empty() {
            debug!(count = rows.len(), "found due reminders");
        }
        Ok(rows.into_iter().map(Event::from).collect())
    }

    #[instrument(skip(self))]
    async fn delete_events_older_date(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM events WHERE off_time < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_error("purge expired events"))?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(deleted, "purged expired events");
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn update_event_notified(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE events SET notified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_error("mark event notified"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}
