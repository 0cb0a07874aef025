// Calendar event model
// Decision: Unset instants are represented by the Unix epoch (DateTime::default)
// so that partially filled requests deserialize and fail validation instead of parsing

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 150;

/// A user-owned, time-bounded calendar entry with an optional reminder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    /// Store-assigned identifier, 0 until persisted
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub on_time: DateTime<Utc>,
    pub off_time: DateTime<Utc>,
    /// Reminder instant, `None` means no reminder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_time: Option<DateTime<Utc>>,
    /// Set by the sender once the reminder was delivered; never taken from clients
    #[serde(skip)]
    pub notified: bool,
}

impl Event {
    /// Create an event occupying `[on_time, off_time]` for `user_id`
    pub fn new(
        user_id: i64,
        title: impl Into<String>,
        on_time: DateTime<Utc>,
        off_time: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            title: title.into(),
            on_time,
            off_time,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_notify_time(mut self, notify_time: DateTime<Utc>) -> Self {
        self.notify_time = Some(notify_time);
        self
    }

    /// Whether the reminder is due at `as_of` and has not been delivered yet
    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        !self.notified && self.notify_time.is_some_and(|t| t <= as_of)
    }
}

/// Whether an instant carries the "unset" value
pub fn is_unset(instant: &DateTime<Utc>) -> bool {
    *instant == DateTime::<Utc>::default()
}
