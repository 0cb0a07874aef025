// Notification message carried from the scheduler to the sender

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Content type of encoded notification messages
pub const CONTENT_TYPE: &str = "application/json";

/// Reminder for a single event, derived at publish time
///
/// Wire form: `{"id": 1, "title": "...", "date": "<RFC 3339>", "userId": 1}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMsg {
    pub id: i64,
    pub title: String,
    /// Start of the event being reminded about
    pub date: DateTime<Utc>,
    pub user_id: i64,
}

impl From<&Event> for NotificationMsg {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id,
            title: event.title.clone(),
            date: event.on_time,
            user_id: event.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_event() {
        let on = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let off = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();
        let mut event = Event::new(42, "dentist", on, off).with_notify_time(on);
        event.id = 9;

        let msg = NotificationMsg::from(&event);
        assert_eq!(msg.id, 9);
        assert_eq!(msg.user_id, 42);
        assert_eq!(msg.title, "dentist");
        assert_eq!(msg.date, on);
    }

    #[test]
    fn test_wire_keys() {
        let msg = NotificationMsg {
            id: 1,
            title: "t".into(),
            date: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            user_id: 2,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "title": "t",
                "date": "2024-01-02T03:04:05Z",
                "userId": 2
            })
        );
    }
}
