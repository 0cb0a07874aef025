//! Structural rules an event must satisfy before it is persisted
//!
//! Both the calendar facade and every store backend run these checks, so a
//! record that reaches storage always has a non-zero owner, a bounded title
//! and a well-formed interval. Overlap with other events needs the
//! store's view of the user's calendar and lives in [`crate::span`].

use crate::event::{is_unset, Event, MAX_TITLE_LEN};

/// Rule violated by an event, identified by field
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("wrong id: id is zero")]
    MissingId,

    #[error("wrong userId: must be non-zero")]
    MissingUserId,

    #[error("wrong title: length {len}, must be <= {MAX_TITLE_LEN}")]
    TitleTooLong { len: usize },

    #[error("wrong onTime: empty")]
    MissingOnTime,

    #[error("wrong offTime: empty")]
    MissingOffTime,

    #[error("wrong offTime: must be after onTime")]
    OffTimeNotAfterOnTime,

    #[error("wrong notifyTime: must be within [onTime, offTime]")]
    NotifyTimeOutOfRange,
}

impl ValidationError {
    /// Wire name of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingId => "id",
            Self::MissingUserId => "userId",
            Self::TitleTooLong { .. } => "title",
            Self::MissingOnTime => "onTime",
            Self::MissingOffTime | Self::OffTimeNotAfterOnTime => "offTime",
            Self::NotifyTimeOutOfRange => "notifyTime",
        }
    }
}

/// Check the structural rules for a new event
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    if event.user_id == 0 {
        return Err(ValidationError::MissingUserId);
    }

    let len = event.title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong { len });
    }

    if is_unset(&event.on_time) {
        return Err(ValidationError::MissingOnTime);
    }

    if is_unset(&event.off_time) {
        return Err(ValidationError::MissingOffTime);
    }
    if event.off_time <= event.on_time {
        return Err(ValidationError::OffTimeNotAfterOnTime);
    }

    if let Some(notify_time) = event.notify_time {
        if notify_time < event.on_time || notify_time > event.off_time {
            return Err(ValidationError::NotifyTimeOutOfRange);
        }
    }

    Ok(())
}

/// Same as [`validate_event`] plus the presence of an id, for updates
pub fn validate_update(event: &Event) -> Result<(), ValidationError> {
    if event.id == 0 {
        return Err(ValidationError::MissingId);
    }
    validate_event(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap()
    }

    fn valid() -> Event {
        Event::new(1, "review", t0(), t0() + Duration::hours(2))
            .with_notify_time(t0() + Duration::hours(1))
    }

    #[test]
    fn test_valid_event_passes() {
        assert_eq!(validate_event(&valid()), Ok(()));
    }

    #[test]
    fn test_zero_user_rejected() {
        let event = Event {
            user_id: 0,
            ..valid()
        };
        let err = validate_event(&event).unwrap_err();
        assert_eq!(err, ValidationError::MissingUserId);
        assert_eq!(err.field(), "userId");
    }

    #[test]
    fn test_title_length_counts_characters() {
        let at_limit = Event {
            title: "é".repeat(MAX_TITLE_LEN),
            ..valid()
        };
        assert_eq!(validate_event(&at_limit), Ok(()));

        let over = Event {
            title: "a".repeat(MAX_TITLE_LEN + 1),
            ..valid()
        };
        assert_eq!(
            validate_event(&over),
            Err(ValidationError::TitleTooLong { len: 151 })
        );
    }

    #[test]
    fn test_unset_times_rejected() {
        let no_on = Event {
            on_time: DateTime::default(),
            ..valid()
        };
        assert_eq!(validate_event(&no_on), Err(ValidationError::MissingOnTime));

        let no_off = Event {
            off_time: DateTime::default(),
            ..valid()
        };
        assert_eq!(validate_event(&no_off), Err(ValidationError::MissingOffTime));
    }

    #[test]
    fn test_off_time_must_follow_on_time() {
        let equal = Event {
            off_time: t0(),
            notify_time: None,
            ..valid()
        };
        assert_eq!(
            validate_event(&equal),
            Err(ValidationError::OffTimeNotAfterOnTime)
        );

        let before = Event {
            off_time: t0() - Duration::minutes(1),
            notify_time: None,
            ..valid()
        };
        assert_eq!(
            validate_event(&before),
            Err(ValidationError::OffTimeNotAfterOnTime)
        );
    }

    #[test]
    fn test_notify_time_bounds_are_inclusive() {
        let event = valid();
        for notify in [event.on_time, event.off_time] {
            let e = Event {
                notify_time: Some(notify),
                ..valid()
            };
            assert_eq!(validate_event(&e), Ok(()));
        }

        for notify in [
            event.on_time - Duration::seconds(1),
            event.off_time + Duration::seconds(1),
        ] {
            let e = Event {
                notify_time: Some(notify),
                ..valid()
            };
            assert_eq!(
                validate_event(&e),
                Err(ValidationError::NotifyTimeOutOfRange)
            );
        }
    }

    #[test]
    fn test_update_requires_id() {
        assert_eq!(validate_update(&valid()), Err(ValidationError::MissingId));
        let stored = Event { id: 5, ..valid() };
        assert_eq!(validate_update(&stored), Ok(()));
    }
}
