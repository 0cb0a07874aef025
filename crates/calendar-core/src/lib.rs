//! # Calendar core
//!
//! Domain types shared by every part of the notification pipeline:
//!
//! - [`Event`]: a user's occupied interval with an optional reminder
//! - [`NotificationMsg`]: the reminder record published by the scheduler
//! - [`validate_event`] / [`validate_update`]: structural invariants
//! - [`span`]: closed-interval predicates and day/week/month bounds
//!
//! ```text
//!  client ──▶ Calendar ──▶ EventStore ◀── Scheduler ──▶ queue ──▶ Sender
//!                              ▲                                    │
//!                              └──────── update_event_notified ─────┘
//! ```

pub mod event;
pub mod notification;
pub mod span;
pub mod validation;

pub use event::{is_unset, Event, MAX_TITLE_LEN};
pub use notification::{NotificationMsg, CONTENT_TYPE};
pub use span::{
    day_bounds, in_span, intervals_conflict, month_bounds, touches_range, week_bounds,
};
pub use validation::{validate_event, validate_update, ValidationError};
