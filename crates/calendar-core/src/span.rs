// Interval predicates shared by every store backend
// All spans are closed intervals: touching at an endpoint counts as overlap

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

/// Whether `instant` falls inside `[begin, end]`
pub fn in_span(begin: DateTime<Utc>, end: DateTime<Utc>, instant: DateTime<Utc>) -> bool {
    begin <= instant && instant <= end
}

/// Whether two occupied intervals of the same user conflict
///
/// They conflict when either interval's boundary falls inside the other one,
/// which for closed intervals is the same as `a_on <= b_off && b_on <= a_off`.
pub fn intervals_conflict(
    a_on: DateTime<Utc>,
    a_off: DateTime<Utc>,
    b_on: DateTime<Utc>,
    b_off: DateTime<Utc>,
) -> bool {
    a_on <= b_off && b_on <= a_off
}

/// Whether an event spanning `[on, off]` belongs to the range query `[begin, end]`
///
/// Matches when either endpoint of the event lies in the range.
pub fn touches_range(
    on: DateTime<Utc>,
    off: DateTime<Utc>,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    in_span(begin, end, on) || in_span(begin, end, off)
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::default()).and_utc()
}

fn last_instant_before(next: DateTime<Utc>) -> DateTime<Utc> {
    next - Duration::nanoseconds(1)
}

/// Calendar day containing `date`, as an inclusive range
pub fn day_bounds(date: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let begin = start_of(date.date_naive());
    (begin, last_instant_before(begin + Duration::days(1)))
}

/// Monday-to-Sunday week containing `date`, as an inclusive range
pub fn week_bounds(date: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = i64::from(date.weekday().num_days_from_monday());
    let begin = start_of(date.date_naive()) - Duration::days(offset);
    (begin, last_instant_before(begin + Duration::days(7)))
}

/// Month containing `date`, as an inclusive range
pub fn month_bounds(date: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = date.date_naive();
    let first = day.with_day(1).unwrap_or(day);
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };

    let end = next_first
        .map(|next| last_instant_before(start_of(next)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    (start_of(first), end)
}
