//! Time and timestamp helpers.

use chrono::{DateTime, Utc};

/// UTC timestamp used for fire times, command issue times, event times, etc.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Add a whole number of seconds to a timestamp.
#[must_use]
pub fn add_seconds(ts: Timestamp, seconds: u32) -> Timestamp {
    ts + chrono::Duration::seconds(i64::from(seconds))
}
