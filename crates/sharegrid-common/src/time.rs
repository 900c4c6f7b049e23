//! Timestamps carried by cells, column data and protocol messages.
//!
//! All dates are UTC with millisecond resolution on the wire. The epoch is
//! the "never set" marker used by undefined cell values.

use chrono::{DateTime, TimeZone, Utc};

pub type Timestamp = DateTime<Utc>;

/// Date of every undefined sentinel value.
pub const EPOCH: Timestamp = DateTime::<Utc>::UNIX_EPOCH;

pub fn from_epoch_millis(millis: i64) -> Timestamp {
    Utc.timestamp_millis_opt(millis).single().unwrap_or(EPOCH)
}

pub fn to_epoch_millis(date: &Timestamp) -> i64 {
    date.timestamp_millis()
}

/// Truncate to the millisecond precision used on the wire, so dates survive
/// a serialization round trip unchanged.
pub fn truncate_millis(date: Timestamp) -> Timestamp {
    from_epoch_millis(date.timestamp_millis())
}
