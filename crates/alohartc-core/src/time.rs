//! Timestamps as they appear on the signaling wire.
//!
//! The signaling server reports instants as RFC 3339 strings
//! (`2024-01-01T00:00:00Z`). Older servers, and anything that serializes a
//! JavaScript `Date` by value, send integer milliseconds since the Unix
//! epoch instead. Both are materialized into a [`DateTime<Utc>`].

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use thiserror::Error;

/// Errors produced when a wire timestamp cannot be materialized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// The string is neither RFC 3339 nor a plain `YYYY-MM-DD` date.
    #[error("invalid timestamp {value:?}: {reason}")]
    Invalid { value: String, reason: String },

    /// Epoch milliseconds outside the range chrono can represent.
    #[error("epoch milliseconds out of range: {0}")]
    OutOfRange(i64),
}

/// Parses a wire timestamp string.
///
/// Accepts RFC 3339 date-times (any offset, normalized to UTC) and bare
/// dates, which are taken as midnight UTC.
///
/// # Example
///
/// ```rust
/// use alohartc_core::parse_timestamp;
///
/// let ts = parse_timestamp("2024-01-01T02:00:00+02:00").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
/// ```
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = value.trim();
    match DateTime::parse_from_rfc3339(trimmed) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(rfc_err) => match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            Ok(date) => Ok(date
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc())
                .unwrap_or_default()),
            Err(_) => Err(TimestampError::Invalid {
                value: value.to_string(),
                reason: rfc_err.to_string(),
            }),
        },
    }
}

/// Converts integer milliseconds since the Unix epoch.
pub fn from_epoch_millis(millis: i64) -> Result<DateTime<Utc>, TimestampError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(TimestampError::OutOfRange(millis))
}

/// Formats a timestamp the way the signaling server writes them.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Serde adapter for fields that must always hold a materialized timestamp.
///
/// Use with `#[serde(with = "alohartc_core::time::wire")]`. Serializes as an
/// RFC 3339 string; deserializes from a string or from epoch milliseconds.
pub mod wire {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        struct WireTimestamp;

        impl de::Visitor<'_> for WireTimestamp {
            type Value = DateTime<Utc>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an RFC 3339 timestamp string or epoch milliseconds")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                super::parse_timestamp(value).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                super::from_epoch_millis(value).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                let millis = i64::try_from(value).map_err(E::custom)?;
                super::from_epoch_millis(millis).map_err(E::custom)
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
                super::from_epoch_millis(value.trunc() as i64).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(WireTimestamp)
    }
}
