//! # Temporal Types — UTC-Only Timestamps
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to millisecond
//! precision. Audit records hash their timestamp, so the representation must
//! be deterministic: always UTC, always `Z`, always three fractional digits.
//!
//! Non-UTC inputs are **rejected** by [`Timestamp::parse()`]; there is no
//! silent offset conversion on the strict path.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SignoffError;

/// A UTC-only timestamp, truncated to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self(truncate_to_millis(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-millisecond precision.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_millis(dt))
    }

    /// Parse an RFC 3339 string. Only the `Z` suffix is accepted.
    pub fn parse(s: &str) -> Result<Self, SignoffError> {
        if !s.ends_with('Z') {
            return Err(SignoffError::validation(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            SignoffError::validation(format!("invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_millis(dt.with_timezone(&Utc))))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// This timestamp shifted forward by whole days.
    pub fn plus_days(&self, days: u32) -> Self {
        Self(self.0 + Duration::days(i64::from(days)))
    }

    /// Render as ISO 8601 with millisecond precision and `Z` suffix.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    let millis = dt.nanosecond() / 1_000_000;
    dt.with_nanosecond(millis * 1_000_000).unwrap_or(dt)
}
