//! # Temporal Types: UTC-Only Timestamps
//!
//! `Timestamp` is the only instant type that crosses crate boundaries. It is
//! always UTC and truncated to whole seconds, so two records written in the
//! same second compare equal regardless of backend precision.
//!
//! Business dates (a warranty's request date, a device's warranty expiry) are
//! plain `chrono::NaiveDate`s. Converting an instant to a date requires an
//! explicit offset: see [`Timestamp::date_in`].

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string. Only the `Z` suffix is accepted.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if !s.ends_with('Z') {
            return Err(CoreError::InvalidTimestamp(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| CoreError::InvalidTimestamp(format!("{s:?}: {e}")))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// The calendar date of this instant as observed at `offset`.
    pub fn date_in(&self, offset: FixedOffset) -> NaiveDate {
        self.0.with_timezone(&offset).date_naive()
    }

    /// This instant shifted by a whole number of days.
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Render as ISO 8601 with Z suffix.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Build a `FixedOffset` from a minute count east of UTC.
pub fn offset_from_minutes(minutes: i32) -> Result<FixedOffset, CoreError> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(CoreError::InvalidOffset { minutes })
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_has_no_subseconds() {
        assert_eq!(Timestamp::now().as_datetime().nanosecond(), 0);
    }

    #[test]
    fn test_parse_z_suffix_accepted() {
        let ts = Timestamp::parse("2026-01-15T12:00:00.250Z").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:00:00Z");
    }

    #[test]
    fn test_parse_offset_rejected() {
        assert!(Timestamp::parse("2026-01-15T12:00:00+07:00").is_err());
        assert!(Timestamp::parse("not-a-date").is_err());
    }

    #[test]
    fn test_date_in_crosses_midnight_with_offset() {
        let ts = Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 3, 31, 20, 30, 0).unwrap());
        let plus_seven = offset_from_minutes(7 * 60).unwrap();
        assert_eq!(ts.date_in(plus_seven), NaiveDate::from_ymd_opt(2026, 4, 1).unwrap());
        let utc = offset_from_minutes(0).unwrap();
        assert_eq!(ts.date_in(utc), NaiveDate::from_ymd_opt(2026, 3, 31).unwrap());
    }

    #[test]
    fn test_offset_out_of_range() {
        assert_eq!(
            offset_from_minutes(24 * 60),
            Err(CoreError::InvalidOffset { minutes: 24 * 60 })
        );
    }

    #[test]
    fn test_plus_days_orders() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert!(ts < ts.plus_days(1));
        assert_eq!(ts.plus_days(1).to_iso8601(), "2026-01-16T12:00:00Z");
    }
}
