// libs/scheduling-cell/src/dates.rs
//
// Canonical date arithmetic for the scheduling core. Every component that
// touches a calendar day goes through this module so that weekly views,
// advance-notice checks and chat-extracted dates all agree on what "day"
// means regardless of the caller's timezone.
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

use crate::models::SchedulingError;

/// A validated (year, month, day) triple with a canonical `YYYY-MM-DD`
/// string form. Immutable; derived values always return new instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self, SchedulingError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(CalendarDate)
            .ok_or_else(|| {
                SchedulingError::InvalidDate(format!("{:04}-{:02}-{:02}", year, month, day))
            })
    }

    pub fn from_naive(date: NaiveDate) -> Self {
        CalendarDate(date)
    }

    /// Strict parse of the canonical `YYYY-MM-DD` form. Anything else is an
    /// error; lenient formats go through [`validate_and_normalize`].
    pub fn parse(s: &str) -> Result<Self, SchedulingError> {
        let trimmed = s.trim();
        if trimmed.len() != 10 {
            return Err(SchedulingError::InvalidDate(s.to_string()));
        }
        let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map_err(|_| SchedulingError::InvalidDate(s.to_string()))?;
        // Round-trip guard: rejects inputs chrono would accept loosely.
        if parsed.format("%Y-%m-%d").to_string() != trimmed {
            return Err(SchedulingError::InvalidDate(s.to_string()));
        }
        Ok(CalendarDate(parsed))
    }

    /// The current date in the clinic's operating timezone, derived from an
    /// injected instant. Never round-trips through a UTC date string.
    pub fn today(now: DateTime<Utc>, utc_offset_minutes: i32) -> Self {
        let local = now + Duration::minutes(utc_offset_minutes as i64);
        CalendarDate(local.date_naive())
    }

    /// Pure day arithmetic with month/year rollover.
    pub fn add_days(&self, n: i64) -> Self {
        CalendarDate(
            self.0
                .checked_add_signed(Duration::days(n))
                .unwrap_or(self.0),
        )
    }

    pub fn compare(&self, other: &CalendarDate) -> Ordering {
        self.0.cmp(&other.0)
    }

    /// First day of the week containing this date. Weeks start on Sunday;
    /// every weekly view relies on this one convention.
    pub fn start_of_week(&self) -> Self {
        let back = self.0.weekday().num_days_from_sunday() as i64;
        self.add_days(-back)
    }

    /// Weekday index with 0 = Sunday, matching the business-hours table.
    pub fn weekday_index(&self) -> u32 {
        self.0.weekday().num_days_from_sunday()
    }

    pub fn day_name(&self) -> &'static str {
        match self.weekday_index() {
            0 => "domingo",
            1 => "lunes",
            2 => "martes",
            3 => "miércoles",
            4 => "jueves",
            5 => "viernes",
            _ => "sábado",
        }
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl Serialize for CalendarDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

struct CalendarDateVisitor;

impl<'de> Visitor<'de> for CalendarDateVisitor {
    type Value = CalendarDate;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a date string in YYYY-MM-DD format")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<CalendarDate, E> {
        CalendarDate::parse(value).map_err(|_| E::custom(format!("invalid date: {}", value)))
    }
}

impl<'de> Deserialize<'de> for CalendarDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(CalendarDateVisitor)
    }
}

/// Outcome of lenient input normalization. A detected displacement is
/// auto-corrected but always surfaced so callers can log it.
#[derive(Debug, Clone, Serialize)]
pub struct DateNormalization {
    pub normalized: CalendarDate,
    pub displacement_detected: bool,
}

/// Normalizes the date formats that reach this system from the web UI and
/// the chat channel:
///
/// - `YYYY-MM-DD` is accepted as-is.
/// - An RFC3339 datetime is reduced to the calendar day written in it. When
///   converting that instant into the clinic's timezone would land on a
///   *different* day, the input is flagged as displaced and the written day
///   wins. This is the "day shifts by one" bug class.
/// - `DD/MM/YYYY` is converted to the canonical form.
///
/// Malformed input is always an error, never silently corrected.
pub fn validate_and_normalize(
    raw: &str,
    utc_offset_minutes: i32,
) -> Result<DateNormalization, SchedulingError> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(SchedulingError::InvalidDate(raw.to_string()));
    }

    // Canonical form first.
    if let Ok(date) = CalendarDate::parse(trimmed) {
        return Ok(DateNormalization {
            normalized: date,
            displacement_detected: false,
        });
    }

    // RFC3339 datetime: the intended day is the one written in the string,
    // not the one the instant resolves to in some other timezone.
    if trimmed.len() > 10 && trimmed.as_bytes()[10] == b'T' {
        let written = CalendarDate::parse(&trimmed[..10])?;

        if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
            let clinic_day =
                CalendarDate::today(instant.with_timezone(&Utc), utc_offset_minutes);
            return Ok(DateNormalization {
                normalized: written,
                displacement_detected: clinic_day != written,
            });
        }

        // Naive datetime (no offset): no instant to displace, keep the
        // written day.
        return Ok(DateNormalization {
            normalized: written,
            displacement_detected: false,
        });
    }

    // DD/MM/YYYY from chat or legacy forms.
    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() == 3 {
        let day: u32 = parts[0]
            .parse()
            .map_err(|_| SchedulingError::InvalidDate(raw.to_string()))?;
        let month: u32 = parts[1]
            .parse()
            .map_err(|_| SchedulingError::InvalidDate(raw.to_string()))?;
        let year: i32 = parts[2]
            .parse()
            .map_err(|_| SchedulingError::InvalidDate(raw.to_string()))?;
        let date = CalendarDate::new(year, month, day)?;
        return Ok(DateNormalization {
            normalized: date,
            displacement_detected: false,
        });
    }

    Err(SchedulingError::InvalidDate(raw.to_string()))
}
