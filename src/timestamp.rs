use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, SecondsFormat, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BuildTrendError, Result};

const NANOS_PER_SECOND: f64 = 1e9;

/// A point in time broken down into its calendar components.
///
/// Carries both a formatted RFC 3339 string and the numeric seconds value it
/// was derived from, so exports can be grouped by any component (day of week,
/// hour, ...) without re-parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTimestamp {
    pub isotimestamp: String,
    pub timestamp_seconds: f64,
    pub year: i32,
    pub month: u32,
    pub month_short_en: String,
    pub month_full_en: String,
    pub day_of_month: u32,
    /// ISO weekday, Monday is 1
    pub day_of_week: u32,
    pub day_of_week_short_en: String,
    pub day_of_week_full_en: String,
    pub hour_24: u32,
    pub hour_12: u32,
    pub hour_ampm: String,
    pub minute: u32,
    pub second: u32,
    pub microsecond: u32,
    pub timezone: String,
    /// Offset in seconds east of UTC
    pub timezone_offset: i32,
}

impl SplitTimestamp {
    pub fn to_value(&self) -> Value {
        // plain scalar fields, serialization cannot fail
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Parses a raw numeric timestamp as found in CSV exports and log tags.
///
/// # Errors
///
/// Returns `BuildTrendError::Type` when `raw` is not a finite number.
pub fn parse_seconds(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| BuildTrendError::Type(format!("timestamp '{raw}' is not numeric")))
}

/// Splits an epoch timestamp in seconds (fractions allowed) into a `SplitTimestamp` in UTC.
///
/// # Errors
///
/// - `BuildTrendError::Type` if `seconds` is NaN or infinite
/// - `BuildTrendError::Value` if `seconds` is negative or out of range
pub fn split(seconds: f64) -> Result<SplitTimestamp> {
    if !seconds.is_finite() {
        return Err(BuildTrendError::Type(format!(
            "timestamp {seconds} is not a number"
        )));
    }
    if seconds < 0.0 {
        return Err(BuildTrendError::Value(format!(
            "timestamp {seconds} is negative"
        )));
    }

    let mut whole = seconds.trunc();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut micros = ((seconds - whole) * 1e6).round() as u32;
    if micros >= 1_000_000 {
        whole += 1.0;
        micros = 0;
    }

    #[allow(clippy::cast_possible_truncation)]
    let datetime = DateTime::from_timestamp(whole as i64, micros * 1000)
        .ok_or_else(|| BuildTrendError::Value(format!("timestamp {seconds} is out of range")))?;

    Ok(split_datetime(&datetime.fixed_offset(), seconds))
}

/// Same as [`split`], for a timestamp expressed in nanoseconds.
///
/// Fractions of a nanosecond are truncated, so `123456789.5` ns and
/// `0.123456789` s produce identical results.
///
/// # Errors
///
/// See [`split`].
pub fn split_nano(nanoseconds: f64) -> Result<SplitTimestamp> {
    split(nano_to_seconds(nanoseconds)?)
}

/// Parses an ISO 8601 date/time string into a `SplitTimestamp`.
///
/// Accepts RFC 3339 strings (`2014-07-08T11:18:13Z`, `...+02:00`) and
/// strings without offset, which are taken as UTC.
///
/// # Errors
///
/// Returns `BuildTrendError::Value` for malformed input.
pub fn split_isotimestamp(isotimestamp: &str) -> Result<SplitTimestamp> {
    let trimmed = isotimestamp.trim();

    let datetime = DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| {
            NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
                .map(|naive| naive.and_utc().fixed_offset())
        })
        .map_err(|e| {
            BuildTrendError::Value(format!("invalid ISO 8601 timestamp '{isotimestamp}': {e}"))
        })?;

    #[allow(clippy::cast_precision_loss)]
    let seconds =
        datetime.timestamp() as f64 + f64::from(datetime.timestamp_subsec_micros()) / 1e6;

    Ok(split_datetime(&datetime, seconds))
}

/// Converts nanoseconds to seconds, dropping fractions of a nanosecond.
///
/// # Errors
///
/// - `BuildTrendError::Type` if `nanoseconds` is NaN or infinite
/// - `BuildTrendError::Value` if `nanoseconds` is negative
pub fn nano_to_seconds(nanoseconds: f64) -> Result<f64> {
    if !nanoseconds.is_finite() {
        return Err(BuildTrendError::Type(format!(
            "nanosecond value {nanoseconds} is not a number"
        )));
    }
    if nanoseconds < 0.0 {
        return Err(BuildTrendError::Value(format!(
            "nanosecond value {nanoseconds} is negative"
        )));
    }
    Ok(nanoseconds.trunc() / NANOS_PER_SECOND)
}

fn split_datetime(datetime: &DateTime<FixedOffset>, seconds: f64) -> SplitTimestamp {
    let offset = datetime.offset().local_minus_utc();
    let (is_pm, hour_12) = datetime.hour12();

    SplitTimestamp {
        isotimestamp: datetime.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        timestamp_seconds: seconds,
        year: datetime.year(),
        month: datetime.month(),
        month_short_en: datetime.format("%b").to_string(),
        month_full_en: datetime.format("%B").to_string(),
        day_of_month: datetime.day(),
        day_of_week: datetime.weekday().number_from_monday(),
        day_of_week_short_en: datetime.format("%a").to_string(),
        day_of_week_full_en: datetime.format("%A").to_string(),
        hour_24: datetime.hour(),
        hour_12,
        hour_ampm: if is_pm { "PM" } else { "AM" }.to_string(),
        minute: datetime.minute(),
        second: datetime.second(),
        microsecond: datetime.timestamp_subsec_micros(),
        timezone: if offset == 0 {
            "UTC".to_string()
        } else {
            datetime.format("%:z").to_string()
        },
        timezone_offset: offset,
    }
}
