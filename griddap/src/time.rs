//! Conversion between stored numeric time values and calendar timestamps.
//!
//! Time coordinates follow the CF convention of a unit and an epoch, eg
//! `"hours since 1990-01-01 00:00:00"`. Only the standard (proleptic) Gregorian calendar is
//! supported.
//!
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime, SubsecRound};

use crate::errors::{Error, Result};

pub type Timestamp = NaiveDateTime;

/// Format used for time ranges passed around as strings
pub const DEFAULT_FORMAT: &str = "%Y%m%d.%H%M%S";

/// Units given to synthetic time variables
pub const EPOCH_UNITS: &str = "seconds since 1970-01-01";

const CALENDARS: [&str; 3] = ["standard", "gregorian", "proleptic_gregorian"];

const EPOCH_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

#[derive(Clone, Debug, PartialEq)]
pub struct TimeUnits {
    /// Length of one unit, in microseconds
    pub micros: i64,

    /// The instant corresponding to a stored value of zero
    pub epoch: Timestamp,
}

impl TimeUnits {
    /// Parse CF units, eg `"days since 1900-01-01"`.
    ///
    pub fn parse(units: &str) -> Result<Self> {
        let bad = || Error::BadTimeUnits(units.to_string());
        let (unit, epoch) = units.split_once(" since ").ok_or_else(bad)?;
        let micros = match unit.trim().to_lowercase().as_str() {
            "microseconds" | "microsecond" | "us" => 1,
            "milliseconds" | "millisecond" | "ms" => 1_000,
            "seconds" | "second" | "secs" | "sec" | "s" => 1_000_000,
            "minutes" | "minute" | "mins" | "min" => 60_000_000,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3_600_000_000,
            "days" | "day" | "d" => 86_400_000_000,
            _ => return Err(bad()),
        };
        let epoch = parse_epoch(epoch).ok_or_else(bad)?;

        Ok(Self { micros, epoch })
    }

    /// Parse CF units, checking the calendar attribute (if any) is one we can honor.
    ///
    pub fn with_calendar(units: &str, calendar: Option<&str>) -> Result<Self> {
        if let Some(calendar) = calendar {
            let calendar = calendar.trim().to_lowercase();
            if !CALENDARS.contains(&calendar.as_str()) {
                return Err(Error::BadTimeUnits(format!(
                    "{units} (unsupported calendar {calendar})"
                )));
            }
        }

        Self::parse(units)
    }

    /// Convert a stored value to a timestamp, rounded to the microsecond
    ///
    pub fn decode(&self, value: f64) -> Result<Timestamp> {
        let micros = (value * self.micros as f64).round();
        if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
            return Err(Error::TimeOutOfRange(value));
        }

        self.epoch
            .checked_add_signed(Duration::microseconds(micros as i64))
            .ok_or(Error::TimeOutOfRange(value))
    }

    pub fn decode_all<I>(&self, values: I) -> Result<Vec<Timestamp>>
    where
        I: IntoIterator<Item = f64>,
    {
        values.into_iter().map(|value| self.decode(value)).collect()
    }

    /// Convert a timestamp to a value in these units
    ///
    pub fn encode(&self, timestamp: Timestamp) -> f64 {
        let delta = timestamp - self.epoch;
        match delta.num_microseconds() {
            Some(micros) => micros as f64 / self.micros as f64,
            None => delta.num_seconds() as f64 * 1e6 / self.micros as f64,
        }
    }

    pub fn encode_all(&self, timestamps: &[Timestamp]) -> Vec<f64> {
        timestamps.iter().map(|t| self.encode(*t)).collect()
    }
}

impl FromStr for TimeUnits {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_epoch(epoch: &str) -> Option<Timestamp> {
    let mut epoch = epoch.trim();
    for suffix in ["UTC", "Z", "+00:00", "+0000"] {
        if epoch.len() > 10 {
            if let Some(stripped) = epoch.strip_suffix(suffix) {
                epoch = stripped.trim_end();
                break;
            }
        }
    }

    for format in EPOCH_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(epoch, format) {
            return Some(timestamp);
        }
    }

    NaiveDate::parse_from_str(epoch, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Parse a timestamp given as a string in the given format
///
pub fn parse_timestamp(value: &str, format: &str) -> Result<Timestamp> {
    NaiveDateTime::parse_from_str(value, format).map_err(|_| Error::BadTimestamp {
        value: value.to_string(),
        format: format.to_string(),
    })
}

/// Timestamps are compared at whole second resolution when matching times from different files
/// or from an existing store.
///
pub fn key(timestamp: Timestamp) -> Timestamp {
    timestamp.round_subsecs(0)
}
