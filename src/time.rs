// ============================================================================
// Time of Day
// ============================================================================

use crate::error::{Result, TransitError};
use std::fmt;

const SECONDS_PER_HOUR: u32 = 3600;
const SECONDS_PER_MINUTE: u32 = 60;

/// Seconds since local midnight of the service day.
///
/// Values of 24:00:00 and beyond are continuations of the same service day
/// and are kept as-is; only [`TimeOfDay::display_12h`] wraps the hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        TimeOfDay(hours * SECONDS_PER_HOUR + minutes * SECONDS_PER_MINUTE + seconds)
    }

    pub fn from_seconds(seconds: u32) -> Self {
        TimeOfDay(seconds)
    }

    /// Parses a feed time of the form `HH:MM:SS` (hours may exceed 23).
    pub fn parse(time_str: &str) -> Result<Self> {
        let parts = split_numbers(time_str)?;
        match parts.as_slice() {
            [h, m, s] => checked_hms(*h, *m, *s).ok_or_else(|| invalid(time_str)),
            _ => Err(invalid(time_str)),
        }
    }

    /// Parses a target time of the form `HH:MM`.
    pub fn parse_hh_mm(time_str: &str) -> Result<Self> {
        let parts = split_numbers(time_str)?;
        match parts.as_slice() {
            [h, m] => checked_hms(*h, *m, 0).ok_or_else(|| invalid(time_str)),
            _ => Err(invalid(time_str)),
        }
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    pub fn hours(self) -> u32 {
        self.0 / SECONDS_PER_HOUR
    }

    pub fn minutes(self) -> u32 {
        (self.0 % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE
    }

    /// Signed distance in seconds from `other` to `self`.
    pub fn seconds_since(self, other: TimeOfDay) -> i64 {
        i64::from(self.0) - i64::from(other.0)
    }

    /// Wall-clock rendering such as `1:30 AM`; 25:30 displays as 1:30 AM.
    pub fn display_12h(self) -> String {
        let hour = self.hours() % 24;
        let period = if hour < 12 { "AM" } else { "PM" };
        let hour = match hour % 12 {
            0 => 12,
            h => h,
        };
        format!("{}:{:02} {}", hour, self.minutes(), period)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hours(),
            self.minutes(),
            self.0 % SECONDS_PER_MINUTE
        )
    }
}

fn split_numbers(time_str: &str) -> Result<Vec<u32>> {
    time_str
        .split(':')
        .map(|part| part.trim().parse::<u32>().map_err(|_| invalid(time_str)))
        .collect()
}

fn checked_hms(hours: u32, minutes: u32, seconds: u32) -> Option<TimeOfDay> {
    hours
        .checked_mul(SECONDS_PER_HOUR)?
        .checked_add(minutes.checked_mul(SECONDS_PER_MINUTE)?)?
        .checked_add(seconds)
        .map(TimeOfDay)
}

fn invalid(time_str: &str) -> TransitError {
    TransitError::RowParse(format!("'{}' is not a valid time", time_str))
}
