// ============================================================================
// Service Calendar: which service ids run on a given date
// ============================================================================

use crate::error::{Result, TransitError};
use crate::tabular::{Record, Table};
use chrono::{Datelike, NaiveDate, Weekday};
use log::debug;
use std::collections::HashSet;

const FEED_DATE_FORMAT: &str = "%Y%m%d";

/// Weekly pattern of one service id, valid between two inclusive dates.
#[derive(Debug, Clone)]
pub struct CalendarEntry {
    pub service_id: String,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl CalendarEntry {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        if date < self.start_date || date > self.end_date {
            return false;
        }
        match date.weekday() {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    fn from_record(record: &Record<'_>) -> Result<Self> {
        let flag = |column: &str| record.field(column) == "1";
        Ok(CalendarEntry {
            service_id: record.field("service_id").to_string(),
            monday: flag("monday"),
            tuesday: flag("tuesday"),
            wednesday: flag("wednesday"),
            thursday: flag("thursday"),
            friday: flag("friday"),
            saturday: flag("saturday"),
            sunday: flag("sunday"),
            start_date: parse_feed_date(record.field("start_date"))?,
            end_date: parse_feed_date(record.field("end_date"))?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Added,
    Removed,
}

/// A one-day override of the weekly pattern.
#[derive(Debug, Clone)]
pub struct CalendarException {
    pub service_id: String,
    pub date: NaiveDate,
    pub exception: Exception,
}

impl CalendarException {
    fn from_record(record: &Record<'_>) -> Result<Self> {
        let exception = match record.field("exception_type") {
            "1" => Exception::Added,
            "2" => Exception::Removed,
            other => {
                return Err(TransitError::RowParse(format!(
                    "'{}' is not a known exception_type",
                    other
                )));
            }
        };
        Ok(CalendarException {
            service_id: record.field("service_id").to_string(),
            date: parse_feed_date(record.field("date"))?,
            exception,
        })
    }
}

/// Weekly patterns plus dated exceptions, in feed order.
#[derive(Debug, Clone, Default)]
pub struct ServiceCalendar {
    entries: Vec<CalendarEntry>,
    exceptions: Vec<CalendarException>,
}

impl ServiceCalendar {
    pub fn new(entries: Vec<CalendarEntry>, exceptions: Vec<CalendarException>) -> Self {
        ServiceCalendar { entries, exceptions }
    }

    /// Builds from `calendar.txt` and, when the feed ships one, `calendar_dates.txt`.
    pub fn from_tables(calendar: &Table, calendar_dates: Option<&Table>) -> Self {
        let entries = collect_rows(calendar, CalendarEntry::from_record);
        let exceptions = calendar_dates
            .map(|table| collect_rows(table, CalendarException::from_record))
            .unwrap_or_default();
        ServiceCalendar { entries, exceptions }
    }

    pub fn service_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.service_id.as_str())
            .chain(self.exceptions.iter().map(|e| e.service_id.as_str()))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Service ids running on `today`: weekly patterns first, then that day's
    /// exceptions applied in order, each one overriding the pattern.
    pub fn active_services(&self, today: NaiveDate) -> HashSet<String> {
        let mut active: HashSet<String> = self
            .entries
            .iter()
            .filter(|entry| entry.runs_on(today))
            .map(|entry| entry.service_id.clone())
            .collect();

        for exception in self.exceptions.iter().filter(|e| e.date == today) {
            match exception.exception {
                Exception::Added => {
                    active.insert(exception.service_id.clone());
                }
                Exception::Removed => {
                    active.remove(&exception.service_id);
                }
            }
        }

        active
    }
}

fn collect_rows<T, F>(table: &Table, parse: F) -> Vec<T>
where
    F: Fn(&Record<'_>) -> Result<T>,
{
    table
        .records()
        .filter_map(|record| match parse(&record) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!("Skipping {} row: {}", table.name(), e);
                None
            }
        })
        .collect()
}

fn parse_feed_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, FEED_DATE_FORMAT)
        .map_err(|e| TransitError::RowParse(format!("'{}' is not a YYYYMMDD date: {}", value, e)))
}
