// ============================================================================
// Data Structures
// ============================================================================

use crate::error::Result;
use crate::time::TimeOfDay;
use serde::Serialize;

/// Route id → line letter for the rail lines whose feed short names are not letters.
const ROUTE_LINE_MAP: &[(&str, &str)] = &[
    ("801", "A"),
    ("802", "B"),
    ("803", "C"),
    ("804", "D"),
    ("806", "E"),
    ("805", "G"),
    ("807", "K"),
];

const LINE_COLORS: &[(&str, &str)] = &[
    ("A", "#0072bc"),
    ("B", "#e3242b"),
    ("C", "#58a738"),
    ("D", "#a05da5"),
    ("E", "#fdb913"),
    ("G", "#f58220"),
    ("K", "#e96bb0"),
];

const FALLBACK_LINE_COLOR: &str = "#888";

/// Line letter for a route, from the override table first, then the feed's short name.
pub fn line_for_route(route_id: &str, short_name: Option<&str>) -> Option<String> {
    ROUTE_LINE_MAP
        .iter()
        .find(|(id, _)| *id == route_id)
        .map(|(_, line)| line.to_string())
        .or_else(|| short_name.filter(|s| !s.is_empty()).map(str::to_string))
}

pub fn line_color(line: &str) -> &'static str {
    LINE_COLORS
        .iter()
        .find(|(l, _)| *l == line)
        .map(|(_, color)| *color)
        .unwrap_or(FALLBACK_LINE_COLOR)
}

/// Route ids that carry a line letter even when `routes.txt` omits them.
pub fn override_route_ids() -> impl Iterator<Item = &'static str> {
    ROUTE_LINE_MAP.iter().map(|(id, _)| *id)
}

#[derive(Debug, Clone)]
pub struct Stop {
    pub stop_id: String,
    pub stop_name: String,
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub route_id: String,
    pub short_name: String,
    pub line: String,
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub direction_id: Option<u32>,
    /// Feed headsign, or the one computed from the trip's last stop.
    pub headsign: String,
    pub line: String,
}

/// A raw stop-time row. Times are kept as text and parsed per query so a
/// malformed value only ever drops its own row.
#[derive(Debug, Clone)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub arrival_time: String,
    pub departure_time: String,
    pub stop_sequence: u32,
}

impl StopTime {
    /// Arrival time, falling back to the departure time when the arrival is blank.
    pub fn scheduled_time(&self) -> Result<TimeOfDay> {
        if self.arrival_time.is_empty() {
            TimeOfDay::parse(&self.departure_time)
        } else {
            TimeOfDay::parse(&self.arrival_time)
        }
    }
}

// ============================================================================
// Query Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrival {
    pub time: String,
    pub minutes_away: i64,
    pub headsign: String,
    pub line: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelTime {
    pub minutes: u32,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDeparture {
    pub time: String,
    pub line: String,
    pub headsign: String,
    pub color: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_override_wins_over_short_name() {
        assert_eq!(line_for_route("801", Some("Metro A Line")), Some("A".to_string()));
        assert_eq!(line_for_route("900", Some("L")), Some("L".to_string()));
        assert_eq!(line_for_route("900", Some("")), None);
        assert_eq!(line_for_route("900", None), None);
    }

    #[test]
    fn test_line_color_fallback() {
        assert_eq!(line_color("E"), "#fdb913");
        assert_eq!(line_color("Z"), "#888");
        assert_eq!(line_color(""), "#888");
    }

    #[test]
    fn test_scheduled_time_falls_back_to_departure() {
        let st = StopTime {
            trip_id: "T1".into(),
            stop_id: "S1".into(),
            arrival_time: String::new(),
            departure_time: "08:15:00".into(),
            stop_sequence: 1,
        };
        assert_eq!(st.scheduled_time().unwrap(), TimeOfDay::from_hms(8, 15, 0));

        let malformed = StopTime {
            arrival_time: "8h15".into(),
            ..st
        };
        assert!(malformed.scheduled_time().is_err());
    }
}
