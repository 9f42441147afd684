// ============================================================================
// Schedule queries against one index snapshot
// ============================================================================
//
// Each query takes the local wall-clock moment (or service date) explicitly.
// Unresolvable stations and days without service yield empty results.

use crate::models::{line_color, Arrival, ScheduledDeparture, TravelTime};
use crate::schedule_index::ScheduleIndex;
use crate::time::TimeOfDay;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use std::collections::{BTreeSet, HashMap, HashSet};

const ARRIVALS_PAST_MS: i64 = 2 * 60 * 1000;
const ARRIVALS_AHEAD_MS: i64 = 180 * 60 * 1000;
const SCHEDULE_WINDOW_SECS: i64 = 60 * 60;

/// Upcoming arrivals at a station between 2 minutes ago and 3 hours ahead.
pub fn arrivals(index: &ScheduleIndex, station_name: &str, limit: usize, now: NaiveDateTime) -> Vec<Arrival> {
    let services = index.calendar().active_services(now.date());
    if services.is_empty() {
        debug!("No active services on {}", now.date());
        return Vec::new();
    }

    let stop_ids = index.resolver().resolve(station_name);
    if stop_ids.is_empty() {
        debug!("No stops match station '{}'", station_name);
        return Vec::new();
    }

    let midnight = now.date().and_time(NaiveTime::MIN);
    let mut upcoming: Vec<(NaiveDateTime, Arrival)> = Vec::new();

    for stop_id in &stop_ids {
        for stop_time in index.stop_times_at(stop_id) {
            let Some(trip) = index.trip(&stop_time.trip_id) else {
                continue;
            };
            if !services.contains(&trip.service_id) {
                continue;
            }

            let time_of_day = match stop_time.scheduled_time() {
                Ok(t) => t,
                Err(e) => {
                    debug!("Skipping stop time of trip {}: {}", stop_time.trip_id, e);
                    continue;
                }
            };

            let arrival_at = midnight + Duration::seconds(i64::from(time_of_day.seconds()));
            let ms_away = (arrival_at - now).num_milliseconds();
            if !(-ARRIVALS_PAST_MS..=ARRIVALS_AHEAD_MS).contains(&ms_away) {
                continue;
            }

            upcoming.push((
                arrival_at,
                Arrival {
                    time: arrival_at.format("%-I:%M %p").to_string(),
                    minutes_away: (ms_away / 60_000).max(0),
                    headsign: trip.headsign.clone(),
                    line: trip.line.clone(),
                    color: line_color(&trip.line).to_string(),
                },
            ));
        }
    }

    upcoming.sort_by_key(|(arrival_at, _)| *arrival_at);

    // Same minute, headsign and line is the same train seen from two platforms.
    let mut seen = HashSet::new();
    upcoming
        .into_iter()
        .filter(|(arrival_at, arrival)| {
            seen.insert((
                arrival_at.format("%H:%M").to_string(),
                arrival.headsign.clone(),
                arrival.line.clone(),
            ))
        })
        .map(|(_, arrival)| arrival)
        .take(limit)
        .collect()
}

/// Shortest direct ride from each origin to the destination on `today`.
///
/// Only same-trip connections count. An origin without one maps to `None`.
/// The whole map is empty when the destination is unknown or nothing runs.
pub fn travel_times<S: AsRef<str>>(
    index: &ScheduleIndex,
    origin_names: &[S],
    destination_name: &str,
    today: NaiveDate,
) -> HashMap<String, Option<TravelTime>> {
    let mut results = HashMap::new();

    let services = index.calendar().active_services(today);
    if services.is_empty() {
        debug!("No active services on {}", today);
        return results;
    }

    let destination_ids = index.resolver().resolve(destination_name);
    if destination_ids.is_empty() {
        debug!("No stops match destination '{}'", destination_name);
        return results;
    }

    for origin_name in origin_names {
        let origin_name = origin_name.as_ref();
        let origin_ids = index.resolver().resolve(origin_name);
        let best = if origin_ids.is_empty() {
            debug!("No stops match origin '{}'", origin_name);
            None
        } else {
            fastest_direct_trip(index, &origin_ids, &destination_ids, &services)
        };
        results.insert(origin_name.to_string(), best);
    }

    results
}

fn fastest_direct_trip(
    index: &ScheduleIndex,
    origin_ids: &BTreeSet<String>,
    destination_ids: &BTreeSet<String>,
    services: &HashSet<String>,
) -> Option<TravelTime> {
    let origin_trips: BTreeSet<&str> = origin_ids
        .iter()
        .flat_map(|stop_id| index.stop_times_at(stop_id))
        .filter(|st| {
            index
                .trip(&st.trip_id)
                .is_some_and(|trip| services.contains(&trip.service_id))
        })
        .map(|st| st.trip_id.as_str())
        .collect();

    let mut best: Option<TravelTime> = None;

    for trip_id in origin_trips {
        let mut boarding: Option<TimeOfDay> = None;
        let mut alighting: Option<TimeOfDay> = None;

        for stop_time in index.trip_stop_times(trip_id) {
            let Ok(time_of_day) = stop_time.scheduled_time() else {
                continue;
            };
            if origin_ids.contains(&stop_time.stop_id) && boarding.is_none_or(|b| time_of_day < b) {
                boarding = Some(time_of_day);
            }
            if destination_ids.contains(&stop_time.stop_id) && alighting.is_none_or(|a| time_of_day > a) {
                alighting = Some(time_of_day);
            }
        }

        let (Some(boarding), Some(alighting)) = (boarding, alighting) else {
            continue;
        };
        if alighting <= boarding {
            continue;
        }

        let minutes = (alighting.seconds() - boarding.seconds()) / 60;
        if best.as_ref().is_none_or(|b| minutes < b.minutes) {
            best = Some(TravelTime {
                minutes,
                line: index
                    .trip(trip_id)
                    .map(|trip| trip.line.clone())
                    .unwrap_or_default(),
            });
        }
    }

    best
}

/// Trains at a station within an hour of `target_time` ("HH:MM").
///
/// With `direction_station_name`, a train is kept only if the same trip later
/// reaches that station. Trains at or after the target sort first, then by
/// distance from it.
pub fn schedule_at_station(
    index: &ScheduleIndex,
    station_name: &str,
    target_time: &str,
    direction_station_name: Option<&str>,
    limit: usize,
    today: NaiveDate,
) -> Vec<ScheduledDeparture> {
    let services = index.calendar().active_services(today);
    if services.is_empty() {
        debug!("No active services on {}", today);
        return Vec::new();
    }

    let stop_ids = index.resolver().resolve(station_name);
    if stop_ids.is_empty() {
        debug!("No stops match station '{}'", station_name);
        return Vec::new();
    }

    let target = match TimeOfDay::parse_hh_mm(target_time) {
        Ok(t) => t,
        Err(e) => {
            debug!("Ignoring schedule request: {}", e);
            return Vec::new();
        }
    };

    // A direction that resolves to nothing does not filter.
    let direction_ids = direction_station_name
        .map(|name| index.resolver().resolve(name))
        .filter(|ids| !ids.is_empty());

    let mut candidates: Vec<(TimeOfDay, ScheduledDeparture)> = Vec::new();

    for stop_id in &stop_ids {
        for stop_time in index.stop_times_at(stop_id) {
            let Some(trip) = index.trip(&stop_time.trip_id) else {
                continue;
            };
            if !services.contains(&trip.service_id) {
                continue;
            }

            let time_of_day = match stop_time.scheduled_time() {
                Ok(t) => t,
                Err(e) => {
                    debug!("Skipping stop time of trip {}: {}", stop_time.trip_id, e);
                    continue;
                }
            };

            if time_of_day.seconds_since(target).abs() > SCHEDULE_WINDOW_SECS {
                continue;
            }

            if let Some(direction_ids) = &direction_ids {
                if !continues_toward(index, &stop_time.trip_id, direction_ids, time_of_day) {
                    continue;
                }
            }

            candidates.push((
                time_of_day,
                ScheduledDeparture {
                    time: time_of_day.display_12h(),
                    line: trip.line.clone(),
                    headsign: trip.headsign.clone(),
                    color: line_color(&trip.line).to_string(),
                },
            ));
        }
    }

    candidates.sort_by_key(|(time_of_day, _)| (*time_of_day < target, time_of_day.seconds_since(target).abs()));

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|(_, departure)| departure)
        .filter(|d| seen.insert((d.time.clone(), d.line.clone(), d.headsign.clone())))
        .take(limit)
        .collect()
}

/// Whether `trip_id` stops at any of `stop_ids` strictly after `after`.
fn continues_toward(index: &ScheduleIndex, trip_id: &str, stop_ids: &BTreeSet<String>, after: TimeOfDay) -> bool {
    index.trip_stop_times(trip_id).any(|stop_time| {
        stop_ids.contains(&stop_time.stop_id)
            && stop_time
                .scheduled_time()
                .is_ok_and(|time_of_day| time_of_day > after)
    })
}
