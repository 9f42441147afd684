// ============================================================================
// Schedule Index: one immutable snapshot of every derived lookup structure
// ============================================================================

use crate::calendar::ServiceCalendar;
use crate::error::Result;
use crate::feed_loader::FeedArchive;
use crate::models::{self, Route, Stop, StopTime, Trip};
use crate::station_resolver::{normalize_name, NameIndex, StationResolver};
use crate::tabular::Table;
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const ROUTES_FILE: &str = "routes.txt";
pub const TRIPS_FILE: &str = "trips.txt";
pub const STOPS_FILE: &str = "stops.txt";
pub const STOP_TIMES_FILE: &str = "stop_times.txt";
pub const CALENDAR_FILE: &str = "calendar.txt";
pub const CALENDAR_DATES_FILE: &str = "calendar_dates.txt";

lazy_static! {
    static ref HEADSIGN_STATION: Regex = Regex::new(r"\s*Station\b.*").unwrap();
    static ref HEADSIGN_BRANDING: Regex = Regex::new(r"\s*-\s*Metro\b.*").unwrap();
    static ref HEADSIGN_LINE_LETTER: Regex = Regex::new(r"\s+[A-Z]-Line\b").unwrap();
}

/// The raw tables a snapshot is built from.
pub struct FeedTables {
    pub routes: Table,
    pub trips: Table,
    pub stops: Table,
    pub stop_times: Table,
    pub calendar: Table,
    pub calendar_dates: Option<Table>,
}

impl FeedTables {
    pub fn read(archive: &mut FeedArchive) -> Result<Self> {
        let calendar_dates = if archive.has_resource(CALENDAR_DATES_FILE) {
            Some(Table::read(archive, CALENDAR_DATES_FILE)?)
        } else {
            None
        };

        let tables = FeedTables {
            routes: Table::read(archive, ROUTES_FILE)?,
            trips: Table::read(archive, TRIPS_FILE)?,
            stops: Table::read(archive, STOPS_FILE)?,
            stop_times: Table::read(archive, STOP_TIMES_FILE)?,
            calendar: Table::read(archive, CALENDAR_FILE)?,
            calendar_dates,
        };

        info!(
            "Parsed {} routes, {} trips, {} stops, {} stop times, {} calendar rows",
            tables.routes.len(),
            tables.trips.len(),
            tables.stops.len(),
            tables.stop_times.len(),
            tables.calendar.len()
        );

        Ok(tables)
    }
}

/// Every lookup the queries need, built together and never mutated afterwards.
///
/// Stop-times live once in an arena; the per-stop and per-trip indexes hold
/// positions into it. Per-trip positions are ordered by stop sequence.
#[derive(Debug)]
pub struct ScheduleIndex {
    stops: HashMap<String, Stop>,
    routes: HashMap<String, Route>,
    trips: HashMap<String, Trip>,
    stop_times: Vec<StopTime>,
    stop_times_by_stop: HashMap<String, Vec<usize>>,
    stop_times_by_trip: HashMap<String, Vec<usize>>,
    parent_children: HashMap<String, Vec<String>>,
    names: NameIndex,
    calendar: ServiceCalendar,
}

impl ScheduleIndex {
    pub fn from_archive(archive: &mut FeedArchive) -> Result<Self> {
        let tables = FeedTables::read(archive)?;
        Ok(Self::build(&tables))
    }

    pub fn build(tables: &FeedTables) -> Self {
        let routes = build_routes(&tables.routes);
        let mut ordered_stops = build_stops(&tables.stops);

        // Parents that are not themselves stops are dropped.
        let known: HashSet<String> = ordered_stops.iter().map(|s| s.stop_id.clone()).collect();
        let mut orphaned = 0usize;
        for stop in ordered_stops.iter_mut() {
            if stop.parent_station.as_ref().is_some_and(|p| !known.contains(p)) {
                stop.parent_station = None;
                orphaned += 1;
            }
        }
        if orphaned > 0 {
            debug!("{} stops reference a missing parent station", orphaned);
        }

        let mut parent_children: HashMap<String, Vec<String>> = HashMap::new();
        let mut names = NameIndex::default();
        for stop in &ordered_stops {
            let normalized = normalize_name(&stop.stop_name);
            names.insert(normalized.clone(), &stop.stop_id);
            if let Some(parent) = &stop.parent_station {
                names.insert(normalized, parent);
                parent_children
                    .entry(parent.clone())
                    .or_default()
                    .push(stop.stop_id.clone());
            }
        }

        let stops: HashMap<String, Stop> = ordered_stops
            .into_iter()
            .map(|s| (s.stop_id.clone(), s))
            .collect();

        let (stop_times, stop_times_by_stop, stop_times_by_trip) = build_stop_times(&tables.stop_times);
        let trips = build_trips(&tables.trips, &routes, &stops, &stop_times, &stop_times_by_trip);
        let calendar = ServiceCalendar::from_tables(&tables.calendar, tables.calendar_dates.as_ref());

        info!(
            "Built schedule index: {} stops ({} stations), {} routes, {} trips, {} stop times, {} station names",
            stops.len(),
            parent_children.len(),
            routes.len(),
            trips.len(),
            stop_times.len(),
            names.len()
        );

        ScheduleIndex {
            stops,
            routes,
            trips,
            stop_times,
            stop_times_by_stop,
            stop_times_by_trip,
            parent_children,
            names,
            calendar,
        }
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    pub fn children(&self, stop_id: &str) -> &[String] {
        self.parent_children
            .get(stop_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Stop-times at one stop, in feed order.
    pub fn stop_times_at<'a>(&'a self, stop_id: &str) -> impl Iterator<Item = &'a StopTime> + use<'a> {
        self.positions(&self.stop_times_by_stop, stop_id)
    }

    /// Stop-times of one trip, in stop-sequence order.
    pub fn trip_stop_times<'a>(&'a self, trip_id: &str) -> impl Iterator<Item = &'a StopTime> + use<'a> {
        self.positions(&self.stop_times_by_trip, trip_id)
    }

    fn positions<'a>(
        &'a self,
        index: &'a HashMap<String, Vec<usize>>,
        key: &str,
    ) -> impl Iterator<Item = &'a StopTime> + use<'a> {
        index
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.stop_times[i])
    }

    pub fn resolver(&self) -> StationResolver<'_> {
        StationResolver::new(&self.names, &self.parent_children)
    }

    pub fn calendar(&self) -> &ServiceCalendar {
        &self.calendar
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    pub fn stop_time_count(&self) -> usize {
        self.stop_times.len()
    }
}

fn build_routes(table: &Table) -> HashMap<String, Route> {
    let mut routes: HashMap<String, Route> = HashMap::new();

    for record in table.records() {
        let route_id = record.field("route_id");
        if route_id.is_empty() {
            continue;
        }
        let short_name = record.field("route_short_name");
        routes.insert(
            route_id.to_string(),
            Route {
                route_id: route_id.to_string(),
                short_name: short_name.to_string(),
                line: models::line_for_route(route_id, Some(short_name)).unwrap_or_default(),
            },
        );
    }

    for route_id in models::override_route_ids() {
        routes.entry(route_id.to_string()).or_insert_with(|| Route {
            route_id: route_id.to_string(),
            short_name: String::new(),
            line: models::line_for_route(route_id, None).unwrap_or_default(),
        });
    }

    routes
}

fn build_stops(table: &Table) -> Vec<Stop> {
    table
        .records()
        .filter(|record| !record.field("stop_id").is_empty())
        .map(|record| Stop {
            stop_id: record.field("stop_id").to_string(),
            stop_name: record.field("stop_name").to_string(),
            parent_station: Some(record.field("parent_station"))
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
        .collect()
}

type StopTimeArena = (
    Vec<StopTime>,
    HashMap<String, Vec<usize>>,
    HashMap<String, Vec<usize>>,
);

fn build_stop_times(table: &Table) -> StopTimeArena {
    let mut stop_times = Vec::with_capacity(table.len());
    let mut by_stop: HashMap<String, Vec<usize>> = HashMap::new();
    let mut by_trip: HashMap<String, Vec<usize>> = HashMap::new();
    let mut skipped = 0usize;

    for record in table.records() {
        let sequence = record.field("stop_sequence");
        let stop_sequence = if sequence.is_empty() {
            0
        } else {
            match sequence.parse::<u32>() {
                Ok(seq) => seq,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            }
        };

        let stop_time = StopTime {
            trip_id: record.field("trip_id").to_string(),
            stop_id: record.field("stop_id").to_string(),
            arrival_time: record.field("arrival_time").to_string(),
            departure_time: record.field("departure_time").to_string(),
            stop_sequence,
        };

        let position = stop_times.len();
        by_stop.entry(stop_time.stop_id.clone()).or_default().push(position);
        by_trip.entry(stop_time.trip_id.clone()).or_default().push(position);
        stop_times.push(stop_time);
    }

    for positions in by_trip.values_mut() {
        positions.sort_by_key(|&i| stop_times[i].stop_sequence);
    }

    if skipped > 0 {
        debug!("Skipped {} stop times with an unreadable stop_sequence", skipped);
    }

    (stop_times, by_stop, by_trip)
}

fn build_trips(
    table: &Table,
    routes: &HashMap<String, Route>,
    stops: &HashMap<String, Stop>,
    stop_times: &[StopTime],
    stop_times_by_trip: &HashMap<String, Vec<usize>>,
) -> HashMap<String, Trip> {
    let mut trips = HashMap::new();
    let mut unknown_route = 0usize;

    for record in table.records() {
        let trip_id = record.field("trip_id");
        if trip_id.is_empty() {
            continue;
        }

        let Some(route) = routes.get(record.field("route_id")) else {
            unknown_route += 1;
            continue;
        };

        let headsign = match record.field("trip_headsign") {
            "" => stop_times_by_trip
                .get(trip_id)
                .and_then(|positions| positions.last())
                .map(|&i| computed_headsign(&stop_times[i].stop_id, stops))
                .unwrap_or_default(),
            explicit => explicit.to_string(),
        };

        trips.insert(
            trip_id.to_string(),
            Trip {
                trip_id: trip_id.to_string(),
                route_id: route.route_id.clone(),
                service_id: record.field("service_id").to_string(),
                direction_id: record.field("direction_id").parse::<u32>().ok(),
                headsign,
                line: route.line.clone(),
            },
        );
    }

    if unknown_route > 0 {
        debug!("Skipped {} trips referencing an unknown route", unknown_route);
    }

    trips
}

/// Destination text for a trip ending at `last_stop_id`: the parent station's
/// name when there is one, without "Station", branding or line-letter suffixes.
fn computed_headsign(last_stop_id: &str, stops: &HashMap<String, Stop>) -> String {
    let Some(last_stop) = stops.get(last_stop_id) else {
        return String::new();
    };

    let name = last_stop
        .parent_station
        .as_ref()
        .and_then(|parent| stops.get(parent))
        .map(|parent| parent.stop_name.as_str())
        .unwrap_or(last_stop.stop_name.as_str());

    clean_headsign(name)
}

fn clean_headsign(name: &str) -> String {
    let name = HEADSIGN_STATION.replace_all(name, "");
    let name = HEADSIGN_BRANDING.replace_all(&name, "");
    let name = HEADSIGN_LINE_LETTER.replace_all(&name, "");
    name.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(stops: &str, trips: &str, stop_times: &str) -> FeedTables {
        FeedTables {
            routes: Table::parse(ROUTES_FILE, "route_id,route_short_name\n801,\n900,L\n").unwrap(),
            trips: Table::parse(TRIPS_FILE, trips).unwrap(),
            stops: Table::parse(STOPS_FILE, stops).unwrap(),
            stop_times: Table::parse(STOP_TIMES_FILE, stop_times).unwrap(),
            calendar: Table::parse(
                CALENDAR_FILE,
                "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n",
            )
            .unwrap(),
            calendar_dates: None,
        }
    }

    const STOPS: &str = "stop_id,stop_name,parent_station\n\
        P1,Downtown Long Beach Station,\n\
        C1,Downtown Long Beach Station - Metro A Line,P1\n\
        P2,APU / Citrus College Station,\n\
        C2,APU / Citrus College Station A-Line,P2\n\
        S3,Atlantic Station,GHOST\n";

    #[test]
    fn test_headsign_from_parent_of_last_stop() {
        let index = ScheduleIndex::build(&tables(
            STOPS,
            "route_id,service_id,trip_id,trip_headsign,direction_id\n\
             801,WKDY,T1,,0\n\
             801,WKDY,T2,Long Beach,1\n\
             805,WKDY,T3,,0\n",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,10:30:00,10:30:00,C1,2\n\
             T1,10:00:00,10:00:00,C2,1\n\
             T2,11:00:00,11:00:00,C2,1\n",
        ));

        assert_eq!(index.trip("T1").unwrap().headsign, "Downtown Long Beach");
        assert_eq!(index.trip("T1").unwrap().line, "A");
        assert_eq!(index.trip("T1").unwrap().direction_id, Some(0));
        assert_eq!(index.trip("T2").unwrap().headsign, "Long Beach");
        // 805 is a known line even though routes.txt omits it.
        assert_eq!(index.trip("T3").unwrap().line, "G");
        assert_eq!(index.trip("T3").unwrap().headsign, "");
    }

    #[test]
    fn test_trips_with_unknown_route_are_skipped() {
        let index = ScheduleIndex::build(&tables(
            STOPS,
            "route_id,service_id,trip_id,trip_headsign\n999,WKDY,T9,Nowhere\n900,WKDY,T10,Somewhere\n",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n",
        ));
        assert!(index.trip("T9").is_none());
        assert_eq!(index.trip("T10").unwrap().line, "L");
        assert_eq!(index.trip_count(), 1);
        assert_eq!(index.route("900").unwrap().short_name, "L");
        assert_eq!(index.route("807").unwrap().line, "K");
        assert!(index.route("999").is_none());
    }

    #[test]
    fn test_stop_hierarchy_and_missing_parents() {
        let index = ScheduleIndex::build(&tables(
            STOPS,
            "route_id,service_id,trip_id\n",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n",
        ));
        assert_eq!(index.children("P1"), ["C1".to_string()]);
        assert!(index.children("GHOST").is_empty());
        assert_eq!(index.stop("S3").unwrap().parent_station, None);
        assert_eq!(index.stop("C1").unwrap().parent_station.as_deref(), Some("P1"));
    }

    #[test]
    fn test_trip_stop_times_follow_sequence() {
        let index = ScheduleIndex::build(&tables(
            STOPS,
            "route_id,service_id,trip_id\n801,WKDY,T1\n",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,10:30:00,10:30:00,C1,10\n\
             T1,10:00:00,10:00:00,C2,2\n\
             T1,10:10:00,10:10:00,S3,x\n",
        ));
        let order: Vec<_> = index.trip_stop_times("T1").map(|st| st.stop_id.as_str()).collect();
        assert_eq!(order, ["C2", "C1"]);
        assert_eq!(index.stop_times_at("C1").count(), 1);
        assert_eq!(index.stop_times_at("S3").count(), 0);
        assert_eq!(index.stop_time_count(), 2);
    }

    #[test]
    fn test_every_stop_resolves_by_its_own_name() {
        let index = ScheduleIndex::build(&tables(
            STOPS,
            "route_id,service_id,trip_id\n",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n",
        ));
        for id in ["P1", "C1", "P2", "C2", "S3"] {
            let stop = index.stop(id).unwrap();
            let resolved = index.resolver().resolve(&stop.stop_name);
            assert!(resolved.contains(id), "{} not resolved from {:?}", id, stop.stop_name);
        }
        let station = index.resolver().resolve("Downtown Long Beach Station");
        assert!(station.contains("C1"));
    }

    #[test]
    fn test_clean_headsign() {
        assert_eq!(clean_headsign("Union Station"), "Union");
        assert_eq!(clean_headsign("Norwalk - Metro C Line"), "Norwalk");
        assert_eq!(clean_headsign("Expo / Crenshaw E-Line"), "Expo / Crenshaw");
        assert_eq!(clean_headsign("North Hollywood"), "North Hollywood");
    }
}
