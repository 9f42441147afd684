//! Static-schedule query engine for a rail network.
//!
//! The feed (a GTFS zip bundle) is downloaded, indexed into an immutable
//! [`ScheduleIndex`] snapshot and kept fresh by a [`RefreshCache`]. The
//! [`ScheduleService`] facade answers the three rider-facing queries and never
//! returns an error: an unavailable feed or an unknown station yields an empty
//! result.

pub mod calendar;
pub mod config;
pub mod error;
pub mod feed_loader;
pub mod models;
pub mod queries;
pub mod refresh_cache;
pub mod schedule_index;
pub mod station_resolver;
pub mod tabular;
pub mod time;

#[cfg(test)]
mod test_support;

pub use config::FeedConfig;
pub use error::{Result, TransitError};
pub use feed_loader::{FeedArchive, FeedSource, HttpFeedSource};
pub use models::{Arrival, ScheduledDeparture, TravelTime};
pub use refresh_cache::{CacheState, CacheStats, RefreshCache};
pub use schedule_index::ScheduleIndex;
pub use station_resolver::normalize_name;
pub use time::TimeOfDay;

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;

/// Entry point for callers: queries over whatever snapshot the cache holds.
pub struct ScheduleService<S = HttpFeedSource> {
    cache: RefreshCache<S>,
    timezone: Tz,
}

impl<S> Clone for ScheduleService<S> {
    fn clone(&self) -> Self {
        ScheduleService {
            cache: self.cache.clone(),
            timezone: self.timezone,
        }
    }
}

impl ScheduleService<HttpFeedSource> {
    /// Service backed by the HTTP feed named in `config`. Nothing is
    /// downloaded until the first query.
    pub fn new(config: FeedConfig) -> Result<Self> {
        let source = HttpFeedSource::new(&config)?;
        Ok(Self::with_source(source, &config))
    }
}

impl<S: FeedSource> ScheduleService<S> {
    pub fn with_source(source: S, config: &FeedConfig) -> Self {
        ScheduleService {
            cache: RefreshCache::new(source, config),
            timezone: config.timezone,
        }
    }

    pub fn cache(&self) -> &RefreshCache<S> {
        &self.cache
    }

    /// Current wall-clock time in the feed's timezone.
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.timezone).naive_local()
    }

    fn snapshot(&self) -> Option<Arc<ScheduleIndex>> {
        match self.cache.get() {
            Ok(index) => Some(index),
            Err(e) => {
                warn!("No schedule snapshot available: {}", e);
                None
            }
        }
    }

    pub fn get_arrivals(&self, station_name: &str, limit: usize) -> Vec<Arrival> {
        self.get_arrivals_at(station_name, limit, self.local_now())
    }

    pub fn get_arrivals_at(&self, station_name: &str, limit: usize, now: NaiveDateTime) -> Vec<Arrival> {
        self.snapshot()
            .map(|index| queries::arrivals(&index, station_name, limit, now))
            .unwrap_or_default()
    }

    pub fn get_travel_times<T: AsRef<str>>(
        &self,
        origin_names: &[T],
        destination_name: &str,
    ) -> HashMap<String, Option<TravelTime>> {
        self.get_travel_times_at(origin_names, destination_name, self.local_now())
    }

    pub fn get_travel_times_at<T: AsRef<str>>(
        &self,
        origin_names: &[T],
        destination_name: &str,
        now: NaiveDateTime,
    ) -> HashMap<String, Option<TravelTime>> {
        self.snapshot()
            .map(|index| queries::travel_times(&index, origin_names, destination_name, now.date()))
            .unwrap_or_default()
    }

    pub fn get_schedule_at_station(
        &self,
        station_name: &str,
        target_time: &str,
        direction_station_name: Option<&str>,
        limit: usize,
    ) -> Vec<ScheduledDeparture> {
        self.get_schedule_at_station_at(
            station_name,
            target_time,
            direction_station_name,
            limit,
            self.local_now(),
        )
    }

    pub fn get_schedule_at_station_at(
        &self,
        station_name: &str,
        target_time: &str,
        direction_station_name: Option<&str>,
        limit: usize,
        now: NaiveDateTime,
    ) -> Vec<ScheduledDeparture> {
        self.snapshot()
            .map(|index| {
                queries::schedule_at_station(
                    &index,
                    station_name,
                    target_time,
                    direction_station_name,
                    limit,
                    now.date(),
                )
            })
            .unwrap_or_default()
    }

    /// Refetches the feed right away; see [`RefreshCache::refresh_now`].
    pub fn refresh_now(&self) -> Result<()> {
        self.cache.refresh_now()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
