// ============================================================================
// Refresh Cache: owns the current schedule snapshot and its lifecycle
// ============================================================================
//
// Readers clone an `Arc` out of a short read lock and never wait on a fetch
// once a snapshot exists. A stale read starts at most one background refresh;
// its result replaces the snapshot wholesale, and a failure leaves the old
// one in place.

use crate::config::FeedConfig;
use crate::error::Result;
use crate::feed_loader::FeedSource;
use crate::schedule_index::ScheduleIndex;
use log::{info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

const REFRESH_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Empty,
    Valid,
    Stale,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub state: CacheState,
    pub stops: usize,
    pub trips: usize,
    pub stop_times: usize,
    pub services: usize,
    pub age_secs: Option<u64>,
    pub refreshing: bool,
}

struct Snapshot {
    index: Arc<ScheduleIndex>,
    loaded_at: Instant,
}

struct Shared<S> {
    source: S,
    ttl: Duration,
    retry_backoff: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    refreshing: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
    cold_load: Mutex<()>,
}

impl<S: FeedSource> Shared<S> {
    fn current(&self) -> Option<(Arc<ScheduleIndex>, Instant)> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| (Arc::clone(&s.index), s.loaded_at))
    }

    /// Fetches and indexes a new snapshot without touching the published one.
    fn build(&self) -> Result<ScheduleIndex> {
        let started = Instant::now();
        let mut archive = self.source.fetch()?;
        let index = ScheduleIndex::from_archive(&mut archive)?;
        info!("Schedule snapshot built in {:?}", started.elapsed());
        Ok(index)
    }

    fn publish(&self, index: Arc<ScheduleIndex>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Snapshot {
            index,
            loaded_at: Instant::now(),
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight flag when the refresh holding it ends, however it ends.
struct RefreshClaim<'a>(&'a AtomicBool);

impl Drop for RefreshClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Time-to-live cache over the feed, with stale-while-refreshing reads.
pub struct RefreshCache<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for RefreshCache<S> {
    fn clone(&self) -> Self {
        RefreshCache {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: FeedSource> RefreshCache<S> {
    pub fn new(source: S, config: &FeedConfig) -> Self {
        Self::with_ttl(source, config.cache_ttl, config.retry_backoff)
    }

    pub fn with_ttl(source: S, ttl: Duration, retry_backoff: Duration) -> Self {
        RefreshCache {
            shared: Arc::new(Shared {
                source,
                ttl,
                retry_backoff,
                snapshot: RwLock::new(None),
                refreshing: AtomicBool::new(false),
                last_attempt: Mutex::new(None),
                cold_load: Mutex::new(()),
            }),
        }
    }

    /// The snapshot to query against.
    ///
    /// Loads synchronously when nothing has been loaded yet; that is the only
    /// case that can fail. A stale snapshot is returned immediately while a
    /// background refresh is started.
    pub fn get(&self) -> Result<Arc<ScheduleIndex>> {
        if let Some((index, loaded_at)) = self.shared.current() {
            if loaded_at.elapsed() >= self.shared.ttl {
                self.spawn_refresh();
            }
            return Ok(index);
        }
        self.load_cold()
    }

    fn load_cold(&self) -> Result<Arc<ScheduleIndex>> {
        let _guard = lock(&self.shared.cold_load);

        // Another caller may have finished the first load while we waited.
        if let Some((index, _)) = self.shared.current() {
            return Ok(index);
        }

        info!("No schedule snapshot yet, loading feed...");
        let index = Arc::new(self.shared.build()?);
        self.shared.publish(Arc::clone(&index));
        Ok(index)
    }

    fn spawn_refresh(&self) {
        {
            let mut last_attempt = lock(&self.shared.last_attempt);
            if last_attempt.is_some_and(|t| t.elapsed() < self.shared.retry_backoff) {
                return;
            }
            if self.shared.refreshing.swap(true, Ordering::AcqRel) {
                return;
            }
            *last_attempt = Some(Instant::now());
        }

        info!("Schedule snapshot is stale, refreshing in background...");

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("schedule-refresh".to_string())
            .spawn(move || {
                let _claim = RefreshClaim(&shared.refreshing);
                match shared.build() {
                    Ok(index) => {
                        shared.publish(Arc::new(index));
                        info!("✓ Schedule snapshot refreshed");
                    }
                    Err(e) => warn!("Schedule refresh failed, keeping previous snapshot: {}", e),
                }
            });

        if let Err(e) = spawned {
            warn!("Could not start schedule refresh: {}", e);
            self.shared.refreshing.store(false, Ordering::Release);
        }
    }

    /// Fetches and publishes a new snapshot on the calling thread.
    /// On failure the current snapshot stays in place.
    ///
    /// Waits for an in-flight background refresh or first load to finish
    /// before fetching, so only one fetch ever runs at a time.
    pub fn refresh_now(&self) -> Result<()> {
        info!("Manual schedule refresh requested...");
        let _cold_guard = lock(&self.shared.cold_load);
        while self.shared.refreshing.swap(true, Ordering::AcqRel) {
            thread::sleep(REFRESH_POLL_INTERVAL);
        }
        let _claim = RefreshClaim(&self.shared.refreshing);

        let index = self.shared.build()?;
        self.shared.publish(Arc::new(index));
        info!("✓ Manual schedule refresh completed");
        Ok(())
    }

    pub fn state(&self) -> CacheState {
        match self.shared.current() {
            None => CacheState::Empty,
            Some((_, loaded_at)) if loaded_at.elapsed() >= self.shared.ttl => CacheState::Stale,
            Some(_) => CacheState::Valid,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.shared.refreshing.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CacheStats {
        let current = self.shared.current();
        CacheStats {
            state: self.state(),
            stops: current.as_ref().map_or(0, |(index, _)| index.stop_count()),
            trips: current.as_ref().map_or(0, |(index, _)| index.trip_count()),
            stop_times: current.as_ref().map_or(0, |(index, _)| index.stop_time_count()),
            services: current
                .as_ref()
                .map_or(0, |(index, _)| index.calendar().service_count()),
            age_secs: current.as_ref().map(|(_, loaded_at)| loaded_at.elapsed().as_secs()),
            refreshing: self.is_refreshing(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransitError;
    use crate::feed_loader::FeedArchive;
    use crate::test_support;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        fetches: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        failing: AtomicBool,
    }

    struct FakeSource {
        counters: Arc<Counters>,
        delay: Duration,
    }

    impl FeedSource for FakeSource {
        fn fetch(&self) -> Result<FeedArchive> {
            self.counters.fetches.fetch_add(1, Ordering::SeqCst);
            let running = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            thread::sleep(self.delay);
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.counters.failing.load(Ordering::SeqCst) {
                return Err(TransitError::Fetch("connection refused".to_string()));
            }
            FeedArchive::from_bytes(test_support::sample_feed())
        }
    }

    fn cache(ttl: Duration, backoff: Duration, delay: Duration) -> (RefreshCache<FakeSource>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let source = FakeSource {
            counters: Arc::clone(&counters),
            delay,
        };
        (RefreshCache::with_ttl(source, ttl, backoff), counters)
    }

    fn wait_for_refresh(cache: &RefreshCache<FakeSource>) {
        for _ in 0..500 {
            if !cache.is_refreshing() {
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("background refresh did not finish");
    }

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_cold_load_then_cached() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (cache, counters) = cache(HOUR, HOUR, Duration::ZERO);
        assert_eq!(cache.state(), CacheState::Empty);

        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), CacheState::Valid);
        assert!(!cache.is_refreshing());
    }

    #[test]
    fn test_first_load_failure_surfaces_and_recovers() {
        let (cache, counters) = cache(HOUR, HOUR, Duration::ZERO);
        counters.failing.store(true, Ordering::SeqCst);
        assert!(matches!(cache.get(), Err(TransitError::Fetch(_))));
        assert_eq!(cache.state(), CacheState::Empty);

        counters.failing.store(false, Ordering::SeqCst);
        assert!(cache.get().is_ok());
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_reads_coalesce_into_one_refresh() {
        let (cache, counters) = cache(Duration::ZERO, HOUR, Duration::from_millis(100));
        let original = cache.get().unwrap();
        assert_eq!(cache.state(), CacheState::Stale);

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get().unwrap())
            })
            .collect();
        for reader in readers {
            let served = reader.join().unwrap();
            assert_eq!(served.stop_count(), original.stop_count());
        }

        wait_for_refresh(&cache);
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&original, &cache.get().unwrap()));
    }

    #[test]
    fn test_failed_refresh_keeps_serving_stale_snapshot() {
        let (cache, counters) = cache(Duration::ZERO, HOUR, Duration::ZERO);
        let original = cache.get().unwrap();

        counters.failing.store(true, Ordering::SeqCst);
        let served = cache.get().unwrap();
        assert!(Arc::ptr_eq(&original, &served));
        wait_for_refresh(&cache);

        let after = cache.get().unwrap();
        assert!(Arc::ptr_eq(&original, &after));
        // The backoff holds off a second attempt.
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cache.state(), CacheState::Stale);
    }

    #[test]
    fn test_refresh_now_swaps_snapshot() {
        let (cache, counters) = cache(HOUR, HOUR, Duration::ZERO);
        let original = cache.get().unwrap();

        cache.refresh_now().unwrap();
        assert!(!Arc::ptr_eq(&original, &cache.get().unwrap()));

        counters.failing.store(true, Ordering::SeqCst);
        let current = cache.get().unwrap();
        assert!(cache.refresh_now().is_err());
        assert!(Arc::ptr_eq(&current, &cache.get().unwrap()));
        assert!(!cache.is_refreshing());
    }

    #[test]
    fn test_refresh_now_waits_for_background_refresh() {
        let (cache, counters) = cache(Duration::ZERO, HOUR, Duration::from_millis(300));
        cache.get().unwrap();
        cache.get().unwrap();
        assert!(cache.is_refreshing());

        thread::sleep(Duration::from_millis(50));
        cache.refresh_now().unwrap();

        wait_for_refresh(&cache);
        assert_eq!(counters.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(counters.peak_in_flight.load(Ordering::SeqCst), 1);
        assert!(!cache.is_refreshing());
    }

    #[test]
    fn test_refresh_now_during_first_load_runs_after_it() {
        let (cache, counters) = cache(HOUR, HOUR, Duration::from_millis(200));
        let loader = {
            let cache = cache.clone();
            thread::spawn(move || cache.get().unwrap())
        };
        thread::sleep(Duration::from_millis(50));
        cache.refresh_now().unwrap();
        loader.join().unwrap();

        assert!(counters.fetches.load(Ordering::SeqCst) >= 1);
        assert_eq!(counters.peak_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), CacheState::Valid);
    }

    #[test]
    fn test_stats_report_snapshot() {
        let (cache, _) = cache(HOUR, HOUR, Duration::ZERO);
        assert_eq!(cache.stats().state, CacheState::Empty);
        assert_eq!(cache.stats().age_secs, None);

        cache.get().unwrap();
        let stats = cache.stats();
        assert_eq!(stats.state, CacheState::Valid);
        assert!(stats.stops > 0);
        assert!(stats.trips > 0);
        assert_eq!(stats.age_secs, Some(0));
    }
}
