// ============================================================================
// Configuration
// ============================================================================

use crate::error::{Result, TransitError};
use chrono_tz::Tz;
use std::time::Duration;

const DEFAULT_FEED_URL: &str = "https://gitlab.com/LACMTA/gtfs_rail/-/raw/master/gtfs_rail.zip";
const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const CACHE_TTL_SECS: u64 = 4 * 3600;
const RETRY_BACKOFF_SECS: u64 = 15 * 60;

/// Where the feed lives and how long a built snapshot stays fresh.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub feed_url: String,
    pub request_timeout: Duration,
    /// Age after which a snapshot is served stale and a refresh is started.
    pub cache_ttl: Duration,
    /// Minimum spacing between two background refresh attempts.
    pub retry_backoff: Duration,
    /// Timezone the feed's service days and times-of-day are expressed in.
    pub timezone: Tz,
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            feed_url: DEFAULT_FEED_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(CACHE_TTL_SECS),
            retry_backoff: Duration::from_secs(RETRY_BACKOFF_SECS),
            timezone: DEFAULT_TIMEZONE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FeedConfig {
    /// Defaults, overridden by any `METRO_*` variable present in the environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = FeedConfig::default();

        if let Some(url) = lookup("METRO_FEED_URL") {
            config.feed_url = url;
        }
        if let Some(secs) = lookup("METRO_FEED_TIMEOUT_SECS") {
            config.request_timeout = parse_secs("METRO_FEED_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("METRO_CACHE_TTL_SECS") {
            config.cache_ttl = parse_secs("METRO_CACHE_TTL_SECS", &secs)?;
        }
        if let Some(secs) = lookup("METRO_REFRESH_BACKOFF_SECS") {
            config.retry_backoff = parse_secs("METRO_REFRESH_BACKOFF_SECS", &secs)?;
        }
        if let Some(name) = lookup("METRO_TIMEZONE") {
            config.timezone = name.parse::<Tz>().map_err(|e| {
                TransitError::Format(format!("METRO_TIMEZONE '{}' is not a timezone: {}", name, e))
            })?;
        }

        Ok(config)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| TransitError::Format(format!("{} '{}' is not a number of seconds: {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = FeedConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.cache_ttl, Duration::from_secs(4 * 3600));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.timezone, chrono_tz::America::Los_Angeles);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = FeedConfig::from_lookup(lookup_from(&[
            ("METRO_FEED_URL", "http://localhost/feed.zip"),
            ("METRO_CACHE_TTL_SECS", "60"),
            ("METRO_TIMEZONE", "America/New_York"),
        ]))
        .unwrap();
        assert_eq!(config.feed_url, "http://localhost/feed.zip");
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.timezone, chrono_tz::America::New_York);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let result = FeedConfig::from_lookup(lookup_from(&[("METRO_CACHE_TTL_SECS", "soon")]));
        assert!(matches!(result, Err(TransitError::Format(_))));

        let result = FeedConfig::from_lookup(lookup_from(&[("METRO_TIMEZONE", "Mars/Olympus")]));
        assert!(matches!(result, Err(TransitError::Format(_))));
    }
}
