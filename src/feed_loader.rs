// ============================================================================
// Feed Loader: download and archive access
// ============================================================================
//
// The feed is a GTFS zip bundle fetched over HTTP and held entirely in memory.

use crate::config::FeedConfig;
use crate::error::{Result, TransitError};
use bytes::Bytes;
use log::info;
use reqwest::blocking;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Anything able to produce a fresh copy of the feed bundle.
///
/// Implementations must not retry on their own; the refresh cache decides
/// when another attempt is made.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch(&self) -> Result<FeedArchive>;
}

/// A feed bundle unpacked into named resources (`stops.txt`, `trips.txt`, ...).
pub struct FeedArchive {
    archive: ZipArchive<Cursor<Bytes>>,
}

impl FeedArchive {
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| TransitError::Format(format!("Failed to open feed zip: {}", e)))?;
        Ok(FeedArchive { archive })
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    /// Reads one resource as text. A missing resource is a `Format` error.
    pub fn read_resource(&mut self, name: &str) -> Result<String> {
        let mut file = self
            .archive
            .by_name(name)
            .map_err(|e| TransitError::Format(format!("{} not found in feed archive: {}", name, e)))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| TransitError::Format(format!("Failed to read {}: {}", name, e)))?;

        Ok(contents)
    }
}

/// Downloads the bundle from a fixed URL with a bounded timeout.
pub struct HttpFeedSource {
    client: blocking::Client,
    url: String,
}

impl HttpFeedSource {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = blocking::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransitError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpFeedSource {
            client,
            url: config.feed_url.clone(),
        })
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch(&self) -> Result<FeedArchive> {
        info!("Downloading schedule feed from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|e| TransitError::Fetch(format!("Failed to download feed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TransitError::Fetch(format!(
                "Feed download failed with status: {}",
                response.status()
            )));
        }

        let zip_bytes = response
            .bytes()
            .map_err(|e| TransitError::Fetch(format!("Failed to read feed body: {}", e)))?;

        info!("Downloaded {} KB, extracting...", zip_bytes.len() / 1024);

        FeedArchive::from_bytes(zip_bytes)
    }
}
