//! Registry feed retrieval: HTTP download plus a local cache.

use anyhow::{Context, Result};
use reqwest::Client;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::utils::format_bytes;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 2000;

/// Maximum feed size (64 MB)
/// The full APNIC delegated file is a few MB, so 64 MB provides ample margin
const MAX_FEED_SIZE: usize = 64 * 1024 * 1024;

/// HTTP client for the registry feed
pub struct Fetcher {
    client: Client,
    timeout: Duration,
    retry_delay: Duration,
}

impl Fetcher {
    /// Create a fetcher whose downloads, retries included, give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("geowall/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            timeout,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Download `url` with retry logic and size validation
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tokio::time::timeout(self.timeout, self.fetch_with_retry(url))
            .await
            .map_err(|_| anyhow::anyhow!("Timed out after {:?} fetching {}", self.timeout, url))?
    }

    /// Transient failures are retried with exponential back-off
    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = self.retry_delay * (1 << (attempt - 1));
                debug!("Retry {} after {:?} for {}", attempt, delay, url);
                tokio::time::sleep(delay).await;
            }

            match self.fetch_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    debug!("Attempt {} for {} failed: {:#}", attempt + 1, url, e);
                    if e.downcast_ref::<FetchError>().is_some_and(FetchError::is_permanent) {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()).into());
        }

        if let Some(content_length) = response.content_length() {
            check_size(content_length as usize)?;
        }

        // Content-Length may be absent or wrong; enforce the cap while reading
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .context("Failed to read response body")?
        {
            body.extend_from_slice(&chunk);
            check_size(body.len())?;
        }
        Ok(body)
    }
}

fn check_size(size: usize) -> Result<(), FetchError> {
    if size > MAX_FEED_SIZE {
        return Err(FetchError::TooLarge {
            size,
            max: MAX_FEED_SIZE,
        });
    }
    Ok(())
}

/// Last downloaded copy of the feed on disk.
#[derive(Debug, Clone)]
pub struct FeedCache {
    path: PathBuf,
    max_age: Duration,
}

impl FeedCache {
    pub fn new<P: Into<PathBuf>>(path: P, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Time since the cache was last written, or `None` if there is no cache.
    pub fn age(&self) -> Option<Duration> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        // A timestamp in the future counts as brand new
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    pub fn is_fresh(&self) -> bool {
        self.age().is_some_and(|age| age < self.max_age)
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .with_context(|| format!("Failed to read feed cache: {:?}", self.path))
    }

    /// Replace the cache atomically (tempfile + rename).
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let parent_dir = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent_dir)
            .with_context(|| format!("Failed to create {:?}", parent_dir))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .context("Failed to create temporary file for feed cache")?;
        temp_file.write_all(data)?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&self.path)
            .with_context(|| format!("Failed to persist feed cache: {:?}", self.path))?;
        Ok(())
    }
}

/// Where the feed bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSource {
    Network,
    Cache,
    /// Download failed; an outdated cached copy was used instead
    StaleCache,
}

/// Raw feed contents
#[derive(Debug)]
pub struct Feed {
    pub bytes: Vec<u8>,
    pub source: FeedSource,
}

/// Load the configured feed, going to the network only when needed.
pub async fn load_feed(config: &Config, refresh: bool) -> Result<Feed> {
    let fetcher = Fetcher::new(config.fetch_timeout())?;
    let cache = config
        .cache_path
        .as_ref()
        .map(|path| FeedCache::new(path, config.cache_max_age()));
    let url = config.feed_url.as_str();

    resolve_feed(cache.as_ref(), refresh, || async move {
        info!("Fetching {}...", url);
        fetcher
            .fetch(url)
            .await
            .with_context(|| format!("Failed to fetch {}", url))
    })
    .await
}

/// Cache policy: fresh cache, else download (and store), else stale cache.
async fn resolve_feed<F, Fut>(cache: Option<&FeedCache>, refresh: bool, download: F) -> Result<Feed>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    if let Some(cache) = cache {
        if !refresh && cache.is_fresh() {
            match cache.read() {
                Ok(bytes) => {
                    info!(
                        "Using cached feed {:?} ({})",
                        cache.path(),
                        format_bytes(bytes.len() as u64)
                    );
                    return Ok(Feed {
                        bytes,
                        source: FeedSource::Cache,
                    });
                }
                Err(e) => warn!("{:#}", e),
            }
        }
    }

    match download().await {
        Ok(bytes) => {
            info!("Downloaded feed ({})", format_bytes(bytes.len() as u64));
            if let Some(cache) = cache {
                // Failing to cache does not invalidate the download
                if let Err(e) = cache.write(&bytes) {
                    warn!("Could not update feed cache: {:#}", e);
                }
            }
            Ok(Feed {
                bytes,
                source: FeedSource::Network,
            })
        }
        Err(e) => {
            let Some(cache) = cache else {
                return Err(e);
            };
            let Ok(bytes) = cache.read() else {
                return Err(e);
            };
            warn!("{:#}", e);
            warn!(
                "Using stale cached feed {:?}; ranges may be out of date",
                cache.path()
            );
            Ok(Feed {
                bytes,
                source: FeedSource::StaleCache,
            })
        }
    }
}
