//! Cancellable artifact downloads
//!
//! [`ArtifactFetcher::fetch`] starts one download and returns a
//! [`FetchHandle`]. The handle yields exactly one [`FetchResult`], whose
//! status is `Ok`, `Error` or `Aborted`; transfer failures are never raised
//! across the async boundary.
//!
//! ```ignore
//! let fetcher = ArtifactFetcher::new(cache.clone());
//! let handle = fetcher.fetch(url, true);
//! let result = handle.result().await;
//! if result.is_ok() {
//!     let platforms = catalog::parse_platforms(result.data.as_deref().unwrap_or_default());
//! }
//! ```

mod slot;

pub use slot::{FetchSlot, SlotEvent};

use crate::cache::ArtifactCache;
use crate::package::sha256_hex;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Default whole-transfer timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal status of a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The full body was received
    Ok,
    /// Network, timeout or HTTP failure
    Error,
    /// Cancelled before the result was delivered
    Aborted,
}

/// Outcome of one fetch request
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Terminal status
    pub status: FetchStatus,
    /// Body bytes, only present for [`FetchStatus::Ok`]
    pub data: Option<Bytes>,
    /// URL that was requested
    pub source_url: Url,
    /// Failure description for [`FetchStatus::Error`]
    pub error: Option<String>,
}

impl FetchResult {
    fn ok(source_url: Url, data: Bytes) -> Self {
        Self {
            status: FetchStatus::Ok,
            data: Some(data),
            source_url,
            error: None,
        }
    }

    fn error(source_url: Url, message: String) -> Self {
        Self {
            status: FetchStatus::Error,
            data: None,
            source_url,
            error: Some(message),
        }
    }

    fn aborted(source_url: Url) -> Self {
        Self {
            status: FetchStatus::Aborted,
            data: None,
            source_url,
            error: None,
        }
    }

    /// Whether the download completed
    pub fn is_ok(&self) -> bool {
        self.status == FetchStatus::Ok
    }

    /// Lowercase hex SHA-256 of the body
    ///
    /// Only available once the status is `Ok`; `None` otherwise.
    pub fn sha256(&self) -> Option<String> {
        match (&self.status, &self.data) {
            (FetchStatus::Ok, Some(data)) => Some(sha256_hex(data)),
            _ => None,
        }
    }
}

/// Fetcher configuration
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for the whole transfer (connect, headers and body)
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Handle to one in-flight (or already completed) fetch
#[derive(Debug)]
pub struct FetchHandle {
    url: Url,
    cancel: CancellationToken,
    receiver: oneshot::Receiver<FetchResult>,
}

impl FetchHandle {
    /// URL being fetched
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request cancellation
    ///
    /// Takes effect at the next chunk boundary. A result that is already
    /// complete but not yet collected is reported as `Aborted`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this fetch when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the single result of this fetch
    pub async fn result(self) -> FetchResult {
        let result = match self.receiver.await {
            Ok(result) => result,
            Err(_) => FetchResult::error(
                self.url.clone(),
                "download task ended without a result".to_string(),
            ),
        };

        if self.cancel.is_cancelled() && result.status != FetchStatus::Aborted {
            log::debug!("Discarding result for {}: cancelled before delivery", self.url);
            return FetchResult::aborted(self.url);
        }
        result
    }
}

/// Downloads artifacts over HTTP(S), optionally through an [`ArtifactCache`]
#[derive(Debug, Clone)]
pub struct ArtifactFetcher {
    client: reqwest::Client,
    cache: Arc<ArtifactCache>,
    config: FetcherConfig,
}

impl ArtifactFetcher {
    /// Create a fetcher with the default configuration
    pub fn new(cache: Arc<ArtifactCache>) -> Self {
        Self::with_config(cache, FetcherConfig::default())
    }

    /// Create a fetcher with an explicit configuration
    pub fn with_config(cache: Arc<ArtifactCache>, config: FetcherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache,
            config,
        }
    }

    /// Cache shared by this fetcher
    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Start fetching `url`
    ///
    /// With `use_cache`, a cached copy is returned without touching the
    /// network and a fresh download is written back to the cache. Must be
    /// called from within a tokio runtime.
    pub fn fetch(&self, url: Url, use_cache: bool) -> FetchHandle {
        let cancel = CancellationToken::new();
        let (sender, receiver) = oneshot::channel();

        if use_cache {
            if let Some(data) = self.cache.get(url.as_str()) {
                log::debug!("cache hit: {}", url);
                let _ = sender.send(FetchResult::ok(url.clone(), data));
                return FetchHandle {
                    url,
                    cancel,
                    receiver,
                };
            }
            log::debug!("cache miss: {}", url);
        }

        let task = Download {
            client: self.client.clone(),
            cache: self.cache.clone(),
            timeout: self.config.timeout,
            url: url.clone(),
            use_cache,
            cancel: cancel.clone(),
        };
        tokio::spawn(async move {
            let result = task.run().await;
            let _ = sender.send(result);
        });

        FetchHandle {
            url,
            cancel,
            receiver,
        }
    }
}

/// State moved into the download task
struct Download {
    client: reqwest::Client,
    cache: Arc<ArtifactCache>,
    timeout: Duration,
    url: Url,
    use_cache: bool,
    cancel: CancellationToken,
}

impl Download {
    async fn run(self) -> FetchResult {
        log::info!("Downloading {}", self.url);

        let request = self
            .client
            .get(self.url.clone())
            .timeout(self.timeout)
            .send();

        let mut response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.abort(),
            response = request => match response {
                Ok(response) => response,
                Err(e) => return self.fail(&e),
            },
        };

        if let Err(e) = response.error_for_status_ref() {
            return self.fail(&e);
        }

        let mut data = BytesMut::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.abort(),
                chunk = response.chunk() => chunk,
            };
            match chunk {
                Ok(Some(chunk)) => data.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => return self.fail(&e),
            }
        }

        if self.cancel.is_cancelled() {
            return self.abort();
        }

        let data = data.freeze();
        log::debug!("Downloaded {} bytes from {}", data.len(), self.url);
        if self.use_cache {
            self.cache.set(self.url.as_str(), data.clone());
        }
        FetchResult::ok(self.url, data)
    }

    fn abort(&self) -> FetchResult {
        log::info!("Download aborted: {}", self.url);
        FetchResult::aborted(self.url.clone())
    }

    fn fail(&self, e: &reqwest::Error) -> FetchResult {
        let message = if e.is_timeout() {
            format!("Timeout while downloading file: {}", e)
        } else if e.is_status() {
            format!("HTTP error: {}", e)
        } else {
            format!("Download error: {}", e)
        };
        log::warn!("{}", message);
        FetchResult::error(self.url.clone(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(server: &MockServer, route: &str, body: &[u8], delay: Duration) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(body.to_vec())
                    .set_delay(delay),
            )
            .mount(server)
            .await;
    }

    fn url(server: &MockServer, route: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let cache = Arc::new(ArtifactCache::new());
        // Nothing listens on the discard port; any network access would fail
        let url = Url::parse("http://127.0.0.1:9/platforms.json").unwrap();
        cache.set(url.as_str(), Bytes::from_static(b"cached"));

        let fetcher = ArtifactFetcher::new(cache);
        let result = fetcher.fetch(url.clone(), true).result().await;
        assert_eq!(result.status, FetchStatus::Ok);
        assert_eq!(result.data.as_deref(), Some(&b"cached"[..]));
        assert_eq!(result.source_url, url);
    }

    #[tokio::test]
    async fn test_download_populates_cache() {
        let server = MockServer::start().await;
        serve(&server, "/releases.json", b"{\"releases\":[]}", Duration::ZERO).await;

        let cache = Arc::new(ArtifactCache::new());
        let fetcher = ArtifactFetcher::new(cache.clone());
        let target = url(&server, "/releases.json");

        let result = fetcher.fetch(target.clone(), true).result().await;
        assert!(result.is_ok());
        assert_eq!(
            cache.get(target.as_str()).as_deref(),
            Some(&b"{\"releases\":[]}"[..])
        );
    }

    #[tokio::test]
    async fn test_uncached_fetch_leaves_cache_alone() {
        let server = MockServer::start().await;
        serve(&server, "/fw.zip", b"PK", Duration::ZERO).await;

        let cache = Arc::new(ArtifactCache::new());
        let fetcher = ArtifactFetcher::new(cache.clone());
        let result = fetcher.fetch(url(&server, "/fw.zip"), false).result().await;
        assert!(result.is_ok());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = ArtifactFetcher::new(Arc::new(ArtifactCache::new()));
        let result = fetcher
            .fetch(url(&server, "/missing.json"), true)
            .result()
            .await;
        assert_eq!(result.status, FetchStatus::Error);
        assert!(result.data.is_none());
        assert!(result.error.unwrap().contains("404"));
        assert!(fetcher.cache().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let server = MockServer::start().await;
        serve(&server, "/slow.json", b"{}", Duration::from_secs(3)).await;

        let config = FetcherConfig {
            timeout: Duration::from_millis(200),
        };
        let fetcher = ArtifactFetcher::with_config(Arc::new(ArtifactCache::new()), config);
        let result = fetcher.fetch(url(&server, "/slow.json"), false).result().await;
        assert_eq!(result.status, FetchStatus::Error);
        assert!(result.error.unwrap().starts_with("Timeout"));
    }

    #[tokio::test]
    async fn test_cancel_in_flight() {
        let server = MockServer::start().await;
        serve(&server, "/slow.zip", b"PK", Duration::from_secs(5)).await;

        let cache = Arc::new(ArtifactCache::new());
        let fetcher = ArtifactFetcher::new(cache.clone());
        let handle = fetcher.fetch(url(&server, "/slow.zip"), true);
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle.result())
            .await
            .expect("cancelled fetch should finish promptly");
        assert_eq!(result.status, FetchStatus::Aborted);
        assert!(result.data.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_delivery_is_aborted() {
        let server = MockServer::start().await;
        serve(&server, "/fast.json", b"{}", Duration::ZERO).await;

        let fetcher = ArtifactFetcher::new(Arc::new(ArtifactCache::new()));
        let handle = fetcher.fetch(url(&server, "/fast.json"), false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.cancel();

        let result = handle.result().await;
        assert_eq!(result.status, FetchStatus::Aborted);
        assert!(result.sha256().is_none());
    }

    #[tokio::test]
    async fn test_sha256_only_for_ok() {
        let server = MockServer::start().await;
        serve(&server, "/abc", b"abc", Duration::ZERO).await;

        let fetcher = ArtifactFetcher::new(Arc::new(ArtifactCache::new()));
        let result = fetcher.fetch(url(&server, "/abc"), false).result().await;
        assert_eq!(
            result.sha256().as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }
}
