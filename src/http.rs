//! HTTP client for barcode product lookups with rate limiting.
//!
//! This module provides:
//! - Open Food Facts lookups, plus USDA FoodData Central when an API key is set
//! - Sliding-window rate limiting shared by all requests
//! - Automatic retry with exponential backoff on 429
//! - Cache-first search backed by the [`Tracker`] product table

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::barcode::{parse_openfoodfacts, parse_usda, validate_barcode};
use crate::{
    BarcodeProduct, BarcodeScanRequest, BarcodeSearchResponse, ProductSource, Result, Tracker,
    TrackerError,
};

/// Settings for [`ProductFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    /// Default: https://world.openfoodfacts.org/api/v0
    pub openfoodfacts_url: String,
    /// Default: https://api.nal.usda.gov/fdc/v1
    pub usda_url: String,
    /// USDA lookups are skipped without a key.
    /// Default: None
    pub usda_api_key: Option<String>,
    /// Requests allowed per `window`.
    /// Default: 100 (Open Food Facts product query limit)
    pub max_requests: u32,
    /// Default: 60 seconds
    pub window: Duration,
    /// Retries after a 429 or a connection error.
    /// Default: 3
    pub max_retries: u32,
    /// Default: 10 seconds
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            openfoodfacts_url: "https://world.openfoodfacts.org/api/v0".to_string(),
            usda_url: "https://api.nal.usda.gov/fdc/v1".to_string(),
            usda_api_key: None,
            max_requests: 100,
            window: Duration::from_secs(60),
            max_retries: 3,
            timeout: Duration::from_secs(10),
            user_agent: concat!("fittrack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Rate limiter using sliding window
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    request_times: Mutex<VecDeque<Instant>>,
    consecutive_429s: AtomicU32,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests as usize,
            window,
            request_times: Mutex::new(VecDeque::with_capacity(max_requests as usize + 1)),
            consecutive_429s: AtomicU32::new(0),
        }
    }

    async fn wait_if_needed(&self) {
        loop {
            let wait_time = {
                let mut times = self.request_times.lock().await;
                let now = Instant::now();

                // Prune requests outside the window
                while times
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    times.pop_front();
                }

                if times.len() >= self.max_requests {
                    times
                        .front()
                        .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
                } else {
                    None
                }
            };

            match wait_time {
                Some(duration) if !duration.is_zero() => {
                    debug!("[ProductFetcher] Rate limit: waiting {:?}", duration);
                    tokio::time::sleep(duration).await;
                }
                _ => break,
            }
        }
    }

    async fn record_request(&self) {
        let mut times = self.request_times.lock().await;
        times.push_back(Instant::now());
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed);
        // Exponential backoff: 1s, 2s, 4s, 8s, 16s
        Duration::from_millis(1000 * (1 << count.min(4)))
    }
}

fn http_error(message: impl Into<String>, status: Option<StatusCode>) -> TrackerError {
    TrackerError::Http {
        message: message.into(),
        status_code: status.map(|s| s.as_u16()),
    }
}

/// Product lookups against the public food databases.
pub struct ProductFetcher {
    client: Client,
    config: FetcherConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl ProductFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| http_error(format!("failed to create HTTP client: {}", e), None))?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::new(config.max_requests, config.window)),
            config,
        })
    }

    /// GET a JSON document. `Ok(None)` on 404.
    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Option<Value>> {
        let mut retries = 0;

        loop {
            self.rate_limiter.wait_if_needed().await;

            let response = self.client.get(url).query(query).send().await;

            self.rate_limiter.record_request().await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(http_error("max retries exceeded (429)", Some(status)));
                        }

                        let backoff = self.rate_limiter.record_429();
                        warn!(
                            "[ProductFetcher] 429 from {}, retry {} after {:?}",
                            url, retries, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    self.rate_limiter.record_success();

                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if !status.is_success() {
                        return Err(http_error(format!("GET {} failed", url), Some(status)));
                    }

                    return resp
                        .json::<Value>()
                        .await
                        .map(Some)
                        .map_err(|e| http_error(format!("invalid JSON from {}: {}", url, e), None));
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(http_error(format!("request failed: {}", e), e.status()));
                    }

                    let backoff = Duration::from_millis(500 * (1 << retries.min(4)));
                    warn!(
                        "[ProductFetcher] Error for {}: {}, retry {} after {:?}",
                        url, e, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    pub async fn fetch_openfoodfacts(&self, barcode: &str) -> Result<Option<BarcodeProduct>> {
        let url = format!("{}/product/{}.json", self.config.openfoodfacts_url, barcode);
        let json = self.get_json(&url, &[]).await?;
        Ok(json.and_then(|json| parse_openfoodfacts(barcode, &json)))
    }

    /// Branded-food search on FoodData Central. `Ok(None)` without an API key.
    pub async fn fetch_usda(&self, barcode: &str) -> Result<Option<BarcodeProduct>> {
        let Some(api_key) = self.config.usda_api_key.as_deref() else {
            debug!("[ProductFetcher] No USDA API key, skipping lookup");
            return Ok(None);
        };

        let url = format!("{}/foods/search", self.config.usda_url);
        let json = self
            .get_json(
                &url,
                &[
                    ("query", barcode),
                    ("dataType", "Branded"),
                    ("pageSize", "5"),
                    ("api_key", api_key),
                ],
            )
            .await?;
        Ok(json.and_then(|json| parse_usda(barcode, &json)))
    }

    /// Try each source in order and return the first hit.
    ///
    /// A failing source is logged and skipped.
    pub async fn lookup(&self, barcode: &str, sources: &[ProductSource]) -> Option<BarcodeProduct> {
        for source in sources {
            let result = match source {
                ProductSource::OpenFoodFacts => self.fetch_openfoodfacts(barcode).await,
                ProductSource::Usda => self.fetch_usda(barcode).await,
                ProductSource::Manual => continue,
            };

            match result {
                Ok(Some(product)) => return Some(product),
                Ok(None) => debug!("[ProductFetcher] {} not found in {}", barcode, source),
                Err(e) => warn!("[ProductFetcher] {} lookup for {} failed: {}", source, barcode, e),
            }
        }
        None
    }

    /// Cache-first product search.
    ///
    /// With a `cache`, hits from remote sources are stored (bumping the scan
    /// count of known products). `force_refresh` bypasses the cache read.
    pub async fn search(
        &self,
        request: &BarcodeScanRequest,
        cache: Option<&Tracker>,
    ) -> Result<BarcodeSearchResponse> {
        let started = Instant::now();
        validate_barcode(&request.barcode)?;

        if !request.force_refresh {
            if let Some(tracker) = cache {
                if let Some(product) = tracker.cached_product(&request.barcode)? {
                    debug!("[ProductFetcher] Cache hit for {}", request.barcode);
                    return Ok(BarcodeSearchResponse {
                        found: true,
                        product: Some(product),
                        alternatives: Vec::new(),
                        cache_hit: true,
                        response_time_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
        }

        let product = self
            .lookup(&request.barcode, &request.preferred_sources)
            .await;

        if let (Some(tracker), Some(product)) = (cache, product.as_ref()) {
            if let Err(e) = tracker.cache_product(product) {
                warn!("[ProductFetcher] Failed to cache {}: {}", product.barcode, e);
            }
        }

        info!(
            "[ProductFetcher] Search {}: {} in {:?}",
            request.barcode,
            if product.is_some() { "found" } else { "not found" },
            started.elapsed()
        );

        Ok(BarcodeSearchResponse {
            found: product.is_some(),
            product,
            alternatives: Vec::new(),
            cache_hit: false,
            response_time_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points every source at a closed local port.
    fn offline_config() -> FetcherConfig {
        FetcherConfig {
            openfoodfacts_url: "http://127.0.0.1:9/api/v0".to_string(),
            usda_url: "http://127.0.0.1:9/fdc/v1".to_string(),
            max_retries: 0,
            timeout: Duration::from_secs(2),
            ..FetcherConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(100, Duration::from_secs(60));

        // Should not wait on first request
        let start = Instant::now();
        limiter.wait_if_needed().await;
        limiter.record_request().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_rate_limiter_waits_for_window() {
        let limiter = RateLimiter::new(2, Duration::from_millis(200));

        let start = Instant::now();
        for _ in 0..3 {
            limiter.wait_if_needed().await;
            limiter.record_request().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_429_backoff_grows_and_resets() {
        let limiter = RateLimiter::new(10, Duration::from_secs(1));
        assert_eq!(limiter.record_429(), Duration::from_secs(1));
        assert_eq!(limiter.record_429(), Duration::from_secs(2));
        assert_eq!(limiter.record_429(), Duration::from_secs(4));
        limiter.record_success();
        assert_eq!(limiter.record_429(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_search_serves_cache() {
        let tracker = Tracker::in_memory().unwrap();
        let product = BarcodeProduct::new("3017620422003", "Nutella", ProductSource::OpenFoodFacts);
        tracker.cache_product(&product).unwrap();

        let fetcher = ProductFetcher::new(offline_config()).unwrap();
        let response = fetcher
            .search(&BarcodeScanRequest::new("3017620422003"), Some(&tracker))
            .await
            .unwrap();

        assert!(response.found);
        assert!(response.cache_hit);
        assert_eq!(response.product, Some(product));
    }

    #[tokio::test]
    async fn test_force_refresh_skips_cache() {
        let tracker = Tracker::in_memory().unwrap();
        let product = BarcodeProduct::new("3017620422003", "Nutella", ProductSource::OpenFoodFacts);
        tracker.cache_product(&product).unwrap();

        let fetcher = ProductFetcher::new(offline_config()).unwrap();
        let request = BarcodeScanRequest {
            force_refresh: true,
            ..BarcodeScanRequest::new("3017620422003")
        };
        let response = fetcher.search(&request, Some(&tracker)).await.unwrap();

        // Remote sources are unreachable
        assert!(!response.found);
        assert!(!response.cache_hit);
    }

    #[tokio::test]
    async fn test_search_rejects_bad_barcode() {
        let fetcher = ProductFetcher::new(offline_config()).unwrap();
        let err = fetcher
            .search(&BarcodeScanRequest::new("123"), None)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 422);
    }
}
