use governor::{
    RateLimiter,
    Quota,
    DefaultDirectRateLimiter,
    Jitter
};
use moka::future::Cache;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::http::ProviderError;
use crate::observability::provider_metrics;

/// Rate-limited HTTP client shared by the provider clients.
///
/// Every request waits on a direct `governor` limiter. Read-only lookups may
/// pass a cache key to reuse a recent response for a short TTL.
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    http: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    cache: Cache<String, serde_json::Value>,
    service: &'static str,
}

impl RateLimitedHttpClient {
    /// Create a new rate-limited HTTP client for one upstream service
    pub fn new(service: &'static str, requests_per_second: u32) -> Result<Self, ProviderError> {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = per_second.saturating_mul(NonZeroU32::MIN.saturating_add(1));
        let quota = Quota::per_second(per_second).allow_burst(burst);
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("colorpfp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // Short TTL: signer status must never be served stale from here
        let cache = Cache::builder()
            .max_capacity(500)
            .time_to_live(Duration::from_secs(60))
            .build();

        Ok(Self {
            http,
            rate_limiter,
            cache,
            service,
        })
    }

    /// Underlying reqwest client for building requests
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Send a request with rate limiting and decode the JSON body.
    ///
    /// Non-2xx responses become `ProviderError::Status`, carrying the
    /// provider's `message` field when the body has one.
    pub async fn send_json<T>(
        &self,
        request: RequestBuilder,
        cache_key: Option<&str>,
    ) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        let metrics = provider_metrics();

        if let Some(key) = cache_key {
            if let Some(cached) = self.cache.get(key).await {
                debug!(service = self.service, key, "Cache hit");
                metrics.record_cache_hit();
                return self.decode(cached);
            }
            metrics.record_cache_miss();
        }

        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        metrics.record_request();
        debug!(service = self.service, "Executing provider request with rate limiting");

        let response = request.send().await.inspect_err(|_| metrics.record_error())?;
        let status = response.status();
        let body = response.text().await.inspect_err(|_| metrics.record_error())?;

        if !status.is_success() {
            metrics.record_error();
            return Err(ProviderError::Status {
                service: self.service,
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let value: serde_json::Value = if body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
                service: self.service,
                reason: e.to_string(),
            })?
        };

        if let Some(key) = cache_key {
            self.cache.insert(key.to_string(), value.clone()).await;
            debug!(service = self.service, key, "Cached response for future requests");
        }

        self.decode(value)
    }

    fn decode<T: DeserializeOwned>(&self, value: serde_json::Value) -> Result<T, ProviderError> {
        serde_json::from_value(value).map_err(|e| ProviderError::Decode {
            service: self.service,
            reason: e.to_string(),
        })
    }

    /// Clear cache (after write operations)
    pub async fn clear_cache(&self) {
        self.cache.invalidate_all();
        info!(service = self.service, "HTTP client cache cleared");
    }

    /// Invalidate a single cached lookup
    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
        debug!(service = self.service, key, "Invalidated cache entry");
    }
}

/// Pull a human-readable message out of an error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}
