use tracing::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Provider API usage metrics (Neynar, Alchemy)
#[derive(Debug, Default)]
pub struct ProviderApiMetrics {
    pub total_requests: AtomicU64,
    pub errors: AtomicU64,
    pub retries: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub stale_responses: AtomicU64,
}

impl ProviderApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        warn!("Retrying provider request after transient failure");
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A poll response that arrived for a superseded signer id or generation
    pub fn record_stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> ProviderApiStats {
        ProviderApiStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            requests = stats.total_requests,
            errors = stats.errors,
            retries = stats.retries,
            cache_hits = stats.cache_hits,
            cache_misses = stats.cache_misses,
            stale_responses = stats.stale_responses,
            "Provider API metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderApiStats {
    pub total_requests: u64,
    pub errors: u64,
    pub retries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub stale_responses: u64,
}

/// Global metrics instance
static PROVIDER_METRICS: std::sync::LazyLock<ProviderApiMetrics> =
    std::sync::LazyLock::new(ProviderApiMetrics::new);

pub fn provider_metrics() -> &'static ProviderApiMetrics {
    &PROVIDER_METRICS
}

/// Create a span covering one signer approval flow
pub fn create_flow_span(flow_id: &str) -> tracing::Span {
    tracing::info_span!(
        "signer_flow",
        flow.id = flow_id,
        otel.kind = "internal"
    )
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
