// Retry handling for one-shot provider calls (create, register, profile lookup).
// Signer status polling does not go through here: the poll loop owns its own
// error budget and never gives up.

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, error, warn};

use crate::http::ProviderError;
use crate::observability::provider_metrics;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delays between attempts; one fewer than `max_attempts`.
    fn delays(&self) -> Vec<Duration> {
        let base_ms = self.config.base_delay.as_millis() as u64;
        ExponentialBackoff::from_millis(2)
            .factor(base_ms / 2)
            .max_delay(self.config.max_delay)
            .take(self.config.max_attempts.saturating_sub(1) as usize)
            .map(|delay| if self.config.jitter { jitter(delay) } else { delay })
            .collect()
    }

    /// Execute a provider operation with exponential backoff retry.
    ///
    /// Only errors classified as retryable are repeated; anything else is
    /// returned on the first failure.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut action: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let operation_id = uuid::Uuid::new_v4();
        debug!(
            %operation_id,
            operation,
            max_attempts = self.config.max_attempts,
            "Starting provider operation"
        );

        let result = RetryIf::spawn(
            self.delays(),
            || action(),
            |err: &ProviderError| {
                let retryable = err.is_retryable();
                if retryable {
                    provider_metrics().record_retry();
                    warn!(%operation_id, operation, error = %err, "Provider operation failed (retryable)");
                }
                retryable
            },
        )
        .await;

        if let Err(ref err) = result {
            error!(%operation_id, operation, error = %err, "Provider operation failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_handler() -> RetryHandler {
        RetryHandler::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(10),
            jitter: false,
        })
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let retry_handler = fast_handler();
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result = retry_handler
            .execute("create_signer", move || {
                let counter = counter.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(ProviderError::Unavailable("connection reset".to_string()))
                    } else {
                        Ok("signer-1")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "signer-1");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let retry_handler = fast_handler();
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result: Result<(), _> = retry_handler
            .execute("register_signer", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Config("missing app key".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let retry_handler = fast_handler();
        let attempt_count = Arc::new(AtomicU32::new(0));
        let counter = attempt_count.clone();

        let result: Result<(), _> = retry_handler
            .execute("lookup_user", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Unavailable("503".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let handler = RetryHandler::new(RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
            jitter: false,
        });
        let delays = handler.delays();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[0], Duration::from_millis(500));
        assert_eq!(delays[1], Duration::from_millis(1000));
        assert_eq!(delays[2], Duration::from_secs(2));
        assert_eq!(delays[3], Duration::from_secs(2));
    }
}
