pub mod client;
pub mod error;
pub mod retry;

pub use client::RateLimitedHttpClient;
pub use error::ProviderError;
pub use retry::{RetryConfig, RetryHandler};
