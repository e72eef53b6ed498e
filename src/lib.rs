// Base Colors PFP Library - Farcaster signer approval and color profile pictures
// This exposes the core components for testing and integration

pub mod cli;
pub mod colors;
pub mod config;
pub mod http;
pub mod neynar;
pub mod observability;
pub mod profile;
pub mod shutdown;
pub mod signer;
pub mod telemetry;

// Re-export key types for easy access
pub use colors::{AlchemyClient, BaseColor, ColorError};
pub use config::{config, init_config, ColorPfpConfig};
pub use http::{ProviderError, RateLimitedHttpClient, RetryConfig, RetryHandler};
pub use neynar::{AppSigner, NeynarClient, SignedKeyRequest};
pub use observability::{create_flow_span, provider_metrics, OperationTimer, ProviderApiMetrics};
pub use profile::{ImageStore, LocalImageStore, ProfileApi, ProfileError, ProfileUpdater};
pub use shutdown::ShutdownCoordinator;
pub use signer::{
    CoordinatorConfig, CoordinatorError, FileSignerStore, FlowNotice, FlowSnapshot, Signer,
    SignerCoordinator, SignerProvider, SignerStatus, SignerStore, SignerUpdate,
};
pub use telemetry::{generate_correlation_id, init_telemetry, shutdown_telemetry};
