// Signer Module - managed signer creation, approval polling and persistence

pub mod coordinator;
pub mod provider;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod mocks;


pub use coordinator::{
    CoordinatorConfig, CoordinatorError, FlowNotice, FlowSnapshot, HealthStatus, PollOutcome,
    RetryAction, SignerCoordinator,
};
pub use provider::SignerProvider;
pub use store::{FileSignerStore, FlowLock, MemorySignerStore, PersistedSigner, SignerStore, StoreError};
pub use types::{Signer, SignerStatus, SignerUpdate};
