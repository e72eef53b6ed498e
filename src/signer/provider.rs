use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::types::{Signer, SignerUpdate};
use crate::http::ProviderError;

/// Identity provider operations the approval flow depends on.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SignerProvider: Send + Sync {
    /// Allocate a new managed signer in the `Generated` state
    async fn create_signer(&self) -> Result<Signer, ProviderError>;

    /// Request an approval link for `signer_id`.
    ///
    /// The returned update may be keyed to a different id than the one
    /// passed in; the caller must treat that id as authoritative.
    async fn register_signer(&self, signer_id: &str) -> Result<SignerUpdate, ProviderError>;

    /// Look up the current state of a signer
    async fn fetch_signer(&self, signer_id: &str) -> Result<SignerUpdate, ProviderError>;

    /// Current profile picture of the user with `fid`, if any
    async fn fetch_profile_picture(&self, fid: u64) -> Result<Option<String>, ProviderError>;
}
