// Profile Module - color pfp rendering, image hosting and profile updates

pub mod updater;
pub mod upload;

use thiserror::Error;

use crate::colors::ColorError;
use crate::http::ProviderError;
use crate::signer::SignerStatus;

pub use updater::{PfpChange, ProfileApi, ProfileUpdater};
pub use upload::{ImageStore, LocalImageStore};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("A Farcaster FID is required")]
    MissingFid,

    #[error("A signer is required to update the profile")]
    MissingSigner,

    #[error("Signer is {status}, not approved")]
    SignerNotApproved { status: SignerStatus },

    #[error(transparent)]
    Color(#[from] ColorError),

    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
