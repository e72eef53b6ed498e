use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::upload::ImageStore;
use super::ProfileError;
use crate::colors::{generate_color_svg, normalize_hex};
use crate::http::ProviderError;
use crate::observability::OperationTimer;
use crate::signer::{Signer, SignerStatus};

/// Profile endpoints the updater needs
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn update_pfp(&self, signer_id: &str, pfp_url: &str, fid: u64) -> Result<(), ProviderError>;

    async fn current_pfp(&self, fid: u64) -> Result<Option<String>, ProviderError>;
}

/// Result of a successful color change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfpChange {
    pub fid: u64,
    pub color: String,
    pub pfp_url: String,
}

pub struct ProfileUpdater {
    api: Arc<dyn ProfileApi>,
    images: Arc<dyn ImageStore>,
    current: Mutex<HashMap<u64, String>>,
}

impl ProfileUpdater {
    pub fn new(api: Arc<dyn ProfileApi>, images: Arc<dyn ImageStore>) -> Self {
        Self {
            api,
            images,
            current: Mutex::new(HashMap::new()),
        }
    }

    /// Render `color` as the profile picture of `fid`, acting through `signer_id`
    pub async fn set_color(
        &self,
        fid: u64,
        color: &str,
        signer_id: &str,
    ) -> Result<PfpChange, ProfileError> {
        if fid == 0 {
            return Err(ProfileError::MissingFid);
        }
        if signer_id.trim().is_empty() {
            return Err(ProfileError::MissingSigner);
        }
        let color = normalize_hex(color)?;

        let timer = OperationTimer::new("set_pfp_color");
        let svg = generate_color_svg(&color)?;
        let pfp_url = self.images.upload_svg(&svg).await?;
        self.api.update_pfp(signer_id, &pfp_url, fid).await?;

        self.current.lock().await.insert(fid, pfp_url.clone());
        timer.finish();
        info!(fid, color = %color, pfp_url = %pfp_url, "Profile picture changed");

        Ok(PfpChange {
            fid,
            color,
            pfp_url,
        })
    }

    /// `set_color` using an approved signer's own FID
    pub async fn set_color_with_signer(
        &self,
        signer: &Signer,
        color: &str,
    ) -> Result<PfpChange, ProfileError> {
        if signer.status != SignerStatus::Approved {
            return Err(ProfileError::SignerNotApproved {
                status: signer.status,
            });
        }
        let fid = signer.owner_fid.ok_or(ProfileError::MissingFid)?;
        self.set_color(fid, color, &signer.id).await
    }

    /// Current profile picture of `fid`, as reported by the provider
    pub async fn fetch_current_pfp(&self, fid: u64) -> Result<Option<String>, ProfileError> {
        if fid == 0 {
            return Err(ProfileError::MissingFid);
        }
        match self.api.current_pfp(fid).await {
            Ok(Some(url)) => {
                self.current.lock().await.insert(fid, url.clone());
                Ok(Some(url))
            }
            Ok(None) => Ok(self.recorded_pfp(fid).await),
            Err(e) => {
                warn!(fid, error = %e, "Failed to fetch current profile picture");
                Err(e.into())
            }
        }
    }

    /// Last pfp URL this updater saw or set for `fid`
    pub async fn recorded_pfp(&self, fid: u64) -> Option<String> {
        self.current.lock().await.get(&fid).cloned()
    }
}
