use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::ProfileError;
use crate::colors::format_svg_data;
use crate::config::UploadConfig;

/// Somewhere to put generated images so the profile can point at them
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store an SVG (data URL or raw markup) and return its public URL
    async fn upload_svg(&self, data: &str) -> Result<String, ProfileError>;
}

/// Writes content-addressed SVGs into a local uploads directory
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    directory: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub fn new(directory: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            directory: directory.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(&config.directory, &config.public_base_url)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(markup: &str) -> String {
        let digest = Sha256::digest(markup.as_bytes());
        format!("{}.svg", hex::encode(digest))
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn upload_svg(&self, data: &str) -> Result<String, ProfileError> {
        let markup = format_svg_data(data)?;
        let file_name = Self::file_name(&markup);
        let path = self.directory.join(&file_name);

        tokio::fs::create_dir_all(&self.directory).await?;
        tokio::fs::write(&path, markup.as_bytes()).await?;

        let url = format!("{}/uploads/{}", self.public_base_url, file_name);
        info!(path = %path.display(), url = %url, "Image saved");
        Ok(url)
    }
}
