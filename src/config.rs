use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for the color pfp tool
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ColorPfpConfig {
    /// Neynar API and app key settings
    pub neynar: NeynarConfig,
    /// Alchemy NFT API settings
    pub alchemy: AlchemyConfig,
    /// Signer approval flow settings
    pub signer: SignerConfig,
    /// Where generated images are written and served from
    pub upload: UploadConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NeynarConfig {
    /// Neynar API key (falls back to NEYNAR_API_KEY)
    pub api_key: Option<String>,
    pub base_url: String,
    /// Hex secp256k1 key of the app's custody address (falls back to FARCASTER_APP_PRIVATE_KEY)
    pub app_private_key: Option<String>,
    /// App FID; looked up from the custody address when unset
    pub app_fid: Option<u64>,
    /// Ask for the signer registration to be sponsored
    pub sponsor: bool,
    /// Sponsor from the app's own account instead of Neynar's
    pub self_sponsor: bool,
    pub requests_per_second: u32,
}

impl Default for NeynarConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.neynar.com/v2/farcaster".to_string(),
            app_private_key: None,
            app_fid: None,
            sponsor: true,
            self_sponsor: false,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlchemyConfig {
    /// Alchemy API key (falls back to ALCHEMY_API_KEY)
    pub api_key: Option<String>,
    pub base_url: String,
    /// Base Colors contract
    pub contract_address: String,
    pub requests_per_second: u32,
}

impl Default for AlchemyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://base-mainnet.g.alchemy.com".to_string(),
            contract_address: "0x7Bc1C072742D8391817EB4Eb2317F98dc72C61dB".to_string(),
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignerConfig {
    pub poll_interval_ms: u64,
    pub health_check_interval_ms: u64,
    /// Consecutive poll failures before the provider is reported unreachable
    pub error_threshold: u32,
    /// Path to the persisted signer record
    pub state_file_path: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            health_check_interval_ms: 5_000,
            error_threshold: 10,
            state_file_path: ".color-pfp/signer.json".to_string(),
        }
    }
}

impl SignerConfig {
    pub fn state_file(&self) -> PathBuf {
        PathBuf::from(&self.state_file_path)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    pub directory: String,
    /// Public origin the uploads directory is served under
    pub public_base_url: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: "public/uploads".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl ColorPfpConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (color-pfp.toml, .color-pfp-rc)
    /// 3. Environment variables (prefixed with COLOR_PFP_)
    pub fn load() -> Result<Self> {
        let mut files = Vec::new();
        if Path::new("color-pfp.toml").exists() {
            files.push(PathBuf::from("color-pfp.toml"));
        }
        if Path::new(".color-pfp-rc").exists() {
            files.push(PathBuf::from(".color-pfp-rc"));
        }

        let mut loaded = Self::load_from(&files, true)?;
        loaded.apply_env_fallbacks(|name| std::env::var(name).ok());
        Ok(loaded)
    }

    /// Layer the given TOML files over the defaults, then optionally the
    /// `COLOR_PFP_` environment.
    pub fn load_from(files: &[PathBuf], with_env: bool) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        for file in files {
            builder = builder.add_source(File::from(file.as_path()).format(FileFormat::Toml));
        }

        if with_env {
            // Nested keys use a double underscore: COLOR_PFP_NEYNAR__API_KEY
            builder = builder.add_source(
                Environment::with_prefix("COLOR_PFP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Fill unset secrets from the conventional unprefixed variables
    pub fn apply_env_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if self.neynar.api_key.is_none() {
            self.neynar.api_key = lookup("NEYNAR_API_KEY");
        }
        if self.alchemy.api_key.is_none() {
            self.alchemy.api_key = lookup("ALCHEMY_API_KEY");
        }
        if self.neynar.app_private_key.is_none() {
            self.neynar.app_private_key = lookup("FARCASTER_APP_PRIVATE_KEY");
        }
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ColorPfpConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = ColorPfpConfig::load_env_file();
        ColorPfpConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static ColorPfpConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration system
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_files() {
        let loaded = ColorPfpConfig::load_from(&[], false).unwrap();
        assert_eq!(loaded.neynar.base_url, "https://api.neynar.com/v2/farcaster");
        assert_eq!(loaded.signer.poll_interval_ms, 3_000);
        assert_eq!(loaded.signer.health_check_interval_ms, 5_000);
        assert_eq!(loaded.signer.error_threshold, 10);
        assert!(loaded.neynar.sponsor);
        assert!(loaded.neynar.api_key.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("color-pfp.toml");
        std::fs::write(
            &path,
            r#"
[neynar]
api_key = "neynar-test-key"
app_fid = 1234

[signer]
poll_interval_ms = 1000
"#,
        )
        .unwrap();

        let loaded = ColorPfpConfig::load_from(&[path], false).unwrap();
        assert_eq!(loaded.neynar.api_key.as_deref(), Some("neynar-test-key"));
        assert_eq!(loaded.neynar.app_fid, Some(1234));
        assert_eq!(loaded.signer.poll_interval_ms, 1000);
        assert_eq!(loaded.signer.error_threshold, 10);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.toml");
        let mut original = ColorPfpConfig::default();
        original.upload.public_base_url = "https://colors.example".to_string();
        original.save_to_file(&path).unwrap();

        let loaded = ColorPfpConfig::load_from(&[path], false).unwrap();
        assert_eq!(loaded.upload.public_base_url, "https://colors.example");
    }

    #[test]
    fn test_env_fallbacks_fill_only_missing_secrets() {
        let mut loaded = ColorPfpConfig::default();
        loaded.alchemy.api_key = Some("from-file".to_string());
        loaded.apply_env_fallbacks(|name| match name {
            "NEYNAR_API_KEY" => Some("from-env".to_string()),
            "ALCHEMY_API_KEY" => Some("ignored".to_string()),
            "FARCASTER_APP_PRIVATE_KEY" => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(loaded.neynar.api_key.as_deref(), Some("from-env"));
        assert_eq!(loaded.alchemy.api_key.as_deref(), Some("from-file"));
        assert!(loaded.neynar.app_private_key.is_none());
    }
}
