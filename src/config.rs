//! Connection settings for the processing service, read from TOML.
//!
//! ```toml
//! base_url = "http://localhost:7654"
//! request_timeout_secs = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::{Result, SessionError};

pub const DEFAULT_BASE_URL: &str = "http://localhost:7654";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("specmap-session/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ServiceConfig {
    /// Load settings from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("Failed to read {:?}: {}", path, e)))?;
        let config: ServiceConfig = toml::from_str(&content)
            .map_err(|e| SessionError::Config(format!("Invalid TOML in {:?}: {}", path, e)))?;
        config.base_url()?;
        info!("Loaded service config from {:?}", path);
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// `<config dir>/specmap/session.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("specmap").join("session.toml"))
    }

    /// Parsed base URL, always ending in `/` so routes join beneath it.
    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .map_err(|e| SessionError::Config(format!("Invalid base_url '{}': {}", self.base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(SessionError::Config(format!(
                "base_url '{}' cannot be used as a base",
                self.base_url
            )));
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
