//! Immutable configuration, built once at startup and injected into the
//! pipeline and the imagery provider.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::geometry::MAX_SPAN_DAYS;
use crate::io::artifacts::ArtifactStore;
use crate::types::{NdviError, NdviResult};

pub const ENV_CLIENT_ID: &str = "CDSE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CDSE_CLIENT_SECRET";

/// Processing limits and tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Catalog results considered per interval
    pub max_images_to_consider: usize,
    pub max_polygon_area_sqkm: f64,
    /// Highest acceptable in-polygon cloud fraction, inclusive
    pub max_cloud_coverage_in_polygon: f64,
    pub max_span_days: i64,
    /// Metres per pixel of the requested band grid
    pub resolution_m: f64,
    /// Simultaneous candidate downloads
    pub fetch_concurrency: usize,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_images_to_consider: 30,
            max_polygon_area_sqkm: 25.0,
            max_cloud_coverage_in_polygon: 0.5,
            max_span_days: MAX_SPAN_DAYS,
            resolution_m: 10.0,
            fetch_concurrency: 4,
            output_dir: ArtifactStore::default_root(),
        }
    }
}

impl PipelineConfig {
    /// Worker count actually used: at least 1, never more than the candidate cap
    pub fn effective_concurrency(&self) -> usize {
        self.fetch_concurrency
            .min(self.max_images_to_consider)
            .max(1)
    }

    pub fn validate(&self) -> NdviResult<()> {
        if self.max_images_to_consider == 0 {
            return Err(NdviError::Config(
                "max_images_to_consider must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_cloud_coverage_in_polygon) {
            return Err(NdviError::Config(format!(
                "max_cloud_coverage_in_polygon must be within [0, 1], got {}",
                self.max_cloud_coverage_in_polygon
            )));
        }
        if !(self.resolution_m > 0.0) {
            return Err(NdviError::Config(format!(
                "resolution_m must be positive, got {}",
                self.resolution_m
            )));
        }
        if !(self.max_polygon_area_sqkm > 0.0) {
            return Err(NdviError::Config(format!(
                "max_polygon_area_sqkm must be positive, got {}",
                self.max_polygon_area_sqkm
            )));
        }
        Ok(())
    }
}

/// Copernicus Data Space Ecosystem (Sentinel Hub) access
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub token_url: String,
    /// Catalog collection and Process API data type
    pub collection: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: "https://sh.dataspace.copernicus.eu".to_string(),
            token_url: "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token"
                .to_string(),
            collection: "sentinel-2-l2a".to_string(),
            request_timeout_secs: 60,
        }
    }
}

// Keep the secret out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("collection", &self.collection)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Credentials from `CDSE_CLIENT_ID` / `CDSE_CLIENT_SECRET` replace file values
    pub fn with_env_credentials(self) -> Self {
        self.with_credentials_from(|key| std::env::var(key).ok())
    }

    fn with_credentials_from<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        if let Some(id) = lookup(ENV_CLIENT_ID).filter(|v| !v.is_empty()) {
            self.client_id = id;
        }
        if let Some(secret) = lookup(ENV_CLIENT_SECRET).filter(|v| !v.is_empty()) {
            self.client_secret = secret;
        }
        self
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Parse TOML; missing keys fall back to defaults
    pub fn from_toml_str(content: &str) -> NdviResult<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| NdviError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.pipeline.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> NdviResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NdviError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Optional TOML file, then the environment credential overlay
    pub fn load(path: Option<&Path>) -> NdviResult<Self> {
        let mut config = match path {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Self::from_toml_file(path)?
            }
            None => Self::default(),
        };
        config.provider = config.provider.with_env_credentials();
        log::debug!("Provider configuration: {:?}", config.provider);
        Ok(config)
    }
}
