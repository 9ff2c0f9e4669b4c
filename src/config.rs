//! Server configuration, read from a TOML file.
//!
//! Every section and key is optional; missing values take the defaults
//! below. Unknown keys are rejected so that typos do not go unnoticed.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//! base_uri = "https://images.example.org"
//!
//! [source]
//! kind = "filesystem"
//! root = "./images"
//!
//! [iiif]
//! max_pixels = 400000000
//! max_scale = 1.0
//! restrict_to_sizes = false
//!
//! [delegate.v3_extra_keys]
//! rights = "http://creativecommons.org/licenses/by/4.0/"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub server: HttpConfig,
    pub source: SourceConfig,
    pub iiif: IiifConfig,
    pub delegate: DelegateConfig,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.source.validate()?;
        self.iiif.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Public root URI used in `id`s and `Link` headers. When unset it is
    /// derived from each request's `Host` header.
    pub base_uri: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            base_uri: None,
        }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "server.bind is not a socket address: {}",
                self.bind
            )));
        }
        if let Some(uri) = &self.base_uri {
            if !(uri.starts_with("http://") || uri.starts_with("https://")) {
                return Err(ConfigError::Validation(
                    "server.base_uri must be an http or https URI".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Filesystem,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Directory holding source images (filesystem sources).
    pub root: PathBuf,
    /// Upstream root; images are fetched from `<base_url>/<identifier>` (http sources).
    pub base_url: Option<String>,
    /// Where downloaded images are kept (http sources).
    pub cache_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Filesystem,
            root: PathBuf::from("./images"),
            base_url: None,
            cache_dir: PathBuf::from("./proxy_cache"),
        }
    }
}

impl SourceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == SourceKind::Http && self.base_url.is_none() {
            return Err(ConfigError::Validation(
                "source.base_url is required for http sources".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IiifConfig {
    /// Largest output area in pixels; 0 disables the limit.
    pub max_pixels: u64,
    /// Largest scale relative to the full image; unlimited when unset.
    pub max_scale: Option<f64>,
    /// Smallest side of an advertised size.
    pub min_size: u32,
    /// Smallest side of an advertised tile.
    pub min_tile_size: u32,
    /// Only serve sizes listed in the information document.
    pub restrict_to_sizes: bool,
    /// String standing in for `/` in identifiers.
    pub slash_substitute: Option<String>,
    pub scale_constraint_delimiter: String,
}

impl Default for IiifConfig {
    fn default() -> Self {
        Self {
            max_pixels: 0,
            max_scale: None,
            min_size: 64,
            min_tile_size: 512,
            restrict_to_sizes: false,
            slash_substitute: None,
            scale_constraint_delimiter: "-".to_string(),
        }
    }
}

impl IiifConfig {
    pub fn effective_max_scale(&self) -> f64 {
        self.max_scale.unwrap_or(f64::MAX)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size == 0 {
            return Err(ConfigError::Validation("iiif.min_size must be > 0".into()));
        }
        if self.min_tile_size == 0 {
            return Err(ConfigError::Validation(
                "iiif.min_tile_size must be > 0".into(),
            ));
        }
        if let Some(scale) = self.max_scale {
            if !scale.is_finite() || scale <= 0.0 {
                return Err(ConfigError::Validation(
                    "iiif.max_scale must be a positive number".into(),
                ));
            }
        }
        if self.scale_constraint_delimiter.is_empty() {
            return Err(ConfigError::Validation(
                "iiif.scale_constraint_delimiter must not be empty".into(),
            ));
        }
        if self.slash_substitute.as_deref() == Some("/") {
            return Err(ConfigError::Validation(
                "iiif.slash_substitute must not be a slash".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DelegateConfig {
    /// Keys added to Image API 2 information documents.
    pub v2_extra_keys: toml::Table,
    /// Keys added to Image API 3 information documents.
    pub v3_extra_keys: toml::Table,
}

/// Loads and validates the configuration at `path`, or the defaults when no
/// path is given.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServerConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
