//! Hook for site-specific additions to information documents, such as
//! rights statements or attribution.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::ApiVersion;
use crate::config::DelegateConfig;

#[derive(Debug, Error)]
pub enum DelegateError {
    #[error("delegate configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("delegate failed: {0}")]
    Failed(String),
}

/// Supplies extra keys for information documents.
///
/// Errors never fail the request; the document is served without the extra
/// keys.
pub trait Delegate: Send + Sync {
    fn extra_info_keys(
        &self,
        version: ApiVersion,
        image_uri: &str,
    ) -> Result<Map<String, Value>, DelegateError>;
}

/// A delegate returning fixed keys taken from the configuration file.
#[derive(Debug, Default, Clone)]
pub struct StaticDelegate {
    v2_keys: Map<String, Value>,
    v3_keys: Map<String, Value>,
}

impl StaticDelegate {
    pub fn from_config(config: &DelegateConfig) -> Result<Self, DelegateError> {
        Ok(Self {
            v2_keys: table_to_map(&config.v2_extra_keys)?,
            v3_keys: table_to_map(&config.v3_extra_keys)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.v2_keys.is_empty() && self.v3_keys.is_empty()
    }
}

fn table_to_map(table: &toml::Table) -> Result<Map<String, Value>, DelegateError> {
    match serde_json::to_value(table)? {
        Value::Object(map) => Ok(map),
        other => Err(DelegateError::Failed(format!("expected a table, got {other}"))),
    }
}

impl Delegate for StaticDelegate {
    fn extra_info_keys(
        &self,
        version: ApiVersion,
        _image_uri: &str,
    ) -> Result<Map<String, Value>, DelegateError> {
        Ok(match version {
            ApiVersion::V2 => self.v2_keys.clone(),
            ApiVersion::V3 => self.v3_keys.clone(),
        })
    }
}
