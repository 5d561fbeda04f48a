//! Hub configuration

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};

/// Router limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    /// Envelopes that crossed more forwarding contexts than this are
    /// dropped as routing loops
    pub max_hops: usize,

    /// Hub requests allowed to wait on one address to connect; further ones
    /// are refused
    pub max_deferred_per_address: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            // A frame inside an extension page inside devtools is three hops
            max_hops: 16,
            max_deferred_per_address: 256,
        }
    }
}

impl HubConfig {
    /// Check that every limit is usable
    pub fn validate(&self) -> HubResult<()> {
        if self.max_hops == 0 {
            return Err(HubError::Config(
                "max_hops must be greater than 0".to_string(),
            ));
        }

        if self.max_deferred_per_address == 0 {
            return Err(HubError::Config(
                "max_deferred_per_address must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a TOML document; missing keys take their defaults
    pub fn from_toml_str(raw: &str) -> HubResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| HubError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> HubResult<String> {
        toml::to_string(self).map_err(|e| HubError::Config(e.to_string()))
    }
}
