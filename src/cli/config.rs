//! Node configuration file
//!
//! JSON, every field optional:
//!
//! ```json
//! {
//!   "node_id": "node-0",
//!   "discovery": { "publish_timeout_secs": 30, "publish_diff_enabled": true },
//!   "recovery": { "reestablish_timeout_secs": 30, "chunk_size_bytes": 524288 }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::identity::NodeId;
use crate::settings::{DiscoverySettingsConfig, DynamicSettingsStore};
use crate::shard_recovery::RecoveryConfig;

/// Configuration of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identifier (default: "node-0")
    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default)]
    pub discovery: DiscoverySettingsConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,
}

fn default_node_id() -> String {
    "node-0".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            discovery: DiscoverySettingsConfig::default(),
            recovery: RecoveryConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: NodeConfig = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load from `path` when given, otherwise use the defaults.
    pub fn load_or_default(path: Option<&Path>) -> CliResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> CliResult<()> {
        if self.node_id.trim().is_empty() {
            return Err(CliError::config_error("node_id must not be empty"));
        }
        self.discovery
            .to_snapshot()
            .map_err(|e| CliError::config_error(e.to_string()))?;
        self.recovery
            .validate()
            .map_err(|e| CliError::config_error(e.to_string()))?;
        Ok(())
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.node_id.as_str())
    }

    /// Settings store seeded from the discovery section.
    pub fn settings_store(&self) -> CliResult<DynamicSettingsStore> {
        DynamicSettingsStore::from_config(&self.discovery)
            .map_err(|e| CliError::config_error(e.to_string()))
    }
}
