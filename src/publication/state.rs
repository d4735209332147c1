//! Cluster state and diffs
//!
//! A `ClusterState` is an ordered key/value map of cluster metadata stamped
//! with a version. A `ClusterStateDiff` carries only what changed between two
//! consecutive versions and applies only on top of its exact base.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{PublishError, PublishResult};
use crate::identity::ClusterStateVersion;

/// A versioned snapshot of cluster metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    version: ClusterStateVersion,
    metadata: BTreeMap<String, Value>,
}

impl ClusterState {
    /// State held by a node that has never applied anything.
    pub fn empty() -> Self {
        Self {
            version: ClusterStateVersion::INITIAL,
            metadata: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> ClusterStateVersion {
        self.version
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Copy of this state at the next version, ready to be modified.
    pub fn next(&self) -> Self {
        Self {
            version: self.version.successor(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn without_entry(mut self, key: &str) -> Self {
        self.metadata.remove(key);
        self
    }

    /// Changes that turn `base` into `self`.
    pub fn diff_from(&self, base: &ClusterState) -> ClusterStateDiff {
        let upserts = self
            .metadata
            .iter()
            .filter(|(key, value)| base.metadata.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let removals = base
            .metadata
            .keys()
            .filter(|key| !self.metadata.contains_key(*key))
            .cloned()
            .collect();

        ClusterStateDiff {
            base_version: base.version,
            version: self.version,
            upserts,
            removals,
        }
    }

    /// Full-snapshot payload bytes.
    pub fn encode(&self) -> PublishResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(PublishError::payload)
    }

    pub fn decode(bytes: &[u8]) -> PublishResult<Self> {
        serde_json::from_slice(bytes).map_err(PublishError::payload)
    }
}

/// Incremental change between two consecutive states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStateDiff {
    base_version: ClusterStateVersion,
    version: ClusterStateVersion,
    upserts: BTreeMap<String, Value>,
    removals: Vec<String>,
}

impl ClusterStateDiff {
    pub fn base_version(&self) -> ClusterStateVersion {
        self.base_version
    }

    pub fn version(&self) -> ClusterStateVersion {
        self.version
    }

    /// Apply on top of `base`, which must be the exact base version.
    pub fn apply_to(&self, base: &ClusterState) -> PublishResult<ClusterState> {
        if base.version != self.base_version {
            return Err(PublishError::DiffBaseMismatch {
                base: self.base_version,
                held: base.version,
            });
        }

        let mut metadata = base.metadata.clone();
        for key in &self.removals {
            metadata.remove(key);
        }
        for (key, value) in &self.upserts {
            metadata.insert(key.clone(), value.clone());
        }

        Ok(ClusterState {
            version: self.version,
            metadata,
        })
    }

    /// Diff payload bytes.
    pub fn encode(&self) -> PublishResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(PublishError::payload)
    }

    pub fn decode(bytes: &[u8]) -> PublishResult<Self> {
        serde_json::from_slice(bytes).map_err(PublishError::payload)
    }
}
