//! Shard recovery identity
//!
//! A recovery session is anchored by two identifiers:
//! - `RecoveryId`: process-unique, assigned monotonically, never reused
//! - `AllocationId`: incarnation of the target shard copy, fixed at session
//!   start; a reassigned copy gets a new one

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one shard recovery session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecoveryId(u64);

impl RecoveryId {
    /// Creates a recovery id with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RecoveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a shard: owning index plus shard number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId {
    /// Index the shard belongs to
    pub index_id: String,
    /// Shard number within the index
    pub shard_number: i32,
}

impl ShardId {
    /// Create a shard id.
    pub fn new(index_id: impl Into<String>, shard_number: i32) -> Self {
        Self {
            index_id: index_id.into(),
            shard_number,
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index_id, self.shard_number)
    }
}

/// Assignment incarnation of a shard copy.
///
/// Compared, never updated, once a recovery session captured it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(String);

impl AllocationId {
    /// Wrap an externally assigned allocation id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh allocation id for a new assignment.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AllocationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Last transfer point confirmed complete by the target.
///
/// Measured in bytes of the shard's transfer stream.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(u64);

impl Checkpoint {
    /// Nothing transferred yet.
    pub const START: Checkpoint = Checkpoint(0);

    /// Create a checkpoint at the given offset.
    #[inline]
    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Offset in bytes.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
