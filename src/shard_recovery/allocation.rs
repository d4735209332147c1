//! Shard allocation lookup
//!
//! The allocation id of a shard copy changes every time the copy is
//! reassigned. The reestablish handler compares it against the id a session
//! was started with.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::identity::{AllocationId, ShardId};

/// Current allocation of each shard copy
pub trait AllocationProvider: Send + Sync {
    /// Allocation id of the target copy of `shard_id`, if it is allocated.
    fn current_allocation(&self, shard_id: &ShardId) -> Option<AllocationId>;
}

/// In-memory allocation table.
#[derive(Debug, Default)]
pub struct AllocationTable {
    allocations: RwLock<HashMap<ShardId, AllocationId>>,
}

impl AllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, shard_id: ShardId, allocation_id: AllocationId) {
        self.allocations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(shard_id, allocation_id);
    }

    /// Give the shard copy a fresh allocation id.
    pub fn reassign(&self, shard_id: &ShardId) -> AllocationId {
        let allocation_id = AllocationId::generate();
        self.assign(shard_id.clone(), allocation_id.clone());
        allocation_id
    }

    pub fn unassign(&self, shard_id: &ShardId) {
        self.allocations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(shard_id);
    }
}

impl AllocationProvider for AllocationTable {
    fn current_allocation(&self, shard_id: &ShardId) -> Option<AllocationId> {
        self.allocations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(shard_id)
            .cloned()
    }
}
