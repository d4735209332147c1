//! Recovery session record

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::RecoveryState;
use crate::identity::{AllocationId, Checkpoint, NodeId, RecoveryId, ShardId};

/// One shard copy being recovered from a source to a target.
///
/// `target_allocation_id` is captured at start and only ever compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoverySession {
    recovery_id: RecoveryId,
    shard_id: ShardId,
    source_node: NodeId,
    target_node: NodeId,
    target_allocation_id: AllocationId,
    state: RecoveryState,
    last_checkpoint: Checkpoint,
    started_at: DateTime<Utc>,
}

impl RecoverySession {
    pub(super) fn new(
        recovery_id: RecoveryId,
        shard_id: ShardId,
        source_node: NodeId,
        target_node: NodeId,
        target_allocation_id: AllocationId,
    ) -> Self {
        Self {
            recovery_id,
            shard_id,
            source_node,
            target_node,
            target_allocation_id,
            state: RecoveryState::Active,
            last_checkpoint: Checkpoint::START,
            started_at: Utc::now(),
        }
    }

    pub fn recovery_id(&self) -> RecoveryId {
        self.recovery_id
    }

    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    pub fn source_node(&self) -> &NodeId {
        &self.source_node
    }

    pub fn target_node(&self) -> &NodeId {
        &self.target_node
    }

    pub fn target_allocation_id(&self) -> &AllocationId {
        &self.target_allocation_id
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    pub fn last_checkpoint(&self) -> Checkpoint {
        self.last_checkpoint
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(super) fn set_state(&mut self, state: RecoveryState) {
        self.state = state;
    }

    /// Advance the checkpoint; an older one is ignored.
    ///
    /// Returns the checkpoint now stored.
    pub(super) fn advance_checkpoint(&mut self, checkpoint: Checkpoint) -> Checkpoint {
        if checkpoint > self.last_checkpoint {
            self.last_checkpoint = checkpoint;
        }
        self.last_checkpoint
    }
}
