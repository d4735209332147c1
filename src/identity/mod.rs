//! Shared identifiers
//!
//! Every cross-node conflict in this crate is detected by comparing
//! identifiers rather than by locking:
//! - `ClusterStateVersion` orders published states
//! - `RecoveryId` + `AllocationId` anchor a shard recovery session
//!
//! A stale actor is detected and rejected, never prevented from acting.

mod errors;
mod node;
mod shard;
mod version;

pub use errors::ErrorKind;
pub use node::NodeId;
pub use shard::{AllocationId, Checkpoint, RecoveryId, ShardId};
pub use version::ClusterStateVersion;
