//! Resumable peer shard recovery
//!
//! A recovery session copies one shard from a source node to a target
//! replica. When the connection drops mid-transfer the target asks the
//! source to reestablish the session instead of starting over.
//!
//! Invariants:
//! - A session is identified by its `RecoveryId` for its whole lifetime
//! - A reestablish request must name the same shard and the same target
//!   allocation id the session was started with
//! - The recorded checkpoint only moves forward
//! - Only one reestablish attempt per session is in flight; a second one
//!   is rejected Busy
//! - Terminal sessions are released; later requests get NotFound

mod allocation;
mod config;
mod errors;
mod handler;
mod registry;
mod session;
mod state;
mod transfer;

pub use allocation::{AllocationProvider, AllocationTable};
pub use config::{RecoveryConfig, DEFAULT_CHUNK_SIZE_BYTES, DEFAULT_REESTABLISH_TIMEOUT_SECS};
pub use errors::{RecoveryError, RecoveryResult};
pub use handler::{RecoveryReestablishHandler, RecoveryResumer, ResumeFuture};
pub use registry::{RecoverySessionRegistry, ResumeToken};
pub use session::RecoverySession;
pub use state::RecoveryState;
pub use transfer::{Chunks, TransferPlan};
