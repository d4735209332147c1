//! Shard recovery errors
//!
//! Identity failures (`NotFound`, `ShardMismatch`, `AllocationMismatch`) are
//! final for the session: the target must restart recovery from scratch.

use std::time::Duration;

use thiserror::Error;

use crate::identity::{AllocationId, ErrorKind, RecoveryId, ShardId};

/// Result type for shard recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// Shard recovery errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryError {
    /// Unknown recovery id, or the session already ended
    #[error("recovery {0} not found")]
    NotFound(RecoveryId),

    /// Request names a different shard than the session
    #[error("recovery {recovery_id} is for shard {expected}, request names {found}")]
    ShardMismatch {
        recovery_id: RecoveryId,
        expected: ShardId,
        found: ShardId,
    },

    /// The target shard copy was reassigned
    #[error("recovery {recovery_id} targets allocation {expected}, request names {found}")]
    AllocationMismatch {
        recovery_id: RecoveryId,
        expected: AllocationId,
        found: AllocationId,
    },

    /// Another reestablish is in progress for this session
    #[error("recovery {0} is already being reestablished")]
    Busy(RecoveryId),

    /// Resumption did not finish in time; the session may be retried
    #[error("reestablishing recovery {recovery_id} timed out after {timeout:?}")]
    Timeout {
        recovery_id: RecoveryId,
        timeout: Duration,
    },

    /// The source could not resume the transfer
    #[error("recovery {recovery_id} failed to resume: {reason}")]
    ResumeFailed {
        recovery_id: RecoveryId,
        reason: String,
    },

    /// Session state does not allow the transition
    #[error("forbidden transition: {from} -> {to}")]
    ForbiddenTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Recovery configuration rejected
    #[error("recovery setting '{0}' must be strictly positive")]
    InvalidConfig(&'static str),
}

impl RecoveryError {
    /// Create a forbidden transition error.
    pub fn forbidden_transition(from: &'static str, to: &'static str) -> Self {
        Self::ForbiddenTransition { from, to }
    }

    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ShardMismatch { .. } => ErrorKind::ShardMismatch,
            Self::AllocationMismatch { .. } => ErrorKind::AllocationMismatch,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ResumeFailed { .. } => ErrorKind::TransportFailure,
            Self::ForbiddenTransition { .. } => ErrorKind::IllegalTransition,
            Self::InvalidConfig(_) => ErrorKind::InvalidSettings,
        }
    }
}
