//! Error taxonomy shared by every subsystem
//!
//! Each subsystem error (`PublishError`, `RecoveryError`, ...) maps onto one
//! of these kinds. No kind is process-fatal: every failure is scoped to a
//! single publication or recovery session.

use std::fmt;

/// Error classification, format: MESH_CATEGORY_NAME
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Publish or commit window elapsed before the required acks
    Timeout,
    /// Too many failures or nacks for quorum to be reachable
    QuorumUnreachable,
    /// Unknown or terminal recovery/publication session
    NotFound,
    /// Request names a different shard than the session
    ShardMismatch,
    /// Target shard copy was reassigned
    AllocationMismatch,
    /// Another reestablish is in progress
    Busy,
    /// Send/receive failure
    TransportFailure,
    /// Publish attempted with a non-successor version
    StaleVersion,
    /// A newer publication replaced this one before it resolved
    Superseded,
    /// Session state does not allow the requested transition
    IllegalTransition,
    /// Settings value rejected
    InvalidSettings,
    /// Malformed or corrupt wire data
    Codec,
    /// Provider resolution could not pick exactly one candidate
    ProviderConflict,
}

impl ErrorKind {
    /// Returns the stable error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "MESH_TIMEOUT",
            Self::QuorumUnreachable => "MESH_QUORUM_UNREACHABLE",
            Self::NotFound => "MESH_NOT_FOUND",
            Self::ShardMismatch => "MESH_SHARD_MISMATCH",
            Self::AllocationMismatch => "MESH_ALLOCATION_MISMATCH",
            Self::Busy => "MESH_BUSY",
            Self::TransportFailure => "MESH_TRANSPORT_FAILURE",
            Self::StaleVersion => "MESH_STALE_VERSION",
            Self::Superseded => "MESH_SUPERSEDED",
            Self::IllegalTransition => "MESH_ILLEGAL_TRANSITION",
            Self::InvalidSettings => "MESH_INVALID_SETTINGS",
            Self::Codec => "MESH_CODEC",
            Self::ProviderConflict => "MESH_PROVIDER_CONFLICT",
        }
    }

    /// Whether the same session may be retried after this error.
    ///
    /// Identity mismatches and missing sessions are never resumable: the
    /// requester must restart at full cost.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Busy | Self::Timeout | Self::TransportFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
