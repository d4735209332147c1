//! Publication errors
//!
//! Per-node transport failures never surface here on their own: they are
//! absorbed by the `AckCollector` as implicit nacks and only escalate as
//! `QuorumUnreachable`.

use std::time::Duration;

use thiserror::Error;

use crate::identity::{ClusterStateVersion, ErrorKind, NodeId};
use crate::wire::WireError;

/// Result type for publication operations
pub type PublishResult<T> = Result<T, PublishError>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Failure to deliver one message to one node
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No route to the node
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),

    /// The node answered with an error
    #[error("request to {node} failed: {reason}")]
    Failed { node: NodeId, reason: String },

    /// The message could not be framed or unframed
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TransportFailure
    }
}

/// Publication errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// Candidate state is not the successor of the current version
    #[error("stale version: expected {expected}, got {found}")]
    StaleVersion {
        expected: ClusterStateVersion,
        found: ClusterStateVersion,
    },

    /// Publish window elapsed before quorum
    #[error("publication of version {version} timed out with {acked} of {quorum} required acks")]
    Timeout {
        version: ClusterStateVersion,
        acked: usize,
        quorum: usize,
    },

    /// Failures and nacks made quorum impossible
    #[error("quorum unreachable for version {version}: {rejected} of {voting} voting members nacked or failed")]
    QuorumUnreachable {
        version: ClusterStateVersion,
        rejected: usize,
        voting: usize,
    },

    /// A newer publication replaced this one while it was pending
    #[error("publication of version {0} superseded")]
    Superseded(ClusterStateVersion),

    /// Delivery failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed frame
    #[error(transparent)]
    Wire(#[from] WireError),

    /// State or diff payload could not be encoded or decoded
    #[error("invalid state payload: {0}")]
    Payload(String),

    /// Commit for a version this node holds no pending state for
    #[error("no pending state for version {0}")]
    NotFound(ClusterStateVersion),

    /// Diff does not apply to the state held
    #[error("diff base {base} does not match held version {held}")]
    DiffBaseMismatch {
        base: ClusterStateVersion,
        held: ClusterStateVersion,
    },

    /// No cluster state was received after startup
    #[error("no initial cluster state received within {0:?}")]
    InitialStateTimeout(Duration),
}

impl PublishError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StaleVersion { .. } => ErrorKind::StaleVersion,
            Self::Timeout { .. } | Self::InitialStateTimeout(_) => ErrorKind::Timeout,
            Self::QuorumUnreachable { .. } => ErrorKind::QuorumUnreachable,
            Self::Superseded(_) => ErrorKind::Superseded,
            Self::Transport(_) => ErrorKind::TransportFailure,
            Self::Wire(_) | Self::Payload(_) => ErrorKind::Codec,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DiffBaseMismatch { .. } => ErrorKind::StaleVersion,
        }
    }

    pub(crate) fn payload(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}
