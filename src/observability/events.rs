//! Observable events
//!
//! Every lifecycle step of a publication round or a recovery session
//! is logged as one of these typed events.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Publication
    /// A publication round started
    PublishStart,
    /// Quorum of publish acks reached
    PublishQuorumReached,
    /// Publish window elapsed before quorum
    PublishTimeout,
    /// Too many failures/nacks for quorum
    PublishQuorumUnreachable,
    /// A newer publication replaced a pending one
    PublishSuperseded,
    /// Publish attempted with a non-successor version
    PublishStaleVersion,

    // Commit
    /// Commit requests sent
    CommitSent,
    /// Commit phase finished
    CommitComplete,
    /// A node never commit-acked within the commit window
    CommitStaleNode,

    // Follower apply side
    /// A committed state was applied
    StateApplied,
    /// A publish or commit request was rejected by a follower
    StateRejected,

    // Settings
    /// A new settings snapshot was installed
    SettingsUpdated,
    /// A settings update was rejected
    SettingsRejected,

    // Shard recovery
    /// Recovery session started
    RecoveryStart,
    /// Transport reported the peer unreachable
    RecoveryDisconnected,
    /// Reestablish request accepted
    RecoveryReestablishAccepted,
    /// Reestablish request rejected
    RecoveryReestablishRejected,
    /// Transfer resumed from checkpoint
    RecoveryResumed,
    /// Session failed
    RecoveryFailed,
    /// Session cancelled
    RecoveryCancelled,
    /// Transfer completed
    RecoveryComplete,

    // Providers
    /// Active provider resolved
    ProviderResolved,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::PublishStart => "PUBLISH_START",
            Event::PublishQuorumReached => "PUBLISH_QUORUM_REACHED",
            Event::PublishTimeout => "PUBLISH_TIMEOUT",
            Event::PublishQuorumUnreachable => "PUBLISH_QUORUM_UNREACHABLE",
            Event::PublishSuperseded => "PUBLISH_SUPERSEDED",
            Event::PublishStaleVersion => "PUBLISH_STALE_VERSION",

            Event::CommitSent => "COMMIT_SENT",
            Event::CommitComplete => "COMMIT_COMPLETE",
            Event::CommitStaleNode => "COMMIT_STALE_NODE",

            Event::StateApplied => "STATE_APPLIED",
            Event::StateRejected => "STATE_REJECTED",

            Event::SettingsUpdated => "SETTINGS_UPDATED",
            Event::SettingsRejected => "SETTINGS_REJECTED",

            Event::RecoveryStart => "RECOVERY_START",
            Event::RecoveryDisconnected => "RECOVERY_DISCONNECTED",
            Event::RecoveryReestablishAccepted => "RECOVERY_REESTABLISH_ACCEPTED",
            Event::RecoveryReestablishRejected => "RECOVERY_REESTABLISH_REJECTED",
            Event::RecoveryResumed => "RECOVERY_RESUMED",
            Event::RecoveryFailed => "RECOVERY_FAILED",
            Event::RecoveryCancelled => "RECOVERY_CANCELLED",
            Event::RecoveryComplete => "RECOVERY_COMPLETE",

            Event::ProviderResolved => "PROVIDER_RESOLVED",
        }
    }

    /// Severity the event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::PublishTimeout
            | Event::PublishQuorumUnreachable
            | Event::RecoveryFailed => Severity::Error,
            Event::PublishSuperseded
            | Event::PublishStaleVersion
            | Event::CommitStaleNode
            | Event::StateRejected
            | Event::SettingsRejected
            | Event::RecoveryDisconnected
            | Event::RecoveryReestablishRejected
            | Event::RecoveryCancelled => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
