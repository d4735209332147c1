//! Recovery session state machine
//!
//! ```text
//! Active ──disconnect──▶ Disconnected ──begin_reestablish──▶ Reestablishing
//!   ▲                         ▲                                  │
//!   └──────confirm_resumed────┼──────────────────────────────────┤
//!                             └────────abandon_reestablish───────┘
//! Active ──complete──▶ Completed
//! any non-terminal ──cancel──▶ Cancelled
//! any non-terminal ──fail──▶ Failed
//! ```
//!
//! - Transitions are explicit; nothing is inferred from time
//! - Completed, Cancelled and Failed are terminal
//! - Every forbidden transition is an error, never a silent no-op

use serde::Serialize;

use super::errors::{RecoveryError, RecoveryResult};

/// State of one recovery session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecoveryState {
    /// Transfer running
    Active,
    /// Transport reported the peer unreachable
    Disconnected,
    /// A reestablish request was accepted; awaiting resumption
    Reestablishing,
    /// Transfer finished
    Completed,
    /// Explicitly aborted
    Cancelled,
    /// Terminal failure
    Failed,
}

impl RecoveryState {
    /// Get the state name for observability.
    pub fn state_name(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Disconnected => "Disconnected",
            Self::Reestablishing => "Reestablishing",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Active → Disconnected
    pub fn disconnect(self) -> RecoveryResult<Self> {
        match self {
            Self::Active => Ok(Self::Disconnected),
            _ => Err(RecoveryError::forbidden_transition(self.state_name(), "Disconnected")),
        }
    }

    /// Disconnected → Reestablishing
    ///
    /// A session already in Reestablishing is busy, not forbidden.
    pub fn begin_reestablish(self) -> RecoveryResult<Self> {
        match self {
            Self::Disconnected => Ok(Self::Reestablishing),
            _ => Err(RecoveryError::forbidden_transition(self.state_name(), "Reestablishing")),
        }
    }

    /// Reestablishing → Active
    pub fn confirm_resumed(self) -> RecoveryResult<Self> {
        match self {
            Self::Reestablishing => Ok(Self::Active),
            _ => Err(RecoveryError::forbidden_transition(self.state_name(), "Active")),
        }
    }

    /// Reestablishing → Disconnected
    ///
    /// Resumption was abandoned (timed out); the session may be reestablished again.
    pub fn abandon_reestablish(self) -> RecoveryResult<Self> {
        match self {
            Self::Reestablishing => Ok(Self::Disconnected),
            _ => Err(RecoveryError::forbidden_transition(self.state_name(), "Disconnected")),
        }
    }

    /// Active → Completed
    pub fn complete(self) -> RecoveryResult<Self> {
        match self {
            Self::Active => Ok(Self::Completed),
            _ => Err(RecoveryError::forbidden_transition(self.state_name(), "Completed")),
        }
    }

    /// non-terminal → Cancelled
    pub fn cancel(self) -> RecoveryResult<Self> {
        if self.is_terminal() {
            return Err(RecoveryError::forbidden_transition(self.state_name(), "Cancelled"));
        }
        Ok(Self::Cancelled)
    }

    /// non-terminal → Failed
    pub fn fail(self) -> RecoveryResult<Self> {
        if self.is_terminal() {
            return Err(RecoveryError::forbidden_transition(self.state_name(), "Failed"));
        }
        Ok(Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reestablish_cycle() {
        let state = RecoveryState::Active
            .disconnect()
            .and_then(RecoveryState::begin_reestablish)
            .and_then(RecoveryState::confirm_resumed)
            .unwrap();
        assert_eq!(state, RecoveryState::Active);
    }

    #[test]
    fn test_abandoned_reestablish_is_retryable() {
        let state = RecoveryState::Reestablishing.abandon_reestablish().unwrap();
        assert_eq!(state, RecoveryState::Disconnected);
        assert!(state.begin_reestablish().is_ok());
    }

    #[test]
    fn test_complete_only_from_active() {
        assert!(RecoveryState::Active.complete().is_ok());
        assert_eq!(
            RecoveryState::Disconnected.complete(),
            Err(RecoveryError::forbidden_transition("Disconnected", "Completed"))
        );
    }

    #[test]
    fn test_terminal_states_are_final() {
        for state in [
            RecoveryState::Completed,
            RecoveryState::Cancelled,
            RecoveryState::Failed,
        ] {
            assert!(state.is_terminal());
            assert!(state.cancel().is_err());
            assert!(state.fail().is_err());
            assert!(state.disconnect().is_err());
            assert!(state.begin_reestablish().is_err());
        }
    }

    #[test]
    fn test_cancel_from_reestablishing() {
        assert_eq!(
            RecoveryState::Reestablishing.cancel(),
            Ok(RecoveryState::Cancelled)
        );
    }
}
