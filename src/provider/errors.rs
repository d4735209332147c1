//! Provider resolution errors

use thiserror::Error;

use super::registry::ProviderPriority;
use crate::identity::ErrorKind;

/// Result type for provider resolution
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Nothing was registered
    #[error("no provider registered for '{0}'")]
    NoCandidates(&'static str),

    /// Two candidates share the highest priority
    #[error("providers '{first}' and '{second}' both declare priority {priority}")]
    Conflict {
        first: String,
        second: String,
        priority: ProviderPriority,
    },

    /// A provider name was registered twice
    #[error("provider '{0}' is already registered")]
    Duplicate(String),

    /// Registration after the active provider was chosen
    #[error("provider '{0}' registered after resolution")]
    AlreadyResolved(String),
}

impl ProviderError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCandidates(_) => ErrorKind::NotFound,
            Self::Conflict { .. } | Self::Duplicate(_) | Self::AlreadyResolved(_) => {
                ErrorKind::ProviderConflict
            }
        }
    }
}
