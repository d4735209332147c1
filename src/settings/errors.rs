//! Settings errors

use thiserror::Error;

use crate::identity::ErrorKind;

/// Result type for settings operations
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Settings errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    /// A duration setting was zero
    #[error("setting '{0}' must be strictly positive")]
    NonPositive(&'static str),

    /// A duration setting exceeded the supported maximum
    #[error("setting '{setting}' must not exceed {max_secs}s")]
    TooLarge {
        setting: &'static str,
        max_secs: u64,
    },

    /// A node-scoped setting was changed at runtime
    #[error("setting '{0}' is not dynamic and cannot be updated at runtime")]
    NotDynamic(&'static str),
}

impl SettingsError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidSettings
    }
}
