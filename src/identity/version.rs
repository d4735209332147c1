//! ClusterStateVersion - totally ordered state identity
//!
//! - Strictly increasing on the originating node
//! - A follower never applies a version lower than (or equal to) the one it holds
//! - Encoded as int64 on the wire

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of a published cluster state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterStateVersion(u64);

impl ClusterStateVersion {
    /// Version held by a node that has never applied a state.
    pub const INITIAL: ClusterStateVersion = ClusterStateVersion(0);

    /// Creates a version with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The only version a publication may carry after `self`.
    #[inline]
    pub fn successor(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Whether `other` is exactly the successor of `self`.
    #[inline]
    pub fn is_succeeded_by(&self, other: ClusterStateVersion) -> bool {
        self.0.checked_add(1) == Some(other.0)
    }
}

impl fmt::Display for ClusterStateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successor_is_plus_one() {
        let v = ClusterStateVersion::new(41);
        assert_eq!(v.successor(), ClusterStateVersion::new(42));
        assert!(v.is_succeeded_by(ClusterStateVersion::new(42)));
    }

    #[test]
    fn test_non_successor_rejected() {
        let v = ClusterStateVersion::new(5);
        assert!(!v.is_succeeded_by(ClusterStateVersion::new(5)));
        assert!(!v.is_succeeded_by(ClusterStateVersion::new(7)));
        assert!(!v.is_succeeded_by(ClusterStateVersion::new(4)));
    }

    #[test]
    fn test_max_has_no_successor() {
        let v = ClusterStateVersion::new(u64::MAX);
        assert!(!v.is_succeeded_by(ClusterStateVersion::new(0)));
    }

    #[test]
    fn test_versions_order() {
        assert!(ClusterStateVersion::INITIAL < ClusterStateVersion::new(1));
    }
}
