//! Dynamic discovery settings
//!
//! The only in-scope contract is update delivery:
//! - one immutable snapshot, swapped atomically on update
//! - subscribers get the new snapshot wholesale
//! - an operation already in progress keeps the snapshot it started with
//!
//! `initial_state_timeout` is node-scoped and rejected by dynamic updates.

mod config;
mod errors;
mod snapshot;
mod store;

pub use config::DiscoverySettingsConfig;
pub use errors::{SettingsError, SettingsResult};
pub use snapshot::{
    DiscoverySettingsSnapshot, DEFAULT_COMMIT_TIMEOUT_SECS, DEFAULT_INITIAL_STATE_TIMEOUT_SECS,
    DEFAULT_PUBLISH_TIMEOUT_SECS, MAX_TIMEOUT_SECS,
};
pub use store::{DynamicSettingsStore, SettingsUpdate};
