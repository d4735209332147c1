//! Active provider selection
//!
//! Where several implementations of one capability are available (for
//! example alternative cluster transports), exactly one is made active.
//!
//! Invariants:
//! - Every candidate declares an explicit `ProviderPriority`
//! - The highest priority wins; a tie at the top is a conflict and is never
//!   broken by name or registration order
//! - Resolution happens once; the chosen provider is fixed afterwards

mod errors;
mod registry;

pub use errors::{ProviderError, ProviderResult};
pub use registry::{ProviderPriority, ProviderRegistry};
