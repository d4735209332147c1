//! Observability subsystem
//!
//! - Structured logging (JSON lines)
//! - Monotonic counters
//! - Typed lifecycle events
//!
//! Observability is read-only: it describes what happened and never
//! decides what happens. A failing log sink never fails a publication or
//! a recovery session.
//!
//! # Usage
//!
//! ```ignore
//! use meshstate::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::CommitStaleNode, &[("node", "n4"), ("version", "12")]);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
