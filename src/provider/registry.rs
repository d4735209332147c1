//! Provider registry

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use serde::Serialize;

use super::errors::{ProviderError, ProviderResult};
use crate::observability::{log_event_with_fields, Event};

/// Declared priority of a provider candidate.
///
/// Ordered by `rank`, then by `version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ProviderPriority {
    pub rank: i32,
    pub version: u32,
}

impl ProviderPriority {
    pub fn new(rank: i32, version: u32) -> Self {
        Self { rank, version }
    }
}

impl fmt::Display for ProviderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.rank, self.version)
    }
}

struct Candidate<P: ?Sized> {
    name: String,
    priority: ProviderPriority,
    provider: Arc<P>,
}

struct Resolved<P: ?Sized> {
    name: String,
    provider: Arc<P>,
}

/// Candidates for one capability and the provider chosen among them.
pub struct ProviderRegistry<P: ?Sized> {
    capability: &'static str,
    candidates: Mutex<Vec<Candidate<P>>>,
    resolved: OnceLock<Resolved<P>>,
}

impl<P: ?Sized> ProviderRegistry<P> {
    pub fn new(capability: &'static str) -> Self {
        Self {
            capability,
            candidates: Mutex::new(Vec::new()),
            resolved: OnceLock::new(),
        }
    }

    pub fn capability(&self) -> &'static str {
        self.capability
    }

    /// Add a candidate. Fails once the active provider has been resolved.
    pub fn register(
        &self,
        name: impl Into<String>,
        priority: ProviderPriority,
        provider: Arc<P>,
    ) -> ProviderResult<()> {
        let name = name.into();
        let mut candidates = self
            .candidates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.resolved.get().is_some() {
            return Err(ProviderError::AlreadyResolved(name));
        }
        if candidates.iter().any(|c| c.name == name) {
            return Err(ProviderError::Duplicate(name));
        }
        candidates.push(Candidate {
            name,
            priority,
            provider,
        });
        Ok(())
    }

    /// Choose the active provider, or return the one already chosen.
    pub fn resolve(&self) -> ProviderResult<Arc<P>> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.provider.clone());
        }

        let candidates = self
            .candidates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.provider.clone());
        }

        let top = candidates
            .iter()
            .max_by_key(|c| c.priority)
            .ok_or(ProviderError::NoCandidates(self.capability))?;
        if let Some(rival) = candidates
            .iter()
            .find(|c| c.priority == top.priority && c.name != top.name)
        {
            return Err(ProviderError::Conflict {
                first: top.name.clone(),
                second: rival.name.clone(),
                priority: top.priority,
            });
        }

        let priority = top.priority.to_string();
        log_event_with_fields(
            Event::ProviderResolved,
            &[
                ("capability", self.capability),
                ("provider", top.name.as_str()),
                ("priority", priority.as_str()),
            ],
        );

        let resolved = self.resolved.get_or_init(|| Resolved {
            name: top.name.clone(),
            provider: top.provider.clone(),
        });
        Ok(resolved.provider.clone())
    }

    /// Name of the active provider, if resolved.
    pub fn active_name(&self) -> Option<&str> {
        self.resolved.get().map(|r| r.name.as_str())
    }
}

impl<P: ?Sized> fmt::Debug for ProviderRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("capability", &self.capability)
            .field("active", &self.active_name())
            .finish_non_exhaustive()
    }
}
