//! Bounded clarification loops.

use serde::{Deserialize, Serialize};

/// Default number of collaborator calls a clarification loop may make.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Caps how many times a stage consults the collaborator before it gives up
/// asking the customer for more detail.
///
/// Triage and KnowledgeMatch share one policy so the bound is configured in
/// a single place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationPolicy {
    max_iterations: u32,
}

impl IterationPolicy {
    /// Creates a policy allowing `max_iterations` attempts. Zero is raised
    /// to one.
    #[must_use]
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
        }
    }

    /// Returns the number of attempts allowed.
    #[must_use]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Returns the attempt numbers, starting at 1.
    pub fn attempts(&self) -> impl Iterator<Item = u32> {
        1..=self.max_iterations
    }

    /// Returns true if `attempt` is the last one allowed.
    #[must_use]
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.max_iterations
    }
}

impl Default for IterationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}
