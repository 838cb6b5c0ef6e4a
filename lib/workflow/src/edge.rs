//! Edge labels for the routing graph.
//!
//! Every edge carries the [`Route`] a stage must report for the interpreter
//! to follow it. A stage has at most one outgoing edge per route.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The label on an edge between two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Unconditional hand-off to the next stage.
    Next,
    /// The problem can be solved automatically.
    Resolve,
    /// The problem goes to a human.
    Escalate,
}

impl Route {
    /// Returns the label as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Resolve => "resolve",
            Self::Escalate => "escalate",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_labels() {
        assert_eq!(Route::Next.to_string(), "next");
        assert_eq!(Route::Resolve.as_str(), "resolve");
        assert_eq!(
            serde_json::to_string(&Route::Escalate).expect("serialize"),
            "\"escalate\""
        );
    }
}
