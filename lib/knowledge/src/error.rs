//! Error types for the knowledge crate.

use std::fmt;
use std::path::PathBuf;

/// Errors from knowledge base operations.
///
/// Both a missing file and a malformed file are fatal for the lookup that
/// hit them; nothing is cached when loading fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeError {
    /// The backing file does not exist.
    NotFound { path: PathBuf },
    /// The backing file is not a valid known-issue array.
    Malformed { path: PathBuf, reason: String },
    /// The backing file exists but could not be read.
    ReadFailed { path: PathBuf, reason: String },
}

impl fmt::Display for KnowledgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => {
                write!(f, "known issues file not found: {}", path.display())
            }
            Self::Malformed { path, reason } => {
                write!(f, "failed to parse {}: {reason}", path.display())
            }
            Self::ReadFailed { path, reason } => {
                write!(f, "failed to read {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for KnowledgeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_file() {
        let err = KnowledgeError::NotFound {
            path: PathBuf::from("know_issues.json"),
        };
        assert_eq!(err.to_string(), "known issues file not found: know_issues.json");
    }

    #[test]
    fn malformed_carries_reason() {
        let err = KnowledgeError::Malformed {
            path: PathBuf::from("know_issues.json"),
            reason: "expected value at line 1 column 1".to_string(),
        };
        assert!(err.to_string().starts_with("failed to parse know_issues.json"));
        assert!(err.to_string().contains("line 1 column 1"));
    }
}
