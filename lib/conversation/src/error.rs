//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StateError`: Errors from the scoped state store
//! - `SessionError`: Errors from session context operations
//! - `InteractionError`: Errors while waiting on the customer
//! - `ToolError`: Errors from action tool execution

use crate::state::{StateKey, StateScope};
use support_desk_core::SessionId;
use std::fmt;

/// Errors from state store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A stored value could not be decoded into the requested type.
    Decode {
        scope: StateScope,
        key: StateKey,
        reason: String,
    },
    /// A value could not be encoded for storage.
    Encode { key: StateKey, reason: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { scope, key, reason } => {
                write!(f, "failed to decode {key} in {scope}: {reason}")
            }
            Self::Encode { key, reason } => {
                write!(f, "failed to encode {key}: {reason}")
            }
        }
    }
}

impl std::error::Error for StateError {}

/// Errors from session context operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The problem summary is write-once and was already recorded.
    SummaryAlreadyRecorded { session_id: SessionId },
    /// Reading or writing the backing store failed.
    Storage {
        session_id: SessionId,
        source: StateError,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SummaryAlreadyRecorded { session_id } => {
                write!(f, "problem summary already recorded for {session_id}")
            }
            Self::Storage { session_id, source } => {
                write!(f, "session storage failed for {session_id}: {source}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from an interaction channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionError {
    /// The wait was cancelled before a reply arrived.
    Cancelled,
    /// The input side of the channel closed.
    Closed,
    /// Reading or writing the channel failed.
    Io { reason: String },
}

impl fmt::Display for InteractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "interaction cancelled"),
            Self::Closed => write!(f, "interaction channel closed"),
            Self::Io { reason } => write!(f, "interaction I/O failed: {reason}"),
        }
    }
}

impl std::error::Error for InteractionError {}

/// Errors from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool not found.
    NotFound { name: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
    /// Invalid tool input.
    InvalidInput { name: String, reason: String },
    /// Execution was cancelled.
    Cancelled { name: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "tool not found: {name}"),
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
            Self::Cancelled { name } => write!(f, "tool '{name}' cancelled"),
        }
    }
}

impl std::error::Error for ToolError {}
