//! Core domain types and utilities for the support-desk platform.
//!
//! This crate provides the foundational types and error handling shared by
//! every stage of a support conversation.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, SessionId, TurnId, WorkflowRunId};
