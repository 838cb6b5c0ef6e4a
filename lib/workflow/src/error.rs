//! Error types for the workflow crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GraphError`: Routing graph construction and lookup
//! - `StageError`: Failures inside a single stage
//! - `ExecutionError`: Interpreter faults while running the graph
//! - `WorkflowError`: Run-level context wrapping the above

use crate::edge::Route;
use crate::stage::StageId;
use rootcause::prelude::Report;
use std::fmt;
use support_desk_ai::LlmError;
use support_desk_core::WorkflowRunId;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Stage is not part of the graph.
    StageNotFound { stage: StageId },
    /// The graph must have exactly one stage without incoming edges.
    EntryCount { count: usize },
    /// Graph contains cycles.
    CycleDetected,
    /// Two outgoing edges of one stage carry the same route.
    DuplicateRoute { stage: StageId, route: Route },
    /// No outgoing edge of a stage carries the route.
    NoRoute { stage: StageId, route: Route },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageNotFound { stage } => write!(f, "stage not found: {stage}"),
            Self::EntryCount { count } => {
                write!(f, "expected exactly one entry stage, found {count}")
            }
            Self::CycleDetected => write!(f, "graph contains cycles"),
            Self::DuplicateRoute { stage, route } => {
                write!(f, "stage {stage} has more than one '{route}' edge")
            }
            Self::NoRoute { stage, route } => {
                write!(f, "stage {stage} has no '{route}' edge")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors raised by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Triage left no problem summary.
    MissingSummary,
    /// The stage ran without the result it depends on.
    MissingInput { stage: StageId, input: &'static str },
    /// The reasoning collaborator failed.
    Reasoning { kind: &'static str, reason: String },
    /// The collaborator's reply was not the expected JSON.
    Deserialization { reason: String },
    /// A prompt could not be built.
    Prompt { reason: String },
    /// The knowledge base could not be read.
    KnowledgeBase { reason: String },
    /// The customer could not be reached.
    Interaction { reason: String },
    /// Session state could not be updated.
    Session { reason: String },
    /// Nobody is listening for events any more.
    EventsClosed,
    /// The run was cancelled.
    Cancelled,
}

impl StageError {
    /// Returns a short, stable name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSummary => "MissingSummary",
            Self::MissingInput { .. } => "MissingInput",
            Self::Reasoning { kind, .. } => *kind,
            Self::Deserialization { .. } => "Deserialization",
            Self::Prompt { .. } => "Prompt",
            Self::KnowledgeBase { .. } => "KnowledgeBase",
            Self::Interaction { .. } => "Interaction",
            Self::Session { .. } => "Session",
            Self::EventsClosed => "EventsClosed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Returns true if the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Wraps a collaborator failure, keeping it as the cause.
    #[must_use]
    pub fn from_llm(report: Report<LlmError>) -> Report<Self> {
        let context = match report.current_context() {
            LlmError::Cancelled => Self::Cancelled,
            LlmError::ResponseParseFailed { reason } => Self::Deserialization {
                reason: reason.clone(),
            },
            other => Self::Reasoning {
                kind: other.kind(),
                reason: other.to_string(),
            },
        };
        report.context(context)
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSummary => write!(f, "No problem summary found in triage result."),
            Self::MissingInput { stage, input } => {
                write!(f, "stage {stage} ran without {input}")
            }
            Self::Reasoning { reason, .. } => write!(f, "{reason}"),
            Self::Deserialization { reason } => {
                write!(f, "invalid structured reply: {reason}")
            }
            Self::Prompt { reason } => write!(f, "prompt could not be built: {reason}"),
            Self::KnowledgeBase { reason } => write!(f, "knowledge base unavailable: {reason}"),
            Self::Interaction { reason } => write!(f, "{reason}"),
            Self::Session { reason } => write!(f, "session update failed: {reason}"),
            Self::EventsClosed => write!(f, "event stream closed"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for StageError {}

/// Errors from the graph interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The graph names a stage that has no implementation.
    StageMissing { stage: StageId },
    /// A stage ended the run without producing an outcome.
    NoOutcome { stage: StageId },
    /// Execution was cancelled.
    Cancelled,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageMissing { stage } => write!(f, "no implementation for stage {stage}"),
            Self::NoOutcome { stage } => {
                write!(f, "stage {stage} finished the run without an outcome")
            }
            Self::Cancelled => write!(f, "execution cancelled"),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// High-level workflow errors.
///
/// Use these to add run context when wrapping lower-level errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// The graph failed validation (use as context wrapper).
    InvalidGraph,
    /// A stage failed (use as context wrapper).
    StageFailed {
        run_id: WorkflowRunId,
        stage: StageId,
    },
    /// The interpreter failed (use as context wrapper).
    Run { run_id: WorkflowRunId },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGraph => write!(f, "invalid routing graph"),
            Self::StageFailed { run_id, stage } => {
                write!(f, "stage {stage} failed in run {run_id}")
            }
            Self::Run { run_id } => write!(f, "run {run_id} failed"),
        }
    }
}

impl std::error::Error for WorkflowError {}
