//! State of a single run through the stage graph.
//!
//! Stages read their inputs from here (the triage input, the KnowledgeMatch
//! verdict) and the orchestrator records each stage's outcome and the
//! final disposition.

use crate::execution::ExecutionState;
use crate::model::{ClassificationResult, KnowledgeMatchResult, ResolutionOutcome};
use crate::stage::{StageId, StageOutcome};
use chrono::{DateTime, Utc};
use support_desk_core::{SessionId, WorkflowRunId};

/// Complete state of a workflow run.
#[derive(Debug, Clone)]
pub struct RunState {
    /// The run ID.
    pub run_id: WorkflowRunId,
    /// The session the run belongs to.
    pub session_id: SessionId,
    /// Current execution state of the run.
    pub execution_state: ExecutionState,
    /// When the run was created.
    pub queued_at: DateTime<Utc>,
    /// When the first stage started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Customer text handed to Triage. Taken by the first stage that reads it.
    pub input: Option<String>,
    /// Triage verdict.
    pub classification: Option<ClassificationResult>,
    /// KnowledgeMatch verdict.
    pub knowledge_match: Option<KnowledgeMatchResult>,
    /// Final disposition.
    pub outcome: Option<ResolutionOutcome>,
    /// Stages run so far, with how each finished.
    pub visited: Vec<(StageId, StageOutcome)>,
    /// Error message (if failed).
    pub error: Option<String>,
}

impl RunState {
    /// Creates a queued run.
    #[must_use]
    pub fn new(session_id: SessionId, input: Option<String>) -> Self {
        Self {
            run_id: WorkflowRunId::new(),
            session_id,
            execution_state: ExecutionState::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            input,
            classification: None,
            knowledge_match: None,
            outcome: None,
            visited: Vec::new(),
            error: None,
        }
    }

    /// Starts the run.
    pub fn start(&mut self) {
        self.execution_state = ExecutionState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Records how a stage finished.
    pub fn record(&mut self, stage: StageId, outcome: StageOutcome) {
        self.visited.push((stage, outcome));
    }

    /// Returns the stages run so far, in order.
    #[must_use]
    pub fn path(&self) -> Vec<StageId> {
        self.visited.iter().map(|(stage, _)| *stage).collect()
    }

    /// Finalizes the run as completed.
    pub fn complete(&mut self) {
        self.execution_state = ExecutionState::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Finalizes the run as failed.
    pub fn fail(&mut self, error: String) {
        self.execution_state = ExecutionState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    /// Finalizes the run as cancelled.
    pub fn cancel(&mut self) {
        self.execution_state = ExecutionState::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    /// Returns the duration of the run, if it has started.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}
