//! Run lifecycle and the event stream.
//!
//! Stages never print. Everything the customer should see, every stage
//! result and every request for input is published as a [`WorkflowEvent`]
//! through an [`EventSink`]; the driver decides how to render it.

use crate::model::{ClassificationResult, KnowledgeMatchResult, ResolutionOutcome};
use crate::stage::{StageId, StageOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use support_desk_conversation::interaction::{INVALID_INPUT_NOTICE, effective_prompt};
use support_desk_conversation::{InteractionChannel, InteractionError};
use support_desk_core::{SessionId, WorkflowRunId};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// The overall state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Run is created but no stage has started.
    Queued,
    /// Run is actively executing.
    Running,
    /// Run reached a terminal stage with an outcome.
    Completed,
    /// A stage or the interpreter failed.
    Failed,
    /// Run was cancelled by the customer or the system.
    Cancelled,
}

impl ExecutionState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// A result a stage hands to the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    /// Triage verdict.
    Classification(ClassificationResult),
    /// KnowledgeMatch verdict.
    KnowledgeMatch(KnowledgeMatchResult),
    /// Final disposition from Resolution or Escalation.
    Resolution(ResolutionOutcome),
}

/// Events published while a run executes.
#[derive(Debug)]
pub enum WorkflowEvent {
    /// Run started executing.
    RunStarted {
        run_id: WorkflowRunId,
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
    /// A stage started.
    StageStarted {
        run_id: WorkflowRunId,
        stage: StageId,
        timestamp: DateTime<Utc>,
    },
    /// Text for the customer.
    Message { stage: StageId, text: String },
    /// Text for the customer that belongs to no stage.
    Notice { text: String },
    /// A stage result.
    Output { stage: StageId, output: StageOutput },
    /// The run waits for the customer. Send the reply through `reply`.
    InputRequested {
        prompt: String,
        reply: oneshot::Sender<String>,
    },
    /// A stage finished.
    StageCompleted {
        run_id: WorkflowRunId,
        stage: StageId,
        outcome: StageOutcome,
        timestamp: DateTime<Utc>,
    },
    /// Run reached a terminal stage.
    RunCompleted {
        run_id: WorkflowRunId,
        outcome: ResolutionOutcome,
        timestamp: DateTime<Utc>,
    },
    /// Run failed.
    RunFailed {
        run_id: WorkflowRunId,
        stage: Option<StageId>,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Returns a short name for the event type.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::StageStarted { .. } => "stage_started",
            Self::Message { .. } => "message",
            Self::Notice { .. } => "notice",
            Self::Output { .. } => "output",
            Self::InputRequested { .. } => "input_requested",
            Self::StageCompleted { .. } => "stage_completed",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
        }
    }

    /// Returns the run ID for lifecycle events.
    #[must_use]
    pub fn run_id(&self) -> Option<WorkflowRunId> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => Some(*run_id),
            Self::Message { .. }
            | Self::Notice { .. }
            | Self::Output { .. }
            | Self::InputRequested { .. } => None,
        }
    }
}

/// Errors from event publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSinkError {
    /// The receiving side is gone.
    Closed,
}

impl fmt::Display for EventSinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "event receiver dropped"),
        }
    }
}

impl std::error::Error for EventSinkError {}

/// Destination for workflow events.
///
/// This abstraction lets the orchestrator be tested with a recording sink
/// while the driver uses an mpsc channel.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes an event.
    async fn publish(&self, event: WorkflowEvent) -> Result<(), EventSinkError>;
}

#[async_trait]
impl EventSink for mpsc::UnboundedSender<WorkflowEvent> {
    async fn publish(&self, event: WorkflowEvent) -> Result<(), EventSinkError> {
        self.send(event).map_err(|_| EventSinkError::Closed)
    }
}

#[async_trait]
impl EventSink for mpsc::Sender<WorkflowEvent> {
    async fn publish(&self, event: WorkflowEvent) -> Result<(), EventSinkError> {
        self.send(event).await.map_err(|_| EventSinkError::Closed)
    }
}

/// Interaction channel that goes through the event stream.
///
/// Each `ask` publishes [`WorkflowEvent::InputRequested`] and waits on its
/// responder. Blank answers are rejected with a notice and requested again.
pub struct EventChannel {
    events: Arc<dyn EventSink>,
}

impl EventChannel {
    /// Creates a channel publishing to `events`.
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl InteractionChannel for EventChannel {
    async fn ask(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, InteractionError> {
        let prompt = effective_prompt(prompt);
        loop {
            let (reply, answer) = oneshot::channel();
            self.events
                .publish(WorkflowEvent::InputRequested {
                    prompt: prompt.to_string(),
                    reply,
                })
                .await
                .map_err(|_| InteractionError::Closed)?;

            let answer = tokio::select! {
                () = cancel.cancelled() => return Err(InteractionError::Cancelled),
                answer = answer => answer.map_err(|_| InteractionError::Closed)?,
            };

            let answer = answer.trim();
            if !answer.is_empty() {
                return Ok(answer.to_string());
            }
            self.events
                .publish(WorkflowEvent::Notice {
                    text: INVALID_INPUT_NOTICE.to_string(),
                })
                .await
                .map_err(|_| InteractionError::Closed)?;
        }
    }
}
