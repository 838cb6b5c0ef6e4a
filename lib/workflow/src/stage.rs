//! The stage abstraction.
//!
//! A stage is one step of a support conversation. It reads and writes the
//! session, talks to the customer through the interaction channel, publishes
//! events and finishes with a tagged [`StageOutcome`] that the orchestrator
//! turns into a graph edge.

use crate::edge::Route;
use crate::error::StageError;
use crate::execution::{EventSink, StageOutput, WorkflowEvent};
use crate::run_state::RunState;
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use support_desk_conversation::{InteractionChannel, InteractionError, SessionContext};
use tokio_util::sync::CancellationToken;

/// Identifies a stage in the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Understand the problem.
    Triage,
    /// Match the problem against known issues.
    KnowledgeMatch,
    /// Resolve a known issue automatically.
    Resolution,
    /// Hand the customer to a human.
    Escalation,
}

impl StageId {
    /// Returns the stage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage",
            Self::KnowledgeMatch => "knowledge_match",
            Self::Resolution => "resolution",
            Self::Escalation => "escalation",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Follow the unconditional edge.
    Continue,
    /// Follow the resolve edge.
    Resolve,
    /// Follow the escalate edge.
    Escalate,
    /// The run is over.
    Done,
}

impl StageOutcome {
    /// The edge label to follow, or `None` when the run is over.
    #[must_use]
    pub fn route(self) -> Option<Route> {
        match self {
            Self::Continue => Some(Route::Next),
            Self::Resolve => Some(Route::Resolve),
            Self::Escalate => Some(Route::Escalate),
            Self::Done => None,
        }
    }
}

impl From<Route> for StageOutcome {
    fn from(route: Route) -> Self {
        match route {
            Route::Next => Self::Continue,
            Route::Resolve => Self::Resolve,
            Route::Escalate => Self::Escalate,
        }
    }
}

/// Everything a stage may touch while it runs.
pub struct StageContext<'a> {
    /// The session's history and summary.
    pub session: &'a mut SessionContext,
    /// Results produced so far in this run.
    pub run: &'a mut RunState,
    /// The customer.
    pub channel: &'a dyn InteractionChannel,
    /// Where events go.
    pub events: &'a dyn EventSink,
    /// Cancels the run.
    pub cancel: &'a CancellationToken,
}

impl StageContext<'_> {
    /// Publishes a line of text for the customer.
    ///
    /// # Errors
    ///
    /// Returns `EventsClosed` if nobody is listening any more.
    pub async fn say(&self, stage: StageId, text: impl Into<String>) -> Result<(), StageError> {
        self.events
            .publish(WorkflowEvent::Message {
                stage,
                text: text.into(),
            })
            .await
            .map_err(|_| StageError::EventsClosed)
    }

    /// Publishes a stage result.
    ///
    /// # Errors
    ///
    /// Returns `EventsClosed` if nobody is listening any more.
    pub async fn emit(&self, stage: StageId, output: StageOutput) -> Result<(), StageError> {
        self.events
            .publish(WorkflowEvent::Output { stage, output })
            .await
            .map_err(|_| StageError::EventsClosed)
    }

    /// Asks the customer and waits for a reply.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the run is cancelled while waiting, otherwise
    /// `Interaction`.
    pub async fn ask(&self, prompt: &str) -> Result<String, StageError> {
        self.channel
            .ask(prompt, self.cancel)
            .await
            .map_err(|e| match e {
                InteractionError::Cancelled => StageError::Cancelled,
                other => StageError::Interaction {
                    reason: other.to_string(),
                },
            })
    }

    /// Sleeps for `delay` unless the run is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the run is cancelled while sleeping.
    pub async fn pause(&self, delay: std::time::Duration) -> Result<(), StageError> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = self.cancel.cancelled() => Err(StageError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// One step of the support graph.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Which stage this is.
    fn id(&self) -> StageId;

    /// Runs the stage to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage cannot finish; the run ends with it.
    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutcome, Report<StageError>>;
}
