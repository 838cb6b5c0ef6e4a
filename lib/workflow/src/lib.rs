//! Stateful stage graph for support-desk conversations.
//!
//! A support session runs through a fixed routing graph:
//!
//! - **Triage**: understand the problem and summarize it
//! - **KnowledgeMatch**: decide whether it is a known issue
//! - **Resolution**: resolve a known issue with action tools
//! - **Escalation**: hand the session to a (simulated) human specialist
//!
//! Stages finish with a tagged [`StageOutcome`]; the [`Orchestrator`] maps
//! it to the next stage through the [`RoutingGraph`] and publishes every
//! step as a [`WorkflowEvent`].

pub mod edge;
pub mod error;
pub mod execution;
pub mod graph;
pub mod model;
pub mod orchestrator;
pub mod policy;
pub mod run_state;
pub mod stage;
pub mod stages;

#[cfg(test)]
mod testing;

pub use edge::Route;
pub use error::{ExecutionError, GraphError, StageError, WorkflowError};
pub use execution::{
    EventChannel, EventSink, EventSinkError, ExecutionState, StageOutput, WorkflowEvent,
};
pub use graph::RoutingGraph;
pub use model::{
    ClassificationResult, INVESTIGATION_NOTICE, KnowledgeMatchResult, ResolutionOutcome, Urgency,
};
pub use orchestrator::{Orchestrator, SupportServices};
pub use policy::{DEFAULT_MAX_ITERATIONS, IterationPolicy};
pub use run_state::RunState;
pub use stage::{Stage, StageContext, StageId, StageOutcome};
pub use stages::{
    EscalationDelays, EscalationStage, KnowledgeMatchStage, ResolutionStage, TriageStage,
};
