//! Stage graph interpreter.
//!
//! One orchestrator runs one session at a time, sequentially:
//! 1. Publish `RunStarted` and enter the graph's entry stage
//! 2. Run the stage against the session, the run state and the channel
//! 3. Record its tagged outcome and look up the edge labelled with it
//! 4. Stop when a stage reports `Done`; the run's outcome is the result
//!
//! A stage failure ends the run with `RunFailed`; nothing is retried.

use crate::error::{ExecutionError, GraphError, StageError, WorkflowError};
use crate::execution::{EventChannel, EventSink, WorkflowEvent};
use crate::graph::RoutingGraph;
use crate::policy::IterationPolicy;
use crate::run_state::RunState;
use crate::stage::{Stage, StageContext, StageId};
use crate::stages::{
    EscalationDelays, EscalationStage, KnowledgeMatchStage, ResolutionStage, TriageStage,
};
use chrono::Utc;
use rootcause::prelude::Report;
use std::collections::HashMap;
use std::sync::Arc;
use support_desk_ai::{LlmBackend, PromptRegistry};
use support_desk_conversation::{InteractionChannel, SessionContext, ToolRegistry};
use support_desk_knowledge::KnowledgeBase;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Shared collaborators the support stages are built from.
#[derive(Clone)]
pub struct SupportServices {
    /// The reasoning collaborator.
    pub backend: Arc<dyn LlmBackend>,
    /// Stage instructions and output schemas.
    pub prompts: Arc<PromptRegistry>,
    /// Known issues.
    pub knowledge: Arc<KnowledgeBase>,
    /// Action tools available to Resolution.
    pub tools: Arc<ToolRegistry>,
    /// Bound on the Triage and KnowledgeMatch loops.
    pub policy: IterationPolicy,
    /// Pauses in the escalation script.
    pub escalation_delays: EscalationDelays,
}

impl SupportServices {
    /// Creates services with the default prompts, tools, policy and delays.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            backend,
            prompts: Arc::new(PromptRegistry::support_defaults()),
            knowledge,
            tools: Arc::new(ToolRegistry::support_defaults()),
            policy: IterationPolicy::default(),
            escalation_delays: EscalationDelays::default(),
        }
    }

    /// Sets the iteration policy.
    #[must_use]
    pub fn with_policy(mut self, policy: IterationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the escalation delays.
    #[must_use]
    pub fn with_escalation_delays(mut self, delays: EscalationDelays) -> Self {
        self.escalation_delays = delays;
        self
    }

    /// Sets the tool registry.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Arc::new(tools);
        self
    }
}

/// The workflow orchestrator.
pub struct Orchestrator {
    graph: RoutingGraph,
    stages: HashMap<StageId, Arc<dyn Stage>>,
    channel: Arc<dyn InteractionChannel>,
    events: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator over `graph` with no stages registered.
    #[must_use]
    pub fn new(
        graph: RoutingGraph,
        channel: Arc<dyn InteractionChannel>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            graph,
            stages: HashMap::new(),
            channel,
            events,
        }
    }

    /// Builds the support workflow: the fixed topology with all four stages.
    ///
    /// # Errors
    ///
    /// Returns an error if the assembled graph does not validate.
    pub fn support(
        services: &SupportServices,
        channel: Arc<dyn InteractionChannel>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, Report<WorkflowError>> {
        let orchestrator = Self::new(RoutingGraph::support_topology(), channel, events)
            .with_stage(Arc::new(TriageStage::new(
                Arc::clone(&services.backend),
                Arc::clone(&services.prompts),
                services.policy,
            )))
            .with_stage(Arc::new(KnowledgeMatchStage::new(
                Arc::clone(&services.backend),
                Arc::clone(&services.prompts),
                Arc::clone(&services.knowledge),
                services.policy,
            )))
            .with_stage(Arc::new(ResolutionStage::new(
                Arc::clone(&services.backend),
                Arc::clone(&services.prompts),
                Arc::clone(&services.tools),
            )))
            .with_stage(Arc::new(EscalationStage::new(services.escalation_delays)));
        orchestrator.validate()?;
        Ok(orchestrator)
    }

    /// Like [`Orchestrator::support`], but customer input travels through
    /// the event stream as [`WorkflowEvent::InputRequested`].
    ///
    /// # Errors
    ///
    /// Returns an error if the assembled graph does not validate.
    pub fn support_over_events(
        services: &SupportServices,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, Report<WorkflowError>> {
        let channel = Arc::new(EventChannel::new(Arc::clone(&events)));
        Self::support(services, channel, events)
    }

    /// Registers the implementation for a stage, replacing any previous one.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.insert(stage.id(), stage);
        self
    }

    /// Checks the graph and that every stage in it has an implementation.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGraph` wrapping the first problem found.
    pub fn validate(&self) -> Result<(), Report<WorkflowError>> {
        self.graph.validate().map_err(invalid_graph)?;
        if let Some(stage) = self.graph.stages().find(|s| !self.stages.contains_key(s)) {
            let report: Report<ExecutionError> = ExecutionError::StageMissing { stage }.into();
            return Err(report.context(WorkflowError::InvalidGraph));
        }
        Ok(())
    }

    /// Runs one session through the graph.
    ///
    /// `input` is the customer's opening message; without it the entry
    /// stage greets the customer and waits for one. On success the returned
    /// state always carries an outcome.
    ///
    /// # Errors
    ///
    /// Returns `StageFailed` if a stage fails or is cancelled, and `Run` for
    /// interpreter faults (missing stage, missing edge, missing outcome).
    #[instrument(skip_all, fields(session_id = %session.id()))]
    pub async fn run(
        &self,
        session: &mut SessionContext,
        input: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<RunState, Report<WorkflowError>> {
        let mut run = RunState::new(session.id(), input);
        let run_id = run.run_id;
        let mut current = self.graph.entry().map_err(invalid_graph)?;

        run.start();
        info!(%run_id, "run started");
        self.publish(WorkflowEvent::RunStarted {
            run_id,
            session_id: session.id(),
            timestamp: Utc::now(),
        })
        .await;

        loop {
            let Some(stage) = self.stages.get(&current) else {
                let fault = ExecutionError::StageMissing { stage: current };
                self.abort(&mut run, Some(current), fault.to_string()).await;
                let report: Report<ExecutionError> = fault.into();
                return Err(report.context(WorkflowError::Run { run_id }));
            };

            self.publish(WorkflowEvent::StageStarted {
                run_id,
                stage: current,
                timestamp: Utc::now(),
            })
            .await;

            let result = {
                let mut ctx = StageContext {
                    session: &mut *session,
                    run: &mut run,
                    channel: self.channel.as_ref(),
                    events: self.events.as_ref(),
                    cancel,
                };
                stage.run(&mut ctx).await
            };
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(report) => {
                    return Err(self.stage_failed(&mut run, current, report).await);
                }
            };

            run.record(current, outcome);
            self.publish(WorkflowEvent::StageCompleted {
                run_id,
                stage: current,
                outcome,
                timestamp: Utc::now(),
            })
            .await;

            let Some(route) = outcome.route() else {
                break;
            };
            current = match self.graph.next(current, route) {
                Ok(next) => next,
                Err(fault) => {
                    self.abort(&mut run, Some(current), fault.to_string()).await;
                    let report: Report<GraphError> = fault.into();
                    return Err(report.context(WorkflowError::Run { run_id }));
                }
            };
        }

        let Some(outcome) = run.outcome.clone() else {
            let fault = ExecutionError::NoOutcome { stage: current };
            self.abort(&mut run, Some(current), fault.to_string()).await;
            let report: Report<ExecutionError> = fault.into();
            return Err(report.context(WorkflowError::Run { run_id }));
        };

        run.complete();
        info!(
            %run_id,
            path = ?run.path(),
            resolved = outcome.is_resolved,
            requires_human = outcome.requires_human,
            "run completed"
        );
        self.publish(WorkflowEvent::RunCompleted {
            run_id,
            outcome,
            timestamp: Utc::now(),
        })
        .await;
        Ok(run)
    }

    async fn stage_failed(
        &self,
        run: &mut RunState,
        stage: StageId,
        report: Report<StageError>,
    ) -> Report<WorkflowError> {
        let run_id = run.run_id;
        let failure = report.current_context();
        if failure.is_cancelled() {
            warn!(%run_id, %stage, "run cancelled");
            run.cancel();
            self.publish(WorkflowEvent::RunFailed {
                run_id,
                stage: Some(stage),
                error: failure.to_string(),
                timestamp: Utc::now(),
            })
            .await;
        } else {
            self.abort(run, Some(stage), failure.to_string()).await;
        }
        report.context(WorkflowError::StageFailed { run_id, stage })
    }

    async fn abort(&self, run: &mut RunState, stage: Option<StageId>, message: String) {
        error!(run_id = %run.run_id, stage = ?stage, error = %message, "run failed");
        run.fail(message.clone());
        self.publish(WorkflowEvent::RunFailed {
            run_id: run.run_id,
            stage,
            error: message,
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn publish(&self, event: WorkflowEvent) {
        let event_type = event.event_type();
        if let Err(e) = self.events.publish(event).await {
            warn!(event_type, error = %e, "event not delivered");
        }
    }
}

fn invalid_graph(error: GraphError) -> Report<WorkflowError> {
    let report: Report<GraphError> = error.into();
    report.context(WorkflowError::InvalidGraph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ExecutionState, StageOutput};
    use crate::model::{INVESTIGATION_NOTICE, KnowledgeMatchResult};
    use crate::stage::StageOutcome;
    use crate::stages::escalation::simulated_resolution;
    use crate::testing::{
        RecordingSink, ScriptedBackend, ScriptedChannel, knowledge_base, password_record, session,
    };
    use async_trait::async_trait;
    use serde_json::{Value as JsonValue, json};
    use support_desk_ai::LlmError;
    use support_desk_conversation::{SendEmailTool, UnlockAccountTool};
    use tokio::sync::mpsc;

    struct Fixture {
        backend: Arc<ScriptedBackend>,
        channel: Arc<ScriptedChannel>,
        sink: Arc<RecordingSink>,
        orchestrator: Orchestrator,
    }

    fn fixture(replies: Vec<Result<String, LlmError>>, answers: &[&str]) -> Fixture {
        let backend = Arc::new(ScriptedBackend::new(replies));
        let channel = Arc::new(ScriptedChannel::new(answers));
        let sink = Arc::new(RecordingSink::default());

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(UnlockAccountTool::new().with_delay(std::time::Duration::ZERO)));
        tools.register(Arc::new(SendEmailTool::new().with_delay(std::time::Duration::ZERO)));
        let services = SupportServices::new(
            Arc::clone(&backend) as Arc<dyn LlmBackend>,
            knowledge_base(vec![password_record()]),
        )
        .with_tools(tools)
        .with_escalation_delays(EscalationDelays::none());

        let orchestrator = Orchestrator::support(
            &services,
            Arc::clone(&channel) as Arc<dyn InteractionChannel>,
            Arc::clone(&sink) as Arc<dyn EventSink>,
        )
        .expect("valid workflow");

        Fixture {
            backend,
            channel,
            sink,
            orchestrator,
        }
    }

    fn reply(value: JsonValue) -> Result<String, LlmError> {
        Ok(value.to_string())
    }

    fn understood(summary: &str) -> Result<String, LlmError> {
        reply(json!({
            "is_understood": true,
            "question_for_user": "",
            "summary": summary,
            "urgency": "high"
        }))
    }

    fn verdict(known: bool, complex: bool, message: &str) -> Result<String, LlmError> {
        reply(json!({
            "is_known": known,
            "is_complex": complex,
            "message_for_user": message
        }))
    }

    fn resolution(message: &str) -> Result<String, LlmError> {
        reply(json!({
            "message_for_user": message,
            "tool_calls": [{
                "name": "SendEmail",
                "arguments": {"recipient_email": "ana@example.com", "email_type": "ResetPassword"}
            }]
        }))
    }

    fn knowledge_verdicts(sink: &RecordingSink) -> Vec<KnowledgeMatchResult> {
        sink.outputs()
            .into_iter()
            .filter_map(|(_, output)| match output {
                StageOutput::KnowledgeMatch(verdict) => Some(verdict),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn known_issue_is_resolved_automatically() {
        let f = fixture(
            vec![
                understood("esqueci minha senha"),
                verdict(true, false, "Problema conhecido: reset de senha por email"),
                resolution("Enviei um email para redefinir sua senha."),
            ],
            &["sim"],
        );
        let mut session = session();

        let run = f
            .orchestrator
            .run(&mut session, Some("esqueci minha senha".to_string()), &CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(
            run.path(),
            vec![StageId::Triage, StageId::KnowledgeMatch, StageId::Resolution]
        );
        assert_eq!(run.execution_state, ExecutionState::Completed);
        let verdict = run.knowledge_match.clone().expect("verdict");
        assert!(verdict.is_known);
        assert!(verdict.matched_issue.is_some());
        let outcome = run.outcome.clone().expect("outcome");
        assert!(outcome.is_resolved);
        assert_eq!(outcome.actions_executed, vec!["SendEmail".to_string()]);
        assert_eq!(f.backend.calls(), 3);
        assert_eq!(session.problem_summary(), Some("esqueci minha senha"));

        let types = f.sink.event_types();
        assert_eq!(types.first(), Some(&"run_started"));
        assert_eq!(types.last(), Some(&"run_completed"));
        assert_eq!(types.iter().filter(|t| **t == "stage_completed").count(), 3);
    }

    #[tokio::test]
    async fn undecided_match_escalates_after_the_bound() {
        let undecided = verdict(false, false, "Pode dar mais detalhes?");
        let mut replies = vec![understood("algo estranho acontece")];
        replies.extend(std::iter::repeat_n(undecided, 5));
        let f = fixture(replies, &["a", "b", "c", "d", "e", "ok", "valeu"]);
        let mut session = session();

        let run = f
            .orchestrator
            .run(&mut session, Some("algo estranho".to_string()), &CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(run.path().last(), Some(&StageId::Escalation));
        assert_eq!(f.backend.calls(), 6);
        let prompts = f.channel.prompts();
        assert_eq!(prompts.len(), 7);
        assert!(prompts[..5].iter().all(|p| p == "Pode dar mais detalhes?"));
        let verdict = run.knowledge_match.clone().expect("verdict");
        assert!(!verdict.is_known);
        assert!(verdict.is_complex);
        assert_eq!(verdict.message_for_user, INVESTIGATION_NOTICE);
        assert!(run.outcome.expect("outcome").is_resolved);
    }

    #[tokio::test]
    async fn collaborator_failure_in_match_is_fatal() {
        let f = fixture(
            vec![
                understood("erro estranho"),
                verdict(false, false, "Qual erro?"),
                Err(LlmError::ProviderUnavailable {
                    provider: "azure_openai".to_string(),
                    reason: "503".to_string(),
                }),
            ],
            &["erro 42"],
        );
        let mut session = session();

        let err = f
            .orchestrator
            .run(&mut session, Some("erro estranho".to_string()), &CancellationToken::new())
            .await
            .expect_err("fatal");

        assert!(matches!(
            err.current_context(),
            WorkflowError::StageFailed {
                stage: StageId::KnowledgeMatch,
                ..
            }
        ));
        let verdicts = knowledge_verdicts(&f.sink);
        assert_eq!(verdicts.len(), 1);
        assert!(verdicts[0].is_complex);
        assert!(!verdicts[0].is_known);
        assert!(verdicts[0].message_for_user.contains("503"));

        let types = f.sink.event_types();
        assert_eq!(types.last(), Some(&"run_failed"));
        assert_eq!(types.iter().filter(|t| **t == "stage_started").count(), 2);
    }

    #[tokio::test]
    async fn rejected_resolution_is_terminal() {
        let f = fixture(
            vec![
                understood("esqueci minha senha"),
                verdict(true, false, "Reset de senha conhecido"),
                resolution("Enviei o email."),
            ],
            &["não"],
        );
        let mut session = session();

        let run = f
            .orchestrator
            .run(&mut session, Some("esqueci minha senha".to_string()), &CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(run.path().len(), 3);
        assert_eq!(run.visited.last(), Some(&(StageId::Resolution, StageOutcome::Done)));
        let outcome = run.outcome.expect("outcome");
        assert!(!outcome.is_resolved);
        assert!(outcome.requires_human);
        assert!(
            outcome
                .escalation_reason
                .is_some_and(|reason| !reason.is_empty())
        );
    }

    #[tokio::test]
    async fn access_problem_gets_the_access_script() {
        let f = fixture(
            vec![
                understood("sem acesso ao painel"),
                verdict(false, true, "Cliente sem acesso ao painel administrativo"),
            ],
            &["ok", "valeu"],
        );
        let mut session = session();

        let run = f
            .orchestrator
            .run(&mut session, Some("não tenho acesso".to_string()), &CancellationToken::new())
            .await
            .expect("run");

        assert_eq!(run.path().last(), Some(&StageId::Escalation));
        let expected = format!(
            "[ESPECIALISTA HUMANO] {}",
            simulated_resolution("acesso")
        );
        assert!(f.sink.messages().contains(&expected));
        let outcome = run.outcome.expect("outcome");
        assert!(outcome.is_resolved);
        assert!(!outcome.requires_human);
        assert_eq!(f.channel.prompts().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_ends_the_run() {
        let f = fixture(vec![], &[]);
        let mut session = session();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f
            .orchestrator
            .run(&mut session, None, &cancel)
            .await
            .expect_err("cancelled");

        assert!(matches!(
            err.current_context(),
            WorkflowError::StageFailed {
                stage: StageId::Triage,
                ..
            }
        ));
        assert_eq!(f.sink.event_types().last(), Some(&"run_failed"));
    }

    struct WrongRoute;

    #[async_trait]
    impl Stage for WrongRoute {
        fn id(&self) -> StageId {
            StageId::Triage
        }

        async fn run(
            &self,
            _ctx: &mut StageContext<'_>,
        ) -> Result<StageOutcome, Report<StageError>> {
            Ok(StageOutcome::Resolve)
        }
    }

    #[tokio::test]
    async fn missing_edge_is_an_interpreter_fault() {
        let f = fixture(vec![], &[]);
        let orchestrator = f.orchestrator.with_stage(Arc::new(WrongRoute));
        let mut session = session();

        let err = orchestrator
            .run(&mut session, None, &CancellationToken::new())
            .await
            .expect_err("no route");

        assert!(matches!(err.current_context(), WorkflowError::Run { .. }));
    }

    #[test]
    fn unimplemented_stage_fails_validation() {
        let orchestrator = Orchestrator::new(
            RoutingGraph::support_topology(),
            Arc::new(ScriptedChannel::new(&[])),
            Arc::new(RecordingSink::default()),
        )
        .with_stage(Arc::new(WrongRoute));

        let err = orchestrator.validate().expect_err("incomplete");
        assert_eq!(*err.current_context(), WorkflowError::InvalidGraph);
    }

    #[tokio::test]
    async fn event_channel_drives_a_full_run() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            understood("sistema lento"),
            verdict(false, true, "Sistema lento para todos"),
        ]));
        let services = SupportServices::new(
            backend as Arc<dyn LlmBackend>,
            knowledge_base(vec![]),
        )
        .with_escalation_delays(EscalationDelays::none());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator =
            Orchestrator::support_over_events(&services, Arc::new(tx)).expect("workflow");

        let run = tokio::spawn(async move {
            let mut session = session();
            orchestrator
                .run(&mut session, None, &CancellationToken::new())
                .await
        });

        let mut answers = vec!["valeu", "ok", "o sistema está lento"];
        let mut prompts = Vec::new();
        let mut completed = false;
        while let Some(event) = rx.recv().await {
            match event {
                WorkflowEvent::InputRequested { prompt, reply } => {
                    prompts.push(prompt);
                    let _ = reply.send(answers.pop().unwrap_or("ok").to_string());
                }
                WorkflowEvent::RunCompleted { outcome, .. } => {
                    completed = outcome.is_resolved;
                }
                _ => {}
            }
        }

        let run = run.await.expect("join").expect("run");
        assert!(completed);
        assert_eq!(prompts.first().map(String::as_str), Some("Como posso ajudar?"));
        assert_eq!(run.path().last(), Some(&StageId::Escalation));
    }
}
