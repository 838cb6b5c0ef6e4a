//! Resolution: fix a known, simple issue automatically.
//!
//! The collaborator is asked once, with the matched record and the tool
//! catalog. Tool calls it requests are executed through the registry and
//! only the ones that report success count as executed. The customer then
//! confirms whether the problem is gone.

use crate::error::StageError;
use crate::execution::StageOutput;
use crate::model::{KnowledgeMatchResult, ResolutionOutcome};
use crate::stage::{Stage, StageContext, StageId, StageOutcome};
use crate::stages::{prompt_failure, session_failure};
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use support_desk_ai::prompt::RESOLUTION;
use support_desk_ai::{LlmBackend, PromptRegistry};
use support_desk_conversation::{ToolCall, ToolRegistry};
use tracing::{debug, error, info, instrument, warn};

/// Confirmation question asked after the resolution attempt.
pub const CONFIRMATION_PROMPT: &str = "✓ Was your issue resolved? (yes/no)";

const AFFIRMATIVE: [&str; 4] = ["sim", "s", "yes", "y"];

const HANDOFF_MESSAGE: &str =
    "This issue requires human support. A specialist will contact you shortly.";
const NOT_RECOGNIZED: &str = "Problem is not recognized in our knowledge base";
const TOO_COMPLEX: &str = "Problem is too complex for automation";
const NOT_RESOLVED: &str = "User reported issue not resolved after automated resolution attempt";
const CANCELLED_MESSAGE: &str = "Resolution process was cancelled. Please try again.";
const CANCELLED_REASON: &str = "Process was cancelled by user";

/// Returns true if the customer's reply confirms the fix.
#[must_use]
pub fn is_affirmative(reply: &str) -> bool {
    let reply = reply.trim().to_lowercase();
    AFFIRMATIVE.contains(&reply.as_str())
}

#[derive(Debug, Deserialize)]
struct ResolutionReply {
    #[serde(default)]
    message_for_user: String,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

/// The Resolution stage.
pub struct ResolutionStage {
    backend: Arc<dyn LlmBackend>,
    prompts: Arc<PromptRegistry>,
    tools: Arc<ToolRegistry>,
}

impl ResolutionStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        prompts: Arc<PromptRegistry>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            backend,
            prompts,
            tools,
        }
    }

    fn variables(&self, verdict: &KnowledgeMatchResult) -> HashMap<String, JsonValue> {
        let (problem, solution) = verdict.matched_issue.as_ref().map_or_else(
            || (String::new(), String::new()),
            |record| (record.problem.clone(), record.solution.clone().unwrap_or_default()),
        );
        HashMap::from([
            ("problem".to_string(), json!(problem)),
            ("solution".to_string(), json!(solution)),
            ("tools".to_string(), json!(verdict.required_tools.join(", "))),
            (
                "customer_detail".to_string(),
                json!(verdict.message_for_user),
            ),
            (
                "tool_catalog".to_string(),
                JsonValue::Array(self.tools.to_llm_format()),
            ),
        ])
    }

    async fn execute(&self, calls: Vec<ToolCall>, ctx: &StageContext<'_>) -> Vec<String> {
        let mut executed = Vec::new();
        for call in calls {
            match self.tools.invoke(&call.name, call.arguments, ctx.cancel).await {
                Ok(result) if result.success => {
                    debug!(tool = %call.name, elapsed_ms = result.execution_time_ms, "tool succeeded");
                    executed.push(call.name);
                }
                Ok(result) => {
                    warn!(tool = %call.name, error = ?result.error, "tool reported failure");
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "tool call failed");
                }
            }
        }
        executed
    }

    async fn attempt(
        &self,
        ctx: &mut StageContext<'_>,
        verdict: &KnowledgeMatchResult,
        executed: &mut Vec<String>,
    ) -> Result<ResolutionOutcome, Report<StageError>> {
        let call = self
            .prompts
            .require(RESOLUTION)
            .map_err(prompt_failure)?
            .to_call(&self.variables(verdict))
            .map_err(prompt_failure)?;
        let result = call
            .invoke(self.backend.as_ref(), ctx.cancel)
            .await
            .map_err(StageError::from_llm)?;

        let reply = result
            .decode::<ResolutionReply>()
            .unwrap_or_else(|_| ResolutionReply {
                message_for_user: result.content.trim().to_string(),
                tool_calls: Vec::new(),
            });

        executed.extend(self.execute(reply.tool_calls, ctx).await);
        if !reply.message_for_user.is_empty() {
            ctx.say(StageId::Resolution, reply.message_for_user.clone())
                .await?;
            ctx.session.push_assistant(reply.message_for_user.clone());
        }

        let confirmation = ctx.ask(CONFIRMATION_PROMPT).await?;
        ctx.session.push_user(confirmation.clone());
        ctx.session.persist().await.map_err(session_failure)?;

        let resolved = is_affirmative(&confirmation);
        info!(resolved, actions = executed.len(), "resolution attempt finished");
        Ok(ResolutionOutcome {
            is_resolved: resolved,
            requires_human: !resolved,
            message_for_user: reply.message_for_user,
            actions_executed: executed.clone(),
            escalation_reason: (!resolved).then(|| NOT_RESOLVED.to_string()),
        })
    }

    async fn conclude(
        &self,
        ctx: &mut StageContext<'_>,
        outcome: ResolutionOutcome,
    ) -> Result<StageOutcome, Report<StageError>> {
        ctx.run.outcome = Some(outcome.clone());
        ctx.emit(StageId::Resolution, StageOutput::Resolution(outcome))
            .await?;
        Ok(StageOutcome::Done)
    }
}

#[async_trait]
impl Stage for ResolutionStage {
    fn id(&self) -> StageId {
        StageId::Resolution
    }

    #[instrument(skip_all, fields(session_id = %ctx.session.id()))]
    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutcome, Report<StageError>> {
        let verdict = ctx
            .run
            .knowledge_match
            .clone()
            .ok_or(StageError::MissingInput {
                stage: StageId::Resolution,
                input: "knowledge match result",
            })?;

        if verdict.is_complex || !verdict.is_known {
            let reason = if verdict.is_complex {
                TOO_COMPLEX
            } else {
                NOT_RECOGNIZED
            };
            warn!(reason, "resolution reached with an unresolvable verdict");
            return self
                .conclude(ctx, ResolutionOutcome::needs_human(HANDOFF_MESSAGE, reason))
                .await;
        }

        let mut executed = Vec::new();
        let attempt = self.attempt(ctx, &verdict, &mut executed).await;
        match attempt {
            Ok(outcome) => self.conclude(ctx, outcome).await,
            Err(report) if report.current_context().is_cancelled() => {
                warn!("resolution cancelled");
                let mut outcome = ResolutionOutcome::needs_human(CANCELLED_MESSAGE, CANCELLED_REASON);
                outcome.actions_executed = executed;
                self.conclude(ctx, outcome).await
            }
            Err(report) => {
                let failure = report.current_context();
                error!(error = %failure, "resolution failed");
                let mut outcome = ResolutionOutcome::needs_human(
                    format!("An error occurred during resolution: {failure}"),
                    format!("Error during resolution: {}", failure.kind()),
                );
                outcome.actions_executed = executed;
                ctx.run.outcome = Some(outcome.clone());
                if let Err(e) = ctx
                    .emit(StageId::Resolution, StageOutput::Resolution(outcome))
                    .await
                {
                    warn!(error = %e, "error outcome was not delivered");
                }
                Err(report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, ScriptedBackend, password_record};
    use support_desk_ai::LlmError;
    use support_desk_conversation::{SendEmailTool, UnlockAccountTool};

    fn tools() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(UnlockAccountTool::new().with_delay(std::time::Duration::ZERO)));
        registry.register(Arc::new(SendEmailTool::new().with_delay(std::time::Duration::ZERO)));
        Arc::new(registry)
    }

    fn stage(backend: &Arc<ScriptedBackend>) -> ResolutionStage {
        ResolutionStage::new(
            Arc::clone(backend) as Arc<dyn LlmBackend>,
            Arc::new(PromptRegistry::support_defaults()),
            tools(),
        )
    }

    fn known_verdict() -> KnowledgeMatchResult {
        let mut verdict = KnowledgeMatchResult::new(false, false, "Cliente ana@example.com sem senha");
        verdict.is_known = true;
        verdict.attach(password_record());
        verdict
    }

    fn last_outcome(harness: &Harness) -> ResolutionOutcome {
        harness.run.outcome.clone().expect("outcome")
    }

    #[test]
    fn affirmative_tokens() {
        for reply in ["sim", " S ", "YES", "y"] {
            assert!(is_affirmative(reply), "{reply}");
        }
        for reply in ["não", "no", "ok", "talvez", ""] {
            assert!(!is_affirmative(reply), "{reply}");
        }
    }

    #[tokio::test]
    async fn confirmed_resolution_records_successful_tools() {
        let backend = Arc::new(ScriptedBackend::json([json!({
            "message_for_user": "Enviei um email de reset de senha.",
            "tool_calls": [
                {"name": "SendEmail", "arguments": {"recipient_email": "ana@example.com", "email_type": "ResetPassword"}},
                {"name": "ResetEverything", "arguments": {}}
            ]
        })]));
        let mut harness = Harness::new(&["sim"]);
        harness.run.knowledge_match = Some(known_verdict());

        let outcome = stage(&backend)
            .run(&mut harness.context())
            .await
            .expect("resolution");

        assert_eq!(outcome, StageOutcome::Done);
        let result = last_outcome(&harness);
        assert!(result.is_resolved);
        assert!(!result.requires_human);
        assert_eq!(result.actions_executed, vec!["SendEmail".to_string()]);
        assert!(result.escalation_reason.is_none());
        assert_eq!(
            harness.sink.messages(),
            vec!["Enviei um email de reset de senha.".to_string()]
        );
        assert_eq!(harness.channel.prompts(), vec![CONFIRMATION_PROMPT.to_string()]);

        let prompt = &backend.requests()[0].prompt;
        assert!(prompt.contains("Problema: Usuário esqueceu a senha"));
        assert!(prompt.contains("Ferramentas disponíveis: SendEmail"));
        assert!(prompt.contains("Detalhes do cliente: Cliente ana@example.com sem senha"));
    }

    #[tokio::test]
    async fn invalid_tool_arguments_are_not_recorded() {
        let backend = Arc::new(ScriptedBackend::json([json!({
            "message_for_user": "Conta desbloqueada.",
            "tool_calls": [{"name": "UnlockAccount", "arguments": {}}]
        })]));
        let mut harness = Harness::new(&["yes"]);
        harness.run.knowledge_match = Some(known_verdict());

        stage(&backend)
            .run(&mut harness.context())
            .await
            .expect("resolution");

        assert!(last_outcome(&harness).actions_executed.is_empty());
    }

    #[tokio::test]
    async fn free_text_reply_is_shown_verbatim() {
        let backend = Arc::new(ScriptedBackend::new([Ok(
            "  Reenviei o email de confirmação.  ".to_string()
        )]));
        let mut harness = Harness::new(&["s"]);
        harness.run.knowledge_match = Some(known_verdict());

        stage(&backend)
            .run(&mut harness.context())
            .await
            .expect("resolution");

        let result = last_outcome(&harness);
        assert!(result.is_resolved);
        assert_eq!(result.message_for_user, "Reenviei o email de confirmação.");
    }

    #[tokio::test]
    async fn negative_confirmation_needs_a_human() {
        let backend = Arc::new(ScriptedBackend::json([json!({
            "message_for_user": "Tentei resolver.",
            "tool_calls": []
        })]));
        let mut harness = Harness::new(&["não"]);
        harness.run.knowledge_match = Some(known_verdict());

        let outcome = stage(&backend)
            .run(&mut harness.context())
            .await
            .expect("resolution");

        assert_eq!(outcome, StageOutcome::Done);
        let result = last_outcome(&harness);
        assert!(!result.is_resolved);
        assert!(result.requires_human);
        assert_eq!(result.escalation_reason.as_deref(), Some(NOT_RESOLVED));
    }

    #[tokio::test]
    async fn unrecognized_verdict_is_handed_off_without_a_call() {
        let backend = Arc::new(ScriptedBackend::json(Vec::<JsonValue>::new()));
        let mut harness = Harness::new(&[]);
        harness.run.knowledge_match = Some(KnowledgeMatchResult::new(false, false, "?"));

        stage(&backend)
            .run(&mut harness.context())
            .await
            .expect("resolution");

        assert_eq!(backend.calls(), 0);
        let result = last_outcome(&harness);
        assert_eq!(result.escalation_reason.as_deref(), Some(NOT_RECOGNIZED));
        assert_eq!(result.message_for_user, HANDOFF_MESSAGE);
    }

    #[tokio::test]
    async fn cancellation_finishes_normally() {
        let backend = Arc::new(ScriptedBackend::json([json!({
            "message_for_user": "Enviei o email.",
            "tool_calls": []
        })]));
        let mut harness = Harness::cancelling();
        harness.run.knowledge_match = Some(known_verdict());

        let outcome = stage(&backend)
            .run(&mut harness.context())
            .await
            .expect("cancelled resolution still finishes");

        assert_eq!(outcome, StageOutcome::Done);
        let result = harness.run.outcome.clone().expect("outcome");
        assert!(result.requires_human);
        assert_eq!(result.message_for_user, CANCELLED_MESSAGE);
        assert_eq!(result.escalation_reason.as_deref(), Some(CANCELLED_REASON));
    }

    #[tokio::test]
    async fn collaborator_failure_emits_then_propagates() {
        let backend = Arc::new(ScriptedBackend::new([Err(LlmError::RequestFailed {
            reason: "connection reset".to_string(),
        })]));
        let mut harness = Harness::new(&[]);
        harness.run.knowledge_match = Some(known_verdict());

        let err = stage(&backend)
            .run(&mut harness.context())
            .await
            .expect_err("failure");

        assert_eq!(err.current_context().kind(), "RequestFailed");
        let result = last_outcome(&harness);
        assert!(result.requires_human);
        assert_eq!(
            result.escalation_reason.as_deref(),
            Some("Error during resolution: RequestFailed")
        );
        assert_eq!(harness.sink.outputs().len(), 1);
    }
}
