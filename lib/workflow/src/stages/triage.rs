//! Triage: understand the customer's problem.
//!
//! The collaborator sees the latest customer message with the earlier turns
//! as context and either summarizes the problem or asks one clarifying
//! question. The loop is bounded; when it runs out, the customer's own words
//! become the summary and KnowledgeMatch decides what to do with them.

use crate::error::StageError;
use crate::execution::StageOutput;
use crate::model::ClassificationResult;
use crate::policy::IterationPolicy;
use crate::stage::{Stage, StageContext, StageId, StageOutcome};
use crate::stages::{llm_history, prompt_failure, question_or_fallback, session_failure};
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use support_desk_ai::prompt::TRIAGE;
use support_desk_ai::{LlmBackend, PromptRegistry};
use tracing::{debug, info, instrument, warn};

/// Greeting used when the run starts without customer text.
pub const GREETING: &str = "Como posso ajudar?";

/// The Triage stage.
pub struct TriageStage {
    backend: Arc<dyn LlmBackend>,
    prompts: Arc<PromptRegistry>,
    policy: IterationPolicy,
}

impl TriageStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        prompts: Arc<PromptRegistry>,
        policy: IterationPolicy,
    ) -> Self {
        Self {
            backend,
            prompts,
            policy,
        }
    }

    async fn classify(
        &self,
        ctx: &StageContext<'_>,
    ) -> Result<ClassificationResult, Report<StageError>> {
        let template = self.prompts.require(TRIAGE).map_err(prompt_failure)?;
        let Some((latest, earlier)) = ctx.session.history().split_last() else {
            return Err(StageError::MissingInput {
                stage: StageId::Triage,
                input: "customer message",
            }
            .into());
        };

        let variables = HashMap::from([("message".to_string(), json!(latest.text))]);
        let call = template
            .to_call(&variables)
            .map_err(prompt_failure)?
            .with_history(llm_history(earlier));
        let (verdict, _) = call
            .invoke_structured::<ClassificationResult>(self.backend.as_ref(), ctx.cancel)
            .await
            .map_err(StageError::from_llm)?;
        Ok(verdict)
    }

    async fn finish(
        &self,
        ctx: &mut StageContext<'_>,
        verdict: ClassificationResult,
    ) -> Result<StageOutcome, Report<StageError>> {
        ctx.session
            .record_summary(verdict.summary.clone())
            .map_err(session_failure)?;
        ctx.session.persist().await.map_err(session_failure)?;
        ctx.run.classification = Some(verdict.clone());
        ctx.emit(StageId::Triage, StageOutput::Classification(verdict))
            .await?;
        Ok(StageOutcome::Continue)
    }
}

#[async_trait]
impl Stage for TriageStage {
    fn id(&self) -> StageId {
        StageId::Triage
    }

    #[instrument(skip_all, fields(session_id = %ctx.session.id()))]
    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutcome, Report<StageError>> {
        let input = match ctx.run.input.take() {
            Some(text) if !text.trim().is_empty() => text,
            _ => ctx.ask(GREETING).await?,
        };
        ctx.session.push_user(input);

        for attempt in self.policy.attempts() {
            let verdict = self.classify(ctx).await?;
            debug!(attempt, understood = verdict.is_understood, "triage verdict");

            if verdict.is_understood {
                info!(attempt, urgency = ?verdict.urgency, "problem understood");
                ctx.session.push_assistant(verdict.summary.clone());
                return self.finish(ctx, verdict).await;
            }
            if self.policy.is_last(attempt) {
                break;
            }

            let question = question_or_fallback(verdict.question_for_user);
            ctx.session.push_assistant(question.clone());
            let reply = ctx.ask(&question).await?;
            ctx.session.push_user(reply);
            ctx.session.persist().await.map_err(session_failure)?;
        }

        warn!(
            attempts = self.policy.max_iterations(),
            "triage did not converge, using the customer's own words"
        );
        let summary = ctx.session.user_texts().collect::<Vec<_>>().join("\n");
        self.finish(ctx, ClassificationResult::exhausted(summary))
            .await
    }
}
