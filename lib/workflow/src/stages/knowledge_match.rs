//! KnowledgeMatch: decide whether the problem is a known issue.
//!
//! Each iteration sends the summary plus every clarification so far. A
//! decided verdict (known or complex) ends the stage; otherwise the
//! customer is asked for more detail, on the last iteration too. Running
//! out of iterations forces a complex verdict without another call. Any failure publishes a degraded verdict first and then
//! propagates, so the run never escalates silently.

use crate::error::StageError;
use crate::execution::StageOutput;
use crate::model::KnowledgeMatchResult;
use crate::policy::IterationPolicy;
use crate::stage::{Stage, StageContext, StageId, StageOutcome};
use crate::stages::{knowledge_failure, prompt_failure, question_or_fallback};
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use support_desk_ai::prompt::KNOWLEDGE_MATCH;
use support_desk_ai::{LlmBackend, PromptRegistry};
use support_desk_knowledge::{KnowledgeBase, extract_keywords};
use tracing::{debug, error, info, instrument, warn};

/// The KnowledgeMatch stage.
pub struct KnowledgeMatchStage {
    backend: Arc<dyn LlmBackend>,
    prompts: Arc<PromptRegistry>,
    knowledge: Arc<KnowledgeBase>,
    policy: IterationPolicy,
}

impl KnowledgeMatchStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        prompts: Arc<PromptRegistry>,
        knowledge: Arc<KnowledgeBase>,
        policy: IterationPolicy,
    ) -> Self {
        Self {
            backend,
            prompts,
            knowledge,
            policy,
        }
    }

    async fn decide(
        &self,
        ctx: &StageContext<'_>,
        summary: String,
    ) -> Result<KnowledgeMatchResult, Report<StageError>> {
        let template = self
            .prompts
            .require(KNOWLEDGE_MATCH)
            .map_err(prompt_failure)?;
        let mut history = vec![summary];

        for attempt in self.policy.attempts() {
            let variables = HashMap::from([("problem".to_string(), json!(history.join("\n")))]);
            let call = template.to_call(&variables).map_err(prompt_failure)?;
            let (mut verdict, _) = call
                .invoke_structured::<KnowledgeMatchResult>(self.backend.as_ref(), ctx.cancel)
                .await
                .map_err(StageError::from_llm)?;

            if verdict.is_decided() {
                if verdict.is_known && !verdict.message_for_user.trim().is_empty() {
                    let candidates = extract_keywords(&verdict.message_for_user);
                    let record = self
                        .knowledge
                        .first_match(&candidates)
                        .await
                        .map_err(knowledge_failure)?;
                    if let Some(record) = record {
                        debug!(problem = %record.problem, "matched known issue record");
                        verdict.attach(record);
                    }
                }
                info!(
                    attempt,
                    known = verdict.is_known,
                    complex = verdict.is_complex,
                    "knowledge match decided"
                );
                return Ok(verdict);
            }

            let reply = ctx
                .ask(&question_or_fallback(verdict.message_for_user))
                .await?;
            history.push(reply);
        }

        warn!(
            attempts = self.policy.max_iterations(),
            "knowledge match did not converge, escalating"
        );
        Ok(KnowledgeMatchResult::exhausted())
    }
}

#[async_trait]
impl Stage for KnowledgeMatchStage {
    fn id(&self) -> StageId {
        StageId::KnowledgeMatch
    }

    #[instrument(skip_all, fields(session_id = %ctx.session.id()))]
    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutcome, Report<StageError>> {
        let summary = match ctx.session.problem_summary() {
            Some(summary) if !summary.trim().is_empty() => summary.to_string(),
            _ => return Err(StageError::MissingSummary.into()),
        };

        let decision = self.decide(ctx, summary).await;
        match decision {
            Ok(verdict) => {
                let route = verdict.route();
                ctx.run.knowledge_match = Some(verdict.clone());
                ctx.emit(StageId::KnowledgeMatch, StageOutput::KnowledgeMatch(verdict))
                    .await?;
                Ok(route.into())
            }
            Err(report) => {
                error!(error = %report.current_context(), "knowledge match failed");
                let degraded = KnowledgeMatchResult::degraded(report.current_context());
                ctx.run.knowledge_match = Some(degraded.clone());
                if let Err(e) = ctx
                    .emit(StageId::KnowledgeMatch, StageOutput::KnowledgeMatch(degraded))
                    .await
                {
                    warn!(error = %e, "degraded verdict was not delivered");
                }
                Err(report)
            }
        }
    }
}
