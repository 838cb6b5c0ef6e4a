//! Escalation: simulated handoff to a human specialist.
//!
//! A scripted exchange. The support agent announces the handoff, a "human"
//! greets the customer, offers a canned fix chosen from the problem text
//! and asks for confirmation. Every pause can be cancelled.

use crate::error::StageError;
use crate::execution::StageOutput;
use crate::model::ResolutionOutcome;
use crate::stage::{Stage, StageContext, StageId, StageOutcome};
use async_trait::async_trait;
use rootcause::prelude::Report;
use std::time::Duration;
use tracing::{debug, info, instrument};

const BANNER_WIDTH: usize = 80;
const REPLY_PROMPT: &str = "[USUÁRIO] Sua resposta";
const HUMAN_SUPPORT: &str = "HumanSupport";
const ESCALATION_REASON: &str =
    "Problema complexo ou desconhecido - resolvido por especialista humano";

const ACCEPTED: [&str; 9] = [
    "ok",
    "obrigado",
    "tá bom",
    "valeu",
    "sim",
    "s",
    "yes",
    "ok, obrigado",
    "muito obrigado",
];

const RESOLUTIONS: [(&str, &str); 6] = [
    (
        "queda",
        "Seu problema é uma queda do sistema. Em 15 minutos o sistema voltará ao ar. Não precisa fazer nada, só aguardar.",
    ),
    (
        "lento",
        "O sistema está lento porque temos uma manutenção em andamento. Deverá voltar ao normal em 30 minutos. Recomendo fazer uma pausa.",
    ),
    (
        "erro",
        "Identificamos um erro na sua conta. Vou resetar suas permissões agora. Tente fazer login novamente em 2 minutos.",
    ),
    (
        "acesso",
        "Seu acesso foi bloqueado por segurança. Vou desbloqueá-lo e enviar um email com instruções para resetar sua senha.",
    ),
    (
        "conexão",
        "Temos um problema com a conexão do seu servidor. Estou reiniciando-o agora, deve estar online em 5 minutos.",
    ),
    (
        "dados",
        "Seus dados foram recuperados com sucesso. Estou enviando um arquivo com todas as informações por email.",
    ),
];

const DEFAULT_RESOLUTION: &str = "Identifiquei seu problema. Estou tomando as ações necessárias para resolvê-lo. Você receberá um email em breve com mais detalhes. Obrigado pela paciência!";

/// Picks the specialist's canned fix for a problem description.
///
/// Keywords are tried in a fixed order and matched case-insensitively; the
/// first hit wins.
#[must_use]
pub fn simulated_resolution(problem: &str) -> &'static str {
    let problem = problem.to_lowercase();
    RESOLUTIONS
        .iter()
        .find(|(keyword, _)| problem.contains(*keyword))
        .map_or(DEFAULT_RESOLUTION, |(_, resolution)| *resolution)
}

/// Returns true if the customer's final reply closes the case as resolved.
#[must_use]
pub fn is_accepted(reply: &str) -> bool {
    let reply = reply.trim().to_lowercase();
    ACCEPTED.contains(&reply.as_str())
}

/// Simulated pauses between the scripted lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationDelays {
    /// Pause after the announcement and after the acknowledgment.
    pub short: Duration,
    /// Pause while connecting, after the greeting and after the fix.
    pub long: Duration,
}

impl EscalationDelays {
    /// Delays derived from the longest pause; the short one is half of it.
    #[must_use]
    pub fn from_longest(longest: Duration) -> Self {
        Self {
            short: longest / 2,
            long: longest,
        }
    }

    /// No pauses at all.
    #[must_use]
    pub fn none() -> Self {
        Self::from_longest(Duration::ZERO)
    }
}

impl Default for EscalationDelays {
    fn default() -> Self {
        Self::from_longest(Duration::from_millis(1000))
    }
}

/// The Escalation stage.
pub struct EscalationStage {
    delays: EscalationDelays,
}

impl EscalationStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(delays: EscalationDelays) -> Self {
        Self { delays }
    }

    async fn say(&self, ctx: &StageContext<'_>, text: impl Into<String>) -> Result<(), StageError> {
        ctx.say(StageId::Escalation, text).await
    }
}

#[async_trait]
impl Stage for EscalationStage {
    fn id(&self) -> StageId {
        StageId::Escalation
    }

    #[instrument(skip_all, fields(session_id = %ctx.session.id()))]
    async fn run(&self, ctx: &mut StageContext<'_>) -> Result<StageOutcome, Report<StageError>> {
        let problem = ctx
            .run
            .knowledge_match
            .as_ref()
            .map(|verdict| verdict.message_for_user.clone())
            .unwrap_or_default();
        let banner = "=".repeat(BANNER_WIDTH);
        info!("handing the session to human support");

        self.say(ctx, format!("\n{banner}")).await?;
        self.say(ctx, "[ATENDENTE SUPORTE] Vamos passar o atendimento para um humano especialista")
            .await?;
        self.say(ctx, banner.clone()).await?;
        ctx.pause(self.delays.short).await?;

        self.say(ctx, "\n[ATENDENTE SUPORTE] Aguarde um momento enquanto você é conectado...\n")
            .await?;
        ctx.pause(self.delays.long).await?;

        self.say(ctx, "[ATENDENTE HUMANO] Olá! Estou com as informações do seu problema e já estou resolvendo.")
            .await?;
        self.say(ctx, "[ATENDENTE HUMANO] Por favor aguarde enquanto analiso a situação...\n")
            .await?;
        ctx.pause(self.delays.long).await?;

        let acknowledgment = ctx.ask(REPLY_PROMPT).await?;
        self.say(ctx, format!("\n[USUÁRIO] {acknowledgment}\n")).await?;
        ctx.session.push_user(acknowledgment);
        ctx.pause(self.delays.short).await?;

        let resolution = simulated_resolution(&problem);
        debug!(resolution, "specialist resolution chosen");
        self.say(ctx, format!("[ESPECIALISTA HUMANO] {resolution}"))
            .await?;
        self.say(ctx, "").await?;
        ctx.session.push_assistant(resolution);
        ctx.pause(self.delays.long).await?;

        let confirmation = ctx.ask(REPLY_PROMPT).await?;
        self.say(ctx, format!("\n[USUÁRIO] {confirmation}\n")).await?;
        let resolved = is_accepted(&confirmation);
        ctx.session.push_user(confirmation);

        self.say(ctx, banner.clone()).await?;
        self.say(ctx, "[SISTEMA] Finalizando atendimento com suporte humano")
            .await?;
        self.say(ctx, format!("{banner}\n")).await?;
        info!(resolved, "human support interaction completed");

        let outcome = ResolutionOutcome {
            is_resolved: resolved,
            requires_human: false,
            message_for_user: format!("Atendimento humano concluído. Problema resolvido: {resolved}"),
            actions_executed: vec![HUMAN_SUPPORT.to_string()],
            escalation_reason: Some(ESCALATION_REASON.to_string()),
        };
        ctx.run.outcome = Some(outcome.clone());
        ctx.emit(StageId::Escalation, StageOutput::Resolution(outcome))
            .await?;
        Ok(StageOutcome::Done)
    }
}
