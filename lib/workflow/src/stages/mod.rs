//! The four support stages.

pub mod escalation;
pub mod knowledge_match;
pub mod resolution;
pub mod triage;

pub use escalation::{EscalationDelays, EscalationStage};
pub use knowledge_match::KnowledgeMatchStage;
pub use resolution::ResolutionStage;
pub use triage::TriageStage;

use crate::error::StageError;
use rootcause::prelude::Report;
use support_desk_ai::{LlmMessage, PromptError};
use support_desk_conversation::{ConversationTurn, SessionError, Speaker};
use support_desk_knowledge::KnowledgeError;

/// Shown when the collaborator wants more detail but gives no question.
pub const CLARIFY_FALLBACK: &str = "Por favor, forneça mais detalhes sobre o problema.";

/// Converts session turns into collaborator context messages.
pub(crate) fn llm_history(turns: &[ConversationTurn]) -> Vec<LlmMessage> {
    turns
        .iter()
        .map(|turn| match turn.speaker {
            Speaker::User => LlmMessage::user(turn.text.clone()),
            Speaker::Assistant => LlmMessage::assistant(turn.text.clone()),
        })
        .collect()
}

/// Returns `text`, or the fallback question when it is blank.
pub(crate) fn question_or_fallback(text: String) -> String {
    if text.trim().is_empty() {
        CLARIFY_FALLBACK.to_string()
    } else {
        text
    }
}

pub(crate) fn prompt_failure(error: PromptError) -> Report<StageError> {
    let reason = error.to_string();
    let report: Report<PromptError> = error.into();
    report.context(StageError::Prompt { reason })
}

pub(crate) fn session_failure(error: SessionError) -> Report<StageError> {
    let reason = error.to_string();
    let report: Report<SessionError> = error.into();
    report.context(StageError::Session { reason })
}

pub(crate) fn knowledge_failure(report: Report<KnowledgeError>) -> Report<StageError> {
    let reason = report.current_context().to_string();
    report.context(StageError::KnowledgeBase { reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use support_desk_ai::MessageRole;

    #[test]
    fn history_keeps_speakers_and_order() {
        let turns = vec![
            ConversationTurn::user("não consigo entrar"),
            ConversationTurn::assistant("Qual o seu email?"),
            ConversationTurn::user("ana@example.com"),
        ];
        let messages = llm_history(&turns);
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(messages[2].content, "ana@example.com");
    }

    #[test]
    fn blank_question_uses_fallback() {
        assert_eq!(question_or_fallback("  ".to_string()), CLARIFY_FALLBACK);
        assert_eq!(question_or_fallback("Qual o erro?".to_string()), "Qual o erro?");
    }

    #[test]
    fn failures_keep_their_message() {
        let report = prompt_failure(PromptError::TemplateNotFound {
            name: "triage".to_string(),
        });
        assert_eq!(report.current_context().kind(), "Prompt");
        assert!(report.current_context().to_string().contains("triage"));
    }
}
