//! Typed per-session context.
//!
//! `SessionContext` is what stages see of the conversation: the ordered
//! turn history and the problem summary. Both are mirrored into the scoped
//! [`StateStore`] under the triage scope whenever a stage calls
//! [`SessionContext::persist`].

use crate::error::SessionError;
use crate::message::ConversationTurn;
use crate::state::{StateKey, StateScope, StateStore, StateStoreExt};
use std::sync::Arc;
use support_desk_core::SessionId;

/// Conversation state for one support session.
pub struct SessionContext {
    id: SessionId,
    store: Arc<dyn StateStore>,
    history: Vec<ConversationTurn>,
    problem_summary: Option<String>,
}

impl SessionContext {
    /// Creates an empty context for a new session.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            id: SessionId::new(),
            store,
            history: Vec::new(),
            problem_summary: None,
        }
    }

    /// Rebuilds a context from whatever the store holds for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if stored values cannot be decoded.
    pub async fn load(store: Arc<dyn StateStore>, id: SessionId) -> Result<Self, SessionError> {
        let scope = StateScope::triage(id);
        let history = store
            .read_as::<Vec<ConversationTurn>>(scope, StateKey::ConversationHistory)
            .await
            .map_err(|source| SessionError::Storage {
                session_id: id,
                source,
            })?
            .unwrap_or_default();
        let problem_summary = store
            .read_as::<String>(scope, StateKey::ProblemSummary)
            .await
            .map_err(|source| SessionError::Storage {
                session_id: id,
                source,
            })?;

        Ok(Self {
            id,
            store,
            history,
            problem_summary,
        })
    }

    /// Returns the session ID.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the scope this session's state lives under.
    #[must_use]
    pub fn scope(&self) -> StateScope {
        StateScope::triage(self.id)
    }

    /// Returns the ordered turn history.
    #[must_use]
    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Appends a customer turn.
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(ConversationTurn::user(text));
    }

    /// Appends an assistant turn.
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(ConversationTurn::assistant(text));
    }

    /// Returns the customer's own words, oldest first.
    pub fn user_texts(&self) -> impl Iterator<Item = &str> {
        self.history
            .iter()
            .filter(|turn| turn.is_user())
            .map(|turn| turn.text.as_str())
    }

    /// Returns the problem summary, if triage has recorded one.
    #[must_use]
    pub fn problem_summary(&self) -> Option<&str> {
        self.problem_summary.as_deref()
    }

    /// Records the problem summary.
    ///
    /// # Errors
    ///
    /// Returns an error if a summary was already recorded; it is never revised.
    pub fn record_summary(&mut self, summary: impl Into<String>) -> Result<(), SessionError> {
        if self.problem_summary.is_some() {
            return Err(SessionError::SummaryAlreadyRecorded {
                session_id: self.id,
            });
        }
        self.problem_summary = Some(summary.into());
        Ok(())
    }

    /// Mirrors history and summary into the state store.
    ///
    /// # Errors
    ///
    /// Returns an error if the values cannot be encoded.
    pub async fn persist(&self) -> Result<(), SessionError> {
        let scope = self.scope();
        self.store
            .write_as(scope, StateKey::ConversationHistory, &self.history)
            .await
            .map_err(|source| SessionError::Storage {
                session_id: self.id,
                source,
            })?;
        if let Some(summary) = &self.problem_summary {
            self.store
                .write_as(scope, StateKey::ProblemSummary, summary)
                .await
                .map_err(|source| SessionError::Storage {
                    session_id: self.id,
                    source,
                })?;
        }
        tracing::debug!(
            session_id = %self.id,
            turns = self.history.len(),
            has_summary = self.problem_summary.is_some(),
            "persisted session state"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("history", &self.history)
            .field("problem_summary", &self.problem_summary)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Speaker;
    use crate::state::InMemoryStateStore;

    fn new_context() -> (Arc<InMemoryStateStore>, SessionContext) {
        let store = Arc::new(InMemoryStateStore::new());
        let context = SessionContext::new(store.clone());
        (store, context)
    }

    #[test]
    fn history_preserves_order() {
        let (_, mut context) = new_context();
        context.push_user("não consigo entrar");
        context.push_assistant("Qual mensagem aparece?");
        context.push_user("conta bloqueada");

        let speakers: Vec<_> = context.history().iter().map(|t| t.speaker).collect();
        assert_eq!(
            speakers,
            vec![Speaker::User, Speaker::Assistant, Speaker::User]
        );
        let user: Vec<_> = context.user_texts().collect();
        assert_eq!(user, vec!["não consigo entrar", "conta bloqueada"]);
    }

    #[test]
    fn summary_is_set_once() {
        let (_, mut context) = new_context();
        context.record_summary("Conta bloqueada").expect("first write");

        let err = context
            .record_summary("Outra coisa")
            .expect_err("second write must fail");
        assert!(matches!(err, SessionError::SummaryAlreadyRecorded { .. }));
        assert_eq!(context.problem_summary(), Some("Conta bloqueada"));
    }

    #[tokio::test]
    async fn persist_writes_triage_scope() {
        let (store, mut context) = new_context();
        context.push_user("VPN caiu");
        context.record_summary("VPN caiu").expect("summary");
        context.persist().await.expect("persist");

        let scope = StateScope::triage(context.id());
        let summary: Option<String> = store
            .read_as(scope, StateKey::ProblemSummary)
            .await
            .expect("decode");
        assert_eq!(summary.as_deref(), Some("VPN caiu"));

        let history: Option<Vec<ConversationTurn>> = store
            .read_as(scope, StateKey::ConversationHistory)
            .await
            .expect("decode");
        assert_eq!(history.map(|h| h.len()), Some(1));
    }

    #[tokio::test]
    async fn load_restores_persisted_context() {
        let (store, mut context) = new_context();
        context.push_user("sistema lento");
        context.record_summary("Sistema lento").expect("summary");
        context.persist().await.expect("persist");

        let restored = SessionContext::load(store, context.id())
            .await
            .expect("load");
        assert_eq!(restored.history(), context.history());
        assert_eq!(restored.problem_summary(), Some("Sistema lento"));
    }

    #[tokio::test]
    async fn load_unknown_session_is_empty() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let context = SessionContext::load(store, SessionId::new())
            .await
            .expect("load");
        assert!(context.history().is_empty());
        assert!(context.problem_summary().is_none());
    }
}
