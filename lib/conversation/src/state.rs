//! Scoped key/value state for a support session.
//!
//! Stages share state through a store keyed by `(scope, key)`. Keys form a
//! closed set so that a stage can only read what another stage is known to
//! write. Writes overwrite; the last write wins. Nothing here survives a
//! process restart.

use crate::error::StateError;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;
use support_desk_core::SessionId;
use tokio::sync::RwLock;

/// Named partition of the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// State owned by the triage stage and read by later stages.
    Triage,
}

impl ScopeKind {
    /// Returns the scope name used in logs and diagnostics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triage => "triage_state",
        }
    }
}

/// A scope within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateScope {
    /// The session the scope belongs to.
    pub session_id: SessionId,
    /// Which partition of the session.
    pub kind: ScopeKind,
}

impl StateScope {
    /// Returns the triage scope of a session.
    #[must_use]
    pub fn triage(session_id: SessionId) -> Self {
        Self {
            session_id,
            kind: ScopeKind::Triage,
        }
    }
}

impl fmt::Display for StateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.session_id, self.kind.as_str())
    }
}

/// Keys that may be stored in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Ordered list of conversation turns.
    ConversationHistory,
    /// The problem summary produced once triage understands the issue.
    ProblemSummary,
}

impl StateKey {
    /// Returns the key name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationHistory => "conversation_history",
            Self::ProblemSummary => "problem_summary",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for session state storage.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Reads a value, or `None` if nothing was written under `(scope, key)`.
    async fn read(&self, scope: StateScope, key: StateKey) -> Option<JsonValue>;

    /// Writes a value, replacing any previous one.
    async fn write(&self, scope: StateScope, key: StateKey, value: JsonValue);
}

/// Typed helpers over any [`StateStore`].
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Reads and decodes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if a value exists but does not decode as `T`.
    async fn read_as<T: DeserializeOwned + Send>(
        &self,
        scope: StateScope,
        key: StateKey,
    ) -> Result<Option<T>, StateError> {
        let Some(value) = self.read(scope, key).await else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StateError::Decode {
                scope,
                key,
                reason: e.to_string(),
            })
    }

    /// Encodes and writes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded as JSON.
    async fn write_as<T: Serialize + Sync>(
        &self,
        scope: StateScope,
        key: StateKey,
        value: &T,
    ) -> Result<(), StateError> {
        let value = serde_json::to_value(value).map_err(|e| StateError::Encode {
            key,
            reason: e.to_string(),
        })?;
        self.write(scope, key, value).await;
        Ok(())
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// Process-local state store.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<(StateScope, StateKey), JsonValue>>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn read(&self, scope: StateScope, key: StateKey) -> Option<JsonValue> {
        self.entries.read().await.get(&(scope, key)).cloned()
    }

    async fn write(&self, scope: StateScope, key: StateKey, value: JsonValue) {
        self.entries.write().await.insert((scope, key), value);
    }
}
