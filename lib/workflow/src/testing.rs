//! In-memory doubles for stage and orchestrator tests.

use crate::execution::{EventSink, EventSinkError, StageOutput, WorkflowEvent};
use crate::run_state::RunState;
use crate::stage::{StageContext, StageId};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use support_desk_ai::{
    LlmBackend, LlmError, LlmProvider, LlmRequest, LlmResponse, TokenUsage,
};
use support_desk_conversation::{
    InMemoryStateStore, InteractionChannel, InteractionError, SessionContext,
};
use support_desk_knowledge::{KnowledgeBase, KnownIssueRecord};
use tokio_util::sync::CancellationToken;

/// Backend that answers from a script, in order.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(replies: impl IntoIterator<Item = Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every reply is the JSON document given.
    pub(crate) fn json(replies: impl IntoIterator<Item = JsonValue>) -> Self {
        Self::new(replies.into_iter().map(|value| Ok(value.to_string())))
    }

    pub(crate) fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::RequestFailed {
                    reason: "script exhausted".to_string(),
                })
            })?;
        Ok(LlmResponse {
            content: reply,
            structured_output: None,
            usage: TokenUsage::default(),
            model: "scripted".to_string(),
        })
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAiCompatible
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Channel that answers from a script and remembers the prompts.
pub(crate) struct ScriptedChannel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChannel {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InteractionChannel for ScriptedChannel {
    async fn ask(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, InteractionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if cancel.is_cancelled() {
            return Err(InteractionError::Cancelled);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(InteractionError::Closed)
    }
}

/// Channel whose `ask` cancels the run instead of answering.
pub(crate) struct CancellingChannel {
    cancel: CancellationToken,
}

impl CancellingChannel {
    pub(crate) fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl InteractionChannel for CancellingChannel {
    async fn ask(
        &self,
        _prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, InteractionError> {
        self.cancel.cancel();
        cancel.cancelled().await;
        Err(InteractionError::Cancelled)
    }
}

/// Sink that keeps everything published to it.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingSink {
    pub(crate) fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(WorkflowEvent::event_type)
            .collect()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::Message { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn outputs(&self) -> Vec<(StageId, StageOutput)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::Output { stage, output } => Some((*stage, output.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: WorkflowEvent) -> Result<(), EventSinkError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// The account-locked record used across tests.
pub(crate) fn password_record() -> KnownIssueRecord {
    KnownIssueRecord::new(
        "Usuário esqueceu a senha",
        vec!["senha".to_string(), "login".to_string()],
    )
    .with_solution("Enviar email de reset de senha")
    .with_tools(vec!["SendEmail".to_string()])
    .with_success_rate(0.95)
}

pub(crate) fn knowledge_base(records: Vec<KnownIssueRecord>) -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::with_records("know_issues.json", records))
}

pub(crate) fn session() -> SessionContext {
    SessionContext::new(Arc::new(InMemoryStateStore::new()))
}

/// Everything a stage needs, owned, so a test can lend it out.
pub(crate) struct Harness<C = ScriptedChannel> {
    pub(crate) session: SessionContext,
    pub(crate) run: RunState,
    pub(crate) channel: C,
    pub(crate) sink: RecordingSink,
    pub(crate) cancel: CancellationToken,
}

impl Harness<ScriptedChannel> {
    pub(crate) fn new(replies: &[&str]) -> Self {
        Self::with_channel(ScriptedChannel::new(replies))
    }
}

impl Harness<CancellingChannel> {
    /// The first `ask` cancels the run.
    pub(crate) fn cancelling() -> Self {
        let cancel = CancellationToken::new();
        let mut harness = Self::with_channel(CancellingChannel::new(cancel.clone()));
        harness.cancel = cancel;
        harness
    }
}

impl<C: InteractionChannel> Harness<C> {
    pub(crate) fn with_channel(channel: C) -> Self {
        let session = session();
        let run = RunState::new(session.id(), None);
        Self {
            session,
            run,
            channel,
            sink: RecordingSink::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn context(&mut self) -> StageContext<'_> {
        StageContext {
            session: &mut self.session,
            run: &mut self.run,
            channel: &self.channel,
            events: &self.sink,
            cancel: &self.cancel,
        }
    }
}
