//! Reasoning collaborator primitives for support-desk.
//!
//! Stages consult the collaborator through a single primitive, the
//! [`LlmCall`]: a one-shot request with optional structured output that is
//! raced against a cancellation token and decoded strictly. Providers sit
//! behind [`LlmBackend`]; [`AzureOpenAiBackend`] is the production one.
//! Stage instructions and output schemas live in the [`PromptRegistry`].

pub mod azure;
pub mod backend;
pub mod error;
pub mod llm_call;
pub mod prompt;

pub use azure::AzureOpenAiBackend;
pub use backend::{
    LlmBackend, LlmBackendConfig, LlmMessage, LlmProvider, LlmRequest, LlmResponse, MessageRole,
    TokenUsage,
};
pub use error::{LlmError, PromptError};
pub use llm_call::{LlmCall, LlmCallResult, LlmInvocationId};
pub use prompt::{PromptRegistry, PromptTemplate, VariableDefinition};
