//! LLM Call primitive.
//!
//! The fundamental AI operation: single-shot inference with optional
//! structured output. Every stage talks to the reasoning collaborator
//! through this primitive, which also owns cancellation and strict JSON
//! decoding of structured replies.

use crate::backend::{LlmBackend, LlmMessage, LlmRequest, LlmResponse, TokenUsage};
use crate::error::LlmError;
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use ulid::Ulid;

/// Unique identifier for an LLM invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LlmInvocationId(Ulid);

impl LlmInvocationId {
    /// Creates a new invocation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for LlmInvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LlmInvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "llm_{}", self.0)
    }
}

/// Configuration for an LLM Call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LlmCallConfig {
    /// The prompt.
    pub prompt: String,
    /// Optional system prompt.
    pub system_prompt: Option<String>,
    /// Optional output schema for structured output.
    pub output_schema: Option<JsonValue>,
    /// Temperature for sampling.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl LlmCallConfig {
    #[must_use]
    pub(crate) fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            output_schema: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

/// The result of an LLM Call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallResult {
    /// Unique identifier for this invocation.
    pub id: LlmInvocationId,
    /// The raw text output.
    pub content: String,
    /// Structured output (if schema was provided).
    pub structured_output: Option<JsonValue>,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

impl LlmCallResult {
    /// Creates a result from an LLM response.
    #[must_use]
    pub fn from_response(id: LlmInvocationId, response: LlmResponse, latency_ms: u64) -> Self {
        Self {
            id,
            content: response.content,
            structured_output: response.structured_output,
            usage: response.usage,
            model: response.model,
            timestamp: Utc::now(),
            latency_ms,
        }
    }

    /// Decodes the reply as `T`.
    ///
    /// Uses the provider's structured output when present, otherwise the
    /// raw text. No repair is attempted; anything that is not exactly a
    /// JSON document of the expected shape is an error.
    ///
    /// # Errors
    ///
    /// Returns `ResponseParseFailed` if the reply does not decode.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        let decoded = match &self.structured_output {
            Some(value) => serde_json::from_value(value.clone()),
            None => serde_json::from_str(self.content.trim()),
        };
        decoded.map_err(|e| LlmError::ResponseParseFailed {
            reason: e.to_string(),
        })
    }
}

/// An LLM Call executor.
///
/// This is a builder for executing LLM calls with various configurations.
#[derive(Debug, Clone)]
pub struct LlmCall {
    config: LlmCallConfig,
    history: Vec<LlmMessage>,
}

impl LlmCall {
    /// Creates a new LLM Call with the given prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            config: LlmCallConfig::new(prompt),
            history: Vec::new(),
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system.into());
        self
    }

    /// Adds an output schema for structured output.
    #[must_use]
    pub fn with_output_schema(mut self, schema: JsonValue) -> Self {
        self.config.output_schema = Some(schema);
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    /// Adds prior conversation turns, sent ahead of the prompt.
    #[must_use]
    pub fn with_history(mut self, history: Vec<LlmMessage>) -> Self {
        self.history = history;
        self
    }

    /// Builds an LLM request from this configuration.
    #[must_use]
    pub fn build_request(&self) -> LlmRequest {
        let mut request =
            LlmRequest::new(self.config.prompt.clone()).with_context(self.history.clone());

        if let Some(ref system) = self.config.system_prompt {
            request = request.with_system(system.clone());
        }

        if let Some(ref schema) = self.config.output_schema {
            request = request.with_output_schema(schema.clone());
        }

        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }

        if let Some(max_tokens) = self.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        request
    }

    /// Sends the call to `backend`, racing it against `cancel`.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `cancel` fires first, otherwise whatever the
    /// backend reports.
    pub async fn invoke(
        &self,
        backend: &dyn LlmBackend,
        cancel: &CancellationToken,
    ) -> Result<LlmCallResult, Report<LlmError>> {
        let id = LlmInvocationId::new();
        let request = self.build_request();
        let started = Instant::now();

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(LlmError::Cancelled.into()),
            response = backend.generate(&request) => response?,
        };

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = LlmCallResult::from_response(id, response, latency_ms);
        debug!(
            invocation_id = %result.id,
            provider = backend.provider().as_str(),
            model = %result.model,
            input_tokens = result.usage.input_tokens,
            output_tokens = result.usage.output_tokens,
            latency_ms,
            "LLM call completed"
        );
        Ok(result)
    }

    /// Sends the call and decodes the reply as `T`.
    ///
    /// # Errors
    ///
    /// Returns `ResponseParseFailed` if the reply is not valid JSON for `T`,
    /// plus everything [`LlmCall::invoke`] can return.
    pub async fn invoke_structured<T: DeserializeOwned>(
        &self,
        backend: &dyn LlmBackend,
        cancel: &CancellationToken,
    ) -> Result<(T, LlmCallResult), Report<LlmError>> {
        let result = self.invoke(backend, cancel).await?;
        let value = result.decode::<T>()?;
        Ok((value, result))
    }
}
