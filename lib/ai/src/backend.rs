//! LLM backend abstraction.
//!
//! Provides a unified interface over the reasoning collaborator. Stages only
//! ever see [`LlmBackend`]; the concrete provider is chosen at startup.

use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Available LLM providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Azure OpenAI deployment.
    AzureOpenAi,
    /// Generic OpenAI-compatible API.
    OpenAiCompatible,
}

impl LlmProvider {
    /// Returns the provider name used in logs and errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AzureOpenAi => "azure_open_ai",
            Self::OpenAiCompatible => "open_ai_compatible",
        }
    }
}

/// Configuration for an LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmBackendConfig {
    /// The provider type.
    pub provider: LlmProvider,
    /// Base URL for the API.
    pub base_url: String,
    /// Model identifier (the deployment name for Azure).
    pub model: String,
    /// API key (if required).
    pub api_key: Option<String>,
    /// Additional provider-specific options.
    pub options: HashMap<String, JsonValue>,
}

impl LlmBackendConfig {
    /// Creates an Azure OpenAI backend configuration.
    #[must_use]
    pub fn azure_openai(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let mut options = HashMap::new();
        options.insert(
            "api_version".to_string(),
            JsonValue::String(api_version.into()),
        );
        Self {
            provider: LlmProvider::AzureOpenAi,
            base_url: endpoint.into(),
            model: deployment.into(),
            api_key: Some(api_key.into()),
            options,
        }
    }

    /// Returns a string option, if set.
    #[must_use]
    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(JsonValue::as_str)
    }
}

/// A request to an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The prompt/messages to send.
    pub prompt: String,
    /// System prompt, if any.
    pub system: Option<String>,
    /// Context from previous messages.
    pub context: Vec<LlmMessage>,
    /// Optional JSON schema for structured output.
    pub output_schema: Option<JsonValue>,
    /// Temperature for sampling (0.0 - 1.0).
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    /// Creates a new simple request with just a prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            context: Vec::new(),
            output_schema: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Adds context messages.
    ///
    /// Context messages are sent before the prompt, oldest first.
    #[must_use]
    pub fn with_context(mut self, context: Vec<LlmMessage>) -> Self {
        self.context = context;
        self
    }

    /// Adds an output schema for structured output.
    #[must_use]
    pub fn with_output_schema(mut self, schema: JsonValue) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: String,
}

impl LlmMessage {
    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User/human message.
    User,
    /// Assistant/AI message.
    Assistant,
    /// System message.
    System,
}

/// A response from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// The generated content.
    pub content: String,
    /// Structured output (if output_schema was provided).
    pub structured_output: Option<JsonValue>,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens.
    pub input_tokens: u32,
    /// Number of output tokens.
    pub output_tokens: u32,
}

impl TokenUsage {
    /// Returns the total number of tokens.
    #[must_use]
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait for LLM backends.
///
/// This trait defines the interface that all LLM providers must implement.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Generates a response for the given request.
    ///
    /// # Errors
    ///
    /// Returns an error if the LLM call fails.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Returns the provider type.
    fn provider(&self) -> LlmProvider;

    /// Returns the model name.
    fn model(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_request_builder() {
        let request = LlmRequest::new("Problema do Usuário: VPN caiu")
            .with_system("És um agente de suporte.")
            .with_context(vec![LlmMessage::user("VPN caiu")])
            .with_temperature(0.2)
            .with_max_tokens(500);

        assert_eq!(request.prompt, "Problema do Usuário: VPN caiu");
        assert_eq!(request.system.as_deref(), Some("És um agente de suporte."));
        assert_eq!(request.context.len(), 1);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(500));
    }

    #[test]
    fn llm_message_creation() {
        let user_msg = LlmMessage::user("Não consigo entrar");
        assert_eq!(user_msg.role, MessageRole::User);

        let assistant_msg = LlmMessage::assistant("Qual erro aparece?");
        assert_eq!(assistant_msg.role, MessageRole::Assistant);
    }

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn azure_config_keeps_api_version() {
        let config = LlmBackendConfig::azure_openai(
            "https://contoso.openai.azure.com",
            "gpt-4o-mini",
            "secret",
            "2024-08-01-preview",
        );
        assert_eq!(config.provider, LlmProvider::AzureOpenAi);
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.option_str("api_version"), Some("2024-08-01-preview"));
        assert_eq!(config.option_str("missing"), None);
    }

    #[test]
    fn provider_names_are_snake_case() {
        let json = serde_json::to_string(&LlmProvider::AzureOpenAi).expect("serialize");
        assert_eq!(json, format!("\"{}\"", LlmProvider::AzureOpenAi.as_str()));
    }
}
