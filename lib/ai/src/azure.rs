//! Azure OpenAI chat-completions backend.

use crate::backend::{
    LlmBackend, LlmBackendConfig, LlmProvider, LlmRequest, LlmResponse, MessageRole, TokenUsage,
};
use crate::error::LlmError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::{debug, warn};

/// Api-version used when the configuration does not name one.
pub const DEFAULT_API_VERSION: &str = "2024-08-01-preview";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Talks to one Azure OpenAI deployment.
#[derive(Debug, Clone)]
pub struct AzureOpenAiBackend {
    client: Client,
    url: Url,
    api_key: String,
    deployment: String,
}

impl AzureOpenAiBackend {
    /// Builds a backend from `config`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the endpoint is not an absolute URL, the
    /// deployment or key is empty, or the HTTP client cannot be built.
    pub fn new(config: &LlmBackendConfig) -> Result<Self, Report<LlmError>> {
        if config.provider != LlmProvider::AzureOpenAi {
            return Err(invalid(format!(
                "expected provider azure_open_ai, got {}",
                config.provider.as_str()
            ))
            .into());
        }
        if config.model.trim().is_empty() {
            return Err(invalid("deployment name is empty").into());
        }
        let api_key = match config.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => return Err(invalid("API key is missing").into()),
        };
        let api_version = config
            .option_str("api_version")
            .unwrap_or(DEFAULT_API_VERSION);
        let url = completions_url(&config.base_url, &config.model, api_version)?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            api_key,
            deployment: config.model.clone(),
        })
    }

    /// Returns the full chat-completions URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn translate_request(request: &LlmRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.context.len() + 2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        for message in &request.context {
            messages.push(ChatMessage {
                role: role_name(message.role),
                content: message.content.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let response_format = request.output_schema.as_ref().map(|schema| ResponseFormat {
            r#type: "json_schema",
            json_schema: JsonSchemaFormat {
                name: "response",
                schema: schema.clone(),
                strict: false,
            },
        });

        ChatRequest {
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format,
        }
    }

    fn normalize_response(&self, response: ChatResponse) -> Result<LlmResponse, LlmError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ResponseParseFailed {
                reason: "no choices in response".to_string(),
            })?;
        let content = choice.message.content.unwrap_or_default();
        let usage = response
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            structured_output: None,
            usage,
            model: response.model.unwrap_or_else(|| self.deployment.clone()),
        })
    }
}

#[async_trait]
impl LlmBackend for AzureOpenAiBackend {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = Self::translate_request(request);
        debug!(
            deployment = %self.deployment,
            messages = body.messages.len(),
            structured = body.response_format.is_some(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(self.url.clone())
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else if e.is_connect() {
                    LlmError::ProviderUnavailable {
                        provider: LlmProvider::AzureOpenAi.as_str().to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    LlmError::RequestFailed {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let text = response.text().await.map_err(|e| LlmError::RequestFailed {
            reason: format!("failed to read response: {e}"),
        })?;

        if !status.is_success() {
            let err = status_error(status, &text, retry_after_secs);
            warn!(status = status.as_u16(), error = %err, "chat completion rejected");
            return Err(err);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::ResponseParseFailed {
                reason: e.to_string(),
            })?;
        self.normalize_response(parsed)
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::AzureOpenAi
    }

    fn model(&self) -> &str {
        &self.deployment
    }
}

fn invalid(reason: impl Into<String>) -> LlmError {
    LlmError::InvalidConfig {
        reason: reason.into(),
    }
}

fn completions_url(endpoint: &str, deployment: &str, api_version: &str) -> Result<Url, LlmError> {
    let base = Url::parse(endpoint).map_err(|e| invalid(format!("endpoint '{endpoint}': {e}")))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(invalid(format!("endpoint '{endpoint}' is not an http(s) URL")));
    }
    let path = format!(
        "{}/openai/deployments/{deployment}/chat/completions",
        base.path().trim_end_matches('/')
    );
    let mut url = base;
    url.set_path(&path);
    url.query_pairs_mut()
        .clear()
        .append_pair("api-version", api_version);
    Ok(url)
}

fn status_error(status: StatusCode, body: &str, retry_after_secs: Option<u64>) -> LlmError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    match status.as_u16() {
        401 | 403 => invalid(format!("authentication failed: {message}")),
        429 => LlmError::RateLimited { retry_after_secs },
        500..=599 => LlmError::ProviderUnavailable {
            provider: LlmProvider::AzureOpenAi.as_str().to_string(),
            reason: format!("HTTP {status}: {message}"),
        },
        _ => LlmError::RequestFailed {
            reason: format!("HTTP {status}: {message}"),
        },
    }
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: &'static str,
    schema: JsonValue,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}
