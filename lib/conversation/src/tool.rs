//! Action tools available to the resolution stage.
//!
//! Tools are side-effecting operations the reasoning collaborator may ask
//! for while resolving a known issue:
//! - `UnlockAccount`: unlock a customer's account
//! - `SendEmail`: send one of the canned customer emails
//!
//! Both are simulated: they wait a short, fixed time and report success.

use crate::error::ToolError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Definition of a tool, as advertised to the reasoning collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for input parameters.
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    /// Creates a new tool definition.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({}),
        }
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Result data (if successful).
    pub data: Option<JsonValue>,
    /// Error message (if failed).
    pub error: Option<String>,
    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
}

impl ToolResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(data: JsonValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms: 0,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time_ms: 0,
        }
    }

    /// Records how long the tool took.
    #[must_use]
    pub fn with_execution_time(mut self, elapsed: Duration) -> Self {
        self.execution_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Trait for tool execution.
#[async_trait]
pub trait ActionTool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given input.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid, the tool fails, or
    /// `cancel` fires before it completes.
    async fn execute(
        &self,
        input: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError>;
}

/// Canned emails the `SendEmail` tool can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailTemplate {
    /// Password reset instructions.
    ResetPassword,
    /// Request to update billing details.
    UpdateBilling,
    /// Subscription cancellation confirmation.
    CancelSubscription,
    /// Account unlocked notice.
    UnlockConfirmation,
}

impl EmailTemplate {
    /// Returns the numeric code used by the mail provider.
    #[must_use]
    pub fn code(&self) -> u8 {
        match self {
            Self::ResetPassword => 1,
            Self::UpdateBilling => 2,
            Self::CancelSubscription => 3,
            Self::UnlockConfirmation => 4,
        }
    }
}

/// Input for [`UnlockAccountTool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockAccountInput {
    /// Username, email or account number.
    pub account_identifier: String,
    /// Why the account is being unlocked.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Input for [`SendEmailTool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailInput {
    /// Recipient address.
    pub recipient_email: String,
    /// Which canned email to send.
    pub email_type: EmailTemplate,
    /// Template parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

async fn simulate(name: &str, delay: Duration, cancel: &CancellationToken) -> Result<(), ToolError> {
    tokio::select! {
        () = cancel.cancelled() => Err(ToolError::Cancelled { name: name.to_string() }),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn parse_input<T: serde::de::DeserializeOwned>(name: &str, input: JsonValue) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Unlocks a customer account.
#[derive(Debug, Clone)]
pub struct UnlockAccountTool {
    delay: Duration,
}

impl UnlockAccountTool {
    /// Tool name.
    pub const NAME: &'static str = "UnlockAccount";

    /// Creates the tool with its default simulated latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(100),
        }
    }

    /// Overrides the simulated latency.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for UnlockAccountTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionTool for UnlockAccountTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(Self::NAME, "Desbloqueia a conta do usuário").with_input_schema(
            serde_json::json!({
                "type": "object",
                "properties": {
                    "account_identifier": { "type": "string" },
                    "reason": { "type": "string" }
                },
                "required": ["account_identifier"]
            }),
        )
    }

    async fn execute(
        &self,
        input: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let started = Instant::now();
        let input: UnlockAccountInput = parse_input(Self::NAME, input)?;
        if input.account_identifier.trim().is_empty() {
            return Err(ToolError::InvalidInput {
                name: Self::NAME.to_string(),
                reason: "account_identifier is empty".to_string(),
            });
        }

        simulate(Self::NAME, self.delay, cancel).await?;
        tracing::info!(
            account = %input.account_identifier,
            reason = input.reason.as_deref().unwrap_or("unspecified"),
            "account unlocked"
        );

        Ok(ToolResult::success(serde_json::json!({
            "account_identifier": input.account_identifier,
            "unlocked": true
        }))
        .with_execution_time(started.elapsed()))
    }
}

/// Sends a canned email to a customer.
#[derive(Debug, Clone)]
pub struct SendEmailTool {
    delay: Duration,
}

impl SendEmailTool {
    /// Tool name.
    pub const NAME: &'static str = "SendEmail";

    /// Creates the tool with its default simulated latency.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(150),
        }
    }

    /// Overrides the simulated latency.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for SendEmailTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ActionTool for SendEmailTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(Self::NAME, "Envia email de reset de senha e outros avisos")
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "recipient_email": { "type": "string" },
                    "email_type": {
                        "type": "string",
                        "enum": [
                            "ResetPassword",
                            "UpdateBilling",
                            "CancelSubscription",
                            "UnlockConfirmation"
                        ]
                    },
                    "parameters": {
                        "type": "object",
                        "additionalProperties": { "type": "string" }
                    }
                },
                "required": ["recipient_email", "email_type"]
            }))
    }

    async fn execute(
        &self,
        input: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let started = Instant::now();
        let input: SendEmailInput = parse_input(Self::NAME, input)?;
        if !input.recipient_email.contains('@') {
            return Err(ToolError::InvalidInput {
                name: Self::NAME.to_string(),
                reason: format!("'{}' is not an email address", input.recipient_email),
            });
        }

        simulate(Self::NAME, self.delay, cancel).await?;
        tracing::info!(
            recipient = %input.recipient_email,
            template = ?input.email_type,
            template_code = input.email_type.code(),
            parameters = input.parameters.len(),
            "email sent"
        );

        Ok(ToolResult::success(serde_json::json!({
            "recipient_email": input.recipient_email,
            "email_type": input.email_type,
            "sent": true
        }))
        .with_execution_time(started.elapsed()))
    }
}

/// Registry of available tools.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ActionTool>>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Creates a registry holding the standard support tools.
    #[must_use]
    pub fn support_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UnlockAccountTool::new()));
        registry.register(Arc::new(SendEmailTool::new()));
        registry
    }

    /// Registers a tool under its definition name.
    pub fn register(&mut self, tool: Arc<dyn ActionTool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    /// Gets a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ActionTool>> {
        self.tools.get(name)
    }

    /// Returns all registered tool definitions, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invokes a tool by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown name, otherwise whatever the tool returns.
    pub async fn invoke(
        &self,
        name: &str,
        input: JsonValue,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;
        tool.execute(input, cancel).await
    }

    /// Converts definitions to the format expected by LLM APIs.
    #[must_use]
    pub fn to_llm_format(&self) -> Vec<JsonValue> {
        self.definitions()
            .into_iter()
            .map(|def| {
                serde_json::json!({
                    "name": def.name,
                    "description": def.description,
                    "parameters": def.input_schema
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
