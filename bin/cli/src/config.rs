//! Driver configuration.
//!
//! Loaded via the `config` crate from environment variables; variable names
//! map to fields by lower-casing (`AZURE_OPENAI_ENDPOINT` becomes
//! `azure_openai_endpoint`).

use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use support_desk_ai::LlmBackendConfig;
use support_desk_core::Result;
use support_desk_workflow::{EscalationDelays, IterationPolicy};

/// Errors from loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The environment could not be read or deserialized.
    Load { reason: String },
    /// A required variable is unset or blank.
    Missing { variable: &'static str },
    /// A variable is set to an unusable value.
    Invalid {
        variable: &'static str,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load { reason } => write!(f, "failed to load configuration: {reason}"),
            Self::Missing { variable } => write!(f, "{variable} is not configured"),
            Self::Invalid { variable, reason } => write!(f, "{variable} is invalid: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Azure OpenAI resource endpoint.
    #[serde(default)]
    pub azure_openai_endpoint: String,

    /// Deployment to call.
    #[serde(default = "default_deployment_name")]
    pub azure_openai_deployment_name: String,

    /// Key sent in the `api-key` header.
    #[serde(default)]
    pub azure_openai_api_key: String,

    /// REST api-version.
    #[serde(default = "default_api_version")]
    pub azure_openai_api_version: String,

    /// Known-issues file.
    #[serde(default = "default_known_issues_path")]
    pub known_issues_path: PathBuf,

    /// Bound shared by the Triage and KnowledgeMatch loops.
    #[serde(default = "default_max_workflow_iterations")]
    pub max_workflow_iterations: u32,

    /// Longest pause in the escalation script, in milliseconds.
    #[serde(default = "default_escalation_delay_ms")]
    pub escalation_delay_ms: u64,
}

fn default_deployment_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_version() -> String {
    "2024-08-01-preview".to_string()
}

fn default_known_issues_path() -> PathBuf {
    PathBuf::from("know_issues.json")
}

fn default_max_workflow_iterations() -> u32 {
    support_desk_workflow::DEFAULT_MAX_ITERATIONS
}

fn default_escalation_delay_ms() -> u64 {
    1000
}

impl AppConfig {
    /// Loads and validates configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed, a required one is
    /// missing, or a value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(config::Environment::default())
    }

    fn from_environment(environment: config::Environment) -> Result<Self, ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(environment.separator("__").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks required values and ranges.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.azure_openai_endpoint.trim().is_empty() {
            return Err(ConfigError::Missing {
                variable: "AZURE_OPENAI_ENDPOINT",
            }
            .into());
        }
        let endpoint =
            Url::parse(self.azure_openai_endpoint.trim()).map_err(|e| ConfigError::Invalid {
                variable: "AZURE_OPENAI_ENDPOINT",
                reason: e.to_string(),
            })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                variable: "AZURE_OPENAI_ENDPOINT",
                reason: format!("unsupported scheme '{}'", endpoint.scheme()),
            }
            .into());
        }
        if self.azure_openai_deployment_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                variable: "AZURE_OPENAI_DEPLOYMENT_NAME",
            }
            .into());
        }
        if self.azure_openai_api_key.trim().is_empty() {
            return Err(ConfigError::Missing {
                variable: "AZURE_OPENAI_API_KEY",
            }
            .into());
        }
        if self.max_workflow_iterations == 0 {
            return Err(ConfigError::Invalid {
                variable: "MAX_WORKFLOW_ITERATIONS",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Backend settings for the Azure OpenAI deployment.
    #[must_use]
    pub fn backend_config(&self) -> LlmBackendConfig {
        LlmBackendConfig::azure_openai(
            self.azure_openai_endpoint.trim(),
            self.azure_openai_deployment_name.trim(),
            self.azure_openai_api_key.trim(),
            self.azure_openai_api_version.trim(),
        )
    }

    #[must_use]
    pub fn policy(&self) -> IterationPolicy {
        IterationPolicy::new(self.max_workflow_iterations)
    }

    #[must_use]
    pub fn escalation_delays(&self) -> EscalationDelays {
        EscalationDelays::from_longest(Duration::from_millis(self.escalation_delay_ms))
    }
}
