//! Stage results.
//!
//! These are the values stages hand to each other and to the driver. Field
//! names on the wire are the ones the reasoning collaborator is asked to
//! produce.

use crate::edge::Route;
use serde::{Deserialize, Deserializer, Serialize};
use support_desk_knowledge::KnownIssueRecord;

/// Message sent when KnowledgeMatch gives up asking for details.
pub const INVESTIGATION_NOTICE: &str =
    "The issue requires further investigation. It will be escalated to a specialist.";

/// How urgent the customer's problem is.
///
/// Deserialization accepts the English and Portuguese names in any case;
/// anything else, including a missing value, becomes `Unspecified`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// System down, financial loss, many users affected.
    Critical,
    /// Important feature broken or customer blocked.
    High,
    /// Inconvenient, but a workaround exists.
    Medium,
    /// Question, suggestion or cosmetic issue.
    Low,
    /// Not given or not recognized.
    #[default]
    Unspecified,
}

impl Urgency {
    /// Parses an urgency label leniently.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" | "crítica" | "critica" => Self::Critical,
            "high" | "alta" => Self::High,
            "medium" | "média" | "media" => Self::Medium,
            "low" | "baixa" => Self::Low,
            _ => Self::Unspecified,
        }
    }
}

impl<'de> Deserialize<'de> for Urgency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.as_deref().map_or(Self::Unspecified, Self::parse))
    }
}

/// Triage verdict for one collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Whether the problem is understood well enough to summarize.
    pub is_understood: bool,
    /// Clarifying question when the problem is not understood.
    #[serde(default)]
    pub question_for_user: String,
    /// Problem summary when the problem is understood.
    #[serde(default)]
    pub summary: String,
    /// Assessed urgency.
    #[serde(default)]
    pub urgency: Urgency,
}

impl ClassificationResult {
    /// A verdict that understood the problem.
    #[must_use]
    pub fn understood(summary: impl Into<String>, urgency: Urgency) -> Self {
        Self {
            is_understood: true,
            question_for_user: String::new(),
            summary: summary.into(),
            urgency,
        }
    }

    /// A verdict that needs another answer from the customer.
    #[must_use]
    pub fn clarify(question: impl Into<String>) -> Self {
        Self {
            is_understood: false,
            question_for_user: question.into(),
            summary: String::new(),
            urgency: Urgency::Unspecified,
        }
    }

    /// The verdict used when triage runs out of attempts: the customer's own
    /// words stand in for the summary.
    #[must_use]
    pub fn exhausted(summary: impl Into<String>) -> Self {
        Self {
            is_understood: false,
            question_for_user: String::new(),
            summary: summary.into(),
            urgency: Urgency::Unspecified,
        }
    }
}

/// KnowledgeMatch verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatchResult {
    /// Whether the problem is a known issue.
    pub is_known: bool,
    /// Text for the customer: a clarifying question or an explanation.
    #[serde(default)]
    pub message_for_user: String,
    /// Whether the problem needs a human.
    pub is_complex: bool,
    /// The knowledge base record the problem matched.
    #[serde(default)]
    pub matched_issue: Option<KnownIssueRecord>,
    /// Tools needed to resolve the issue.
    #[serde(default)]
    pub required_tools: Vec<String>,
    /// Historical success rate of the resolution, 0.0 to 1.0.
    #[serde(default)]
    pub success_rate: f64,
}

impl KnowledgeMatchResult {
    /// Creates a verdict with no matched record.
    #[must_use]
    pub fn new(is_known: bool, is_complex: bool, message: impl Into<String>) -> Self {
        Self {
            is_known,
            message_for_user: message.into(),
            is_complex,
            matched_issue: None,
            required_tools: Vec::new(),
            success_rate: 0.0,
        }
    }

    /// The verdict emitted when the clarification bound is reached.
    #[must_use]
    pub fn exhausted() -> Self {
        Self::new(false, true, INVESTIGATION_NOTICE)
    }

    /// The verdict emitted before a failure propagates.
    #[must_use]
    pub fn degraded(error: impl std::fmt::Display) -> Self {
        Self::new(
            false,
            true,
            format!("An error occurred during analysis: {error}"),
        )
    }

    /// Attaches a knowledge base record, taking its tools and success rate.
    pub fn attach(&mut self, record: KnownIssueRecord) {
        self.required_tools = record.tools_required.clone();
        self.success_rate = record.success_rate;
        self.matched_issue = Some(record);
    }

    /// Whether the verdict is final. Otherwise the customer is asked for
    /// more detail.
    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.is_known || self.is_complex
    }

    /// Where a decided verdict goes: resolution only for known, simple
    /// problems.
    #[must_use]
    pub fn route(&self) -> Route {
        if self.is_known && !self.is_complex {
            Route::Resolve
        } else {
            Route::Escalate
        }
    }
}

/// Final disposition of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    /// Whether the customer's problem is solved.
    pub is_resolved: bool,
    /// Whether a human still has to act.
    pub requires_human: bool,
    /// Closing message for the customer.
    pub message_for_user: String,
    /// Actions that completed during resolution.
    #[serde(default)]
    pub actions_executed: Vec<String>,
    /// Why the session needs a human, if it does.
    #[serde(default)]
    pub escalation_reason: Option<String>,
}

impl ResolutionOutcome {
    /// An outcome that hands the session to a human.
    #[must_use]
    pub fn needs_human(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            is_resolved: false,
            requires_human: true,
            message_for_user: message.into(),
            actions_executed: Vec::new(),
            escalation_reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgency_accepts_both_languages() {
        assert_eq!(Urgency::parse("Critical"), Urgency::Critical);
        assert_eq!(Urgency::parse(" alta "), Urgency::High);
        assert_eq!(Urgency::parse("MÉDIA"), Urgency::Medium);
        assert_eq!(Urgency::parse("baixa"), Urgency::Low);
        assert_eq!(Urgency::parse("urgentíssimo"), Urgency::Unspecified);
    }

    #[test]
    fn classification_tolerates_missing_and_unknown_fields() {
        let result: ClassificationResult =
            serde_json::from_str(r#"{"is_understood": false, "question_for_user": "Qual o email?", "urgency": null}"#)
                .expect("deserialize");
        assert_eq!(result.urgency, Urgency::Unspecified);
        assert!(result.summary.is_empty());

        let result: ClassificationResult = serde_json::from_str(
            r#"{"is_understood": true, "question_for_user": "", "summary": "VPN caiu", "urgency": "high"}"#,
        )
        .expect("deserialize");
        assert_eq!(result, ClassificationResult::understood("VPN caiu", Urgency::High));
    }

    #[test]
    fn classification_requires_the_verdict() {
        let result: Result<ClassificationResult, _> = serde_json::from_str(r#"{"summary": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn routing_is_exclusive_and_exhaustive() {
        let cases = [
            (true, false, Route::Resolve),
            (true, true, Route::Escalate),
            (false, true, Route::Escalate),
            (false, false, Route::Escalate),
        ];
        for (known, complex, expected) in cases {
            assert_eq!(
                KnowledgeMatchResult::new(known, complex, "").route(),
                expected,
                "known={known} complex={complex}"
            );
        }
    }

    #[test]
    fn undecided_verdict_asks_again() {
        assert!(!KnowledgeMatchResult::new(false, false, "Qual erro?").is_decided());
        assert!(KnowledgeMatchResult::new(true, false, "").is_decided());
        assert!(KnowledgeMatchResult::new(false, true, "").is_decided());
    }

    #[test]
    fn attach_copies_tools_and_rate() {
        let record = KnownIssueRecord::new("Conta bloqueada", vec!["bloqueada".to_string()])
            .with_tools(vec!["UnlockAccount".to_string()])
            .with_success_rate(0.9);
        let mut result = KnowledgeMatchResult::new(true, false, "Conta bloqueada");
        result.attach(record);

        assert_eq!(result.required_tools, vec!["UnlockAccount"]);
        assert!((result.success_rate - 0.9).abs() < f64::EPSILON);
        assert_eq!(
            result.matched_issue.map(|r| r.problem),
            Some("Conta bloqueada".to_string())
        );
    }

    #[test]
    fn degraded_and_exhausted_escalate() {
        let degraded = KnowledgeMatchResult::degraded("boom");
        assert_eq!(degraded.message_for_user, "An error occurred during analysis: boom");
        assert_eq!(degraded.route(), Route::Escalate);
        assert_eq!(KnowledgeMatchResult::exhausted().message_for_user, INVESTIGATION_NOTICE);
    }
}
