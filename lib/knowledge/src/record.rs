//! Known-issue records.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// One entry of the knowledge base.
///
/// Field names on the wire are the Portuguese names used by the support
/// team's knowledge file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownIssueRecord {
    /// Problem title.
    #[serde(rename = "problema", default)]
    pub problem: String,
    /// Symptoms customers report for this problem.
    #[serde(rename = "sintomas", default)]
    pub symptoms: Vec<String>,
    /// Keywords the record is matched on.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Known solution or workaround.
    #[serde(rename = "solucao", default)]
    pub solution: Option<String>,
    /// Whether the support team has to act.
    #[serde(rename = "requer_acao", default)]
    pub action_required: bool,
    /// Automated action that resolves the issue, if any.
    #[serde(rename = "acao_mcp", default)]
    pub automated_action: Option<String>,
    /// Historical resolution success rate, 0.0 to 1.0.
    #[serde(rename = "taxa_sucesso", default)]
    pub success_rate: f64,
    /// Expected time to resolution.
    #[serde(rename = "prazo_resolucao", default, with = "time_span")]
    pub resolution_time: Option<TimeDelta>,
    /// Tools that must be invoked to resolve the issue.
    #[serde(rename = "tools_required", default)]
    pub tools_required: Vec<String>,
}

impl KnownIssueRecord {
    /// Creates a record with a title and keywords and everything else empty.
    #[must_use]
    pub fn new(problem: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            problem: problem.into(),
            symptoms: Vec::new(),
            keywords,
            solution: None,
            action_required: false,
            automated_action: None,
            success_rate: 0.0,
            resolution_time: None,
            tools_required: Vec::new(),
        }
    }

    /// Sets the solution.
    #[must_use]
    pub fn with_solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    /// Sets the required tools.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools_required = tools;
        self
    }

    /// Sets the success rate.
    #[must_use]
    pub fn with_success_rate(mut self, success_rate: f64) -> Self {
        self.success_rate = success_rate;
        self
    }

    /// Returns true if any of this record's keywords equals a candidate,
    /// ignoring case.
    #[must_use]
    pub fn matches_any(&self, candidates: &[String]) -> bool {
        self.keywords.iter().any(|keyword| {
            let keyword = keyword.to_lowercase();
            candidates
                .iter()
                .any(|candidate| candidate.to_lowercase() == keyword)
        })
    }
}

/// `[-][d.]hh:mm:ss[.fraction]` spans, as written in the knowledge file.
pub mod time_span {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Parses a span such as `02:30:00` or `1.04:00:00`.
    #[must_use]
    pub fn parse(text: &str) -> Option<TimeDelta> {
        let text = text.trim();
        let (negative, text) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let mut parts = text.split(':');
        let (head, minutes, seconds) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let (days, hours) = match head.split_once('.') {
            Some((days, hours)) => (days.parse::<i64>().ok()?, hours.parse::<i64>().ok()?),
            None => (0, head.parse::<i64>().ok()?),
        };
        let minutes = minutes.parse::<i64>().ok()?;
        let (whole_seconds, nanos) = match seconds.split_once('.') {
            Some((whole, fraction)) => (whole.parse::<i64>().ok()?, fraction_to_nanos(fraction)?),
            None => (seconds.parse::<i64>().ok()?, 0),
        };
        if hours > 23 || minutes > 59 || whole_seconds > 59 {
            return None;
        }

        let span = TimeDelta::try_days(days)?
            .checked_add(&TimeDelta::try_hours(hours)?)?
            .checked_add(&TimeDelta::try_minutes(minutes)?)?
            .checked_add(&TimeDelta::try_seconds(whole_seconds)?)?
            .checked_add(&TimeDelta::nanoseconds(nanos))?;
        Some(if negative { -span } else { span })
    }

    fn fraction_to_nanos(fraction: &str) -> Option<i64> {
        if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let padded = format!("{fraction:0<9}");
        padded.parse().ok()
    }

    /// Formats a span as `[-][d.]hh:mm:ss`.
    #[must_use]
    pub fn format(span: TimeDelta) -> String {
        let sign = if span < TimeDelta::zero() { "-" } else { "" };
        let span = span.abs();
        let days = span.num_days();
        let hours = span.num_hours() % 24;
        let minutes = span.num_minutes() % 60;
        let seconds = span.num_seconds() % 60;
        if days > 0 {
            format!("{sign}{days}.{hours:02}:{minutes:02}:{seconds:02}")
        } else {
            format!("{sign}{hours:02}:{minutes:02}:{seconds:02}")
        }
    }

    pub fn serialize<S>(span: &Option<TimeDelta>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match span {
            Some(span) => serializer.serialize_str(&format(*span)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<TimeDelta>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(text) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        parse(&text)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time span '{text}'")))
    }
}
