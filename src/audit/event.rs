//! Audit event schema and line encoding.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which decision point produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditCategory {
    Validation,
    Command,
    Privilege,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Command => "COMMAND",
            Self::Privilege => "PRIVILEGE",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }
}

impl From<bool> for AuditOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            Self::Success
        } else {
            Self::Failure
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single security-relevant decision.
///
/// Events are built once and never mutated after being handed to a sink.
/// `details` is ordered so that encoded lines are stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    pub subject: String,
    pub outcome: AuditOutcome,
    pub details: BTreeMap<String, String>,
}

impl AuditEvent {
    pub fn new(category: AuditCategory, subject: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            subject: subject.into(),
            outcome,
            details: BTreeMap::new(),
        }
    }

    pub fn validation(field: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self::new(AuditCategory::Validation, field, outcome)
    }

    pub fn command(command: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self::new(AuditCategory::Command, command, outcome)
    }

    pub fn privilege(action: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self::new(AuditCategory::Privilege, action, outcome)
    }

    /// Add a detail entry. Later values for the same key replace earlier ones.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    /// Encode as one line: `timestamp | category | subject | outcome | k=v ...`.
    ///
    /// Values that could break the line structure are quoted and escaped, so
    /// an encoded event never spans more than one line.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} | {} | {} | {} |",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            self.category,
            encode_value(&self.subject),
            self.outcome,
        );
        for (key, value) in &self.details {
            line.push(' ');
            line.push_str(&encode_key(key));
            line.push('=');
            line.push_str(&encode_value(value));
        }
        line
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.chars().any(|c| {
            c.is_whitespace() || c.is_control() || matches!(c, '|' | '=' | '"' | '\\')
        })
}

fn encode_value(s: &str) -> String {
    if needs_quoting(s) {
        format!("\"{}\"", s.escape_default())
    } else {
        s.to_string()
    }
}

fn encode_key(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}
