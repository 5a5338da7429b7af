use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// A configuration gap found while checking card templates.
///
/// Gaps never stop a session; they are reported so operators can fix the
/// content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigIssue {
    /// Stable issue code (e.g., "CARD002").
    pub code: String,
    pub message: String,
    pub severity: IssueSeverity,
    /// Card the issue belongs to, if any.
    pub card: Option<String>,
    /// Field, formula or lookup name the issue refers to.
    pub subject: Option<String>,
}

impl ConfigIssue {
    pub fn new(code: &str, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity,
            card: None,
            subject: None,
        }
    }

    pub fn for_card(mut self, card: impl Into<String>) -> Self {
        self.card = Some(card.into());
        self
    }

    pub fn about(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckReport {
    pub issues: Vec<ConfigIssue>,
}

impl CheckReport {
    pub fn push(&mut self, issue: ConfigIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}
