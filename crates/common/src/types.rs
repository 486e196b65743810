//! Core types for the Foundry convergence checks

use serde::{Deserialize, Serialize};

/// A record submitted through the data-ingestion form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub event_type: String,
    pub severity: String,
    pub description: String,
    /// Structured extra fields, as the text typed into the form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_fields: Option<String>,
}

impl Record {
    pub fn new(
        event_type: impl Into<String>,
        severity: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            severity: severity.into(),
            description: description.into(),
            additional_fields: None,
        }
    }

    pub fn with_additional_fields(mut self, fields: impl Into<String>) -> Self {
        self.additional_fields = Some(fields.into());
        self
    }

    /// The record submitted by the ingestion scenario
    pub fn e2e_sample() -> Self {
        Self::new(
            "e2e_test_event",
            "high",
            "E2E test event - automated test submission",
        )
    }

    /// Severity as the results list renders it in the badge ("high" -> "High")
    pub fn severity_label(&self) -> String {
        let lower = self.severity.to_lowercase();
        let mut chars = lower.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// Status text shown in a workflow execution-log row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Other(String),
}

impl ExecutionStatus {
    /// Parse a status cell. Only the exact labels the console renders are recognized.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "" => None,
            "Completed" => Some(Self::Completed),
            "In progress" => Some(Self::InProgress),
            "Failed" => Some(Self::Failed),
            "Pending" | "Queued" => Some(Self::Pending),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "Pending"),
            ExecutionStatus::InProgress => write!(f, "In progress"),
            ExecutionStatus::Completed => write!(f, "Completed"),
            ExecutionStatus::Failed => write!(f, "Failed"),
            ExecutionStatus::Other(text) => write!(f, "{}", text),
        }
    }
}

/// Outcome of one verification call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Pending,
    InProgress,
    Completed,
    Failed,
    TimedOut,
}

impl TerminalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

impl Default for TerminalState {
    fn default() -> Self {
        Self::Pending
    }
}

impl From<&ExecutionStatus> for TerminalState {
    fn from(status: &ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Completed => TerminalState::Completed,
            ExecutionStatus::Failed => TerminalState::Failed,
            ExecutionStatus::InProgress => TerminalState::InProgress,
            ExecutionStatus::Pending | ExecutionStatus::Other(_) => TerminalState::Pending,
        }
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalState::Pending => write!(f, "pending"),
            TerminalState::InProgress => write!(f, "in_progress"),
            TerminalState::Completed => write!(f, "completed"),
            TerminalState::Failed => write!(f, "failed"),
            TerminalState::TimedOut => write!(f, "timed_out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Completed", Some(ExecutionStatus::Completed) ; "completed")]
    #[test_case("  In progress ", Some(ExecutionStatus::InProgress) ; "in progress with padding")]
    #[test_case("Failed", Some(ExecutionStatus::Failed) ; "failed")]
    #[test_case("completed", None ; "lowercase is not the console label")]
    #[test_case("Completed with warnings", None ; "longer text is not completed")]
    #[test_case("", None ; "empty cell")]
    fn test_parse_status(text: &str, expected: Option<ExecutionStatus>) {
        assert_eq!(ExecutionStatus::parse(text), expected);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TerminalState::Completed.is_terminal());
        assert!(TerminalState::TimedOut.is_terminal());
        assert!(TerminalState::Failed.is_terminal());
        assert!(!TerminalState::InProgress.is_terminal());
        assert!(!TerminalState::Pending.is_terminal());
    }

    #[test]
    fn test_severity_label() {
        assert_eq!(Record::e2e_sample().severity_label(), "High");
        assert_eq!(Record::new("x", "CRITICAL", "y").severity_label(), "Critical");
        assert_eq!(Record::new("x", "", "y").severity_label(), "");
    }

    #[test]
    fn test_record_serialization_skips_missing_fields() {
        let json = serde_json::to_value(Record::e2e_sample()).unwrap();
        assert!(json.get("additional_fields").is_none());
        assert_eq!(json["event_type"], "e2e_test_event");
    }
}
