//! Error types for E2E convergence checks

use std::time::Duration;
use thiserror::Error;

use foundry_common::ExecutionStatus;

use crate::poller::PollHistory;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Navigation to {path} did not settle within {timeout:?}")]
    NavigationTimeout { path: String, timeout: Duration },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("Form validation error: {0}")]
    FormValidation(String),

    #[error("Workflow execution not confirmed for '{workflow}': {reason}")]
    TriggerNotConfirmed { workflow: String, reason: String },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("{label} did not converge after {} observations\n{history}", .history.len())]
    PollExhausted { label: String, history: PollHistory },

    #[error(
        "Execution of '{workflow}' did not complete; last observed status: {}\n{history}",
        describe_status(.last_status)
    )]
    ExecutionTimedOut {
        workflow: String,
        last_status: Option<ExecutionStatus>,
        history: PollHistory,
    },

    #[error("A poll is already active on this session")]
    PollInProgress,

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Playwright not found. Install with: npm install playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Driver protocol error: {0}")]
    Driver(String),

    #[error("Remote application unreachable after {0} attempts")]
    Unreachable(usize),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Configuration error: {0}")]
    Config(#[from] foundry_common::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Failures a poll attempt may absorb: the UI was merely not there yet
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            E2eError::Timeout(_) | E2eError::AssertionFailed(_) | E2eError::NavigationTimeout { .. }
        )
    }

    /// Attempt history carried by convergence failures
    pub fn history(&self) -> Option<&PollHistory> {
        match self {
            E2eError::PollExhausted { history, .. } | E2eError::ExecutionTimedOut { history, .. } => {
                Some(history)
            }
            _ => None,
        }
    }
}

fn describe_status(status: &Option<ExecutionStatus>) -> String {
    match status {
        None => "none (execution never appeared in the log)".to_string(),
        Some(ExecutionStatus::InProgress) => "In progress (stuck)".to_string(),
        Some(other) => other.to_string(),
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
