//! Execution status machine and step records.
//!
//! ```text
//! None       (terminal; nothing proposed)
//! Pending   --confirm(true)-->  Executing
//! Pending   --confirm(false)--> Rejected   (terminal)
//! Executing --settle-->         Complete   (terminal)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;
use crate::llm::AIResponse;

use super::shell::requires_explicit_approval;

/// Per-message execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// No execution proposed.
    #[default]
    None,
    /// Waiting for the user to approve or reject.
    Pending,
    /// Steps are running.
    Executing,
    /// Every step has settled.
    Complete,
    /// The user declined.
    Rejected,
}

impl ExecutionStatus {
    /// Entry state for a freshly received response.
    ///
    /// Code matching the destructive-command list always waits for confirmation, whatever the
    /// response asked for.
    pub fn initial(response: &AIResponse) -> Self {
        if !response.proposes_execution() {
            return Self::None;
        }
        let destructive = response
            .steps()
            .iter()
            .any(|s| requires_explicit_approval(&s.code));
        if response.user_confirmation_required || destructive {
            Self::Pending
        } else {
            Self::Executing
        }
    }

    pub fn can_transition_to(&self, target: ExecutionStatus) -> bool {
        use ExecutionStatus::*;

        matches!(
            (self, target),
            (Pending, Executing) | (Pending, Rejected) | (Executing, Complete)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::None | Self::Complete | Self::Rejected)
    }

    /// Apply the user's decision.
    pub fn confirm(self, approved: bool) -> Result<Self, ExecutionError> {
        let target = if approved {
            Self::Executing
        } else {
            Self::Rejected
        };
        self.transition(target)
    }

    /// All steps have settled.
    pub fn settle(self) -> Result<Self, ExecutionError> {
        self.transition(Self::Complete)
    }

    fn transition(self, target: Self) -> Result<Self, ExecutionError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(ExecutionError::InvalidTransition {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Complete => "complete",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Success,
    Failure,
}

/// One unit of proposed code plus its eventual result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step: String,
    pub code: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub status: StepStatus,
}

impl ExecutionStep {
    pub fn new(step: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            code: code.into(),
            result: String::new(),
            status: StepStatus::Pending,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != StepStatus::Pending
    }
}

/// Settled record of an execution sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ExecutionResult {
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionResult {
    pub fn new(steps: Vec<ExecutionStep>) -> Self {
        Self { steps }
    }

    pub fn succeeded(&self) -> usize {
        self.count(StepStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(StepStatus::Failure)
    }

    pub fn all_settled(&self) -> bool {
        self.steps.iter().all(ExecutionStep::is_settled)
    }

    pub fn statuses(&self) -> Vec<StepStatus> {
        self.steps.iter().map(|s| s.status).collect()
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}
