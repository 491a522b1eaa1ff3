//! UI-facing status, derived on demand.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::conversation::ChatMessage;
use crate::error::{Error, ErrorCategory};
use crate::execution::ExecutionStatus;

/// A user-visible error. The text is fixed per category; raw details only go to the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub category: ErrorCategory,
    pub message: &'static str,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory) -> Self {
        Self {
            category,
            message: category.user_message(),
            at: Utc::now(),
        }
    }
}

impl From<&Error> for ErrorRecord {
    fn from(error: &Error) -> Self {
        Self::new(error.category())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub is_loading: bool,
    /// Indices of messages waiting for the user to approve or reject execution.
    pub pending_confirmations: Vec<usize>,
    pub last_error: Option<ErrorRecord>,
}

/// Derive status from the conversation, the in-flight flag and the error log.
pub fn project(messages: &[ChatMessage], in_flight: bool, errors: &[ErrorRecord]) -> StatusSnapshot {
    StatusSnapshot {
        is_loading: in_flight || messages.iter().any(ChatMessage::is_loading),
        pending_confirmations: messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.execution_status == ExecutionStatus::Pending)
            .map(|(i, _)| i)
            .collect(),
        last_error: errors.last().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ContentBlock;
    use crate::llm::AIResponse;

    fn pending_reply() -> ChatMessage {
        let response: AIResponse = serde_json::from_value(serde_json::json!({
            "user_confirmation_required": true,
            "should_execute_code": true,
            "execution": "ls",
            "response": "run?"
        }))
        .unwrap();
        let status = ExecutionStatus::initial(&response);
        ChatMessage::assistant(response, status)
    }

    #[test]
    fn idle_conversation() {
        let messages = vec![ChatMessage::user(vec![ContentBlock::text("hi")])];
        let status = project(&messages, false, &[]);
        assert!(!status.is_loading);
        assert!(status.pending_confirmations.is_empty());
        assert!(status.last_error.is_none());
    }

    #[test]
    fn loading_and_pending() {
        let messages = vec![
            ChatMessage::user(vec![ContentBlock::text("do it")]),
            pending_reply(),
            ChatMessage::user(vec![ContentBlock::text("and more")]),
            ChatMessage::loading(),
        ];
        let status = project(&messages, false, &[]);
        assert!(status.is_loading);
        assert_eq!(status.pending_confirmations, vec![1]);

        assert!(project(&[], true, &[]).is_loading);
    }

    #[test]
    fn last_error_wins() {
        let errors = vec![
            ErrorRecord::new(ErrorCategory::RateLimited),
            ErrorRecord::new(ErrorCategory::CredentialMissing),
        ];
        let status = project(&[], false, &errors);
        let last = status.last_error.unwrap();
        assert_eq!(last.category, ErrorCategory::CredentialMissing);
        assert_eq!(last.message, ErrorCategory::CredentialMissing.user_message());
    }
}
