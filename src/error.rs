//! Error types for deskpilot.

use std::path::PathBuf;

/// Top-level error type for the assistant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),
}

impl Error {
    /// Category used for user-visible messaging.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Request(e) => e.category(),
            Error::Attachment(e) => e.category(),
            Error::Execution(e) => e.category(),
            Error::Usage(_) => ErrorCategory::Usage,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

/// Failures of a single AI request. Any of these aborts the whole turn.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("No API key configured for provider {provider}")]
    CredentialMissing { provider: String },

    #[error("Request aborted")]
    Aborted,

    #[error("Malformed response from {provider}: {reason}")]
    MalformedResponse { provider: String, reason: String },

    #[error("Provider {provider} rate limited the request")]
    RateLimited { provider: String },

    #[error("Provider {provider} rejected the request: {body}")]
    BadRequest { provider: String, body: String },

    #[error("Provider {provider} server error (HTTP {status})")]
    ServerError { provider: String, status: u16 },

    #[error("Transport failure talking to {provider}: {reason}")]
    TransportUnknown { provider: String, reason: String },
}

impl RequestError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RequestError::CredentialMissing { .. } => ErrorCategory::CredentialMissing,
            RequestError::Aborted => ErrorCategory::Aborted,
            RequestError::MalformedResponse { .. } => ErrorCategory::MalformedResponse,
            RequestError::RateLimited { .. } => ErrorCategory::RateLimited,
            RequestError::BadRequest { .. } => ErrorCategory::BadRequest,
            RequestError::ServerError { .. } => ErrorCategory::ServerError,
            RequestError::TransportUnknown { .. } => ErrorCategory::TransportUnknown,
        }
    }
}

/// Attachment ingestion errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    #[error("Too many attachments: {current} held + {incoming} new exceeds the limit of {max}")]
    LimitExceeded {
        max: usize,
        current: usize,
        incoming: usize,
    },

    #[error("Cannot attach {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
}

impl AttachmentError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AttachmentError::LimitExceeded { .. } => ErrorCategory::AttachmentLimitExceeded,
            AttachmentError::Unsupported { .. } => ErrorCategory::AttachmentUnsupported,
        }
    }
}

/// Execution gate errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("Step {index} ({label}) failed: {output}")]
    StepFailed {
        index: usize,
        label: String,
        output: String,
    },

    #[error("Execution status {from} cannot transition to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Another execution sequence is already running")]
    Busy,
}

impl ExecutionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ExecutionError::StepFailed { .. } => ErrorCategory::ExecutionStepFailed,
            ExecutionError::InvalidTransition { .. } | ExecutionError::Busy => {
                ErrorCategory::Usage
            }
        }
    }
}

/// Misuse of the session API by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("A request is already in flight; wait for it or abort it first")]
    RequestInFlight,

    #[error("Message is empty")]
    EmptyInput,

    #[error("No message at index {0}")]
    NoSuchMessage(usize),

    #[error("No attachment at index {0}")]
    NoSuchAttachment(usize),

    #[error("Message {0} has no execution awaiting confirmation")]
    NothingToConfirm(usize),
}

/// Stable error categories. UI messaging is keyed by these, never by raw error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    CredentialMissing,
    Aborted,
    MalformedResponse,
    RateLimited,
    BadRequest,
    ServerError,
    TransportUnknown,
    AttachmentLimitExceeded,
    AttachmentUnsupported,
    ExecutionStepFailed,
    Configuration,
    Usage,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::CredentialMissing => "CREDENTIAL_MISSING",
            ErrorCategory::Aborted => "ABORTED",
            ErrorCategory::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorCategory::RateLimited => "RATE_LIMITED",
            ErrorCategory::BadRequest => "BAD_REQUEST",
            ErrorCategory::ServerError => "SERVER_ERROR",
            ErrorCategory::TransportUnknown => "TRANSPORT_UNKNOWN",
            ErrorCategory::AttachmentLimitExceeded => "ATTACHMENT_LIMIT_EXCEEDED",
            ErrorCategory::AttachmentUnsupported => "ATTACHMENT_UNSUPPORTED",
            ErrorCategory::ExecutionStepFailed => "EXECUTION_STEP_FAILED",
            ErrorCategory::Configuration => "CONFIGURATION",
            ErrorCategory::Usage => "USAGE",
        }
    }

    /// Fixed user-facing text for this category.
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorCategory::CredentialMissing => {
                "No valid API key is configured. Open settings and set the API key."
            }
            ErrorCategory::Aborted => "The request was cancelled.",
            ErrorCategory::MalformedResponse => "The assistant returned a response I could not read.",
            ErrorCategory::RateLimited => "The AI service is rate limiting requests. Try again shortly.",
            ErrorCategory::BadRequest => "The AI service rejected the request.",
            ErrorCategory::ServerError => "The AI service is having problems. Try again later.",
            ErrorCategory::TransportUnknown => "Could not reach the AI service.",
            ErrorCategory::AttachmentLimitExceeded => "Too many files attached.",
            ErrorCategory::AttachmentUnsupported => "Some files could not be attached.",
            ErrorCategory::ExecutionStepFailed => "A step of the proposed action failed.",
            ErrorCategory::Configuration => "The assistant is misconfigured.",
            ErrorCategory::Usage => "That action is not available right now.",
        }
    }

    /// Whether this category aborts the whole turn.
    pub fn is_request_level(&self) -> bool {
        matches!(
            self,
            ErrorCategory::CredentialMissing
                | ErrorCategory::Aborted
                | ErrorCategory::MalformedResponse
                | ErrorCategory::RateLimited
                | ErrorCategory::BadRequest
                | ErrorCategory::ServerError
                | ErrorCategory::TransportUnknown
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias for the assistant.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_their_category() {
        let err = RequestError::RateLimited {
            provider: "anthropic".into(),
        };
        assert_eq!(err.category(), ErrorCategory::RateLimited);
        assert!(err.category().is_request_level());

        let top: Error = RequestError::Aborted.into();
        assert_eq!(top.category(), ErrorCategory::Aborted);
    }

    #[test]
    fn per_item_failures_are_not_request_level() {
        assert!(!ErrorCategory::AttachmentUnsupported.is_request_level());
        assert!(!ErrorCategory::ExecutionStepFailed.is_request_level());
        assert!(!ErrorCategory::Usage.is_request_level());
    }

    #[test]
    fn user_message_never_contains_transport_text() {
        let err = RequestError::TransportUnknown {
            provider: "openai".into(),
            reason: "dns error: no such host api.example".into(),
        };
        let msg = err.category().user_message();
        assert!(!msg.contains("dns"));
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::CredentialMissing).unwrap();
        assert_eq!(json, "\"credential_missing\"");
        assert_eq!(ErrorCategory::CredentialMissing.to_string(), "CREDENTIAL_MISSING");
    }
}
