//! LLM integration for deskpilot.
//!
//! Supports:
//! - **Anthropic**: Messages API with a forced tool call
//! - **OpenAI**: Chat Completions with a forced function call
//!
//! Both transports speak plain HTTP through reqwest and honour a cancellation token, so an
//! in-flight request can be abandoned the moment the user aborts.

pub mod anthropic;
pub mod openai;
pub mod prompt;
pub mod response;
pub mod schema;
pub mod transport;

pub use anthropic::AnthropicTransport;
pub use openai::OpenAiTransport;
pub use response::{AIResponse, Execution, normalize_payload};
pub use schema::ToolSchema;
pub use transport::{AiTransport, TransportError, TransportRequest};

use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Provider name used for credential lookup and logging.
    pub fn name(&self) -> &'static str {
        match self {
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::OpenAi => "openai",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmBackend::Anthropic => "claude-sonnet-4-20250514",
            LlmBackend::OpenAi => "gpt-4o",
        }
    }
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "openai" | "gpt" => Ok(LlmBackend::OpenAi),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Create the HTTP transport for a backend.
pub fn create_transport(backend: LlmBackend) -> Arc<dyn AiTransport> {
    match backend {
        LlmBackend::Anthropic => {
            tracing::info!("Using Anthropic transport");
            Arc::new(AnthropicTransport::new())
        }
        LlmBackend::OpenAi => {
            tracing::info!("Using OpenAI transport");
            Arc::new(OpenAiTransport::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_backend_names() {
        assert_eq!("anthropic".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert_eq!("Claude".parse::<LlmBackend>().unwrap(), LlmBackend::Anthropic);
        assert_eq!(" openai ".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        assert!(matches!(
            "mistral".parse::<LlmBackend>(),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn create_transport_matches_backend() {
        assert_eq!(create_transport(LlmBackend::Anthropic).backend(), LlmBackend::Anthropic);
        assert_eq!(create_transport(LlmBackend::OpenAi).backend(), LlmBackend::OpenAi);
    }
}
