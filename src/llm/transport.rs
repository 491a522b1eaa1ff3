//! AI transport capability.

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use super::LlmBackend;
use super::schema::ToolSchema;
use crate::conversation::Message;

/// Everything a transport needs for one completion call.
pub struct TransportRequest<'a> {
    pub model: &'a str,
    pub api_key: &'a SecretString,
    pub tool: &'a ToolSchema,
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub max_tokens: u32,
}

/// Transport-level failure, before any classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    Network(String),
}

/// Sends one request and returns the provider's raw payload.
///
/// Implementations must resolve with `TransportError::Cancelled` promptly once `token` fires.
#[async_trait]
pub trait AiTransport: Send + Sync {
    /// Which payload dialect this transport returns.
    fn backend(&self) -> LlmBackend;

    async fn complete(
        &self,
        request: TransportRequest<'_>,
        token: CancellationToken,
    ) -> Result<String, TransportError>;
}

/// Send a prepared request, racing it against `token`.
pub(crate) async fn send_cancellable(
    builder: reqwest::RequestBuilder,
    token: CancellationToken,
) -> Result<String, TransportError> {
    let call = async {
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(TransportError::Cancelled),
        result = call => result,
    }
}
