//! Anthropic Messages API transport.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::LlmBackend;
use super::transport::{AiTransport, TransportError, TransportRequest, send_cancellable};
use crate::conversation::{ContentBlock, Message};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicTransport {
    client: Client,
    base_url: String,
}

impl AnthropicTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different endpoint (proxies, local mocks).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for AnthropicTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<WireMessage<'a>>,
    tools: [WireTool<'a>; 1],
    tool_choice: ToolChoice<'a>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: Vec<WireBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireBlock<'a> {
    Text { text: &'a str },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
}

fn wire_message(msg: &Message) -> WireMessage<'_> {
    let content = msg
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => WireBlock::Text { text },
            ContentBlock::Image { media_type, data } => WireBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type,
                    data,
                },
            },
        })
        .collect();
    WireMessage {
        role: msg.role.as_str(),
        content,
    }
}

fn build_body<'a>(request: &TransportRequest<'a>) -> MessagesRequest<'a> {
    MessagesRequest {
        model: request.model,
        max_tokens: request.max_tokens,
        temperature: 0.0,
        system: request.system_prompt,
        messages: request.messages.iter().map(wire_message).collect(),
        tools: [WireTool {
            name: &request.tool.name,
            description: &request.tool.description,
            input_schema: &request.tool.input_schema,
        }],
        tool_choice: ToolChoice {
            kind: "tool",
            name: &request.tool.name,
        },
    }
}

#[async_trait]
impl AiTransport for AnthropicTransport {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Anthropic
    }

    async fn complete(
        &self,
        request: TransportRequest<'_>,
        token: CancellationToken,
    ) -> Result<String, TransportError> {
        let body = build_body(&request);
        tracing::debug!(
            model = request.model,
            messages = body.messages.len(),
            "Sending Anthropic request"
        );

        let builder = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", request.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        send_cancellable(builder, token).await
    }
}
