//! OpenAI Chat Completions transport.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::LlmBackend;
use super::transport::{AiTransport, TransportError, TransportRequest, send_cancellable};
use crate::conversation::{ContentBlock, Message};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiTransport {
    client: Client,
    base_url: String,
}

impl OpenAiTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for OpenAiTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    tools: [Tool<'a>; 1],
    tool_choice: ToolChoice<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct Tool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionName<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionName<'a> {
    name: &'a str,
}

fn chat_message(msg: &Message) -> ChatMessage<'_> {
    let content = msg
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::Text { text } => Part::Text { text },
            ContentBlock::Image { media_type, data } => Part::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{media_type};base64,{data}"),
                },
            },
        })
        .collect();
    ChatMessage {
        role: msg.role.as_str(),
        content,
    }
}

fn build_body<'a>(request: &TransportRequest<'a>) -> ChatRequest<'a> {
    let system = ChatMessage {
        role: "system",
        content: vec![Part::Text {
            text: request.system_prompt,
        }],
    };
    let messages = std::iter::once(system)
        .chain(request.messages.iter().map(chat_message))
        .collect();

    ChatRequest {
        model: request.model,
        max_tokens: request.max_tokens,
        temperature: 0.0,
        messages,
        tools: [Tool {
            kind: "function",
            function: FunctionDef {
                name: &request.tool.name,
                description: &request.tool.description,
                parameters: &request.tool.input_schema,
            },
        }],
        tool_choice: ToolChoice {
            kind: "function",
            function: FunctionName {
                name: &request.tool.name,
            },
        },
    }
}

#[async_trait]
impl AiTransport for OpenAiTransport {
    fn backend(&self) -> LlmBackend {
        LlmBackend::OpenAi
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
            "Sending OpenAI request"
        );

        let builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(request.api_key.expose_secret())
            .json(&body);

        send_cancellable(builder, token).await
    }
}
