//! Conversation message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::{ExecutionResult, ExecutionStatus};
use crate::llm::AIResponse;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Atomic unit of turn content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Base64-encoded image data.
    Image {
        media_type: String,
        data: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Image { .. } => None,
        }
    }
}

/// A provider-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

/// Rendering status of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    None,
    Loading,
    Complete,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    #[serde(flatten)]
    pub message: Message,
    pub status: MessageStatus,
    pub ai_response: Option<AIResponse>,
    pub execution_status: ExecutionStatus,
    pub execution_result: Option<ExecutionResult>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, content: Vec<ContentBlock>, status: MessageStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: Message { role, content },
            status,
            ai_response: None,
            execution_status: ExecutionStatus::None,
            execution_result: None,
            created_at: Utc::now(),
        }
    }

    /// A user turn.
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self::new(Role::User, content, MessageStatus::Complete)
    }

    /// The placeholder shown while a request is in flight.
    pub fn loading() -> Self {
        Self::new(Role::Assistant, Vec::new(), MessageStatus::Loading)
    }

    /// An assistant turn built from a normalized response.
    pub fn assistant(response: AIResponse, execution_status: ExecutionStatus) -> Self {
        let mut msg = Self::new(
            Role::Assistant,
            vec![ContentBlock::text(response.response.clone())],
            MessageStatus::Complete,
        );
        msg.ai_response = Some(response);
        msg.execution_status = execution_status;
        msg
    }

    pub fn role(&self) -> Role {
        self.message.role
    }

    pub fn is_loading(&self) -> bool {
        self.status == MessageStatus::Loading
    }

    /// Concatenated text blocks, images skipped.
    pub fn text(&self) -> String {
        self.message
            .content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fields merged into an existing entry by `ConversationStore::update_at`.
#[derive(Debug, Clone, Default)]
pub struct ChatMessagePatch {
    pub status: Option<MessageStatus>,
    pub ai_response: Option<AIResponse>,
    pub execution_status: Option<ExecutionStatus>,
    pub execution_result: Option<ExecutionResult>,
}

impl ChatMessagePatch {
    pub fn execution_status(status: ExecutionStatus) -> Self {
        Self {
            execution_status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_result(mut self, result: ExecutionResult) -> Self {
        self.execution_result = Some(result);
        self
    }
}
