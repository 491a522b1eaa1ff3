//! Conversation log and its message types.

pub mod message;
pub mod store;

pub use message::{ChatMessage, ChatMessagePatch, ContentBlock, Message, MessageStatus, Role};
pub use store::{ConversationStore, Mutation, StoreEvent};
