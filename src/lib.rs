//! Conversation orchestration for a desktop AI assistant that proposes and runs code.

pub mod attachments;
pub mod cancel;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod llm;
pub mod orchestrator;
pub mod session;
pub mod status;

pub use config::AssistConfig;
pub use error::{Error, ErrorCategory, Result};
pub use session::{AssistantSession, SessionDeps, SessionSnapshot};
