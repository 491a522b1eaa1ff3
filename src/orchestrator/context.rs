//! Provider context assembly.

use crate::conversation::{ConversationStore, Message, Role};

/// Messages sent to the provider: the store's last `window` entries, loading placeholders removed.
///
/// Providers expect the exchange to open with a user turn, so any assistant entries cut loose at
/// the start of the window are dropped too.
pub fn provider_context(store: &ConversationStore, window: usize) -> Vec<Message> {
    store
        .window(window)
        .into_iter()
        .filter(|m| !m.is_loading())
        .skip_while(|m| m.role() != Role::User)
        .map(|m| m.message)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ChatMessage, ContentBlock};
    use crate::execution::ExecutionStatus;
    use crate::llm::AIResponse;

    fn reply(text: &str) -> ChatMessage {
        let response: AIResponse = serde_json::from_value(serde_json::json!({
            "user_confirmation_required": false,
            "response": text
        }))
        .unwrap();
        ChatMessage::assistant(response, ExecutionStatus::None)
    }

    fn user(text: &str) -> ChatMessage {
        ChatMessage::user(vec![ContentBlock::text(text)])
    }

    fn store_of(entries: Vec<ChatMessage>) -> ConversationStore {
        let mut store = ConversationStore::new();
        for entry in entries {
            store.append(entry);
        }
        store
    }

    #[test]
    fn skips_placeholder_and_leading_assistant() {
        let store = store_of(vec![
            user("one"),
            reply("r1"),
            user("two"),
            reply("r2"),
            user("three"),
            ChatMessage::loading(),
        ]);

        // Window of 5 starts at "r1", which is dropped
        let context = provider_context(&store, 5);
        let roles: Vec<Role> = context.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(context[0].content[0].as_text(), Some("two"));
        assert_eq!(context[2].content[0].as_text(), Some("three"));
    }

    #[test]
    fn window_larger_than_log() {
        let store = store_of(vec![user("only")]);
        assert_eq!(provider_context(&store, 20).len(), 1);
        assert!(provider_context(&ConversationStore::new(), 20).is_empty());
    }
}
