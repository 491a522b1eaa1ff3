//! In-memory ordered conversation log with change notifications.

use tokio::sync::broadcast;
use tracing::debug;

use super::message::{ChatMessage, ChatMessagePatch};
use crate::error::{Error, ExecutionError, UsageError};

/// Broadcast capacity for change notifications.
const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// What changed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Appended,
    ReplacedLast,
    RemovedLast(usize),
    Updated(usize),
    Cleared,
}

/// "Content changed" notification. Observers use it to scroll to the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub mutation: Mutation,
    /// Entry count after the mutation.
    pub len: usize,
}

/// Ordered, mutable log of conversation turns. Not persisted.
pub struct ConversationStore {
    entries: Vec<ChatMessage>,
    tx: broadcast::Sender<StoreEvent>,
}

impl ConversationStore {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            entries: Vec::new(),
            tx,
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChatMessage> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.entries.push(message);
        self.notify(Mutation::Appended);
    }

    /// Swap the most recent entry. Returns the replaced entry, or `None` (and leaves the store
    /// untouched) when the store is empty.
    pub fn replace_last(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        let slot = self.entries.last_mut()?;
        let previous = std::mem::replace(slot, message);
        self.notify(Mutation::ReplacedLast);
        Some(previous)
    }

    /// Drop up to `n` entries from the end, returning them in original order.
    pub fn remove_last(&mut self, n: usize) -> Vec<ChatMessage> {
        let keep = self.entries.len().saturating_sub(n);
        let removed = self.entries.split_off(keep);
        if !removed.is_empty() {
            self.notify(Mutation::RemovedLast(removed.len()));
        }
        removed
    }

    /// Merge `patch` into the entry at `index`. Execution status may only move forward.
    pub fn update_at(&mut self, index: usize, patch: ChatMessagePatch) -> Result<(), Error> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(UsageError::NoSuchMessage(index))?;

        if let Some(next) = patch.execution_status
            && next != entry.execution_status
            && !entry.execution_status.can_transition_to(next)
        {
            return Err(ExecutionError::InvalidTransition {
                from: entry.execution_status.to_string(),
                to: next.to_string(),
            }
            .into());
        }

        if let Some(status) = patch.status {
            entry.status = status;
        }
        if let Some(response) = patch.ai_response {
            entry.ai_response = Some(response);
        }
        if let Some(status) = patch.execution_status {
            entry.execution_status = status;
        }
        if let Some(result) = patch.execution_result {
            entry.execution_result = Some(result);
        }

        self.notify(Mutation::Updated(index));
        Ok(())
    }

    /// The last `n` entries in original order.
    pub fn window(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..].to_vec()
    }

    /// Reset for a new conversation.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.notify(Mutation::Cleared);
    }

    fn notify(&self, mutation: Mutation) {
        debug!(?mutation, len = self.entries.len(), "Conversation changed");
        // No subscribers is fine
        let _ = self.tx.send(StoreEvent {
            mutation,
            len: self.entries.len(),
        });
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::message::ContentBlock;
    use crate::execution::ExecutionStatus;

    fn user(text: &str) -> ChatMessage {
        ChatMessage::user(vec![ContentBlock::text(text)])
    }

    #[test]
    fn append_and_window_keep_order() {
        let mut store = ConversationStore::new();
        for i in 0..5 {
            store.append(user(&format!("m{i}")));
        }

        let window = store.window(3);
        let texts: Vec<_> = window.iter().map(ChatMessage::text).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);

        assert_eq!(store.window(50).len(), 5);
    }

    #[test]
    fn replace_last_swaps_placeholder() {
        let mut store = ConversationStore::new();
        store.append(user("hi"));
        store.append(ChatMessage::loading());

        let old = store
            .replace_last(ChatMessage::user(vec![ContentBlock::text("done")]))
            .unwrap();
        assert!(old.is_loading());
        assert_eq!(store.len(), 2);
        assert!(!store.last().unwrap().is_loading());
    }

    #[test]
    fn replace_last_on_empty_is_none() {
        let mut store = ConversationStore::new();
        assert!(store.replace_last(user("x")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn remove_last_rolls_back() {
        let mut store = ConversationStore::new();
        store.append(user("keep"));
        store.append(user("drop"));
        store.append(ChatMessage::loading());

        let removed = store.remove_last(2);
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().text(), "keep");

        assert_eq!(store.remove_last(10).len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn update_at_touches_only_target() {
        let mut store = ConversationStore::new();
        store.append(user("a"));
        store.append(user("b"));
        let before = store.get(0).cloned().unwrap();

        store
            .update_at(1, ChatMessagePatch::execution_status(ExecutionStatus::Pending))
            .unwrap();

        assert_eq!(store.get(0).unwrap(), &before);
        assert_eq!(store.get(1).unwrap().execution_status, ExecutionStatus::Pending);
    }

    #[test]
    fn update_at_rejects_backward_transition() {
        let mut store = ConversationStore::new();
        store.append(user("a"));
        store
            .update_at(0, ChatMessagePatch::execution_status(ExecutionStatus::Pending))
            .unwrap();
        store
            .update_at(0, ChatMessagePatch::execution_status(ExecutionStatus::Rejected))
            .unwrap();

        let err = store
            .update_at(0, ChatMessagePatch::execution_status(ExecutionStatus::Executing))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Execution(ExecutionError::InvalidTransition { .. })
        ));
        assert_eq!(store.get(0).unwrap().execution_status, ExecutionStatus::Rejected);
    }

    #[test]
    fn update_at_out_of_range() {
        let mut store = ConversationStore::new();
        let err = store.update_at(3, ChatMessagePatch::default()).unwrap_err();
        assert!(matches!(err, Error::Usage(UsageError::NoSuchMessage(3))));
    }

    #[tokio::test]
    async fn every_mutation_notifies() {
        let mut store = ConversationStore::new();
        let mut rx = store.subscribe();

        store.append(user("a"));
        store.append(ChatMessage::loading());
        store.replace_last(user("b"));
        store.update_at(0, ChatMessagePatch::default()).unwrap();
        store.remove_last(1);
        store.clear();

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event.mutation);
        }
        assert_eq!(
            seen,
            vec![
                Mutation::Appended,
                Mutation::Appended,
                Mutation::ReplacedLast,
                Mutation::Updated(0),
                Mutation::RemovedLast(1),
                Mutation::Cleared,
            ]
        );
    }
}
