//! Cancellation tokens for in-flight requests, addressable by id.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A registered token and the id to cancel it by.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    pub id: Uuid,
    pub token: CancellationToken,
}

/// Creates, cancels and releases cancellation tokens.
pub trait CancellationRegistry: Send + Sync {
    fn create(&self) -> CancelHandle;

    /// Cancel the token with `id`. Returns false if it is unknown or already released.
    fn cancel(&self, id: Uuid) -> bool;

    /// Forget the token with `id`. Safe to call more than once.
    fn release(&self, id: Uuid);

    /// Number of live tokens.
    fn live(&self) -> usize;
}

#[derive(Default)]
pub struct TokenRegistry {
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CancellationRegistry for TokenRegistry {
    fn create(&self) -> CancelHandle {
        let handle = CancelHandle {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        };
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id, handle.token.clone());
        handle
    }

    fn cancel(&self, id: Uuid) -> bool {
        let tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        match tokens.get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn release(&self, id: Uuid) {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    fn live(&self) -> usize {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_fires_token() {
        let registry = TokenRegistry::new();
        let handle = registry.create();
        assert!(!handle.token.is_cancelled());
        assert!(registry.cancel(handle.id));
        assert!(handle.token.is_cancelled());
    }

    #[test]
    fn release_forgets_token() {
        let registry = TokenRegistry::new();
        let handle = registry.create();
        assert_eq!(registry.live(), 1);
        registry.release(handle.id);
        registry.release(handle.id);
        assert_eq!(registry.live(), 0);
        assert!(!registry.cancel(handle.id));
    }
}
