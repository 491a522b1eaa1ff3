//! Credential lookup for AI providers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};

/// Resolves the API key for a provider, if one is configured.
pub trait CredentialStore: Send + Sync {
    fn get(&self, provider: &str) -> Option<SecretString>;
}

/// Reads keys from `ANTHROPIC_API_KEY` / `OPENAI_API_KEY`. Empty values count as absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    fn var_for(provider: &str) -> Option<&'static str> {
        match provider {
            "anthropic" => Some("ANTHROPIC_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get(&self, provider: &str) -> Option<SecretString> {
        let var = Self::var_for(provider)?;
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(SecretString::from)
    }
}

/// In-memory keys, set at runtime (settings screens, tests).
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: Mutex<HashMap<String, SecretString>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(self, provider: &str, key: &str) -> Self {
        self.set(provider, key);
        self
    }

    pub fn set(&self, provider: &str, key: &str) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), SecretString::from(key.to_string()));
    }

    pub fn remove(&self, provider: &str) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(provider);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider: &str) -> Option<SecretString> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .filter(|k| !k.expose_secret().trim().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCredentialStore::new().with_key("anthropic", "sk-ant");
        assert_eq!(store.get("anthropic").unwrap().expose_secret(), "sk-ant");
        assert!(store.get("openai").is_none());

        store.remove("anthropic");
        assert!(store.get("anthropic").is_none());
    }

    #[test]
    fn blank_key_is_absent() {
        let store = MemoryCredentialStore::new().with_key("openai", "   ");
        assert!(store.get("openai").is_none());
    }

    #[test]
    fn env_store_ignores_unknown_provider() {
        assert!(EnvCredentialStore.get("mistral").is_none());
    }
}
