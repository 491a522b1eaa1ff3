//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::LlmBackend;

/// Maximum number of files a single turn may carry.
pub const DEFAULT_MAX_ATTACHMENTS: usize = 10;

/// Character budget shared by all text attachments of a turn.
pub const DEFAULT_TEXT_BUDGET: usize = 100_000;

/// Minimum characters each text attachment keeps, however many files are attached.
pub const DEFAULT_PER_FILE_FLOOR: usize = 5_000;

/// Number of most recent conversation entries sent to the provider.
pub const DEFAULT_CONTEXT_WINDOW: usize = 20;

/// Assistant configuration.
#[derive(Debug, Clone)]
pub struct AssistConfig {
    /// Which provider handles requests.
    pub backend: LlmBackend,
    /// Model name passed to the provider.
    pub model: String,
    /// Completion token cap per request.
    pub max_tokens: u32,
    /// Conversation entries included as provider context.
    pub context_window: usize,
    /// Attachment limits.
    pub attachments: AttachmentLimits,
    /// Overrides the built-in system prompt when set.
    pub system_prompt: Option<String>,
    /// Per-command timeout for the default shell executor.
    pub shell_timeout: Duration,
}

/// Bounds applied by the attachment ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentLimits {
    pub max_files: usize,
    pub text_budget: usize,
    pub per_file_floor: usize,
}

impl AttachmentLimits {
    /// Characters each text attachment may keep when `count` files are attached.
    pub fn per_file_budget(&self, count: usize) -> usize {
        let share = if count == 0 {
            self.text_budget
        } else {
            self.text_budget / count
        };
        share.max(self.per_file_floor)
    }
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_ATTACHMENTS,
            text_budget: DEFAULT_TEXT_BUDGET,
            per_file_floor: DEFAULT_PER_FILE_FLOOR,
        }
    }
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Anthropic,
            model: LlmBackend::Anthropic.default_model().to_string(),
            max_tokens: 8192,
            context_window: DEFAULT_CONTEXT_WINDOW,
            attachments: AttachmentLimits::default(),
            system_prompt: None,
            shell_timeout: Duration::from_secs(120),
        }
    }
}

impl AssistConfig {
    /// Build configuration from `DESKPILOT_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match std::env::var("DESKPILOT_PROVIDER") {
            Ok(name) => name.parse::<LlmBackend>()?,
            Err(_) => defaults.backend,
        };

        let model = std::env::var("DESKPILOT_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        let attachments = AttachmentLimits {
            max_files: env_parse("DESKPILOT_MAX_ATTACHMENTS", defaults.attachments.max_files)?,
            text_budget: env_parse("DESKPILOT_TEXT_BUDGET", defaults.attachments.text_budget)?,
            per_file_floor: env_parse(
                "DESKPILOT_PER_FILE_FLOOR",
                defaults.attachments.per_file_floor,
            )?,
        };
        if attachments.max_files == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DESKPILOT_MAX_ATTACHMENTS".into(),
                message: "must be at least 1".into(),
            });
        }

        let context_window = env_parse("DESKPILOT_CONTEXT_WINDOW", defaults.context_window)?;
        if context_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DESKPILOT_CONTEXT_WINDOW".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            backend,
            model,
            max_tokens: env_parse("DESKPILOT_MAX_TOKENS", defaults.max_tokens)?,
            context_window,
            attachments,
            system_prompt: std::env::var("DESKPILOT_SYSTEM_PROMPT").ok(),
            shell_timeout: Duration::from_secs(env_parse(
                "DESKPILOT_SHELL_TIMEOUT_SECS",
                defaults.shell_timeout.as_secs(),
            )?),
        })
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
