//! Canonical assistant reply and per-provider payload normalization.

use serde::{Deserialize, Serialize};

use super::LlmBackend;
use super::schema::ASSISTANT_TOOL_NAME;
use crate::execution::{ExecutionStep, StepStatus};

/// Proposed code: one opaque script or an ordered list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Execution {
    Script(String),
    Steps(Vec<ExecutionStep>),
}

impl Default for Execution {
    fn default() -> Self {
        Self::Steps(Vec::new())
    }
}

/// Normalized structured reply from the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AIResponse {
    #[serde(default)]
    pub thought_process: String,
    #[serde(default)]
    pub plan: Vec<String>,
    pub user_confirmation_required: bool,
    #[serde(default)]
    pub should_execute_code: bool,
    #[serde(default)]
    pub execution: Execution,
    pub response: String,
}

impl AIResponse {
    /// Proposed steps in order; a script becomes a single step.
    ///
    /// Every listed step is kept, so an execution result lines up with the proposal one to one.
    /// Steps without code settle as failures when run.
    pub fn steps(&self) -> Vec<ExecutionStep> {
        match &self.execution {
            Execution::Script(code) if code.trim().is_empty() => Vec::new(),
            Execution::Script(code) => vec![ExecutionStep::new("Run script", code.clone())],
            Execution::Steps(steps) => steps.clone(),
        }
    }

    /// Whether this reply asks for code to run.
    pub fn proposes_execution(&self) -> bool {
        self.should_execute_code && self.steps().iter().any(|s| !s.code.trim().is_empty())
    }

    /// Results and statuses come from running steps, never from the provider.
    fn reset_step_outcomes(&mut self) {
        if let Execution::Steps(ref mut steps) = self.execution {
            for step in steps {
                step.result.clear();
                step.status = StepStatus::Pending;
            }
        }
    }
}

/// Parse a provider's raw payload into an `AIResponse`. The error is a human-readable reason.
pub fn normalize_payload(backend: LlmBackend, raw: &str) -> Result<AIResponse, String> {
    let payload: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("payload is not JSON: {e}"))?;

    let input = match backend {
        LlmBackend::Anthropic => anthropic_tool_input(&payload)?,
        LlmBackend::OpenAi => openai_tool_input(&payload)?,
    };

    let mut response: AIResponse = serde_json::from_value(input)
        .map_err(|e| format!("tool input does not match schema: {e}"))?;
    response.reset_step_outcomes();
    Ok(response)
}

/// Anthropic: the `input` of the forced `tool_use` block. A text block holding the JSON
/// object is accepted when the model answered without the tool.
fn anthropic_tool_input(payload: &serde_json::Value) -> Result<serde_json::Value, String> {
    let blocks = payload
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or("missing content array")?;

    if let Some(input) = blocks
        .iter()
        .find(|b| b["type"] == "tool_use" && b["name"] == ASSISTANT_TOOL_NAME)
        .and_then(|b| b.get("input"))
    {
        return Ok(input.clone());
    }

    blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .find_map(|t| serde_json::from_str::<serde_json::Value>(t.trim()).ok())
        .filter(|v| v.is_object())
        .ok_or_else(|| "no tool_use block in response".to_string())
}

/// OpenAI: the JSON-encoded `arguments` of the forced function call.
fn openai_tool_input(payload: &serde_json::Value) -> Result<serde_json::Value, String> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or("missing choices[0].message")?;

    let arguments = message
        .get("tool_calls")
        .and_then(|c| c.as_array())
        .and_then(|calls| {
            calls
                .iter()
                .find(|c| c.pointer("/function/name") == Some(&ASSISTANT_TOOL_NAME.into()))
        })
        .and_then(|c| c.pointer("/function/arguments"))
        .and_then(|a| a.as_str())
        .ok_or("no function call in response")?;

    serde_json::from_str(arguments).map_err(|e| format!("function arguments are not JSON: {e}"))
}
