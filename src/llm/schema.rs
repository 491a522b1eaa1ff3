//! Structured-output tool definition the provider is forced to call.

use serde::Serialize;

/// Name of the forced tool.
pub const ASSISTANT_TOOL_NAME: &str = "desktop_assistant_reply";

/// A tool definition in provider-neutral form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool input.
    pub input_schema: serde_json::Value,
}

impl ToolSchema {
    /// The schema every assistant reply must follow.
    pub fn assistant_reply() -> Self {
        Self {
            name: ASSISTANT_TOOL_NAME.to_string(),
            description: "Structure the reply: reasoning, an ordered plan, optional code to run \
                          on the user's machine, whether the user must confirm before it runs, \
                          and the final message shown to the user."
                .to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "thought_process": { "type": "string" },
                    "plan": { "type": "array", "items": { "type": "string" } },
                    "user_confirmation_required": { "type": "boolean" },
                    "should_execute_code": { "type": "boolean" },
                    "execution": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "step": { "type": "string" },
                                "code": { "type": "string" }
                            },
                            "required": ["step", "code"]
                        }
                    },
                    "response": { "type": "string" }
                },
                "required": [
                    "thought_process",
                    "plan",
                    "user_confirmation_required",
                    "should_execute_code",
                    "execution",
                    "response"
                ]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_response() {
        let tool = ToolSchema::assistant_reply();
        let required = tool.input_schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "response"));
        assert!(required.iter().any(|v| v == "user_confirmation_required"));
        assert_eq!(tool.name, ASSISTANT_TOOL_NAME);
    }
}
