//! Code execution capability.

use async_trait::async_trait;

/// What one call to the executor produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub success: bool,
    pub output: String,
}

impl RunOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Runs one piece of proposed code to completion.
///
/// Failures are reported through `RunOutput::success`, never as an error: a failed step is a
/// recorded outcome, not a reason to stop.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn run(&self, code: &str) -> RunOutput;
}
