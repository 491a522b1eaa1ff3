//! Admits one execution sequence at a time and runs its steps in order.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use super::executor::{CodeExecutor, RunOutput};
use super::state::{ExecutionResult, ExecutionStep, StepStatus};
use crate::error::ExecutionError;

/// Recorded as the result of a step that carried no code.
const NO_CODE: &str = "No code to run for this step";

/// Proof that the holder owns the application-wide execution slot.
pub struct ExecutionPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Sequences step execution through a `CodeExecutor`. The gate never runs code itself.
///
/// Share one gate (behind `Arc`) across every session so overlapping side-effecting runs are
/// impossible application-wide.
pub struct ExecutionGate {
    executor: Arc<dyn CodeExecutor>,
    slot: Arc<Mutex<()>>,
}

impl ExecutionGate {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self {
            executor,
            slot: Arc::new(Mutex::new(())),
        }
    }

    /// Claim the execution slot without waiting.
    pub fn try_admit(&self) -> Result<ExecutionPermit, ExecutionError> {
        let guard = Arc::clone(&self.slot)
            .try_lock_owned()
            .map_err(|_| ExecutionError::Busy)?;
        Ok(ExecutionPermit { _guard: guard })
    }

    /// Whether some sequence currently holds the slot.
    pub fn is_busy(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Run `steps` one after another. A failing step does not stop the sequence.
    ///
    /// A step with no code fails without reaching the executor.
    ///
    /// `on_settled` observes the partial result after every step.
    pub async fn run<F>(
        &self,
        _permit: &ExecutionPermit,
        steps: Vec<ExecutionStep>,
        mut on_settled: F,
    ) -> ExecutionResult
    where
        F: FnMut(usize, &ExecutionResult),
    {
        let mut result = ExecutionResult::new(steps);
        let total = result.steps.len();

        for index in 0..total {
            let code = result.steps[index].code.clone();
            let output = if code.trim().is_empty() {
                RunOutput::failure(NO_CODE)
            } else {
                self.executor.run(&code).await
            };

            let step = &mut result.steps[index];
            step.result = output.output;
            step.status = if output.success {
                StepStatus::Success
            } else {
                StepStatus::Failure
            };

            if output.success {
                info!(step = index + 1, total, label = %step.step, "Step succeeded");
            } else {
                let failure = ExecutionError::StepFailed {
                    index,
                    label: step.step.clone(),
                    output: step.result.clone(),
                };
                warn!(step = index + 1, total, error = %failure, "Step failed, continuing");
            }

            on_settled(index, &result);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Fails any code containing "fail"; records call order.
    struct ScriptedExecutor {
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl CodeExecutor for ScriptedExecutor {
        async fn run(&self, code: &str) -> RunOutput {
            self.calls.lock().unwrap().push(code.to_string());
            tokio::task::yield_now().await;
            if code.contains("fail") {
                RunOutput::failure(format!("{code}: error"))
            } else {
                RunOutput::success(format!("{code}: ok"))
            }
        }
    }

    fn gate() -> (ExecutionGate, Arc<ScriptedExecutor>) {
        let exec = Arc::new(ScriptedExecutor {
            calls: StdMutex::new(Vec::new()),
        });
        (ExecutionGate::new(exec.clone()), exec)
    }

    #[tokio::test]
    async fn failing_step_does_not_halt_sequence() {
        let (gate, exec) = gate();
        let permit = gate.try_admit().unwrap();
        let steps = vec![
            ExecutionStep::new("one", "first"),
            ExecutionStep::new("two", "fail here"),
            ExecutionStep::new("three", "third"),
        ];

        let result = gate.run(&permit, steps, |_, _| {}).await;

        assert_eq!(
            result.statuses(),
            vec![StepStatus::Success, StepStatus::Failure, StepStatus::Success]
        );
        assert!(result.all_settled());
        assert_eq!(result.steps[1].result, "fail here: error");
        assert_eq!(
            *exec.calls.lock().unwrap(),
            vec!["first", "fail here", "third"]
        );
    }

    #[tokio::test]
    async fn step_without_code_fails_without_executor() {
        let (gate, exec) = gate();
        let permit = gate.try_admit().unwrap();
        let steps = vec![
            ExecutionStep::new("run", "first"),
            ExecutionStep::new("explain", "   "),
        ];

        let result = gate.run(&permit, steps, |_, _| {}).await;

        assert_eq!(result.steps.len(), 2);
        assert_eq!(
            result.statuses(),
            vec![StepStatus::Success, StepStatus::Failure]
        );
        assert_eq!(result.steps[1].result, NO_CODE);
        assert_eq!(*exec.calls.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn progress_is_reported_in_order() {
        let (gate, _) = gate();
        let permit = gate.try_admit().unwrap();
        let steps = vec![ExecutionStep::new("a", "a"), ExecutionStep::new("b", "b")];

        let mut seen = Vec::new();
        gate.run(&permit, steps, |i, partial| {
            seen.push((i, partial.steps.iter().filter(|s| s.is_settled()).count()));
        })
        .await;

        assert_eq!(seen, vec![(0, 1), (1, 2)]);
    }

    #[tokio::test]
    async fn only_one_sequence_admitted() {
        let (gate, _) = gate();
        let permit = gate.try_admit().unwrap();
        assert!(gate.is_busy());
        assert!(matches!(gate.try_admit(), Err(ExecutionError::Busy)));

        drop(permit);
        assert!(!gate.is_busy());
        assert!(gate.try_admit().is_ok());
    }
}
