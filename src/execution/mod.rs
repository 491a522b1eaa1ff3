//! Code execution: the status machine, step sequencing and the default shell executor.

pub mod executor;
pub mod gate;
pub mod shell;
pub mod state;

pub use executor::{CodeExecutor, RunOutput};
pub use gate::{ExecutionGate, ExecutionPermit};
pub use shell::{ShellExecutor, requires_explicit_approval};
pub use state::{ExecutionResult, ExecutionStatus, ExecutionStep, StepStatus};
