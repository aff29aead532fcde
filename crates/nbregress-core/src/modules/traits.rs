use super::executor::ExecutionError;
use super::grading::GradingError;
use std::path::Path;
use std::time::Duration;

/// Runs one notebook to completion in place, or fails within `timeout`.
pub trait NotebookExecutor {
    fn execute(&self, notebook: &Path, timeout: Duration) -> Result<(), ExecutionError>;
}

/// Turns a prompt into raw model text.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GradingError>;
}
