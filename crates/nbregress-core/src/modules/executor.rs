//! Notebook execution through `jupyter nbconvert` with a harness-side wall clock.

use super::traits::NotebookExecutor;
use crate::domain::HarnessError;
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const NOTEBOOK_STEM_ENV: &str = "NOTEBOOK_STEM";
pub const NOTEBOOKS_SUBDIR: &str = "notebooks";

const DEFAULT_PROGRAM: &str = "jupyter";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL_LINES: usize = 20;
const EXCLUDED_NOTEBOOK: &str = "baseline.ipynb";
const EXCLUDED_COMPONENTS: &[&str] = &[".ipynb_checkpoints", "tests"];

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to start '{}' for notebook '{}': {source}", .program.display(), .notebook.display())]
    Spawn {
        program: PathBuf,
        notebook: PathBuf,
        source: std::io::Error,
    },
    #[error("notebook '{}' did not finish within {}s", .notebook.display(), .timeout.as_secs())]
    Timeout { notebook: PathBuf, timeout: Duration },
    #[error("notebook '{}' failed with {status}{}", .notebook.display(), render_stderr_tail(.stderr_tail))]
    Failed {
        notebook: PathBuf,
        status: String,
        stderr_tail: String,
    },
    #[error("failed to wait for notebook '{}': {source}", .notebook.display())]
    Wait {
        notebook: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read notebook directory '{}': {source}", .path.display())]
    ReadDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<ExecutionError> for HarnessError {
    fn from(error: ExecutionError) -> Self {
        let message = error.to_string();
        match error {
            ExecutionError::Spawn { .. } => HarnessError::io_system("IO.NOTEBOOK_SPAWN", message),
            ExecutionError::Timeout { .. } => {
                HarnessError::computation("RUN.NOTEBOOK_TIMEOUT", message)
            }
            ExecutionError::Failed { .. } => HarnessError::computation("RUN.NOTEBOOK", message),
            ExecutionError::Wait { .. } | ExecutionError::ReadDirectory { .. } => {
                HarnessError::io_system("IO.NOTEBOOK", message)
            }
        }
    }
}

fn render_stderr_tail(tail: &str) -> String {
    if tail.is_empty() {
        String::new()
    } else {
        format!(": {tail}")
    }
}

#[derive(Debug, Clone)]
pub struct NbconvertExecutor {
    program: PathBuf,
    working_dir: PathBuf,
    poll_interval: Duration,
}

impl NbconvertExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            working_dir: working_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replaces the `jupyter` launcher, e.g. with a virtualenv-specific path.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn command_for(&self, notebook: &Path, timeout: Duration) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("nbconvert")
            .arg("--to")
            .arg("notebook")
            .arg("--execute")
            .arg("--inplace")
            .arg(format!("--ExecutePreprocessor.timeout={}", timeout.as_secs()))
            .arg(notebook)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if std::env::var_os(NOTEBOOK_STEM_ENV).is_none() {
            if let Some(stem) = notebook.file_stem() {
                command.env(NOTEBOOK_STEM_ENV, stem);
            }
        }
        command
    }
}

impl NotebookExecutor for NbconvertExecutor {
    fn execute(&self, notebook: &Path, timeout: Duration) -> Result<(), ExecutionError> {
        debug!(
            notebook = %notebook.display(),
            program = %self.program.display(),
            timeout_secs = timeout.as_secs(),
            "starting notebook"
        );
        let mut child =
            self.command_for(notebook, timeout)
                .spawn()
                .map_err(|source| ExecutionError::Spawn {
                    program: self.program.clone(),
                    notebook: notebook.to_path_buf(),
                    source,
                })?;

        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut buffer = Vec::new();
                let _ = stderr.read_to_end(&mut buffer);
                buffer
            })
        });

        let waited = wait_with_deadline(&mut child, timeout, self.poll_interval);

        // Only a failed run needs stderr; a killed child's descendants may hold the pipe open.
        match waited {
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => {
                let stderr = stderr_reader
                    .and_then(|reader| reader.join().ok())
                    .unwrap_or_default();
                Err(ExecutionError::Failed {
                    notebook: notebook.to_path_buf(),
                    status: status.to_string(),
                    stderr_tail: tail_lines(&String::from_utf8_lossy(&stderr), STDERR_TAIL_LINES),
                })
            }
            Ok(None) => {
                warn!(
                    notebook = %notebook.display(),
                    timeout_secs = timeout.as_secs(),
                    "notebook timed out and was killed"
                );
                Err(ExecutionError::Timeout {
                    notebook: notebook.to_path_buf(),
                    timeout,
                })
            }
            Err(source) => Err(ExecutionError::Wait {
                notebook: notebook.to_path_buf(),
                source,
            }),
        }
    }
}

/// `Ok(None)` means the deadline passed and the child was killed and reaped.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    poll_interval: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let started_at = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(error) => {
                terminate_and_reap(child);
                return Err(error);
            }
        }
        if started_at.elapsed() >= timeout {
            terminate_and_reap(child);
            return Ok(None);
        }
        thread::sleep(poll_interval);
    }
}

fn terminate_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn tail_lines(text: &str, count: usize) -> String {
    let lines = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

/// Notebooks directly under `root` plus everything below `root/notebooks`.
pub fn discover_notebooks(root: impl AsRef<Path>) -> Result<Vec<PathBuf>, ExecutionError> {
    let root = root.as_ref();
    let mut notebooks = Vec::new();
    collect_notebooks(root, root, false, &mut notebooks)?;
    let nested = root.join(NOTEBOOKS_SUBDIR);
    if nested.is_dir() {
        collect_notebooks(root, &nested, true, &mut notebooks)?;
    }
    notebooks.sort();
    notebooks.dedup();
    Ok(notebooks)
}

fn collect_notebooks(
    root: &Path,
    dir: &Path,
    recursive: bool,
    notebooks: &mut Vec<PathBuf>,
) -> Result<(), ExecutionError> {
    let read_error = |source: std::io::Error| ExecutionError::ReadDirectory {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(read_error)?;
        if is_excluded(root, &path) {
            continue;
        }
        if file_type.is_dir() {
            if recursive {
                collect_notebooks(root, &path, recursive, notebooks)?;
            }
        } else if file_type.is_file()
            && path.extension().is_some_and(|extension| extension == "ipynb")
        {
            notebooks.push(path);
        }
    }
    Ok(())
}

fn is_excluded(root: &Path, path: &Path) -> bool {
    if path.file_name().is_some_and(|name| name == EXCLUDED_NOTEBOOK) {
        return true;
    }
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|component| match component {
            Component::Normal(name) => EXCLUDED_COMPONENTS.iter().any(|excluded| name == *excluded),
            _ => false,
        })
}
