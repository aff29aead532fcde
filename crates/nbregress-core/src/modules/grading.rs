//! Source-to-feedback grading through an external text generator.
//!
//! Nothing here touches the artifact comparison path. A generator receives one prompt
//! built from the submission's sources and is expected to answer with a JSON record.

use super::traits::TextGenerator;
use crate::domain::HarnessError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_CHARS: usize = 6000;
pub const DEFAULT_MIN_CORRECTNESS: f64 = 6.0;
pub const NO_SOURCES_MESSAGE: &str = "No student code found.";
pub const TRUNCATION_MARKER: &str = "# [TRUNCATED]";

const SOURCE_EXTENSIONS: &[&str] = &["py", "ipynb"];
const EXCLUDED_PREFIXES: &[&str] = &["baseline", "tests", "results", ".github"];

const GRADING_INSTRUCTIONS: &str = r#"
You are grading a Python assignment.

You will see student code (truncated if needed).

Return JSON only with this exact schema:
{
  "correctness_score": 0-10,
  "style_score": 0-10,
  "key_findings": ["short bullet points"],
  "overall_feedback": "2-5 sentences of feedback"
}

Be strict but fair. Do not add any text outside the JSON.
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingFeedback {
    #[serde(default)]
    pub correctness_score: f64,
    #[serde(default)]
    pub style_score: f64,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub overall_feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GradingVerdict {
    Accepted {
        feedback: GradingFeedback,
    },
    BelowThreshold {
        feedback: GradingFeedback,
        minimum: f64,
    },
    /// The generator answered with something other than the JSON record.
    Unparsed {
        raw_output: String,
    },
}

impl GradingVerdict {
    /// Only a parsed score below the minimum fails; unparseable output does not.
    pub fn passed(&self) -> bool {
        !matches!(self, Self::BelowThreshold { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingOptions {
    pub max_chars: usize,
    pub min_correctness: f64,
}

impl Default for GradingOptions {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            min_correctness: DEFAULT_MIN_CORRECTNESS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("failed to read submission directory '{}': {source}", .path.display())]
    ReadDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to start generator '{}': {source}", .program.display())]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("generator '{}' i/o failed: {source}", .program.display())]
    Io {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("generator '{}' exited with {status}", .program.display())]
    Generator { program: PathBuf, status: String },
}

impl From<GradingError> for HarnessError {
    fn from(error: GradingError) -> Self {
        let message = error.to_string();
        match error {
            GradingError::ReadDirectory { .. } => {
                HarnessError::io_system("IO.GRADING_SOURCES", message)
            }
            GradingError::Spawn { .. } | GradingError::Io { .. } => {
                HarnessError::io_system("IO.GRADING_GENERATOR", message)
            }
            GradingError::Generator { .. } => {
                HarnessError::computation("RUN.GRADING_GENERATOR", message)
            }
        }
    }
}

/// Concatenates the submission's top-level sources under `--- FILE: <name> ---` headers.
pub fn collect_sources(root: impl AsRef<Path>, max_chars: usize) -> Result<String, GradingError> {
    let root = root.as_ref();
    let read_error = |source: std::io::Error| GradingError::ReadDirectory {
        path: root.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(root).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        if !entry.file_type().map_err(read_error)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_source = Path::new(&name)
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| SOURCE_EXTENSIONS.contains(&extension));
        let is_excluded = EXCLUDED_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix));
        if is_source && !is_excluded {
            names.push(name);
        }
    }
    names.sort();

    let mut chunks = Vec::with_capacity(names.len());
    for name in names {
        let bytes = match fs::read(root.join(&name)) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(file = %name, %error, "skipping unreadable source");
                continue;
            }
        };
        let text = truncate_chars(&String::from_utf8_lossy(&bytes), max_chars);
        chunks.push(format!("--- FILE: {name} ---\n{text}"));
    }

    if chunks.is_empty() {
        Ok(NO_SOURCES_MESSAGE.to_string())
    } else {
        Ok(chunks.join("\n\n"))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => format!("{}\n{TRUNCATION_MARKER}", &text[..offset]),
        None => text.to_string(),
    }
}

pub fn build_prompt(sources: &str) -> String {
    format!("{GRADING_INSTRUCTIONS}\n\nSTUDENT CODE:\n\n{sources}")
}

pub fn parse_feedback(text: &str) -> Result<GradingFeedback, serde_json::Error> {
    serde_json::from_str(text.trim())
}

pub fn grade(
    root: impl AsRef<Path>,
    generator: &dyn TextGenerator,
    options: &GradingOptions,
) -> Result<GradingVerdict, GradingError> {
    let sources = collect_sources(root, options.max_chars)?;
    let prompt = build_prompt(&sources);
    debug!(prompt_chars = prompt.chars().count(), "requesting grading feedback");
    let raw_output = generator.generate(&prompt)?;

    let verdict = match parse_feedback(&raw_output) {
        Ok(feedback) if feedback.correctness_score < options.min_correctness => {
            GradingVerdict::BelowThreshold {
                feedback,
                minimum: options.min_correctness,
            }
        }
        Ok(feedback) => GradingVerdict::Accepted { feedback },
        Err(error) => {
            warn!(%error, "generator output is not a feedback record");
            GradingVerdict::Unparsed {
                raw_output: raw_output.trim().to_string(),
            }
        }
    };
    info!(passed = verdict.passed(), "grading finished");
    Ok(verdict)
}

/// Pipes the prompt to an external program and takes its stdout as the answer.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl TextGenerator for CommandGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GradingError> {
        let io_error = |source: std::io::Error| GradingError::Io {
            program: self.program.clone(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| GradingError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let output = child.wait_with_output().map_err(io_error)?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // A generator may stop reading early; its exit status decides.
                Ok(Err(error)) if error.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(error)) => return Err(io_error(error)),
                Err(_) => {
                    return Err(io_error(std::io::Error::other("prompt writer panicked")));
                }
            }
        }

        if !output.status.success() {
            return Err(GradingError::Generator {
                program: self.program.clone(),
                status: output.status.to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CommandGenerator, GradingError, GradingOptions, GradingVerdict, NO_SOURCES_MESSAGE,
        build_prompt, collect_sources, grade, parse_feedback,
    };
    use crate::modules::traits::TextGenerator;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::TempDir;

    struct CannedGenerator {
        answer: String,
        prompts: RefCell<Vec<String>>,
    }

    impl CannedGenerator {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for CannedGenerator {
        fn generate(&self, prompt: &str) -> Result<String, GradingError> {
            self.prompts.borrow_mut().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    #[test]
    fn sources_are_filtered_sorted_and_truncated() {
        let temp = TempDir::new().expect("tempdir should be created");
        // Exactly at the budget: kept whole.
        fs::write(temp.path().join("b.py"), "print('b')").expect("write");
        fs::write(temp.path().join("a.ipynb"), "x".repeat(12)).expect("write");
        fs::write(temp.path().join("baseline.ipynb"), "skip").expect("write");
        fs::write(temp.path().join("tests_helper.py"), "skip").expect("write");
        fs::write(temp.path().join("notes.txt"), "skip").expect("write");
        fs::create_dir_all(temp.path().join("pkg.py")).expect("dir named like a source");

        let sources = collect_sources(temp.path(), 10).expect("collection should succeed");
        assert_eq!(
            sources,
            "--- FILE: a.ipynb ---\nxxxxxxxxxx\n# [TRUNCATED]\n\n--- FILE: b.py ---\nprint('b')"
        );
    }

    #[test]
    fn empty_submission_uses_placeholder_text() {
        let temp = TempDir::new().expect("tempdir should be created");
        assert_eq!(
            collect_sources(temp.path(), 100).expect("collection should succeed"),
            NO_SOURCES_MESSAGE
        );
        assert!(build_prompt(NO_SOURCES_MESSAGE).ends_with("STUDENT CODE:\n\nNo student code found."));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let feedback = parse_feedback(" {\"style_score\": 7} ").expect("object should parse");
        assert_eq!(feedback.correctness_score, 0.0);
        assert_eq!(feedback.style_score, 7.0);
        assert!(parse_feedback("Sure! Here is my review").is_err());
    }

    #[test]
    fn verdict_follows_correctness_threshold() {
        let temp = TempDir::new().expect("tempdir should be created");
        fs::write(temp.path().join("main.py"), "x = 1\n").expect("write");

        let low = CannedGenerator::new(
            r#"{"correctness_score": 5, "style_score": 9, "key_findings": [], "overall_feedback": "ok"}"#,
        );
        let verdict = grade(temp.path(), &low, &GradingOptions::default()).expect("grading");
        assert!(matches!(verdict, GradingVerdict::BelowThreshold { minimum, .. } if minimum == 6.0));
        assert!(!verdict.passed());
        assert!(low.prompts.borrow()[0].contains("--- FILE: main.py ---"));

        let high = CannedGenerator::new(r#"{"correctness_score": 6}"#);
        let verdict = grade(temp.path(), &high, &GradingOptions::default()).expect("grading");
        assert!(matches!(verdict, GradingVerdict::Accepted { .. }));
    }

    #[test]
    fn unparseable_output_does_not_fail() {
        let temp = TempDir::new().expect("tempdir should be created");
        let chatty = CannedGenerator::new("I think this is great.\n");
        let verdict = grade(temp.path(), &chatty, &GradingOptions::default()).expect("grading");
        assert_eq!(
            verdict,
            GradingVerdict::Unparsed {
                raw_output: "I think this is great.".to_string()
            }
        );
        assert!(verdict.passed());
    }

    #[cfg(unix)]
    #[test]
    fn command_generator_round_trips_through_stdio() {
        let generator = CommandGenerator::new("sh").with_args(["-c", "wc -c >/dev/null; echo '{}'"]);
        let output = generator.generate("prompt text").expect("generator should run");
        assert_eq!(output.trim(), "{}");

        let failing = CommandGenerator::new("sh").with_args(["-c", "exit 2"]);
        assert!(matches!(
            failing.generate("prompt"),
            Err(GradingError::Generator { .. })
        ));
    }
}
