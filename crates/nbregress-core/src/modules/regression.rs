use super::artifacts::CompareError;
use super::discovery::{DiscoveryError, DiscoveryRules, discover_pairs};
use super::image::{ImageCompareOptions, ImageComparator, ImageComparison, ImageOutcome};
use super::numeric::{NumericComparator, NumericComparison, NumericOutcome};
use super::traits::NotebookExecutor;
use crate::common::config::{DEFAULT_BASELINE_DIR, DEFAULT_RESULTS_DIR};
use crate::common::TolerancePolicy;
use crate::domain::{ArtifactKind, ArtifactPair, ArtifactRole, HarnessError, HarnessResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RegressionRunnerConfig {
    pub baseline_dir: PathBuf,
    pub results_dir: PathBuf,
    pub tolerances: TolerancePolicy,
    pub rules: DiscoveryRules,
    pub emit_diff: bool,
    pub report_digests: bool,
    pub report_path: Option<PathBuf>,
}

impl RegressionRunnerConfig {
    /// Conventional `baseline/` and `results/` directories under `repo_root`.
    pub fn for_repo(repo_root: impl AsRef<Path>) -> Self {
        let repo_root = repo_root.as_ref();
        Self {
            baseline_dir: repo_root.join(DEFAULT_BASELINE_DIR),
            results_dir: repo_root.join(DEFAULT_RESULTS_DIR),
            tolerances: TolerancePolicy::default(),
            rules: DiscoveryRules::default(),
            emit_diff: true,
            report_digests: false,
            report_path: None,
        }
    }
}

impl Default for RegressionRunnerConfig {
    fn default() -> Self {
        Self::for_repo(".")
    }
}

/// Notebooks to run before comparing, and who runs them.
pub struct NotebookExecution<'a> {
    pub executor: &'a dyn NotebookExecutor,
    pub notebooks: Vec<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Pass,
    ArtifactMissing,
    LoadError,
    SizeMismatch,
    ShapeMismatch,
    ContentMismatch,
}

impl ArtifactStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::ArtifactMissing => "artifact_missing",
            Self::LoadError => "load_error",
            Self::SizeMismatch => "size_mismatch",
            Self::ShapeMismatch => "shape_mismatch",
            Self::ContentMismatch => "content_mismatch",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComparisonDetail {
    Image(ImageComparison),
    Table(NumericComparison),
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRegressionReport {
    pub key: String,
    pub kind: ArtifactKind,
    pub baseline_path: String,
    pub actual_path: String,
    pub status: ArtifactStatus,
    pub passed: bool,
    pub reason: Option<String>,
    pub comparison: Option<ComparisonDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotebookRunReport {
    pub notebook: String,
    pub passed: bool,
    pub timed_out: bool,
    pub elapsed_seconds: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegressionRunReport {
    pub generated_at_unix_seconds: u64,
    pub passed: bool,
    pub baseline_dir: String,
    pub results_dir: String,
    pub tolerances: TolerancePolicy,
    pub notebook_count: usize,
    pub passed_notebook_count: usize,
    pub failed_notebook_count: usize,
    pub artifact_count: usize,
    pub passed_artifact_count: usize,
    pub failed_artifact_count: usize,
    pub notebooks: Vec<NotebookRunReport>,
    pub artifacts: Vec<ArtifactRegressionReport>,
}

pub fn run_regression(
    config: &RegressionRunnerConfig,
    execution: Option<NotebookExecution<'_>>,
) -> HarnessResult<RegressionRunReport> {
    let notebooks = match execution {
        Some(execution) => {
            fs::create_dir_all(&config.results_dir).map_err(|source| {
                HarnessError::from(RegressionRunnerError::ResultsDirectory {
                    path: config.results_dir.clone(),
                    source,
                })
            })?;
            run_notebooks(&execution)
        }
        None => Vec::new(),
    };

    let discovered = discover_pairs(&config.baseline_dir, &config.results_dir, &config.rules)
        .map_err(|source| HarnessError::from(RegressionRunnerError::Discovery(source)))?;

    let image_comparator = ImageComparator::new(ImageCompareOptions {
        tolerance: config.tolerances.image_tol,
        emit_diff: config.emit_diff,
        report_digests: config.report_digests,
    });
    let numeric_comparator = NumericComparator::from_policy(&config.tolerances);

    let mut artifacts = Vec::with_capacity(discovered.len());
    for pair in &discovered.pairs {
        let report = compare_pair(pair, &image_comparator, &numeric_comparator);
        debug!(
            key = %report.key,
            kind = %report.kind,
            status = report.status.as_str(),
            "artifact compared"
        );
        artifacts.push(report);
    }
    for unmatched in &discovered.unmatched {
        let path = match unmatched.missing {
            ArtifactRole::Baseline => &unmatched.pair.baseline_path,
            ArtifactRole::Actual => &unmatched.pair.actual_path,
        };
        let error = CompareError::ArtifactMissing {
            role: unmatched.missing,
            path: path.clone(),
        };
        artifacts.push(failed_report(
            &unmatched.pair,
            ArtifactStatus::ArtifactMissing,
            error.to_string(),
        ));
    }
    artifacts.sort_by(|left, right| (&left.key, left.kind).cmp(&(&right.key, right.kind)));

    let notebook_count = notebooks.len();
    let passed_notebook_count = notebooks.iter().filter(|notebook| notebook.passed).count();
    let failed_notebook_count = notebook_count.saturating_sub(passed_notebook_count);

    let artifact_count = artifacts.len();
    let passed_artifact_count = artifacts.iter().filter(|artifact| artifact.passed).count();
    let failed_artifact_count = artifact_count.saturating_sub(passed_artifact_count);
    let passed = failed_notebook_count == 0 && failed_artifact_count == 0;

    let report = RegressionRunReport {
        generated_at_unix_seconds: current_unix_timestamp_seconds(),
        passed,
        baseline_dir: normalize_path(&config.baseline_dir),
        results_dir: normalize_path(&config.results_dir),
        tolerances: config.tolerances,
        notebook_count,
        passed_notebook_count,
        failed_notebook_count,
        artifact_count,
        passed_artifact_count,
        failed_artifact_count,
        notebooks,
        artifacts,
    };
    info!(
        passed,
        notebooks = notebook_count,
        failed_notebooks = failed_notebook_count,
        artifacts = artifact_count,
        failed_artifacts = failed_artifact_count,
        "regression run finished"
    );

    if let Some(report_path) = &config.report_path {
        write_report_file(report_path, &report).map_err(HarnessError::from)?;
    }
    Ok(report)
}

pub fn render_human_summary(report: &RegressionRunReport) -> String {
    let mut lines = Vec::new();
    let status = if report.passed { "PASS" } else { "FAIL" };
    lines.push(format!("Regression status: {}", status));
    if report.notebook_count > 0 {
        lines.push(format!(
            "Notebooks: {} total ({} passed, {} failed)",
            report.notebook_count, report.passed_notebook_count, report.failed_notebook_count
        ));
    }
    lines.push(format!(
        "Artifacts: {} total ({} passed, {} failed)",
        report.artifact_count, report.passed_artifact_count, report.failed_artifact_count
    ));

    for notebook in report.notebooks.iter().filter(|notebook| !notebook.passed) {
        let reason = notebook
            .reason
            .as_deref()
            .unwrap_or("notebook failed without a reason");
        lines.push(format!("Notebook {}: FAIL ({})", notebook.notebook, reason));
    }

    for artifact in &report.artifacts {
        lines.push(format!(
            "Artifact {} [{}]: {}",
            artifact.key,
            artifact.kind,
            artifact.status.as_str()
        ));
        if !artifact.passed {
            let reason = artifact
                .reason
                .as_deref()
                .unwrap_or("artifact comparison failed without a reason");
            lines.push(format!("  {}", reason));
        }
        if let Some(ComparisonDetail::Image(comparison)) = &artifact.comparison {
            if let Some(digests) = &comparison.digests {
                for (label, digest) in [("baseline", &digests.baseline), ("actual", &digests.actual)] {
                    let digest = digest.as_deref().unwrap_or("unavailable");
                    lines.push(format!("  {} sha256={}", label, digest));
                }
            }
        }
    }

    lines.join("\n")
}

#[derive(Debug, thiserror::Error)]
pub enum RegressionRunnerError {
    #[error("failed to create results directory '{}': {source}", .path.display())]
    ResultsDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("artifact discovery failed: {0}")]
    Discovery(DiscoveryError),
    #[error("failed to create report directory '{}': {source}", .path.display())]
    ReportDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize report '{}': {source}", .path.display())]
    SerializeReport {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write report '{}': {source}", .path.display())]
    WriteReport {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<RegressionRunnerError> for HarnessError {
    fn from(error: RegressionRunnerError) -> Self {
        let message = error.to_string();
        match error {
            RegressionRunnerError::Discovery(source) => source.into(),
            RegressionRunnerError::ResultsDirectory { .. }
            | RegressionRunnerError::ReportDirectory { .. }
            | RegressionRunnerError::WriteReport { .. } => {
                HarnessError::io_system("IO.REGRESSION_FILESYSTEM", message)
            }
            RegressionRunnerError::SerializeReport { .. } => {
                HarnessError::internal("SYS.REGRESSION_REPORT", message)
            }
        }
    }
}

fn run_notebooks(execution: &NotebookExecution<'_>) -> Vec<NotebookRunReport> {
    let mut reports = Vec::with_capacity(execution.notebooks.len());
    for notebook in &execution.notebooks {
        info!(notebook = %notebook.display(), "executing notebook");
        let started = Instant::now();
        let result = execution.executor.execute(notebook, execution.timeout);
        let elapsed_seconds = started.elapsed().as_secs_f64();
        let report = match result {
            Ok(()) => NotebookRunReport {
                notebook: normalize_path(notebook),
                passed: true,
                timed_out: false,
                elapsed_seconds,
                reason: None,
            },
            Err(error) => {
                warn!(notebook = %notebook.display(), %error, "notebook execution failed");
                NotebookRunReport {
                    notebook: normalize_path(notebook),
                    passed: false,
                    timed_out: error.is_timeout(),
                    elapsed_seconds,
                    reason: Some(error.to_string()),
                }
            }
        };
        reports.push(report);
    }
    reports
}

fn compare_pair(
    pair: &ArtifactPair,
    image_comparator: &ImageComparator,
    numeric_comparator: &NumericComparator,
) -> ArtifactRegressionReport {
    let compared = match pair.kind {
        ArtifactKind::Image => image_comparator
            .compare(&pair.baseline_path, &pair.actual_path)
            .map(|comparison| {
                let status = match &comparison.outcome {
                    ImageOutcome::Pass { .. } => ArtifactStatus::Pass,
                    ImageOutcome::SizeMismatch { .. } => ArtifactStatus::SizeMismatch,
                    ImageOutcome::ContentMismatch { .. } => ArtifactStatus::ContentMismatch,
                };
                let reason = comparison.outcome.describe();
                (status, reason, ComparisonDetail::Image(comparison))
            }),
        ArtifactKind::Table => numeric_comparator
            .compare(&pair.baseline_path, &pair.actual_path)
            .map(|comparison| {
                let status = match &comparison.outcome {
                    NumericOutcome::Pass { .. } => ArtifactStatus::Pass,
                    NumericOutcome::ShapeMismatch { .. } => ArtifactStatus::ShapeMismatch,
                    NumericOutcome::ContentMismatch(_) => ArtifactStatus::ContentMismatch,
                };
                let reason = comparison.outcome.describe(&pair.key);
                (status, reason, ComparisonDetail::Table(comparison))
            }),
    };

    match compared {
        Ok((status, reason, detail)) => {
            let passed = status == ArtifactStatus::Pass;
            ArtifactRegressionReport {
                key: pair.key.clone(),
                kind: pair.kind,
                baseline_path: normalize_path(&pair.baseline_path),
                actual_path: normalize_path(&pair.actual_path),
                status,
                passed,
                reason: (!passed).then_some(reason),
                comparison: Some(detail),
            }
        }
        Err(error) => {
            let status = if error.is_artifact_missing() {
                ArtifactStatus::ArtifactMissing
            } else {
                ArtifactStatus::LoadError
            };
            failed_report(pair, status, error.to_string())
        }
    }
}

fn failed_report(
    pair: &ArtifactPair,
    status: ArtifactStatus,
    reason: String,
) -> ArtifactRegressionReport {
    ArtifactRegressionReport {
        key: pair.key.clone(),
        kind: pair.kind,
        baseline_path: normalize_path(&pair.baseline_path),
        actual_path: normalize_path(&pair.actual_path),
        status,
        passed: false,
        reason: Some(reason),
        comparison: None,
    }
}

fn write_report_file(
    report_path: &Path,
    report: &RegressionRunReport,
) -> Result<(), RegressionRunnerError> {
    if let Some(parent_dir) = report_path.parent() {
        fs::create_dir_all(parent_dir).map_err(|source| {
            RegressionRunnerError::ReportDirectory {
                path: parent_dir.to_path_buf(),
                source,
            }
        })?;
    }

    let report_json = serde_json::to_string_pretty(report).map_err(|source| {
        RegressionRunnerError::SerializeReport {
            path: report_path.to_path_buf(),
            source,
        }
    })?;
    fs::write(report_path, report_json).map_err(|source| RegressionRunnerError::WriteReport {
        path: report_path.to_path_buf(),
        source,
    })
}

fn current_unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
