use super::CliError;
use super::helpers::*;
use nbregress_core::common::config::{DEFAULT_BASELINE_DIR, DEFAULT_NOTEBOOK_TIMEOUT, DEFAULT_RESULTS_DIR};
use nbregress_core::modules::executor::{NbconvertExecutor, discover_notebooks};
use nbregress_core::modules::grading::{
    CommandGenerator, DEFAULT_MAX_CHARS, DEFAULT_MIN_CORRECTNESS, GradingOptions, GradingVerdict,
    grade,
};
use nbregress_core::modules::image::{ImageCompareOptions, ImageComparator};
use nbregress_core::modules::numeric::NumericComparator;
use nbregress_core::modules::regression::{
    NotebookExecution, RegressionRunnerConfig, render_human_summary, run_regression,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct RegressionArgs {
    /// Repository root (defaults to REPO_ROOT, then the current directory)
    #[arg(long)]
    repo_root: Option<PathBuf>,

    /// Baseline directory, relative to the repository root
    #[arg(long, default_value = DEFAULT_BASELINE_DIR)]
    baseline_dir: PathBuf,

    /// Results directory, relative to the repository root
    #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
    results_dir: PathBuf,

    #[command(flatten)]
    tolerances: ToleranceFlags,

    /// Execute notebooks with jupyter nbconvert before comparing
    #[arg(long)]
    execute: bool,

    /// Notebook to execute (repeatable); defaults to the notebooks found under the root
    #[arg(long = "notebook", value_name = "PATH", requires = "execute")]
    notebooks: Vec<PathBuf>,

    /// Jupyter launcher used for notebook execution
    #[arg(long, default_value = "jupyter")]
    jupyter: PathBuf,

    /// Wall-clock limit per notebook, in seconds
    #[arg(long, default_value_t = DEFAULT_NOTEBOOK_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// File-name glob classifying image artifacts (repeatable)
    #[arg(long = "image-glob", value_name = "GLOB")]
    image_globs: Vec<String>,

    /// File-name glob classifying table artifacts (repeatable)
    #[arg(long = "table-glob", value_name = "GLOB")]
    table_globs: Vec<String>,

    /// Compare every result image against this single baseline image
    #[arg(long, value_name = "NAME")]
    shared_image_baseline: Option<String>,

    /// Compare every result table against this single baseline table
    #[arg(long, value_name = "NAME")]
    shared_table_baseline: Option<String>,

    /// Do not write diff images for mismatching images
    #[arg(long)]
    no_diff: bool,

    /// Record SHA-256 digests of compared images in the report
    #[arg(long)]
    digests: bool,

    /// JSON report output path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct CompareImageArgs {
    /// Baseline image
    baseline: PathBuf,

    /// Actual image
    actual: PathBuf,

    /// RMS tolerance (overrides IMG_TOL)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Write <actual stem>-failed-diff.png beside the actual image on mismatch
    #[arg(long)]
    diff: bool,

    /// Report SHA-256 digests of both files
    #[arg(long)]
    digests: bool,

    /// Print the structured comparison as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
pub(super) struct CompareTableArgs {
    /// Baseline table
    baseline: PathBuf,

    /// Actual table
    actual: PathBuf,

    /// Absolute tolerance (overrides XY_ABS_TOL)
    #[arg(long)]
    abs_tol: Option<f64>,

    /// Relative tolerance (overrides XY_REL_TOL)
    #[arg(long)]
    rel_tol: Option<f64>,

    /// Print the structured comparison as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
pub(super) struct GradeArgs {
    /// Submission directory (defaults to REPO_ROOT, then the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Program that reads the prompt on stdin and answers on stdout
    #[arg(long)]
    generator: PathBuf,

    /// Argument passed to the generator (repeatable)
    #[arg(long = "generator-arg", value_name = "ARG", allow_hyphen_values = true)]
    generator_args: Vec<String>,

    /// Per-file character budget before truncation
    #[arg(long, default_value_t = DEFAULT_MAX_CHARS)]
    max_chars: usize,

    /// Minimum correctness score to accept
    #[arg(long, default_value_t = DEFAULT_MIN_CORRECTNESS)]
    min_correctness: f64,
}

impl RegressionArgs {
    fn into_config(self) -> Result<(RegressionRunnerConfig, Option<NotebookPlan>), CliError> {
        let repo_root = resolve_repo_root(self.repo_root.as_deref())?;
        let working_dir = current_working_dir()?;
        let tolerances = self.tolerances.resolve()?;

        let config = RegressionRunnerConfig {
            baseline_dir: resolve_cli_path(&repo_root, &self.baseline_dir),
            results_dir: resolve_cli_path(&repo_root, &self.results_dir),
            tolerances,
            rules: discovery_rules(
                self.image_globs,
                self.table_globs,
                self.shared_image_baseline,
                self.shared_table_baseline,
            ),
            emit_diff: !self.no_diff,
            report_digests: self.digests,
            report_path: self
                .report
                .map(|path| resolve_cli_path(&working_dir, &path)),
        };

        let plan = if self.execute {
            let notebooks = if self.notebooks.is_empty() {
                discover_notebooks(&repo_root).map_err(harness_error)?
            } else {
                self.notebooks
                    .iter()
                    .map(|path| resolve_cli_path(&working_dir, path))
                    .collect()
            };
            Some(NotebookPlan {
                executor: NbconvertExecutor::new(&repo_root).with_program(self.jupyter),
                notebooks,
                timeout: Duration::from_secs(self.timeout_secs),
            })
        } else {
            None
        };

        Ok((config, plan))
    }
}

struct NotebookPlan {
    executor: NbconvertExecutor,
    notebooks: Vec<PathBuf>,
    timeout: Duration,
}

pub(super) fn run_regression_command(args: RegressionArgs) -> Result<i32, CliError> {
    let (config, plan) = args.into_config()?;
    let execution = plan.as_ref().map(|plan| NotebookExecution {
        executor: &plan.executor,
        notebooks: plan.notebooks.clone(),
        timeout: plan.timeout,
    });
    if let Some(execution) = &execution {
        info!(notebooks = execution.notebooks.len(), "notebook execution requested");
    }

    let report = run_regression(&config, execution).map_err(CliError::Harness)?;
    println!("{}", render_human_summary(&report));
    if let Some(report_path) = &config.report_path {
        println!("JSON report: {}", report_path.display());
    }

    if report.passed { Ok(0) } else { Ok(1) }
}

pub(super) fn run_compare_image_command(args: CompareImageArgs) -> Result<i32, CliError> {
    let flags = ToleranceFlags {
        image_tol: args.tolerance,
        ..ToleranceFlags::default()
    };
    let tolerances = flags.resolve()?;
    let comparator = ImageComparator::new(ImageCompareOptions {
        tolerance: tolerances.image_tol,
        emit_diff: args.diff,
        report_digests: args.digests,
    });
    let comparison = comparator
        .compare(&args.baseline, &args.actual)
        .map_err(harness_error)?;

    if args.json {
        print_json(&comparison)?;
    } else {
        println!("{}", comparison.outcome.describe());
        if let Some(digests) = &comparison.digests {
            for (label, digest) in [("baseline", &digests.baseline), ("actual", &digests.actual)] {
                if let Some(digest) = digest {
                    println!("sha256 {}: {}", label, digest);
                }
            }
        }
    }

    if comparison.outcome.passed() { Ok(0) } else { Ok(1) }
}

pub(super) fn run_compare_table_command(args: CompareTableArgs) -> Result<i32, CliError> {
    let flags = ToleranceFlags {
        abs_tol: args.abs_tol,
        rel_tol: args.rel_tol,
        ..ToleranceFlags::default()
    };
    let tolerances = flags.resolve()?;
    let comparison = NumericComparator::from_policy(&tolerances)
        .compare(&args.baseline, &args.actual)
        .map_err(harness_error)?;

    if args.json {
        print_json(&comparison)?;
    } else {
        let label = args
            .actual
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.actual.display().to_string());
        println!("{}", comparison.outcome.describe(&label));
    }

    if comparison.outcome.passed() { Ok(0) } else { Ok(1) }
}

pub(super) fn run_grade_command(args: GradeArgs) -> Result<i32, CliError> {
    let root = resolve_repo_root(args.root.as_deref())?;
    let generator = CommandGenerator::new(args.generator).with_args(args.generator_args);
    let options = GradingOptions {
        max_chars: args.max_chars,
        min_correctness: args.min_correctness,
    };

    let verdict = grade(&root, &generator, &options).map_err(harness_error)?;
    print_json(&verdict)?;
    match &verdict {
        GradingVerdict::Accepted { .. } => {}
        GradingVerdict::BelowThreshold { .. } => {
            println!("Assignment did not meet minimum correctness threshold.");
        }
        GradingVerdict::Unparsed { .. } => {
            println!("Could not parse model output as JSON; leaving job as success.");
        }
    }

    if verdict.passed() { Ok(0) } else { Ok(1) }
}
