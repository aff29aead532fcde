use super::CliError;
use anyhow::Context;
use nbregress_core::common::{TolerancePolicy, repo_root_from_env};
use nbregress_core::domain::HarnessError;
use nbregress_core::modules::discovery::{BaselineSource, DiscoveryRules};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(clap::Args, Default)]
pub(super) struct ToleranceFlags {
    /// Image RMS tolerance (overrides IMG_TOL)
    #[arg(long)]
    pub(super) image_tol: Option<f64>,

    /// Absolute numeric tolerance (overrides XY_ABS_TOL)
    #[arg(long)]
    pub(super) abs_tol: Option<f64>,

    /// Relative numeric tolerance (overrides XY_REL_TOL)
    #[arg(long)]
    pub(super) rel_tol: Option<f64>,
}

impl ToleranceFlags {
    /// Environment tolerances with any flag given on the command line taking precedence.
    pub(super) fn resolve(&self) -> Result<TolerancePolicy, CliError> {
        TolerancePolicy::from_env()
            .and_then(|policy| policy.with_overrides(self.image_tol, self.abs_tol, self.rel_tol))
            .map_err(|error| CliError::Harness(error.into()))
    }
}

pub(super) fn current_working_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("failed to read current working directory")
}

pub(super) fn resolve_repo_root(repo_root: Option<&Path>) -> Result<PathBuf, CliError> {
    match repo_root {
        Some(path) => Ok(resolve_cli_path(&current_working_dir()?, path)),
        None => repo_root_from_env().map_err(|error| CliError::Harness(error.into())),
    }
}

pub(super) fn resolve_cli_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

pub(super) fn discovery_rules(
    image_globs: Vec<String>,
    table_globs: Vec<String>,
    shared_image_baseline: Option<String>,
    shared_table_baseline: Option<String>,
) -> DiscoveryRules {
    let defaults = DiscoveryRules::default();
    DiscoveryRules {
        image_globs: non_empty_or(image_globs, defaults.image_globs),
        table_globs: non_empty_or(table_globs, defaults.table_globs),
        image_source: shared_image_baseline.map_or(BaselineSource::SameName, BaselineSource::Shared),
        table_source: shared_table_baseline.map_or(BaselineSource::SameName, BaselineSource::Shared),
    }
}

fn non_empty_or(values: Vec<String>, fallback: Vec<String>) -> Vec<String> {
    if values.is_empty() { fallback } else { values }
}

pub(super) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{}", rendered);
    Ok(())
}

pub(super) fn harness_error(error: impl Into<HarnessError>) -> CliError {
    CliError::Harness(error.into())
}

#[cfg(test)]
mod tests {
    use super::{discovery_rules, resolve_cli_path};
    use nbregress_core::modules::discovery::BaselineSource;
    use std::path::{Path, PathBuf};

    #[test]
    fn relative_paths_resolve_against_base_dir() {
        assert_eq!(
            resolve_cli_path(Path::new("/repo"), Path::new("baseline")),
            PathBuf::from("/repo/baseline")
        );
        assert_eq!(
            resolve_cli_path(Path::new("/repo"), Path::new("/elsewhere/results")),
            PathBuf::from("/elsewhere/results")
        );
    }

    #[test]
    fn discovery_flags_fall_back_to_defaults() {
        let rules = discovery_rules(Vec::new(), vec!["*.tsv".to_string()], Some("test000.png".to_string()), None);
        assert_eq!(rules.image_globs, vec!["*.png".to_string()]);
        assert_eq!(rules.table_globs, vec!["*.tsv".to_string()]);
        assert_eq!(
            rules.image_source,
            BaselineSource::Shared("test000.png".to_string())
        );
        assert_eq!(rules.table_source, BaselineSource::SameName);
    }
}
