//! Run-wide configuration read from the process environment.
//!
//! The three tolerances default to `0.0`, which means pixel-perfect images and
//! exact numeric tables unless the environment (or the CLI) relaxes them.

use crate::domain::HarnessError;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

pub const IMAGE_TOLERANCE_ENV: &str = "IMG_TOL";
pub const ABSOLUTE_TOLERANCE_ENV: &str = "XY_ABS_TOL";
pub const RELATIVE_TOLERANCE_ENV: &str = "XY_REL_TOL";
pub const REPO_ROOT_ENV: &str = "REPO_ROOT";

pub const DEFAULT_BASELINE_DIR: &str = "baseline";
pub const DEFAULT_RESULTS_DIR: &str = "results";
pub const DEFAULT_NOTEBOOK_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct TolerancePolicy {
    pub image_tol: f64,
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl TolerancePolicy {
    pub fn new(image_tol: f64, abs_tol: f64, rel_tol: f64) -> Result<Self, ConfigError> {
        validate_tolerance(IMAGE_TOLERANCE_ENV, image_tol)?;
        validate_tolerance(ABSOLUTE_TOLERANCE_ENV, abs_tol)?;
        validate_tolerance(RELATIVE_TOLERANCE_ENV, rel_tol)?;
        Ok(Self {
            image_tol,
            abs_tol,
            rel_tol,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let image_tol = read_tolerance(&lookup, IMAGE_TOLERANCE_ENV)?;
        let abs_tol = read_tolerance(&lookup, ABSOLUTE_TOLERANCE_ENV)?;
        let rel_tol = read_tolerance(&lookup, RELATIVE_TOLERANCE_ENV)?;
        Self::new(image_tol, abs_tol, rel_tol)
    }

    /// Replaces any tolerance for which an override is given.
    pub fn with_overrides(
        self,
        image_tol: Option<f64>,
        abs_tol: Option<f64>,
        rel_tol: Option<f64>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            image_tol.unwrap_or(self.image_tol),
            abs_tol.unwrap_or(self.abs_tol),
            rel_tol.unwrap_or(self.rel_tol),
        )
    }
}

pub fn repo_root_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var_os(REPO_ROOT_ENV) {
        Some(root) if !root.is_empty() => Ok(PathBuf::from(root)),
        _ => std::env::current_dir().map_err(ConfigError::CurrentDir),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got '{value}'")]
    NotANumber { name: &'static str, value: String },
    #[error("{name} must be a finite, non-negative number, got {value}")]
    OutOfRange { name: &'static str, value: f64 },
    #[error("failed to read current working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

impl From<ConfigError> for HarnessError {
    fn from(error: ConfigError) -> Self {
        let message = error.to_string();
        match error {
            ConfigError::NotANumber { .. } | ConfigError::OutOfRange { .. } => {
                HarnessError::input_validation("INPUT.TOLERANCE", message)
            }
            ConfigError::CurrentDir(_) => HarnessError::io_system("IO.CURRENT_DIR", message),
        }
    }
}

fn read_tolerance<F>(lookup: &F, name: &'static str) -> Result<f64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(0.0);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed
        .parse::<f64>()
        .map_err(|_| ConfigError::NotANumber {
            name,
            value: raw.clone(),
        })
}

fn validate_tolerance(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, value })
    }
}
