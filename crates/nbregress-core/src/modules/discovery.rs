//! Pairing of baseline and result artifacts by file-name convention.

use super::image::DIFF_ARTIFACT_SUFFIX;
use crate::domain::{ArtifactKind, ArtifactPair, ArtifactRole, HarnessError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_IMAGE_GLOBS: &[&str] = &["*.png"];
pub const DEFAULT_TABLE_GLOBS: &[&str] = &["*_xy.txt"];

/// Where the baseline for an artifact kind comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "mode", content = "name", rename_all = "snake_case")]
pub enum BaselineSource {
    /// `baseline/<name>` is compared with `results/<name>`.
    #[default]
    SameName,
    /// One baseline file is compared with every result of the kind.
    Shared(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryRules {
    pub image_globs: Vec<String>,
    pub table_globs: Vec<String>,
    pub image_source: BaselineSource,
    pub table_source: BaselineSource,
}

impl Default for DiscoveryRules {
    fn default() -> Self {
        Self {
            image_globs: DEFAULT_IMAGE_GLOBS.iter().map(|glob| glob.to_string()).collect(),
            table_globs: DEFAULT_TABLE_GLOBS.iter().map(|glob| glob.to_string()).collect(),
            image_source: BaselineSource::SameName,
            table_source: BaselineSource::SameName,
        }
    }
}

impl DiscoveryRules {
    fn source_for(&self, kind: ArtifactKind) -> &BaselineSource {
        match kind {
            ArtifactKind::Image => &self.image_source,
            ArtifactKind::Table => &self.table_source,
        }
    }
}

/// A pair where one side was never produced or never accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedArtifact {
    pub pair: ArtifactPair,
    pub missing: ArtifactRole,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoveredArtifacts {
    pub pairs: Vec<ArtifactPair>,
    pub unmatched: Vec<UnmatchedArtifact>,
}

impl DiscoveredArtifacts {
    pub fn len(&self) -> usize {
        self.pairs.len() + self.unmatched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("baseline directory '{}' does not exist", .0.display())]
    MissingBaselineDir(PathBuf),
    #[error("failed to read directory '{}': {source}", .path.display())]
    ReadDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid artifact glob '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        source: globset::Error,
    },
}

impl From<DiscoveryError> for HarnessError {
    fn from(error: DiscoveryError) -> Self {
        let message = error.to_string();
        match error {
            DiscoveryError::MissingBaselineDir(_) => {
                HarnessError::input_validation("INPUT.BASELINE_DIR", message)
            }
            DiscoveryError::ReadDirectory { .. } => {
                HarnessError::io_system("IO.DISCOVERY", message)
            }
            DiscoveryError::InvalidGlob { .. } => {
                HarnessError::input_validation("INPUT.ARTIFACT_GLOB", message)
            }
        }
    }
}

pub fn discover_pairs(
    baseline_dir: impl AsRef<Path>,
    results_dir: impl AsRef<Path>,
    rules: &DiscoveryRules,
) -> Result<DiscoveredArtifacts, DiscoveryError> {
    let baseline_dir = baseline_dir.as_ref();
    let results_dir = results_dir.as_ref();
    if !baseline_dir.is_dir() {
        return Err(DiscoveryError::MissingBaselineDir(baseline_dir.to_path_buf()));
    }

    let classifier = Classifier::new(rules)?;
    let baselines = classifier.classify(list_files(baseline_dir)?);
    let results = if results_dir.is_dir() {
        classifier.classify(list_files(results_dir)?)
    } else {
        debug!(path = %results_dir.display(), "results directory absent, treating as empty");
        BTreeMap::new()
    };

    let mut discovered = DiscoveredArtifacts::default();
    for kind in [ArtifactKind::Image, ArtifactKind::Table] {
        let baseline_names = names_of_kind(&baselines, kind);
        let result_names = names_of_kind(&results, kind);
        match rules.source_for(kind) {
            BaselineSource::SameName => pair_by_name(
                &mut discovered,
                kind,
                baseline_dir,
                results_dir,
                &baseline_names,
                &result_names,
            ),
            BaselineSource::Shared(name) => pair_with_shared(
                &mut discovered,
                kind,
                baseline_dir,
                results_dir,
                name,
                &result_names,
            ),
        }
    }

    discovered
        .pairs
        .sort_by(|left, right| (&left.key, left.kind).cmp(&(&right.key, right.kind)));
    discovered.unmatched.sort_by(|left, right| {
        (&left.pair.key, left.pair.kind).cmp(&(&right.pair.key, right.pair.kind))
    });
    debug!(
        pairs = discovered.pairs.len(),
        unmatched = discovered.unmatched.len(),
        "artifact discovery finished"
    );
    Ok(discovered)
}

fn pair_by_name(
    discovered: &mut DiscoveredArtifacts,
    kind: ArtifactKind,
    baseline_dir: &Path,
    results_dir: &Path,
    baseline_names: &[&str],
    result_names: &[&str],
) {
    for name in result_names {
        let pair = ArtifactPair::new(*name, kind, baseline_dir.join(name), results_dir.join(name));
        if baseline_names.contains(name) {
            discovered.pairs.push(pair);
        } else {
            discovered.unmatched.push(UnmatchedArtifact {
                pair,
                missing: ArtifactRole::Baseline,
            });
        }
    }
    for name in baseline_names {
        if !result_names.contains(name) {
            discovered.unmatched.push(UnmatchedArtifact {
                pair: ArtifactPair::new(
                    *name,
                    kind,
                    baseline_dir.join(name),
                    results_dir.join(name),
                ),
                missing: ArtifactRole::Actual,
            });
        }
    }
}

fn pair_with_shared(
    discovered: &mut DiscoveredArtifacts,
    kind: ArtifactKind,
    baseline_dir: &Path,
    results_dir: &Path,
    shared_name: &str,
    result_names: &[&str],
) {
    let baseline_path = baseline_dir.join(shared_name);
    let baseline_present = baseline_path.is_file();

    if result_names.is_empty() {
        discovered.unmatched.push(UnmatchedArtifact {
            pair: ArtifactPair::new(
                shared_name,
                kind,
                baseline_path.clone(),
                results_dir.join(shared_name),
            ),
            missing: if baseline_present {
                ArtifactRole::Actual
            } else {
                ArtifactRole::Baseline
            },
        });
        return;
    }

    for name in result_names {
        let pair = ArtifactPair::new(*name, kind, baseline_path.clone(), results_dir.join(name));
        if baseline_present {
            discovered.pairs.push(pair);
        } else {
            discovered.unmatched.push(UnmatchedArtifact {
                pair,
                missing: ArtifactRole::Baseline,
            });
        }
    }
}

struct Classifier {
    images: GlobSet,
    tables: GlobSet,
}

impl Classifier {
    fn new(rules: &DiscoveryRules) -> Result<Self, DiscoveryError> {
        Ok(Self {
            images: build_glob_set(&rules.image_globs)?,
            tables: build_glob_set(&rules.table_globs)?,
        })
    }

    fn kind_of(&self, name: &str) -> Option<ArtifactKind> {
        if name.ends_with(DIFF_ARTIFACT_SUFFIX) {
            return None;
        }
        if self.images.is_match(name) {
            Some(ArtifactKind::Image)
        } else if self.tables.is_match(name) {
            Some(ArtifactKind::Table)
        } else {
            None
        }
    }

    fn classify(&self, names: Vec<String>) -> BTreeMap<String, ArtifactKind> {
        names
            .into_iter()
            .filter_map(|name| self.kind_of(&name).map(|kind| (name, kind)))
            .collect()
    }
}

fn build_glob_set(patterns: &[String]) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| DiscoveryError::InvalidGlob {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| DiscoveryError::InvalidGlob {
        pattern: patterns.join(","),
        source,
    })
}

fn names_of_kind(classified: &BTreeMap<String, ArtifactKind>, kind: ArtifactKind) -> Vec<&str> {
    classified
        .iter()
        .filter(|(_, candidate)| **candidate == kind)
        .map(|(name, _)| name.as_str())
        .collect()
}

fn list_files(dir: &Path) -> Result<Vec<String>, DiscoveryError> {
    let read_error = |source: std::io::Error| DiscoveryError::ReadDirectory {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        if entry.file_type().map_err(read_error)?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
