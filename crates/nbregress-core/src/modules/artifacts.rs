use super::table::TableLoadError;
use crate::domain::{ArtifactRole, HarnessError};
use std::path::{Path, PathBuf};

/// Harness-level failure for a single pair. These are kept apart from content
/// mismatches, which are outcomes rather than errors.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("missing {role} artifact: {}", .path.display())]
    ArtifactMissing { role: ArtifactRole, path: PathBuf },
    #[error("failed to decode image '{}': {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error(transparent)]
    Load(#[from] TableLoadError),
}

impl CompareError {
    pub fn is_artifact_missing(&self) -> bool {
        matches!(self, Self::ArtifactMissing { .. })
    }
}

impl From<CompareError> for HarnessError {
    fn from(error: CompareError) -> Self {
        let message = error.to_string();
        match error {
            CompareError::ArtifactMissing { .. } => {
                HarnessError::input_validation("INPUT.ARTIFACT_MISSING", message)
            }
            CompareError::Decode { .. } => {
                HarnessError::input_validation("INPUT.IMAGE_DECODE", message)
            }
            CompareError::Load(source) => source.into(),
        }
    }
}

pub(crate) fn ensure_present(role: ArtifactRole, path: &Path) -> Result<(), CompareError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CompareError::ArtifactMissing {
            role,
            path: path.to_path_buf(),
        })
    }
}
