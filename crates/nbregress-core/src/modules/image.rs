//! Raster image comparison.
//!
//! A dimension check runs first and short-circuits everything else. Images of equal
//! size are compared by RMS distance over 8-bit channel values; the pair passes when
//! `rms <= tolerance`. On a content mismatch a diff image can be written next to the
//! actual artifact. Writing it is best-effort and never changes the outcome.

use super::artifacts::{CompareError, ensure_present};
use super::hashing::sha256_file;
use crate::domain::{ArtifactRole, ImageSize};
use crate::numerics::{format_numeric, root_mean_square};
use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DIFF_ARTIFACT_SUFFIX: &str = "-failed-diff.png";

const DIFF_AMPLIFICATION: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageCompareOptions {
    pub tolerance: f64,
    pub emit_diff: bool,
    pub report_digests: bool,
}

impl ImageCompareOptions {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            emit_diff: false,
            report_digests: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageOutcome {
    Pass {
        rms: f64,
        tolerance: f64,
        channels: u8,
    },
    SizeMismatch {
        expected: ImageSize,
        actual: ImageSize,
    },
    ContentMismatch {
        rms: f64,
        tolerance: f64,
        channels: u8,
        diff_artifact: Option<PathBuf>,
    },
}

impl ImageOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Pass { rms, tolerance, .. } => format!(
                "Image match (rms={}, tol={})",
                format_numeric(*rms),
                format_numeric(*tolerance)
            ),
            Self::SizeMismatch { expected, actual } => format!(
                "Size mismatch: baseline={}, actual={}",
                expected, actual
            ),
            Self::ContentMismatch {
                rms,
                tolerance,
                diff_artifact,
                ..
            } => {
                let mut message = format!(
                    "Image mismatch (rms={}, tol={})",
                    format_numeric(*rms),
                    format_numeric(*tolerance)
                );
                if let Some(path) = diff_artifact {
                    message.push_str(&format!("; diff image: {}", path.display()));
                }
                message
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDigests {
    pub baseline: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageComparison {
    pub outcome: ImageOutcome,
    pub digests: Option<ImageDigests>,
}

pub struct ImageComparator {
    options: ImageCompareOptions,
}

impl ImageComparator {
    pub fn new(options: ImageCompareOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImageCompareOptions {
        &self.options
    }

    pub fn compare(
        &self,
        expected_path: impl AsRef<Path>,
        actual_path: impl AsRef<Path>,
    ) -> Result<ImageComparison, CompareError> {
        let expected_path = expected_path.as_ref();
        let actual_path = actual_path.as_ref();
        ensure_present(ArtifactRole::Baseline, expected_path)?;
        ensure_present(ArtifactRole::Actual, actual_path)?;

        let digests = self.options.report_digests.then(|| ImageDigests {
            baseline: digest_or_warn(expected_path),
            actual: digest_or_warn(actual_path),
        });

        let expected = decode_image(expected_path)?;
        let actual = decode_image(actual_path)?;
        let mut outcome = compare_decoded(&expected, &actual, self.options.tolerance);

        if self.options.emit_diff {
            if let ImageOutcome::ContentMismatch { diff_artifact, .. } = &mut outcome {
                *diff_artifact = match write_diff_artifact(&expected, &actual, actual_path) {
                    Ok(path) => Some(path),
                    Err(error) => {
                        warn!(
                            actual = %actual_path.display(),
                            %error,
                            "skipping diff image"
                        );
                        None
                    }
                };
            }
        }

        Ok(ImageComparison { outcome, digests })
    }
}

/// Compares two image files under `tolerance` without diff output or digests.
pub fn compare_images(
    expected_path: impl AsRef<Path>,
    actual_path: impl AsRef<Path>,
    tolerance: f64,
) -> Result<ImageOutcome, CompareError> {
    ImageComparator::new(ImageCompareOptions::with_tolerance(tolerance))
        .compare(expected_path, actual_path)
        .map(|comparison| comparison.outcome)
}

pub fn compare_decoded(expected: &DynamicImage, actual: &DynamicImage, tolerance: f64) -> ImageOutcome {
    let expected_size = image_size(expected);
    let actual_size = image_size(actual);
    if expected_size != actual_size {
        return ImageOutcome::SizeMismatch {
            expected: expected_size,
            actual: actual_size,
        };
    }

    let pixels = ChannelData::from_pair(expected, actual);
    let rms = pixels.rms();
    if rms <= tolerance {
        ImageOutcome::Pass {
            rms,
            tolerance,
            channels: pixels.channels,
        }
    } else {
        ImageOutcome::ContentMismatch {
            rms,
            tolerance,
            channels: pixels.channels,
            diff_artifact: None,
        }
    }
}

/// `<stem>-failed-diff.png` for a `.png` actual. Any other extension keeps the full
/// file name, so `plot.png` and `plot.PNG` never share a diff path.
pub fn diff_artifact_path(actual_path: &Path) -> Option<PathBuf> {
    let base = if actual_path.extension().is_some_and(|extension| extension == "png") {
        actual_path.file_stem()?.to_str()?
    } else {
        actual_path.file_name()?.to_str()?
    };
    Some(actual_path.with_file_name(format!("{base}{DIFF_ARTIFACT_SUFFIX}")))
}

#[derive(Debug, thiserror::Error)]
enum DiffArtifactError {
    #[error("actual path '{}' has no usable file name", .0.display())]
    FileName(PathBuf),
    #[error("pixel buffer does not match image dimensions")]
    Buffer,
    #[error(transparent)]
    Encode(#[from] image::ImageError),
}

fn write_diff_artifact(
    expected: &DynamicImage,
    actual: &DynamicImage,
    actual_path: &Path,
) -> Result<PathBuf, DiffArtifactError> {
    let output_path = diff_artifact_path(actual_path)
        .ok_or_else(|| DiffArtifactError::FileName(actual_path.to_path_buf()))?;
    let ImageSize { width, height } = image_size(actual);
    let pixels = ChannelData::from_pair(expected, actual);
    let amplified = pixels.amplified_difference();

    if pixels.channels == 4 {
        let image = RgbaImage::from_raw(width, height, amplified).ok_or(DiffArtifactError::Buffer)?;
        image.save(&output_path)?;
    } else {
        let image = RgbImage::from_raw(width, height, amplified).ok_or(DiffArtifactError::Buffer)?;
        image.save(&output_path)?;
    }
    Ok(output_path)
}

/// Both images flattened to the same channel layout: RGB unless either side has
/// translucent pixels, RGBA otherwise.
struct ChannelData {
    channels: u8,
    expected: Vec<u8>,
    actual: Vec<u8>,
}

impl ChannelData {
    fn from_pair(expected: &DynamicImage, actual: &DynamicImage) -> Self {
        if has_translucency(expected) || has_translucency(actual) {
            Self {
                channels: 4,
                expected: expected.to_rgba8().into_raw(),
                actual: actual.to_rgba8().into_raw(),
            }
        } else {
            Self {
                channels: 3,
                expected: expected.to_rgb8().into_raw(),
                actual: actual.to_rgb8().into_raw(),
            }
        }
    }

    fn rms(&self) -> f64 {
        let sum_of_squares = self
            .expected
            .iter()
            .zip(&self.actual)
            .map(|(expected, actual)| {
                let delta = i64::from(*actual) - i64::from(*expected);
                (delta * delta) as u64
            })
            .sum::<u64>();
        root_mean_square(sum_of_squares, self.expected.len())
    }

    fn amplified_difference(&self) -> Vec<u8> {
        let mut output = self
            .expected
            .iter()
            .zip(&self.actual)
            .map(|(expected, actual)| {
                let delta = (i32::from(*actual) - i32::from(*expected)).abs();
                (delta * DIFF_AMPLIFICATION).clamp(0, 255) as u8
            })
            .collect::<Vec<_>>();
        if self.channels == 4 {
            for alpha in output.iter_mut().skip(3).step_by(4) {
                *alpha = u8::MAX;
            }
        }
        output
    }
}

fn has_translucency(image: &DynamicImage) -> bool {
    image.color().has_alpha() && image.to_rgba8().pixels().any(|pixel| pixel[3] != u8::MAX)
}

fn image_size(image: &DynamicImage) -> ImageSize {
    let (width, height) = image.dimensions();
    ImageSize { width, height }
}

fn decode_image(path: &Path) -> Result<DynamicImage, CompareError> {
    image::open(path).map_err(|source| CompareError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn digest_or_warn(path: &Path) -> Option<String> {
    match sha256_file(path) {
        Ok(digest) => Some(digest),
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to compute artifact digest");
            None
        }
    }
}
