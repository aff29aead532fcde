//! Elementwise comparison of numeric tables under an absolute plus relative band.

use super::artifacts::{CompareError, ensure_present};
use super::table::{ParseStage, Table, load_table};
use crate::common::TolerancePolicy;
use crate::domain::{ArtifactRole, TableShape};
use crate::numerics::{compare_element, format_numeric};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElementFailure {
    pub row: usize,
    pub column: usize,
    pub expected: f64,
    pub actual: f64,
    pub diff: f64,
    pub band: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericMismatch {
    pub max_diff: f64,
    pub failing_count: usize,
    pub first_failure: ElementFailure,
    pub abs_tol: f64,
    pub rel_tol: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NumericOutcome {
    Pass {
        max_diff: f64,
    },
    ShapeMismatch {
        expected: TableShape,
        actual: TableShape,
    },
    ContentMismatch(NumericMismatch),
}

impl NumericOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    /// One-line reason naming the compared artifact.
    pub fn describe(&self, label: &str) -> String {
        match self {
            Self::Pass { max_diff } => format!(
                "Numeric match in {label}: max_diff={}",
                format_numeric(*max_diff)
            ),
            Self::ShapeMismatch { expected, actual } => format!(
                "Shape mismatch in {label}: baseline={expected}, actual={actual}"
            ),
            Self::ContentMismatch(mismatch) => {
                let failure = &mismatch.first_failure;
                format!(
                    "Numeric mismatch in {label}: max_diff={} at index ({}, {}) \
                     (baseline={}, actual={}, diff={}, tol={}, abs_tol={}, rel_tol={})",
                    format_numeric(mismatch.max_diff),
                    failure.row,
                    failure.column,
                    format_numeric(failure.expected),
                    format_numeric(failure.actual),
                    format_numeric(failure.diff),
                    format_numeric(failure.band),
                    format_numeric(mismatch.abs_tol),
                    format_numeric(mismatch.rel_tol),
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericComparison {
    pub outcome: NumericOutcome,
    pub baseline_stage: ParseStage,
    pub actual_stage: ParseStage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericComparator {
    abs_tol: f64,
    rel_tol: f64,
}

impl NumericComparator {
    pub fn new(abs_tol: f64, rel_tol: f64) -> Self {
        Self { abs_tol, rel_tol }
    }

    pub fn from_policy(policy: &TolerancePolicy) -> Self {
        Self::new(policy.abs_tol, policy.rel_tol)
    }

    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    pub fn compare(
        &self,
        expected_path: impl AsRef<Path>,
        actual_path: impl AsRef<Path>,
    ) -> Result<NumericComparison, CompareError> {
        let expected_path = expected_path.as_ref();
        let actual_path = actual_path.as_ref();
        ensure_present(ArtifactRole::Baseline, expected_path)?;
        ensure_present(ArtifactRole::Actual, actual_path)?;

        let expected = load_table(expected_path)?;
        let actual = load_table(actual_path)?;
        Ok(NumericComparison {
            outcome: compare_tables(&expected.table, &actual.table, self.abs_tol, self.rel_tol),
            baseline_stage: expected.stage,
            actual_stage: actual.stage,
        })
    }
}

pub fn compare_tables(expected: &Table, actual: &Table, abs_tol: f64, rel_tol: f64) -> NumericOutcome {
    if expected.shape() != actual.shape() {
        return NumericOutcome::ShapeMismatch {
            expected: expected.shape(),
            actual: actual.shape(),
        };
    }

    let columns = expected.shape().columns;
    let mut max_diff = 0.0_f64;
    let mut failing_count = 0usize;
    let mut first_failure = None;

    for (index, (&expected_value, &actual_value)) in
        expected.values().iter().zip(actual.values()).enumerate()
    {
        let element = compare_element(expected_value, actual_value, abs_tol, rel_tol);
        // f64::max would drop a NaN diff; it has to propagate.
        if element.diff.is_nan() || max_diff.is_nan() {
            max_diff = f64::NAN;
        } else if element.diff > max_diff {
            max_diff = element.diff;
        }

        if element.passes {
            continue;
        }
        failing_count += 1;
        if first_failure.is_none() {
            first_failure = Some(ElementFailure {
                row: index / columns,
                column: index % columns,
                expected: expected_value,
                actual: actual_value,
                diff: element.diff,
                band: element.band,
            });
        }
    }

    match first_failure {
        None => NumericOutcome::Pass { max_diff },
        Some(first_failure) => NumericOutcome::ContentMismatch(NumericMismatch {
            max_diff,
            failing_count,
            first_failure,
            abs_tol,
            rel_tol,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{NumericComparator, NumericOutcome, compare_tables};
    use crate::common::TolerancePolicy;
    use crate::domain::TableShape;
    use crate::modules::artifacts::CompareError;
    use crate::modules::table::{ParseStage, Table};
    use std::fs;
    use tempfile::TempDir;

    fn table(rows: &[&[f64]]) -> Table {
        Table::from_rows(rows.iter().map(|row| row.to_vec()).collect())
            .expect("test table should be rectangular")
    }

    #[test]
    fn within_band_passes_and_reports_max_diff() {
        let outcome = compare_tables(&table(&[&[1.0, 2.0]]), &table(&[&[1.0, 2.25]]), 0.5, 0.0);
        assert_eq!(outcome, NumericOutcome::Pass { max_diff: 0.25 });
    }

    #[test]
    fn first_failure_follows_row_major_order() {
        let expected = table(&[&[0.0, 0.0], &[0.0, 0.0]]);
        let actual = table(&[&[0.0, 0.0], &[5.0, 9.0]]);
        match compare_tables(&expected, &actual, 1.0, 0.0) {
            NumericOutcome::ContentMismatch(mismatch) => {
                assert_eq!(mismatch.failing_count, 2);
                assert_eq!(mismatch.max_diff, 9.0);
                assert_eq!(
                    (mismatch.first_failure.row, mismatch.first_failure.column),
                    (1, 0)
                );
                assert_eq!(mismatch.first_failure.diff, 5.0);
                assert_eq!(mismatch.first_failure.band, 1.0);
            }
            other => panic!("expected content mismatch, got {other:?}"),
        }
    }

    #[test]
    fn relative_tolerance_scales_with_baseline_magnitude() {
        let expected = table(&[&[1000.0, 1.0]]);
        let actual = table(&[&[1009.0, 1.009]]);
        assert!(compare_tables(&expected, &actual, 0.0, 0.01).passed());
        assert!(!compare_tables(&expected, &actual, 0.0, 0.001).passed());
    }

    #[test]
    fn shape_mismatch_skips_elementwise_pass() {
        let expected = table(&[&[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]]);
        let actual = table(&[&[1.0, 2.0, 0.0], &[3.0, 4.0, 0.0], &[5.0, 6.0, 0.0]]);
        assert_eq!(
            compare_tables(&expected, &actual, 100.0, 100.0),
            NumericOutcome::ShapeMismatch {
                expected: TableShape {
                    rows: 3,
                    columns: 2
                },
                actual: TableShape {
                    rows: 3,
                    columns: 3
                },
            }
        );
    }

    #[test]
    fn nan_diff_poisons_max_diff_and_fails() {
        let expected = table(&[&[1.0, f64::NAN, 2.0]]);
        let actual = table(&[&[f64::NAN, f64::NAN, 2.0]]);
        match compare_tables(&expected, &actual, 1.0, 1.0) {
            NumericOutcome::ContentMismatch(mismatch) => {
                assert!(mismatch.max_diff.is_nan());
                assert_eq!(mismatch.failing_count, 1);
                assert_eq!(mismatch.first_failure.column, 0);
            }
            other => panic!("expected content mismatch, got {other:?}"),
        }

        let identical = table(&[&[f64::NAN, f64::INFINITY]]);
        assert_eq!(
            compare_tables(&identical, &identical, 0.0, 0.0),
            NumericOutcome::Pass { max_diff: 0.0 }
        );
    }

    #[test]
    fn describe_renders_first_failure_details() {
        let outcome = compare_tables(&table(&[&[1.0, 2.0]]), &table(&[&[1.0, 4.0]]), 0.5, 0.25);
        assert_eq!(
            outcome.describe("test000_xy.txt"),
            "Numeric mismatch in test000_xy.txt: max_diff=2 at index (0, 1) \
             (baseline=2, actual=4, diff=2, tol=1, abs_tol=0.5, rel_tol=0.25)"
        );
    }

    #[test]
    fn comparator_loads_files_and_records_parse_stage() {
        let temp = TempDir::new().expect("tempdir should be created");
        let baseline = temp.path().join("baseline_xy.txt");
        let actual = temp.path().join("actual_xy.txt");
        fs::write(&baseline, "x\ty\n0\t1\n").expect("baseline should be written");
        fs::write(&actual, "0\t1.0000001\n").expect("actual should be written");

        let policy = TolerancePolicy::new(0.0, 1e-3, 0.0).expect("policy should be valid");
        let comparison = NumericComparator::from_policy(&policy)
            .compare(&baseline, &actual)
            .expect("comparison should run");
        assert!(comparison.outcome.passed());
        assert_eq!(comparison.baseline_stage, ParseStage::HeaderSkipped);
        assert_eq!(comparison.actual_stage, ParseStage::Strict);
    }

    #[test]
    fn comparator_surfaces_load_errors() {
        let temp = TempDir::new().expect("tempdir should be created");
        let baseline = temp.path().join("baseline_xy.txt");
        let actual = temp.path().join("actual_xy.txt");
        fs::write(&baseline, "1\t2\n").expect("baseline should be written");
        fs::write(&actual, "1\t2\n3\n").expect("actual should be written");

        let comparator = NumericComparator::new(0.0, 0.0);
        let error = comparator
            .compare(&baseline, &actual)
            .expect_err("ragged actual should fail");
        assert!(matches!(error, CompareError::Load(_)));

        let missing = comparator
            .compare(temp.path().join("none_xy.txt"), &actual)
            .expect_err("missing baseline should fail");
        assert!(missing.is_artifact_missing());
    }
}
