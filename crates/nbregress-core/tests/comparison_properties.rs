use image::{DynamicImage, Rgb, RgbImage};
use nbregress_core::domain::{ImageSize, TableShape};
use nbregress_core::modules::image::{ImageOutcome, compare_decoded, compare_images};
use nbregress_core::modules::numeric::{NumericComparator, NumericOutcome, compare_tables};
use nbregress_core::modules::table::Table;
use proptest::prelude::*;
use std::fs;
use tempfile::TempDir;

fn table(rows: &[&[f64]]) -> Table {
    Table::from_rows(rows.iter().map(|row| row.to_vec()).collect())
        .expect("table should be rectangular")
}

#[test]
fn scenario_a_small_difference_within_absolute_tolerance_passes() {
    let outcome = compare_tables(&table(&[&[1.0, 2.0]]), &table(&[&[1.0, 2.05]]), 0.1, 0.0);
    assert!(outcome.passed(), "expected pass, got {outcome:?}");
}

#[test]
fn scenario_b_tight_tolerance_reports_first_failing_index() {
    let outcome = compare_tables(&table(&[&[1.0, 2.0]]), &table(&[&[1.0, 2.05]]), 0.01, 0.0);
    let NumericOutcome::ContentMismatch(mismatch) = outcome else {
        panic!("expected content mismatch, got {outcome:?}");
    };
    let failure = mismatch.first_failure;
    assert_eq!((failure.row, failure.column), (0, 1));
    assert!((failure.diff - 0.05).abs() < 1e-9);
    assert_eq!(failure.band, 0.01);
    assert!((mismatch.max_diff - 0.05).abs() < 1e-9);
    assert_eq!(mismatch.failing_count, 1);
}

#[test]
fn scenario_c_dimension_mismatch_is_reported_without_distance() {
    let temp = TempDir::new().expect("tempdir should be created");
    let baseline = temp.path().join("baseline.png");
    let actual = temp.path().join("actual.png");
    RgbImage::from_pixel(100, 50, Rgb([0, 0, 0]))
        .save(&baseline)
        .expect("baseline should be saved");
    RgbImage::from_pixel(100, 60, Rgb([0, 0, 0]))
        .save(&actual)
        .expect("actual should be saved");

    let outcome = compare_images(&baseline, &actual, 255.0).expect("comparison should run");
    assert_eq!(
        outcome,
        ImageOutcome::SizeMismatch {
            expected: ImageSize {
                width: 100,
                height: 50
            },
            actual: ImageSize {
                width: 100,
                height: 60
            },
        }
    );
}

#[test]
fn scenario_d_column_count_mismatch_is_a_shape_mismatch() {
    let temp = TempDir::new().expect("tempdir should be created");
    let baseline = temp.path().join("baseline_xy.txt");
    let actual = temp.path().join("actual_xy.txt");
    fs::write(&baseline, "1\t2\n3\t4\n5\t6\n").expect("baseline should be written");
    fs::write(&actual, "1\t2\t7\n3\t4\t8\n5\t6\t9\n").expect("actual should be written");

    let comparison = NumericComparator::new(1.0, 1.0)
        .compare(&baseline, &actual)
        .expect("comparison should run");
    assert_eq!(
        comparison.outcome,
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
fn any_single_differing_element_fails_at_zero_tolerance() {
    let baseline = table(&[&[0.0, 1.0, 2.0], &[3.0, 4.0, 5.0]]);
    for index in 0..6 {
        let mut rows = vec![vec![0.0, 1.0, 2.0], vec![3.0, 4.0, 5.0]];
        rows[index / 3][index % 3] += 1e-12;
        let actual = Table::from_rows(rows).expect("rectangular");
        match compare_tables(&baseline, &actual, 0.0, 0.0) {
            NumericOutcome::ContentMismatch(mismatch) => {
                assert_eq!(mismatch.first_failure.row, index / 3);
                assert_eq!(mismatch.first_failure.column, index % 3);
            }
            other => panic!("element {index} should fail, got {other:?}"),
        }
    }
}

fn finite_value() -> impl Strategy<Value = f64> + Clone {
    -1.0e6..1.0e6_f64
}

fn table_pair() -> impl Strategy<Value = (Vec<Vec<f64>>, Vec<Vec<f64>>)> {
    (1usize..6, 1usize..5).prop_flat_map(|(rows, columns)| {
        let grid = prop::collection::vec(prop::collection::vec(finite_value(), columns), rows);
        (grid.clone(), grid)
    })
}

fn pixels(width: u32, height: u32) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), (width * height * 3) as usize)
}

proptest! {
    #[test]
    fn identical_tables_pass_at_any_tolerance(
        (rows, _) in table_pair(),
        abs_tol in 0.0..10.0_f64,
        rel_tol in 0.0..1.0_f64,
    ) {
        let table = Table::from_rows(rows).expect("rectangular");
        let outcome = compare_tables(&table, &table, abs_tol, rel_tol);
        prop_assert_eq!(outcome, NumericOutcome::Pass { max_diff: 0.0 });
    }

    #[test]
    fn widening_tolerances_never_turns_pass_into_fail(
        (expected, actual) in table_pair(),
        abs_tol in 0.0..1.0e5_f64,
        rel_tol in 0.0..1.0_f64,
        extra_abs in 0.0..1.0e5_f64,
        extra_rel in 0.0..1.0_f64,
    ) {
        let expected = Table::from_rows(expected).expect("rectangular");
        let actual = Table::from_rows(actual).expect("rectangular");
        let narrow = compare_tables(&expected, &actual, abs_tol, rel_tol);
        let wide = compare_tables(&expected, &actual, abs_tol + extra_abs, rel_tol + extra_rel);
        if narrow.passed() {
            prop_assert!(wide.passed());
        }
    }

    #[test]
    fn first_failure_is_stable_across_repeated_comparisons(
        (expected, actual) in table_pair(),
        abs_tol in 0.0..1.0e5_f64,
    ) {
        let expected = Table::from_rows(expected).expect("rectangular");
        let actual = Table::from_rows(actual).expect("rectangular");
        prop_assert_eq!(
            compare_tables(&expected, &actual, abs_tol, 0.0),
            compare_tables(&expected, &actual, abs_tol, 0.0)
        );
    }

    #[test]
    fn identical_images_pass_at_zero_tolerance(raw in pixels(5, 4)) {
        let image = DynamicImage::ImageRgb8(
            RgbImage::from_raw(5, 4, raw).expect("buffer matches dimensions"),
        );
        prop_assert!(compare_decoded(&image, &image, 0.0).passed());
    }

    #[test]
    fn differing_dimensions_are_never_content_mismatches(
        width in 1u32..8,
        height in 1u32..8,
        extra in 1u32..4,
        tolerance in 0.0..300.0_f64,
    ) {
        let expected = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let actual = DynamicImage::ImageRgb8(RgbImage::new(width, height + extra));
        let outcome = compare_decoded(&expected, &actual, tolerance);
        let is_size_mismatch = matches!(outcome, ImageOutcome::SizeMismatch { .. });
        prop_assert!(is_size_mismatch);
    }

    #[test]
    fn raising_image_tolerance_never_turns_pass_into_fail(
        expected in pixels(3, 3),
        actual in pixels(3, 3),
        tolerance in 0.0..200.0_f64,
        extra in 0.0..100.0_f64,
    ) {
        let expected = DynamicImage::ImageRgb8(RgbImage::from_raw(3, 3, expected).expect("3x3"));
        let actual = DynamicImage::ImageRgb8(RgbImage::from_raw(3, 3, actual).expect("3x3"));
        if compare_decoded(&expected, &actual, tolerance).passed() {
            prop_assert!(compare_decoded(&expected, &actual, tolerance + extra).passed());
        }
    }
}
