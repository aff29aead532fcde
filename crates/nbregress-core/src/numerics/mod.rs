/// Permitted deviation for a baseline value under the combined rule
/// `abs_tol + rel_tol * |expected|`.
pub fn permitted_band(expected: f64, abs_tol: f64, rel_tol: f64) -> f64 {
    abs_tol + rel_tol * expected.abs()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementComparison {
    pub diff: f64,
    pub band: f64,
    pub passes: bool,
}

pub fn compare_element(expected: f64, actual: f64, abs_tol: f64, rel_tol: f64) -> ElementComparison {
    let band = permitted_band(expected, abs_tol, rel_tol);

    // Equal infinities and NaN pairs are the same content.
    if expected == actual || (expected.is_nan() && actual.is_nan()) {
        return ElementComparison {
            diff: 0.0,
            band,
            passes: true,
        };
    }

    let diff = (actual - expected).abs();
    let passes = expected.is_finite() && actual.is_finite() && diff <= band;
    ElementComparison { diff, band, passes }
}

/// Root mean square from an exact sum of squared integer differences.
pub fn root_mean_square(sum_of_squares: u64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    (sum_of_squares as f64 / count as f64).sqrt()
}

pub fn format_numeric(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value.is_sign_positive() {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    format!("{value}")
}
