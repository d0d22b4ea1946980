//! Linear interpolation of complex frequency-domain data
//!
//! Used to evaluate calibration terms, Touchstone DUT data and time-domain
//! input at frequencies that are not on the stored grid.

use num_complex::Complex64;

/// Linearly interpolate `values` (sampled at ascending `f`) at `f_new`.
///
/// Points outside the stored range are linearly extrapolated from the two
/// nearest samples. A single sample is returned as a constant.
pub fn interpolate_complex(f: &[f64], values: &[Complex64], f_new: f64) -> Complex64 {
    let n = f.len().min(values.len());

    if n == 0 {
        return Complex64::new(0.0, 0.0);
    }

    if n == 1 {
        return values[0];
    }

    let idx = if f_new <= f[0] {
        0
    } else if f_new >= f[n - 1] {
        n - 2
    } else {
        // First index with f >= f_new, minus one, is the left bracket
        f[..n].partition_point(|&x| x < f_new).saturating_sub(1).min(n - 2)
    };

    let span = f[idx + 1] - f[idx];
    if span.abs() < crate::constants::NEAR_ZERO {
        return values[idx];
    }
    let t = (f_new - f[idx]) / span;
    values[idx] * (1.0 - t) + values[idx + 1] * t
}

/// Interpolate `values` onto every frequency in `f_new`.
pub fn interpolate_complex_all(f: &[f64], values: &[Complex64], f_new: &[f64]) -> Vec<Complex64> {
    f_new
        .iter()
        .map(|&x| interpolate_complex(f, values, x))
        .collect()
}
