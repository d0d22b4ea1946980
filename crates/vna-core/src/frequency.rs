//! Frequency units and sweep spacing helpers
//!
//! Generates the frequency lists behind uniform and logarithmic sweeps and
//! classifies existing lists (uniform, harmonic).

use crate::constants::GRID_REL_TOL;

/// Frequency unit enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequencyUnit {
    #[default]
    Hz,
    KHz,
    MHz,
    GHz,
}

impl FrequencyUnit {
    /// Get the multiplier to convert to Hz
    pub fn multiplier(&self) -> f64 {
        match self {
            FrequencyUnit::Hz => 1.0,
            FrequencyUnit::KHz => 1e3,
            FrequencyUnit::MHz => 1e6,
            FrequencyUnit::GHz => 1e9,
        }
    }

    /// Touchstone option-line spelling
    pub fn label(&self) -> &'static str {
        match self {
            FrequencyUnit::Hz => "HZ",
            FrequencyUnit::KHz => "KHZ",
            FrequencyUnit::MHz => "MHZ",
            FrequencyUnit::GHz => "GHZ",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hz" => Some(FrequencyUnit::Hz),
            "khz" => Some(FrequencyUnit::KHz),
            "mhz" => Some(FrequencyUnit::MHz),
            "ghz" => Some(FrequencyUnit::GHz),
            _ => None,
        }
    }
}

/// `npoints` frequencies from `start_hz` to `stop_hz` inclusive, equally spaced.
///
/// A single point sits at `start_hz`. The last point is pinned to `stop_hz`
/// so that accumulated rounding never moves the end of the sweep.
pub fn linear_spacing(start_hz: f64, stop_hz: f64, npoints: usize) -> Vec<f64> {
    match npoints {
        0 => Vec::new(),
        1 => vec![start_hz],
        n => {
            let step = (stop_hz - start_hz) / (n - 1) as f64;
            (0..n)
                .map(|i| {
                    if i == n - 1 {
                        stop_hz
                    } else {
                        start_hz + i as f64 * step
                    }
                })
                .collect()
        }
    }
}

/// Frequencies starting at `start_hz`, each `ratio` times the previous one,
/// while strictly below `stop_hz`.
///
/// Generation stops after `max_points + 1` values, so a caller can detect a
/// sweep that would exceed its limit without building all of it.
pub fn ratio_spacing(start_hz: f64, stop_hz: f64, ratio: f64, max_points: usize) -> Vec<f64> {
    let mut f = Vec::new();
    if !(ratio > 1.0) || !(start_hz > 0.0) {
        return f;
    }
    let mut current = start_hz;
    while current < stop_hz && f.len() <= max_points {
        f.push(current);
        current *= ratio;
    }
    f
}

/// True when consecutive frequencies share one step (within tolerance).
pub fn is_uniform(f: &[f64]) -> bool {
    if f.len() < 3 {
        return true;
    }
    let step = f[1] - f[0];
    let tol = GRID_REL_TOL * step.abs().max(f64::MIN_POSITIVE);
    f.windows(2).all(|w| ((w[1] - w[0]) - step).abs() <= tol)
}

/// True when `f[k] == (k + 1) * f[0]` for every point, i.e. the list is a
/// DC-free harmonic grid suitable for a low-pass time-domain transform.
pub fn is_harmonic(f: &[f64]) -> bool {
    match f.first() {
        Some(&f0) if f0 > 0.0 => f
            .iter()
            .enumerate()
            .all(|(k, &fk)| (fk - (k + 1) as f64 * f0).abs() <= GRID_REL_TOL * fk),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_spacing_endpoints() {
        let f = linear_spacing(1e9, 10e9, 10);
        assert_eq!(f.len(), 10);
        assert_eq!(f[0], 1e9);
        assert_eq!(f[9], 10e9);
        assert_relative_eq!(f[1] - f[0], 1e9, epsilon = 1e-3);
    }

    #[test]
    fn test_linear_spacing_single_point() {
        assert_eq!(linear_spacing(5e6, 6e9, 1), vec![5e6]);
        assert!(linear_spacing(5e6, 6e9, 0).is_empty());
    }

    #[test]
    fn test_ratio_spacing() {
        let f = ratio_spacing(0.3e6, 8.5e9, 1.01, 10_000);
        assert_eq!(f[0], 0.3e6);
        assert!(*f.last().unwrap() < 8.5e9);
        let ratios: Vec<f64> = f.windows(2).map(|w| w[1] / w[0]).collect();
        for r in ratios {
            assert_relative_eq!(r, 1.01, epsilon = 1e-12);
        }
        assert!(ratio_spacing(1.0, 10.0, 1.0, 100).is_empty());

        // Capped one past the limit
        assert_eq!(ratio_spacing(0.3e6, 8.5e9, 1.0 + 1e-6, 100).len(), 101);
        assert_eq!(ratio_spacing(1.0, f64::INFINITY, 2.0, 50).len(), 51);
    }

    #[test]
    fn test_grid_classification() {
        assert!(is_uniform(&linear_spacing(1e6, 6e9, 2001)));
        assert!(!is_uniform(&ratio_spacing(1e6, 1e9, 1.1, 1000)));

        let harmonic: Vec<f64> = (1..=512).map(|k| k as f64 * 0.3e6).collect();
        assert!(is_harmonic(&harmonic));
        assert!(!is_harmonic(&linear_spacing(1e6, 6e9, 11)));
    }

    #[test]
    fn test_frequency_unit_from_str() {
        assert_eq!(FrequencyUnit::from_str("ghz"), Some(FrequencyUnit::GHz));
        assert_eq!(FrequencyUnit::from_str("MHz"), Some(FrequencyUnit::MHz));
        assert_eq!(FrequencyUnit::from_str("invalid"), None);
        assert_eq!(FrequencyUnit::KHz.multiplier(), 1e3);
    }
}
