//! Unit conversion functions
//!
//! Conversions between the representations of a complex S-parameter value
//! (real/imaginary, magnitude, dB, phase).

use num_complex::Complex64;
use std::f64::consts::PI;

/// Real part
#[inline]
pub fn to_real(z: Complex64) -> f64 {
    z.re
}

/// Imaginary part
#[inline]
pub fn to_imaginary(z: Complex64) -> f64 {
    z.im
}

/// Convert complex number to dB (20*log10(|z|))
///
/// `|z| == 0` gives `f64::NEG_INFINITY`.
pub fn to_log_mag(z: Complex64) -> f64 {
    magnitude_2_db(z.norm())
}

/// Convert complex number to phase in degrees, in (-180, 180]
///
/// `atan2(0, 0)` is 0, so a zero value reports a phase of 0°.
pub fn to_phase_deg(z: Complex64) -> f64 {
    radian_2_degree(z.arg())
}

/// Convert magnitude to dB (20*log10(mag))
pub fn magnitude_2_db(mag: f64) -> f64 {
    if mag == 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * mag.log10()
    }
}

/// Convert dB to magnitude (10^(dB/20))
pub fn db_2_magnitude(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert (dB, degree) to complex
pub fn dbdeg_2_reim(db: f64, deg: f64) -> Complex64 {
    Complex64::from_polar(db_2_magnitude(db), degree_2_radian(deg))
}

/// Convert (magnitude, degree) to complex
pub fn magdeg_2_reim(mag: f64, deg: f64) -> Complex64 {
    Complex64::from_polar(mag, degree_2_radian(deg))
}

/// Convert radians to degrees
pub fn radian_2_degree(rad: f64) -> f64 {
    rad * 180.0 / PI
}

/// Convert degrees to radians
pub fn degree_2_radian(deg: f64) -> f64 {
    deg * PI / 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_to_log_mag() {
        // 20 dB = 20 * log10(|6 + 8j|)
        assert_relative_eq!(to_log_mag(Complex64::new(6.0, 8.0)), 20.0, epsilon = 1e-10);
        assert_relative_eq!(to_log_mag(Complex64::new(1.0, 0.0)), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_magnitude() {
        let z = Complex64::new(0.0, 0.0);
        assert_eq!(to_log_mag(z), f64::NEG_INFINITY);
        assert_eq!(to_phase_deg(z), 0.0);
    }

    #[test]
    fn test_to_phase_deg() {
        assert_relative_eq!(to_phase_deg(Complex64::new(0.0, 1.0)), 90.0, epsilon = 1e-10);
        assert_relative_eq!(to_phase_deg(Complex64::new(-1.0, 0.0)), 180.0, epsilon = 1e-10);
        assert_relative_eq!(to_phase_deg(Complex64::new(0.0, -2.0)), -90.0, epsilon = 1e-10);
    }

    #[test]
    fn test_dbdeg_2_reim() {
        let z = dbdeg_2_reim(20.0, 90.0);
        assert_relative_eq!(z.re, 0.0, epsilon = 1e-10);
        assert_relative_eq!(z.im, 10.0, epsilon = 1e-10);
    }

    #[test]
    fn test_log_mag_phase_round_trip() {
        for z in [
            Complex64::new(0.3, -0.4),
            Complex64::new(-2.0, 1e-3),
            Complex64::new(1e-6, 5e-7),
        ] {
            let back = dbdeg_2_reim(to_log_mag(z), to_phase_deg(z));
            assert_relative_eq!(back.re, z.re, max_relative = 1e-10);
            assert_relative_eq!(back.im, z.im, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_db_2_magnitude() {
        assert_relative_eq!(db_2_magnitude(-6.0), 0.501187, epsilon = 1e-6);
        assert_relative_eq!(magnitude_2_db(db_2_magnitude(-37.5)), -37.5, epsilon = 1e-10);
    }
}
