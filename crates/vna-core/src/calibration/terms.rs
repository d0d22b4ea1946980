//! 12-term two-port error model
//!
//! Forward terms (port 1 driving): directivity EDF, source match ESF,
//! reflection tracking ERF, load match ELF, transmission tracking ETF and
//! isolation EXF. Reverse terms (port 2 driving) mirror them.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::constants::NEAR_ZERO;

type SMatrix = [[Complex64; 2]; 2];

const ONE: Complex64 = Complex64::new(1.0, 0.0);
const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Error terms at one frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorTerms {
    pub edf: Complex64,
    pub esf: Complex64,
    pub erf: Complex64,
    pub elf: Complex64,
    pub etf: Complex64,
    pub exf: Complex64,
    pub edr: Complex64,
    pub esr: Complex64,
    pub err: Complex64,
    pub elr: Complex64,
    pub etr: Complex64,
    pub exr: Complex64,
}

impl Default for ErrorTerms {
    fn default() -> Self {
        Self::ideal()
    }
}

impl ErrorTerms {
    /// A perfect analyzer: measured == actual
    pub const fn ideal() -> Self {
        Self {
            edf: ZERO,
            esf: ZERO,
            erf: ONE,
            elf: ZERO,
            etf: ONE,
            exf: ZERO,
            edr: ZERO,
            esr: ZERO,
            err: ONE,
            elr: ZERO,
            etr: ONE,
            exr: ZERO,
        }
    }

    /// What an analyzer with these errors reports for a DUT with S-matrix
    /// `actual` (`m[i][j]` = S(i+1)(j+1)).
    pub fn apply_error_model(&self, actual: SMatrix) -> SMatrix {
        let (s11, s12, s21, s22) = (actual[0][0], actual[0][1], actual[1][0], actual[1][1]);
        let ds = s11 * s22 - s21 * s12;

        let den_f = ONE - self.esf * s11 - self.elf * s22 + self.esf * self.elf * ds;
        let den_r = ONE - self.esr * s22 - self.elr * s11 + self.esr * self.elr * ds;

        let s11m = self.edf + self.erf * (s11 - self.elf * ds) / den_f;
        let s21m = self.exf + self.etf * s21 / den_f;
        let s22m = self.edr + self.err * (s22 - self.elr * ds) / den_r;
        let s12m = self.exr + self.etr * s12 / den_r;

        [[s11m, s12m], [s21m, s22m]]
    }

    /// Remove these errors from a raw measurement.
    ///
    /// Returns `None` when the correction is singular at this point.
    pub fn correct(&self, measured: SMatrix) -> Option<SMatrix> {
        let (s11m, s12m, s21m, s22m) =
            (measured[0][0], measured[0][1], measured[1][0], measured[1][1]);

        // Standard 12-term correction
        let s11p = (s11m - self.edf) / self.erf;
        let s21p = (s21m - self.exf) / self.etf;
        let s12p = (s12m - self.exr) / self.etr;
        let s22p = (s22m - self.edr) / self.err;

        let den = (ONE + s11p * self.esf) * (ONE + s22p * self.esr)
            - s21p * s12p * self.elf * self.elr;

        if den.norm() <= NEAR_ZERO || !den.is_finite() {
            return None;
        }

        let s11 = (s11p * (ONE + s22p * self.esr) - s21p * s12p * self.elf) / den;
        let s21 = s21p * (ONE + s22p * (self.esr - self.elr)) / den;
        let s12 = s12p * (ONE + s11p * (self.esf - self.elf)) / den;
        let s22 = (s22p * (ONE + s11p * self.esf) - s21p * s12p * self.elr) / den;

        Some([[s11, s12], [s21, s22]])
    }

    /// Term-by-term linear blend: `self` at t = 0, `other` at t = 1
    pub fn lerp(&self, other: &ErrorTerms, t: f64) -> ErrorTerms {
        let mix = |a: Complex64, b: Complex64| a * (1.0 - t) + b * t;
        ErrorTerms {
            edf: mix(self.edf, other.edf),
            esf: mix(self.esf, other.esf),
            erf: mix(self.erf, other.erf),
            elf: mix(self.elf, other.elf),
            etf: mix(self.etf, other.etf),
            exf: mix(self.exf, other.exf),
            edr: mix(self.edr, other.edr),
            esr: mix(self.esr, other.esr),
            err: mix(self.err, other.err),
            elr: mix(self.elr, other.elr),
            etr: mix(self.etr, other.etr),
            exr: mix(self.exr, other.exr),
        }
    }
}
