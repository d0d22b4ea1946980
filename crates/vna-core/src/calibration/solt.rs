//! SOLT (Short-Open-Load-Thru) error-term solver
//!
//! Solves the 12-term model from sweeps of ideal flush standards: a short,
//! an open and a load connected to both ports at once, and a zero-length thru.

use nalgebra::{Matrix3, Vector3};
use num_complex::Complex64;

use super::terms::ErrorTerms;
use crate::constants::GRID_REL_TOL;
use crate::error::{Result, VnaError};
use crate::measurement::SParameterMeasurementPoint;

const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// Raw (uncorrected) sweeps of the calibration standards, all on the same
/// frequency grid. Reflect standards are read from s11 (port 1) and s22
/// (port 2).
#[derive(Debug, Clone, Default)]
pub struct SoltStandards {
    pub short: Vec<SParameterMeasurementPoint>,
    pub open: Vec<SParameterMeasurementPoint>,
    pub load: Vec<SParameterMeasurementPoint>,
    pub thru: Vec<SParameterMeasurementPoint>,
}

/// Directivity, source match and the error-matrix determinant of one port
struct OnePortTerms {
    directivity: Complex64,
    source_match: Complex64,
    determinant: Complex64,
}

impl OnePortTerms {
    /// e10*e01 = e00*e11 - det
    fn reflection_tracking(&self) -> Complex64 {
        self.directivity * self.source_match - self.determinant
    }
}

/// Solve the one-port SOL equations for ideal short (-1), open (+1), load (0).
///
/// ```text
/// Sm = e00 + Si*(e10e01 - e00e11) + Sm*Si*e11
///
/// [ 1  -Si  Sm*Si ] [ e00 ]   [ Sm ]
/// [ 1  -Oi  Om*Oi ] [ det ] = [ Om ]
/// [ 1  -Li  Lm*Li ] [ e11 ]   [ Lm ]
/// ```
fn solve_one_port(sm: Complex64, om: Complex64, lm: Complex64) -> Option<OnePortTerms> {
    let si = Complex64::new(-1.0, 0.0);
    let oi = Complex64::new(1.0, 0.0);
    let li = Complex64::new(0.0, 0.0);

    let a = Matrix3::new(
        ONE,
        -si,
        sm * si,
        ONE,
        -oi,
        om * oi,
        ONE,
        -li,
        lm * li,
    );
    let b = Vector3::new(sm, om, lm);

    let x = a.qr().solve(&b)?;
    Some(OnePortTerms {
        directivity: x[0],
        determinant: x[1],
        source_match: x[2],
    })
}

impl SoltStandards {
    /// Frequencies shared by every standard
    pub fn frequencies(&self) -> Vec<f64> {
        self.thru.iter().map(|p| p.frequency_hz).collect()
    }

    fn check_grid(&self) -> Result<()> {
        let n = self.thru.len();
        if n == 0 {
            return Err(VnaError::calibration("no thru measurement"));
        }
        for (name, sweep) in [("short", &self.short), ("open", &self.open), ("load", &self.load)] {
            if sweep.len() != n {
                return Err(VnaError::calibration(format!(
                    "{} standard has {} points, thru has {}",
                    name,
                    sweep.len(),
                    n
                )));
            }
            let same_grid = sweep.iter().zip(&self.thru).all(|(a, b)| {
                (a.frequency_hz - b.frequency_hz).abs() <= GRID_REL_TOL * b.frequency_hz.abs()
            });
            if !same_grid {
                return Err(VnaError::calibration(format!(
                    "{} standard was measured on a different frequency grid",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Solve the 12 error terms at every frequency (isolation assumed zero)
    pub fn solve(&self) -> Result<Vec<ErrorTerms>> {
        self.check_grid()?;

        self.thru
            .iter()
            .enumerate()
            .map(|(f, thru)| {
                let fail = || {
                    VnaError::calibration(format!(
                        "Failed to solve calibration equations at frequency index {}",
                        f
                    ))
                };

                let p1 = solve_one_port(self.short[f].s11, self.open[f].s11, self.load[f].s11)
                    .ok_or_else(fail)?;
                let p2 = solve_one_port(self.short[f].s22, self.open[f].s22, self.load[f].s22)
                    .ok_or_else(fail)?;

                // Load match and transmission tracking from the ideal thru
                let elf = (thru.s11 - p1.directivity)
                    / (thru.s11 * p1.source_match - p1.determinant);
                let etf = thru.s21 * (ONE - p1.source_match * elf);
                let elr = (thru.s22 - p2.directivity)
                    / (thru.s22 * p2.source_match - p2.determinant);
                let etr = thru.s12 * (ONE - p2.source_match * elr);

                let terms = ErrorTerms {
                    edf: p1.directivity,
                    esf: p1.source_match,
                    erf: p1.reflection_tracking(),
                    elf,
                    etf,
                    exf: Complex64::new(0.0, 0.0),
                    edr: p2.directivity,
                    esr: p2.source_match,
                    err: p2.reflection_tracking(),
                    elr,
                    etr,
                    exr: Complex64::new(0.0, 0.0),
                };
                let finite = [terms.elf, terms.etf, terms.elr, terms.etr]
                    .iter()
                    .all(|z| z.is_finite());
                if finite {
                    Ok(terms)
                } else {
                    Err(fail())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn measure(
        terms: &ErrorTerms,
        f: f64,
        actual: [[Complex64; 2]; 2],
    ) -> SParameterMeasurementPoint {
        SParameterMeasurementPoint::from_matrix(f, terms.apply_error_model(actual))
    }

    fn standards_for(terms: &ErrorTerms, freqs: &[f64]) -> SoltStandards {
        let z = c(0.0, 0.0);
        let reflect = |g: Complex64| [[g, z], [z, g]];
        let thru = [[z, c(1.0, 0.0)], [c(1.0, 0.0), z]];
        SoltStandards {
            short: freqs.iter().map(|&f| measure(terms, f, reflect(c(-1.0, 0.0)))).collect(),
            open: freqs.iter().map(|&f| measure(terms, f, reflect(c(1.0, 0.0)))).collect(),
            load: freqs.iter().map(|&f| measure(terms, f, reflect(z))).collect(),
            thru: freqs.iter().map(|&f| measure(terms, f, thru)).collect(),
        }
    }

    #[test]
    fn test_one_port_sol() {
        // Sm = e00 + (et * Si) / (1 - e11*Si)
        let e00 = c(0.1, 0.0);
        let e11 = c(0.05, 0.0);
        let et = c(0.9, 0.0);
        let simulate = |si: Complex64| e00 + (et * si) / (ONE - e11 * si);

        let terms = solve_one_port(simulate(c(-1.0, 0.0)), simulate(ONE), simulate(c(0.0, 0.0)))
            .unwrap();
        assert!((terms.directivity - e00).norm() < 1e-12);
        assert!((terms.source_match - e11).norm() < 1e-12);
        assert!((terms.reflection_tracking() - et).norm() < 1e-12);
    }

    #[test]
    fn test_solt_recovers_known_terms() {
        let known = ErrorTerms {
            edf: c(0.05, -0.02),
            esf: c(0.08, 0.03),
            erf: c(0.92, -0.10),
            elf: c(0.04, 0.01),
            etf: c(0.90, -0.20),
            exf: c(0.0, 0.0),
            edr: c(-0.03, 0.04),
            esr: c(0.06, -0.05),
            err: c(0.88, 0.15),
            elr: c(0.02, -0.03),
            etr: c(0.91, -0.18),
            exr: c(0.0, 0.0),
        };
        let standards = standards_for(&known, &[1e9, 2e9]);
        let solved = standards.solve().unwrap();

        assert_eq!(solved.len(), 2);
        for t in solved {
            for (a, b) in [
                (t.edf, known.edf),
                (t.esf, known.esf),
                (t.erf, known.erf),
                (t.elf, known.elf),
                (t.etf, known.etf),
                (t.edr, known.edr),
                (t.esr, known.esr),
                (t.err, known.err),
                (t.elr, known.elr),
                (t.etr, known.etr),
            ] {
                assert!((a - b).norm() < 1e-10, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_ideal_standards_give_ideal_terms() {
        let solved = standards_for(&ErrorTerms::ideal(), &[1e9]).solve().unwrap();
        let t = solved[0];
        assert!((t.erf - ONE).norm() < 1e-12);
        assert!((t.etf - ONE).norm() < 1e-12);
        assert!(t.edf.norm() < 1e-12);
    }

    #[test]
    fn test_mismatched_grids_rejected() {
        let mut standards = standards_for(&ErrorTerms::ideal(), &[1e9, 2e9]);
        standards.open.pop();
        assert!(matches!(standards.solve(), Err(VnaError::Calibration(_))));
    }
}
