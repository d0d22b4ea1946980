//! User calibration
//!
//! A [`Calibration`] holds 12-term error coefficients on the grid it was
//! measured on, plus the sweep settings of that grid. Applying it to a sweep
//! on a different grid is allowed: the terms are linearly interpolated
//! (and extrapolated outside the calibrated band).
//!
//! Calibrations are stored as JSON:
//!
//! ```text
//! { "version": 1,
//!   "metadata": { "num_points": 2, "start_freq_hz": ..., ... },
//!   "points": [ { "frequency_hz": 1e9, "edf": [re, im], ... }, ... ] }
//! ```

mod solt;
mod terms;

pub use solt::SoltStandards;
pub use terms::ErrorTerms;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{CAL_MATCH_REL_TOL, GRID_REL_TOL};
use crate::error::{Result, VnaError};
use crate::measurement::SParameterMeasurementPoint;
use crate::sweep::MeasurementConfiguration;

const FILE_VERSION: u32 = 1;

/// Sweep settings a calibration was measured with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationMetadata {
    pub num_points: usize,
    pub start_freq_hz: f64,
    pub stop_freq_hz: f64,
    pub power_level_dbm: f64,
    pub bandwidth_hz: f64,
}

/// Error terms at one calibrated frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub frequency_hz: f64,
    #[serde(flatten)]
    pub terms: ErrorTerms,
}

#[derive(Serialize, Deserialize)]
struct CalibrationFile {
    version: u32,
    metadata: CalibrationMetadata,
    points: Vec<CalibrationPoint>,
}

/// A loaded or freshly solved user calibration
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    metadata: CalibrationMetadata,
    points: Vec<CalibrationPoint>,
}

impl Calibration {
    /// Build from explicit points; frequencies must be strictly ascending
    pub fn new(metadata: CalibrationMetadata, points: Vec<CalibrationPoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(VnaError::calibration("calibration has no points"));
        }
        if points.windows(2).any(|w| w[1].frequency_hz <= w[0].frequency_hz) {
            return Err(VnaError::calibration(
                "calibration frequencies must be strictly ascending",
            ));
        }
        if metadata.num_points != points.len() {
            return Err(VnaError::calibration(format!(
                "metadata declares {} points, file holds {}",
                metadata.num_points,
                points.len()
            )));
        }
        Ok(Self { metadata, points })
    }

    /// Solve a calibration from raw standard sweeps taken with `plan`
    pub fn solve_solt(plan: &MeasurementConfiguration, standards: &SoltStandards) -> Result<Self> {
        plan.validate()?;
        if plan.len() != standards.thru.len() {
            return Err(VnaError::calibration(format!(
                "plan has {} points, standards have {}",
                plan.len(),
                standards.thru.len()
            )));
        }
        let off_grid = plan.points().iter().zip(&standards.thru).position(|(p, s)| {
            (p.frequency_hz - s.frequency_hz).abs() > GRID_REL_TOL * p.frequency_hz.abs()
        });
        if let Some(i) = off_grid {
            return Err(VnaError::calibration(format!(
                "standards were measured at {} Hz where the plan has {} Hz (point {})",
                standards.thru[i].frequency_hz,
                plan.points()[i].frequency_hz,
                i
            )));
        }
        let terms = standards.solve()?;
        let points = standards
            .frequencies()
            .into_iter()
            .zip(terms)
            .map(|(frequency_hz, terms)| CalibrationPoint {
                frequency_hz,
                terms,
            })
            .collect();

        let first = plan.points()[0];
        let metadata = match plan.as_uniform() {
            Some(u) => CalibrationMetadata {
                num_points: u.num_points,
                start_freq_hz: u.start_freq_hz,
                stop_freq_hz: u.stop_freq_hz,
                power_level_dbm: u.power_level_dbm,
                bandwidth_hz: u.bandwidth_hz,
            },
            None => CalibrationMetadata {
                num_points: plan.len(),
                start_freq_hz: first.frequency_hz,
                stop_freq_hz: plan.points()[plan.len() - 1].frequency_hz,
                power_level_dbm: first.power_level_dbm,
                bandwidth_hz: first.bandwidth_hz,
            },
        };
        info!(npoints = plan.len(), "solved SOLT calibration");
        Self::new(metadata, points)
    }

    #[inline]
    pub fn metadata(&self) -> &CalibrationMetadata {
        &self.metadata
    }

    #[inline]
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// True when `plan` lies exactly on the calibrated grid, i.e. no
    /// interpolation of error terms is needed.
    pub fn matches(&self, plan: &MeasurementConfiguration) -> bool {
        if plan.len() != self.points.len() {
            return false;
        }
        let on_grid = plan.points().iter().zip(&self.points).all(|(p, c)| {
            (p.frequency_hz - c.frequency_hz).abs() <= CAL_MATCH_REL_TOL * c.frequency_hz.abs()
        });
        on_grid
            && plan.points().iter().all(|p| {
                p.power_level_dbm == self.metadata.power_level_dbm
                    && p.bandwidth_hz == self.metadata.bandwidth_hz
            })
    }

    /// Error terms at `frequency_hz`, linearly interpolated
    pub fn terms_at(&self, frequency_hz: f64) -> ErrorTerms {
        let n = self.points.len();
        if n == 1 {
            return self.points[0].terms;
        }
        let idx = self
            .points
            .partition_point(|p| p.frequency_hz < frequency_hz)
            .saturating_sub(1)
            .min(n - 2);
        let (a, b) = (&self.points[idx], &self.points[idx + 1]);
        let t = (frequency_hz - a.frequency_hz) / (b.frequency_hz - a.frequency_hz);
        a.terms.lerp(&b.terms, t)
    }

    /// Apply the correction to one raw sample.
    ///
    /// A point where the correction is singular is reported as all zeros.
    pub fn correct(&self, raw: &SParameterMeasurementPoint) -> SParameterMeasurementPoint {
        let terms = self.terms_at(raw.frequency_hz);
        match terms.correct(raw.matrix()) {
            Some(s) => SParameterMeasurementPoint::from_matrix(raw.frequency_hz, s),
            None => {
                debug!(frequency_hz = raw.frequency_hz, "singular correction");
                let zero = num_complex::Complex64::new(0.0, 0.0);
                SParameterMeasurementPoint::new(raw.frequency_hz, zero, zero, zero, zero)
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CalibrationFile = serde_json::from_str(json)?;
        Self::from_file_contents(file)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_file_contents())?)
    }

    /// Read a calibration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let file: CalibrationFile = serde_json::from_reader(reader)?;
        let cal = Self::from_file_contents(file)?;
        info!(
            path = %path.display(),
            npoints = cal.points.len(),
            "loaded calibration"
        );
        Ok(cal)
    }

    /// Write a calibration file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &self.to_file_contents())?;
        writer.flush()?;
        Ok(())
    }

    fn from_file_contents(file: CalibrationFile) -> Result<Self> {
        if file.version != FILE_VERSION {
            return Err(VnaError::calibration(format!(
                "unsupported calibration file version {}",
                file.version
            )));
        }
        Self::new(file.metadata, file.points)
    }

    fn to_file_contents(&self) -> CalibrationFile {
        CalibrationFile {
            version: FILE_VERSION,
            metadata: self.metadata,
            points: self.points.clone(),
        }
    }
}
