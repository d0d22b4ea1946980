//! Sweep planning
//!
//! A [`MeasurementConfiguration`] is an ordered list of measurement points
//! plus a trigger mode. Building one never touches an instrument; every
//! validation error is raised here, before a plan is handed to a device.

use crate::constants::MAX_POINTS;
use crate::error::{Result, VnaError};
use crate::frequency::{is_uniform, linear_spacing, ratio_spacing};

/// One point of a sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementPoint {
    pub frequency_hz: f64,
    pub power_level_dbm: f64,
    pub bandwidth_hz: f64,
}

impl MeasurementPoint {
    pub fn new(frequency_hz: f64, power_level_dbm: f64, bandwidth_hz: f64) -> Self {
        Self {
            frequency_hz,
            power_level_dbm,
            bandwidth_hz,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.frequency_hz.is_finite() || self.frequency_hz <= 0.0 {
            return Err(VnaError::invalid(format!(
                "frequency must be finite and positive, got {} Hz",
                self.frequency_hz
            )));
        }
        if !self.bandwidth_hz.is_finite() || self.bandwidth_hz <= 0.0 {
            return Err(VnaError::invalid(format!(
                "bandwidth must be finite and positive, got {} Hz",
                self.bandwidth_hz
            )));
        }
        if !self.power_level_dbm.is_finite() {
            return Err(VnaError::invalid("power level must be finite"));
        }
        Ok(())
    }
}

/// When the instrument starts executing a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerMode {
    /// Start as soon as the plan is handed over
    #[default]
    FreeRun,
    /// Wait for a rising edge on the external trigger port
    RisingEdge,
}

/// Start/stop/count description of a uniformly spaced plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformSweep {
    pub num_points: usize,
    pub start_freq_hz: f64,
    pub stop_freq_hz: f64,
    pub power_level_dbm: f64,
    pub bandwidth_hz: f64,
}

/// An ordered measurement plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementConfiguration {
    points: Vec<MeasurementPoint>,
    trigger_mode: TriggerMode,
}

impl MeasurementConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `count` points uniformly spaced from `start_hz` to `stop_hz`
    /// inclusive.
    ///
    /// Fails without modifying the plan if `count < 1`, `start_hz > stop_hz`,
    /// any generated point is invalid, or the plan would exceed
    /// [`MAX_POINTS`].
    pub fn add_uniform_sweep(
        &mut self,
        count: usize,
        start_hz: f64,
        stop_hz: f64,
        power_dbm: f64,
        bandwidth_hz: f64,
    ) -> Result<&mut Self> {
        if count < 1 {
            return Err(VnaError::invalid("sweep must contain at least one point"));
        }
        if !(start_hz <= stop_hz) {
            return Err(VnaError::invalid(format!(
                "start frequency {} Hz is above stop frequency {} Hz",
                start_hz, stop_hz
            )));
        }
        self.check_room(count)?;
        let points = linear_spacing(start_hz, stop_hz, count)
            .into_iter()
            .map(|f| MeasurementPoint::new(f, power_dbm, bandwidth_hz))
            .collect();
        self.extend_checked(points)?;
        Ok(self)
    }

    /// Append points whose frequency grows by `ratio` from `start_hz` until
    /// `stop_hz` is reached (exclusive).
    pub fn add_log_sweep(
        &mut self,
        start_hz: f64,
        stop_hz: f64,
        ratio: f64,
        power_dbm: f64,
        bandwidth_hz: f64,
    ) -> Result<&mut Self> {
        if !(ratio > 1.0) {
            return Err(VnaError::invalid(format!(
                "frequency ratio must be greater than 1, got {}",
                ratio
            )));
        }
        if !(start_hz < stop_hz) || !stop_hz.is_finite() {
            return Err(VnaError::invalid(format!(
                "start frequency {} Hz must be below finite stop frequency {} Hz",
                start_hz, stop_hz
            )));
        }
        let room = MAX_POINTS.saturating_sub(self.points.len());
        let freqs = ratio_spacing(start_hz, stop_hz, ratio, room);
        if freqs.len() > room {
            return Err(VnaError::invalid(format!(
                "logarithmic sweep from {} Hz to {} Hz in steps of {} exceeds the {} point limit",
                start_hz, stop_hz, ratio, MAX_POINTS
            )));
        }
        let points = freqs
            .into_iter()
            .map(|f| MeasurementPoint::new(f, power_dbm, bandwidth_hz))
            .collect();
        self.extend_checked(points)?;
        Ok(self)
    }

    /// Append one explicit point
    pub fn add_point(&mut self, point: MeasurementPoint) -> Result<&mut Self> {
        self.extend_checked(vec![point])?;
        Ok(self)
    }

    pub fn set_trigger_mode(&mut self, mode: TriggerMode) -> &mut Self {
        self.trigger_mode = mode;
        self
    }

    #[inline]
    pub fn trigger_mode(&self) -> TriggerMode {
        self.trigger_mode
    }

    #[inline]
    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn frequencies(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.frequency_hz).collect()
    }

    /// Check that the plan can be handed to an instrument
    pub fn validate(&self) -> Result<()> {
        if self.points.is_empty() {
            return Err(VnaError::invalid("measurement configuration has no points"));
        }
        if self.points.len() > MAX_POINTS {
            return Err(VnaError::invalid(format!(
                "sweep has {} points, limit is {}",
                self.points.len(),
                MAX_POINTS
            )));
        }
        self.points.iter().try_for_each(MeasurementPoint::validate)
    }

    /// Describe the plan as start/stop/count if it is one ascending uniform
    /// sweep with a single power level and bandwidth.
    pub fn as_uniform(&self) -> Option<UniformSweep> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        let same_settings = self.points.iter().all(|p| {
            p.power_level_dbm == first.power_level_dbm && p.bandwidth_hz == first.bandwidth_hz
        });
        let f = self.frequencies();
        let ascending = f.windows(2).all(|w| w[1] > w[0]);
        if !same_settings || !ascending || !is_uniform(&f) {
            return None;
        }
        Some(UniformSweep {
            num_points: self.points.len(),
            start_freq_hz: first.frequency_hz,
            stop_freq_hz: last.frequency_hz,
            power_level_dbm: first.power_level_dbm,
            bandwidth_hz: first.bandwidth_hz,
        })
    }

    /// Reject `additional` points up front if the plan cannot hold them
    fn check_room(&self, additional: usize) -> Result<()> {
        match self.points.len().checked_add(additional) {
            Some(total) if total <= MAX_POINTS => Ok(()),
            _ => Err(VnaError::invalid(format!(
                "sweep would have {} + {} points, limit is {}",
                self.points.len(),
                additional,
                MAX_POINTS
            ))),
        }
    }

    fn extend_checked(&mut self, points: Vec<MeasurementPoint>) -> Result<()> {
        self.check_room(points.len())?;
        points.iter().try_for_each(MeasurementPoint::validate)?;
        self.points.extend(points);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_uniform_sweep_shape() {
        let mut cfg = MeasurementConfiguration::new();
        cfg.add_uniform_sweep(2001, 1e6, 6e9, 0.0, 1e3).unwrap();

        assert_eq!(cfg.len(), 2001);
        let f = cfg.frequencies();
        assert_eq!(f[0], 1e6);
        assert_eq!(f[2000], 6e9);
        let step = (6e9 - 1e6) / 2000.0;
        for w in f.windows(2) {
            assert_relative_eq!(w[1] - w[0], step, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_uniform_sweep_rejects_bad_input() {
        let mut cfg = MeasurementConfiguration::new();
        assert!(matches!(
            cfg.add_uniform_sweep(0, 1e6, 2e6, 0.0, 1e3),
            Err(VnaError::InvalidParameter(_))
        ));
        assert!(matches!(
            cfg.add_uniform_sweep(10, 2e6, 1e6, 0.0, 1e3),
            Err(VnaError::InvalidParameter(_))
        ));
        assert!(cfg.is_empty());
    }

    #[test]
    fn test_single_point_sweep() {
        let mut cfg = MeasurementConfiguration::new();
        cfg.add_uniform_sweep(1, 1e9, 1e9, -10.0, 100.0).unwrap();
        assert_eq!(cfg.points(), &[MeasurementPoint::new(1e9, -10.0, 100.0)]);
    }

    #[test]
    fn test_point_limit_is_atomic() {
        let mut cfg = MeasurementConfiguration::new();
        cfg.add_uniform_sweep(10_000, 1e6, 6e9, 0.0, 1e3).unwrap();
        assert!(cfg.add_uniform_sweep(2, 1e6, 2e6, 0.0, 1e3).is_err());
        assert_eq!(cfg.len(), 10_000);
        cfg.add_point(MeasurementPoint::new(7e9, 0.0, 1e3)).unwrap();
        assert_eq!(cfg.len(), MAX_POINTS);
        assert!(cfg.add_point(MeasurementPoint::new(7e9, 0.0, 1e3)).is_err());
    }

    #[test]
    fn test_huge_counts_rejected_before_generation() {
        let mut cfg = MeasurementConfiguration::new();
        for count in [usize::MAX, 1_000_000_000, MAX_POINTS + 1] {
            assert!(matches!(
                cfg.add_uniform_sweep(count, 1e6, 6e9, 0.0, 1e3),
                Err(VnaError::InvalidParameter(_))
            ));
        }
        cfg.add_point(MeasurementPoint::new(1e9, 0.0, 1e3)).unwrap();
        assert!(cfg.add_uniform_sweep(usize::MAX, 1e6, 6e9, 0.0, 1e3).is_err());
        assert_eq!(cfg.len(), 1);
    }

    #[test]
    fn test_log_sweep_limits() {
        let mut cfg = MeasurementConfiguration::new();
        // About 1e7 points if generated in full
        assert!(matches!(
            cfg.add_log_sweep(0.3e6, 8.5e9, 1.0 + 1e-6, 0.0, 1e3),
            Err(VnaError::InvalidParameter(_))
        ));
        assert!(matches!(
            cfg.add_log_sweep(0.3e6, f64::INFINITY, 1.01, 0.0, 1e3),
            Err(VnaError::InvalidParameter(_))
        ));
        assert!(cfg.is_empty());

        // Fits only while the plan has room for it
        cfg.add_log_sweep(1e6, 1e9, 1.01, 0.0, 1e3).unwrap();
        let n = cfg.len();
        cfg.add_uniform_sweep(MAX_POINTS - n, 1e6, 6e9, 0.0, 1e3).unwrap();
        assert!(cfg.add_log_sweep(1e6, 1e9, 1.01, 0.0, 1e3).is_err());
        assert_eq!(cfg.len(), MAX_POINTS);
    }

    #[test]
    fn test_log_sweep_and_uniform_detection() {
        let mut cfg = MeasurementConfiguration::new();
        cfg.add_log_sweep(0.3e6, 8.5e9, 1.01, 0.0, 1e4).unwrap();
        assert!(cfg.len() > 1000);
        assert!(cfg.as_uniform().is_none());

        let mut uniform = MeasurementConfiguration::new();
        uniform.add_uniform_sweep(101, 1e6, 1e9, -5.0, 1e3).unwrap();
        let u = uniform.as_uniform().unwrap();
        assert_eq!(u.num_points, 101);
        assert_eq!(u.start_freq_hz, 1e6);
        assert_eq!(u.stop_freq_hz, 1e9);
        assert_eq!(u.power_level_dbm, -5.0);
    }

    #[test]
    fn test_invalid_point_rejected() {
        let mut cfg = MeasurementConfiguration::new();
        assert!(cfg.add_point(MeasurementPoint::new(-1.0, 0.0, 1e3)).is_err());
        assert!(cfg.add_point(MeasurementPoint::new(1e9, 0.0, 0.0)).is_err());
        assert!(cfg.add_point(MeasurementPoint::new(f64::NAN, 0.0, 1e3)).is_err());
        assert!(cfg.validate().is_err());
    }
}
