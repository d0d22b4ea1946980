//! Simulated analyzer
//!
//! Produces deterministic S-parameters for a selectable device under test,
//! optionally distorted by a 12-term error model so that calibration can be
//! exercised without hardware.

use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{DeviceInfo, Instrument, SweepContext};
use crate::calibration::ErrorTerms;
use crate::config::DemoConfig;
use crate::constants::DEFAULT_Z0;
use crate::error::{Result, VnaError};
use crate::math::interpolation::interpolate_complex;
use crate::measurement::SParameterMeasurementPoint;
use crate::sweep::{MeasurementConfiguration, TriggerMode};
use crate::touchstone;

type SMatrix = [[Complex64; 2]; 2];

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// Granularity of the trigger wait
const TRIGGER_POLL: Duration = Duration::from_millis(5);

/// What is connected between the two ports
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemoDut {
    /// Series RLC resonator near 1 GHz between two short delay lines
    #[default]
    BandPass,
    Through,
    /// Flush short on both ports
    Short,
    /// Flush open on both ports
    Open,
    /// Matched load on both ports
    Load,
    Attenuator {
        db: f64,
    },
    /// Two-port data from a Touchstone v1 file
    Touchstone {
        path: PathBuf,
    },
}

/// DUT response ready to be evaluated at any frequency
#[derive(Debug)]
enum Model {
    Analytic(DemoDut),
    Tabulated {
        f: Vec<f64>,
        s11: Vec<Complex64>,
        s21: Vec<Complex64>,
        s12: Vec<Complex64>,
        s22: Vec<Complex64>,
    },
}

impl Model {
    fn load(dut: DemoDut) -> Result<Self> {
        match dut {
            DemoDut::Touchstone { path } => {
                let samples = touchstone::read_s2p(&path)?;
                debug!(path = %path.display(), npoints = samples.len(), "loaded DUT data");
                Ok(Model::Tabulated {
                    f: samples.iter().map(|s| s.frequency_hz).collect(),
                    s11: samples.iter().map(|s| s.s11).collect(),
                    s21: samples.iter().map(|s| s.s21).collect(),
                    s12: samples.iter().map(|s| s.s12).collect(),
                    s22: samples.iter().map(|s| s.s22).collect(),
                })
            }
            dut => Ok(Model::Analytic(dut)),
        }
    }

    fn s_matrix(&self, frequency_hz: f64) -> SMatrix {
        match self {
            Model::Analytic(DemoDut::BandPass) => band_pass(frequency_hz),
            Model::Analytic(DemoDut::Through) => [[ZERO, ONE], [ONE, ZERO]],
            Model::Analytic(DemoDut::Short) => reflect(-ONE),
            Model::Analytic(DemoDut::Open) => reflect(ONE),
            Model::Analytic(DemoDut::Load) => reflect(ZERO),
            Model::Analytic(DemoDut::Attenuator { db }) => {
                let t = Complex64::new(10f64.powf(-db / 20.0), 0.0);
                [[ZERO, t], [t, ZERO]]
            }
            // Converted by `load`
            Model::Analytic(DemoDut::Touchstone { .. }) => [[ZERO; 2]; 2],
            Model::Tabulated {
                f,
                s11,
                s21,
                s12,
                s22,
            } => {
                // Hold the end values outside the tabulated band
                let lo = f.first().copied().unwrap_or(frequency_hz);
                let hi = f.last().copied().unwrap_or(frequency_hz);
                let x = frequency_hz.clamp(lo, hi);
                [
                    [interpolate_complex(f, s11, x), interpolate_complex(f, s12, x)],
                    [interpolate_complex(f, s21, x), interpolate_complex(f, s22, x)],
                ]
            }
        }
    }
}

fn reflect(gamma: Complex64) -> SMatrix {
    [[gamma, ZERO], [ZERO, gamma]]
}

fn band_pass(frequency_hz: f64) -> SMatrix {
    const L: f64 = 40e-9;
    const C: f64 = 0.633e-12;
    const R: f64 = 2.0;
    const LINE_DELAY_S: f64 = 0.5e-9;

    let w = 2.0 * PI * frequency_hz;
    let z = Complex64::new(R, w * L - 1.0 / (w * C));
    let den = z + 2.0 * DEFAULT_Z0;
    let s11 = z / den;
    let s21 = Complex64::new(2.0 * DEFAULT_Z0, 0.0) / den;
    // Both reflection and transmission pass two line sections
    let lines = Complex64::from_polar(1.0, -2.0 * w * LINE_DELAY_S);
    [[s11 * lines, s21 * lines], [s21 * lines, s11 * lines]]
}

/// Smooth, frequency-dependent systematic errors of an uncalibrated analyzer
pub fn typical_error_terms(frequency_hz: f64) -> ErrorTerms {
    let x = frequency_hz / 1e9;
    let w = 2.0 * PI * frequency_hz;
    let cis = |mag: f64, rad: f64| Complex64::from_polar(mag, rad);
    ErrorTerms {
        edf: cis(0.02 + 0.005 * x, -0.6 * x),
        esf: cis(0.05 + 0.01 * x, 0.9 * x),
        erf: cis(0.95 - 0.01 * x, -w * 0.35e-9),
        elf: cis(0.04, -0.4 * x),
        etf: cis(0.93 - 0.01 * x, -w * 0.45e-9),
        exf: ZERO,
        edr: cis(0.025, 0.5 * x),
        esr: cis(0.06, -0.7 * x),
        err: cis(0.94 - 0.01 * x, -w * 0.30e-9),
        elr: cis(0.035 + 0.005 * x, 0.3 * x),
        etr: cis(0.93 - 0.01 * x, -w * 0.45e-9),
        exr: ZERO,
    }
}

#[derive(Debug, Clone, Copy)]
enum ErrorModel {
    Fixed(ErrorTerms),
    Typical,
}

/// Swaps the DUT of a [`DemoInstrument`] after it was moved into a device
#[derive(Debug, Clone)]
pub struct DemoFixture {
    model: Arc<Mutex<Model>>,
}

impl DemoFixture {
    pub fn connect(&self, dut: DemoDut) -> Result<()> {
        let model = Model::load(dut)?;
        let mut slot = self
            .model
            .lock()
            .map_err(|_| VnaError::device("fixture lock poisoned"))?;
        *slot = model;
        Ok(())
    }
}

/// External trigger input of a [`DemoInstrument`].
///
/// An edge fired while no sweep is waiting is latched for the next one.
#[derive(Debug, Clone, Default)]
pub struct DemoTrigger {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl DemoTrigger {
    /// Deliver one rising edge
    pub fn fire(&self) {
        let (lock, cvar) = &*self.inner;
        if let Ok(mut pending) = lock.lock() {
            *pending = true;
            cvar.notify_all();
        }
    }

    fn wait_for_edge(&self, ctx: &SweepContext<'_>, auto_fire: Option<Duration>) -> Result<()> {
        let start = Instant::now();
        let (lock, cvar) = &*self.inner;
        let mut pending = lock
            .lock()
            .map_err(|_| VnaError::device("trigger lock poisoned"))?;
        loop {
            if *pending {
                *pending = false;
                return Ok(());
            }
            // The sweep loop notices the cancellation on its first emit
            if ctx.is_cancelled() {
                return Ok(());
            }
            let waited = start.elapsed();
            if auto_fire.is_some_and(|d| waited >= d) {
                return Ok(());
            }
            if let Some(timeout) = ctx.trigger_timeout() {
                if waited >= timeout {
                    return Err(VnaError::TriggerTimeout(timeout));
                }
            }
            let (guard, _) = cvar
                .wait_timeout(pending, TRIGGER_POLL)
                .map_err(|_| VnaError::device("trigger lock poisoned"))?;
            pending = guard;
        }
    }
}

/// A deterministic in-process analyzer
#[derive(Debug)]
pub struct DemoInstrument {
    info: DeviceInfo,
    model: Arc<Mutex<Model>>,
    trigger: DemoTrigger,
    errors: Option<ErrorModel>,
    point_delay: Duration,
    auto_trigger: Option<Duration>,
    fail_after: Option<usize>,
}

impl DemoInstrument {
    pub fn new(config: &DemoConfig) -> Result<Self> {
        if !(config.min_frequency_hz > 0.0 && config.max_frequency_hz > config.min_frequency_hz) {
            return Err(VnaError::invalid(format!(
                "demo frequency range {} Hz to {} Hz is empty",
                config.min_frequency_hz, config.max_frequency_hz
            )));
        }
        Ok(Self {
            info: DeviceInfo {
                serial: config.serial.clone(),
                model: "Demo VNA".to_string(),
                min_sweep_frequency_hz: config.min_frequency_hz,
                max_sweep_frequency_hz: config.max_frequency_hz,
            },
            model: Arc::new(Mutex::new(Model::load(config.dut.clone())?)),
            trigger: DemoTrigger::default(),
            errors: config.systematic_errors.then_some(ErrorModel::Typical),
            point_delay: config.point_delay(),
            auto_trigger: config.auto_trigger(),
            fail_after: config.fail_after,
        })
    }

    /// Report raw data distorted by `terms` at every frequency
    pub fn with_error_terms(mut self, terms: ErrorTerms) -> Self {
        self.errors = Some(ErrorModel::Fixed(terms));
        self
    }

    /// Report raw data distorted by [`typical_error_terms`]
    pub fn with_typical_errors(mut self) -> Self {
        self.errors = Some(ErrorModel::Typical);
        self
    }

    pub fn trigger(&self) -> DemoTrigger {
        self.trigger.clone()
    }

    pub fn fixture(&self) -> DemoFixture {
        DemoFixture {
            model: Arc::clone(&self.model),
        }
    }

    fn measure(&self, model: &Model, frequency_hz: f64) -> SParameterMeasurementPoint {
        let actual = model.s_matrix(frequency_hz);
        let raw = match self.errors {
            Some(ErrorModel::Fixed(terms)) => terms.apply_error_model(actual),
            Some(ErrorModel::Typical) => typical_error_terms(frequency_hz).apply_error_model(actual),
            None => actual,
        };
        SParameterMeasurementPoint::from_matrix(frequency_hz, raw)
    }
}

impl Instrument for DemoInstrument {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn run_sweep(
        &mut self,
        plan: &MeasurementConfiguration,
        ctx: &mut SweepContext<'_>,
    ) -> Result<()> {
        if plan.trigger_mode() == TriggerMode::RisingEdge {
            debug!("waiting for trigger");
            self.trigger.wait_for_edge(ctx, self.auto_trigger)?;
        }

        let model = self
            .model
            .lock()
            .map_err(|_| VnaError::device("fixture lock poisoned"))?;
        for (i, point) in plan.points().iter().enumerate() {
            if self.fail_after == Some(i) {
                return Err(VnaError::device(format!("connection lost after {} points", i)));
            }
            if !self.point_delay.is_zero() {
                thread::sleep(self.point_delay);
            }
            let sample = self.measure(&model, point.frequency_hz);
            trace!(frequency_hz = point.frequency_hz, "point measured");
            if ctx.emit(sample).is_break() {
                debug!(delivered = i, "sweep stopped by consumer");
                return Ok(());
            }
        }
        Ok(())
    }
}
