//! Device handle and instrument drivers
//!
//! [`Device`] owns one instrument behind the [`Instrument`] trait and runs
//! measurement plans on it, either on the calling thread
//! ([`Device::perform_measurement`]) or on a worker thread
//! ([`Device::start_measurement`]). Calibration correction happens here, on
//! the host, so every driver delivers raw data.

mod demo;
mod scpi;

pub use demo::{typical_error_terms, DemoDut, DemoFixture, DemoInstrument, DemoTrigger};
pub use scpi::ScpiInstrument;

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info};

use crate::calibration::{Calibration, CalibrationMetadata};
use crate::config::{SessionConfig, VnaConfig};
use crate::error::{Result, VnaError};
use crate::measurement::SParameterMeasurementPoint;
use crate::session::{self, ActiveMeasurement, SessionGuard, SweepJob};
use crate::sweep::MeasurementConfiguration;

/// Identity and sweep range of an instrument
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub serial: String,
    pub model: String,
    pub min_sweep_frequency_hz: f64,
    pub max_sweep_frequency_hz: f64,
}

/// Hands samples from a driver to whoever is consuming the sweep
pub struct SweepContext<'a> {
    cancel: &'a AtomicBool,
    trigger_timeout: Option<Duration>,
    sink: &'a mut dyn FnMut(SParameterMeasurementPoint) -> ControlFlow<()>,
    emitted: usize,
}

impl<'a> SweepContext<'a> {
    pub fn new(
        cancel: &'a AtomicBool,
        trigger_timeout: Option<Duration>,
        sink: &'a mut dyn FnMut(SParameterMeasurementPoint) -> ControlFlow<()>,
    ) -> Self {
        Self {
            cancel,
            trigger_timeout,
            sink,
            emitted: 0,
        }
    }

    /// Deliver the next sample in plan order.
    ///
    /// `Break` means the consumer is gone and the driver should stop.
    pub fn emit(&mut self, sample: SParameterMeasurementPoint) -> ControlFlow<()> {
        if self.is_cancelled() {
            return ControlFlow::Break(());
        }
        self.emitted += 1;
        (self.sink)(sample)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Longest time a driver may wait for the external trigger
    pub fn trigger_timeout(&self) -> Option<Duration> {
        self.trigger_timeout
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

/// A driver for one physical or simulated analyzer
pub trait Instrument: Send {
    fn info(&self) -> DeviceInfo;

    /// Reject plans this driver cannot execute. Called before any I/O.
    fn check_plan(&self, _plan: &MeasurementConfiguration) -> Result<()> {
        Ok(())
    }

    /// Execute `plan`, emitting one raw sample per point in order.
    ///
    /// Returns early without error when `ctx.emit` breaks.
    fn run_sweep(
        &mut self,
        plan: &MeasurementConfiguration,
        ctx: &mut SweepContext<'_>,
    ) -> Result<()>;
}

pub(crate) type SharedInstrument = Arc<Mutex<Box<dyn Instrument>>>;

pub(crate) fn lock_instrument(
    instrument: &SharedInstrument,
) -> Result<MutexGuard<'_, Box<dyn Instrument>>> {
    instrument
        .lock()
        .map_err(|_| VnaError::device("instrument lock poisoned"))
}

/// Apply host-side correction if a calibration is loaded
pub(crate) fn correct(
    calibration: Option<&Calibration>,
    sample: SParameterMeasurementPoint,
) -> SParameterMeasurementPoint {
    match calibration {
        Some(cal) => cal.correct(&sample),
        None => sample,
    }
}

/// An open analyzer
pub struct Device {
    instrument: SharedInstrument,
    info: DeviceInfo,
    busy: Arc<AtomicBool>,
    session: SessionConfig,
    calibration: Option<Arc<Calibration>>,
}

impl Device {
    /// Wrap an already opened driver
    pub fn from_instrument(instrument: Box<dyn Instrument>, session: SessionConfig) -> Self {
        let info = instrument.info();
        info!(serial = %info.serial, model = %info.model, "device opened");
        Self {
            instrument: Arc::new(Mutex::new(instrument)),
            info,
            busy: Arc::new(AtomicBool::new(false)),
            session,
            calibration: None,
        }
    }

    /// Open the first reachable SCPI endpoint from `config`
    pub fn open_any(config: &VnaConfig) -> Result<Self> {
        for endpoint in &config.scpi.endpoints {
            match ScpiInstrument::connect(endpoint, &config.scpi) {
                Ok(instrument) => {
                    return Ok(Self::from_instrument(
                        Box::new(instrument),
                        config.session.clone(),
                    ))
                }
                Err(e) => debug!(endpoint = %endpoint, error = %e, "endpoint not available"),
            }
        }
        Err(VnaError::DeviceNotFound)
    }

    /// Open the simulated analyzer described by `config.demo`
    pub fn open_demo(config: &VnaConfig) -> Result<Self> {
        let demo = DemoInstrument::new(&config.demo)?;
        Ok(Self::from_instrument(Box::new(demo), config.session.clone()))
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// True while a sync or async measurement holds the instrument
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Load a calibration file and correct all following measurements with it
    pub fn apply_calibration_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let cal = Calibration::load(path)?;
        self.set_calibration(cal);
        Ok(())
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = Some(Arc::new(calibration));
    }

    pub fn clear_calibration(&mut self) {
        self.calibration = None;
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_deref()
    }

    /// Sweep settings of the active calibration, to mirror into a new plan
    pub fn calibration_metadata(&self) -> Option<CalibrationMetadata> {
        self.calibration.as_ref().map(|c| *c.metadata())
    }

    /// True when `plan` needs no interpolation of the active calibration.
    /// Always true without a calibration.
    pub fn calibration_matches(&self, plan: &MeasurementConfiguration) -> bool {
        self.calibration.as_ref().map_or(true, |c| c.matches(plan))
    }

    /// Validation that needs no access to the instrument
    fn check_plan(&self, plan: &MeasurementConfiguration) -> Result<()> {
        plan.validate()?;
        let (lo, hi) = (
            self.info.min_sweep_frequency_hz,
            self.info.max_sweep_frequency_hz,
        );
        if let Some(p) = plan
            .points()
            .iter()
            .find(|p| p.frequency_hz < lo || p.frequency_hz > hi)
        {
            return Err(VnaError::invalid(format!(
                "{} Hz is outside the instrument range {} Hz to {} Hz",
                p.frequency_hz, lo, hi
            )));
        }
        if !self.calibration_matches(plan) {
            debug!("plan differs from calibration grid, interpolating error terms");
        }
        Ok(())
    }

    /// Run `plan` to completion on the calling thread.
    ///
    /// Any device failure discards the points measured so far.
    pub fn perform_measurement(
        &self,
        plan: &MeasurementConfiguration,
    ) -> Result<Vec<SParameterMeasurementPoint>> {
        self.check_plan(plan)?;
        let _guard = SessionGuard::acquire(&self.busy)?;
        debug!(npoints = plan.len(), "synchronous measurement");

        let cancel = AtomicBool::new(false);
        let calibration = self.calibration.as_deref();
        let mut samples = Vec::with_capacity(plan.len());
        {
            let mut instrument = lock_instrument(&self.instrument)?;
            instrument.check_plan(plan)?;
            let mut sink = |sample| {
                samples.push(correct(calibration, sample));
                ControlFlow::Continue(())
            };
            let mut ctx = SweepContext::new(&cancel, self.session.trigger_timeout(), &mut sink);
            instrument.run_sweep(plan, &mut ctx)?;
        }

        if samples.len() != plan.len() {
            return Err(VnaError::device(format!(
                "instrument returned {} of {} points",
                samples.len(),
                plan.len()
            )));
        }
        info!(npoints = samples.len(), "measurement complete");
        Ok(samples)
    }

    /// Start `plan` on a worker thread and return immediately
    pub fn start_measurement(&self, plan: &MeasurementConfiguration) -> Result<ActiveMeasurement> {
        self.check_plan(plan)?;
        let guard = SessionGuard::acquire(&self.busy)?;
        lock_instrument(&self.instrument)?.check_plan(plan)?;
        session::start(SweepJob {
            instrument: Arc::clone(&self.instrument),
            plan: plan.clone(),
            calibration: self.calibration.clone(),
            trigger_timeout: self.session.trigger_timeout(),
            capacity: self.session.channel_capacity,
            guard,
        })
    }
}
