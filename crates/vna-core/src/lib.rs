//! vna-core: vector network analyzer sweep client
//!
//! Plans frequency sweeps, runs them on an analyzer synchronously or on a
//! worker thread, and post-processes the resulting S-parameters.
//!
//! ## Modules
//!
//! - `sweep` - Measurement plans (uniform, logarithmic, explicit points)
//! - `device` - Device handle and instrument drivers (simulator, SCPI)
//! - `session` - Asynchronous measurement sessions
//! - `format` - Real/imaginary and log-magnitude/phase tables
//! - `calibration` - 12-term error correction and SOLT solving
//! - `time_domain` - Low-pass and band-pass time-domain transforms
//! - `touchstone` - Touchstone file I/O
//! - `config` - TOML runtime configuration
//!
//! ```no_run
//! use vna_core::{Device, MeasurementConfiguration, VnaConfig};
//!
//! # fn main() -> vna_core::Result<()> {
//! let device = Device::open_demo(&VnaConfig::default())?;
//! let mut plan = MeasurementConfiguration::new();
//! plan.add_uniform_sweep(201, 1e6, 6e9, 0.0, 1e3)?;
//!
//! let mut measurement = device.start_measurement(&plan)?;
//! while measurement.has_more_points() {
//!     let point = measurement.next_point()?;
//!     println!("{} Hz: {}", point.frequency_hz, point.s21);
//! }
//! # Ok(())
//! # }
//! ```

pub mod calibration;
pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod format;
pub mod frequency;
pub mod math;
pub mod measurement;
pub mod session;
pub mod sweep;
pub mod time_domain;
pub mod touchstone;

pub use calibration::{Calibration, CalibrationMetadata, ErrorTerms, SoltStandards};
pub use config::VnaConfig;
pub use device::{Device, DeviceInfo, Instrument};
pub use error::{Result, VnaError};
pub use format::SampleFormat;
pub use measurement::{MeasurementParameter, SParameterMeasurementPoint};
pub use session::{AbortHandle, ActiveMeasurement};
pub use sweep::{MeasurementConfiguration, MeasurementPoint, TriggerMode};
