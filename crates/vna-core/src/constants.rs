//! Numerical and instrument constants
//!
//! Limits and tolerances shared by the sweep planner, the drivers and the
//! signal-processing code.

/// Maximum number of measurement points in one measurement configuration.
pub const MAX_POINTS: usize = 10_001;

/// Tolerance for detecting near-zero values in division and singularity checks.
pub const NEAR_ZERO: f64 = 1e-15;

/// Relative tolerance used when deciding whether a point list is uniformly
/// spaced or lies on a harmonic frequency grid.
pub const GRID_REL_TOL: f64 = 1e-6;

/// Relative tolerance for deciding that a sweep matches a calibration's
/// frequency grid exactly (no interpolation needed).
pub const CAL_MATCH_REL_TOL: f64 = 1e-9;

/// Default reference impedance written to Touchstone files (ohms).
pub const DEFAULT_Z0: f64 = 50.0;

/// Default capacity of the worker → consumer sample channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default sweep range of the simulated instrument (Hz).
pub const DEMO_MIN_FREQUENCY_HZ: f64 = 0.3e6;
pub const DEMO_MAX_FREQUENCY_HZ: f64 = 8.5e9;

/// Default SCPI port of the analyzer software.
pub const DEFAULT_SCPI_PORT: u16 = 5025;
