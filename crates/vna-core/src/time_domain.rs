//! Time-domain transform
//!
//! Converts one S-parameter of a frequency sweep into an impulse or step
//! response via windowed inverse FFT.
//!
//! Low-pass mode produces a real response and needs a harmonic frequency grid
//! (`f_k = k·Δf`) with a DC term. Sweeps that are not harmonic are resampled
//! onto one (`Δf = f_stop / N`) and DC is extrapolated from the two lowest
//! points. Band-pass mode transforms the measured band as-is and reports the
//! magnitude of the complex response.

use ndarray::Array1;
use num_complex::Complex64;
use std::f64::consts::PI;
use tracing::debug;

use crate::error::{Result, VnaError};
use crate::frequency::{is_harmonic, is_uniform, linear_spacing};
use crate::math::interpolation::interpolate_complex_all;
use crate::measurement::{MeasurementParameter, SParameterMeasurementPoint};

/// Transform mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeDomainMode {
    #[default]
    LowPass,
    BandPass,
}

/// Which response to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeDomainResponse {
    #[default]
    Step,
    Impulse,
}

impl TimeDomainResponse {
    pub fn label(&self) -> &'static str {
        match self {
            TimeDomainResponse::Step => "step",
            TimeDomainResponse::Impulse => "impulse",
        }
    }
}

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowFunction {
    /// No window
    #[default]
    Rectangular,
    Hanning,
    Hamming,
    Blackman,
}

impl WindowFunction {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rectangular" | "none" => Some(WindowFunction::Rectangular),
            "hanning" | "hann" => Some(WindowFunction::Hanning),
            "hamming" => Some(WindowFunction::Hamming),
            "blackman" => Some(WindowFunction::Blackman),
            _ => None,
        }
    }

    fn coefficients(&self) -> &'static [f64] {
        match self {
            WindowFunction::Rectangular => &[1.0],
            WindowFunction::Hanning => &[0.5, 0.5],
            WindowFunction::Hamming => &[0.54, 0.46],
            WindowFunction::Blackman => &[0.42, 0.5, 0.08],
        }
    }
}

/// Parameters of a time-domain transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeDomainOptions {
    pub mode: TimeDomainMode,
    pub response: TimeDomainResponse,
    pub window: WindowFunction,
    /// Zero-pad the transform length up to the next power of two
    pub pad_to_power_of_two: bool,
}

/// One point of a time-domain response
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDomainSample {
    pub time_s: f64,
    pub value: f64,
}

/// Transform `parameter` of `measurements` to the time domain.
///
/// Output samples are ordered by time and centred on `t = 0`.
pub fn transform(
    options: &TimeDomainOptions,
    parameter: MeasurementParameter,
    measurements: &[SParameterMeasurementPoint],
) -> Result<Vec<TimeDomainSample>> {
    if measurements.len() < 2 {
        return Err(VnaError::invalid(
            "time-domain transform needs at least two frequency points",
        ));
    }
    let f: Vec<f64> = measurements.iter().map(|m| m.frequency_hz).collect();
    if f.windows(2).any(|w| w[1] <= w[0]) || f[0] <= 0.0 {
        return Err(VnaError::invalid(
            "time-domain transform needs strictly increasing positive frequencies",
        ));
    }
    let s: Vec<Complex64> = measurements.iter().map(|m| m.get(parameter)).collect();

    let (t, x) = match options.mode {
        TimeDomainMode::LowPass => low_pass(options, &f, &s),
        TimeDomainMode::BandPass => {
            if options.response == TimeDomainResponse::Step {
                return Err(VnaError::invalid(
                    "step response is only defined in low-pass mode",
                ));
            }
            band_pass(options, &f, &s)
        }
    };

    let values = match options.response {
        TimeDomainResponse::Impulse => x,
        TimeDomainResponse::Step => x
            .iter()
            .scan(0.0, |acc, &v| {
                *acc += v;
                Some(*acc)
            })
            .collect(),
    };

    Ok(t
        .into_iter()
        .zip(values)
        .map(|(time_s, value)| TimeDomainSample { time_s, value })
        .collect())
}

fn low_pass(options: &TimeDomainOptions, f: &[f64], s: &[Complex64]) -> (Vec<f64>, Vec<f64>) {
    let n = f.len();
    let (df, s_grid) = if is_harmonic(f) {
        (f[0], s.to_vec())
    } else {
        let df = f[n - 1] / n as f64;
        debug!(
            npoints = n,
            df_hz = df,
            "resampling sweep onto harmonic grid for low-pass transform"
        );
        let grid: Vec<f64> = (1..=n).map(|k| k as f64 * df).collect();
        (df, interpolate_complex_all(f, s, &grid))
    };

    // Linear extrapolation to DC; a low-pass response must have a real DC term
    let dc = Complex64::new((s_grid[0] * 2.0 - s_grid[1]).re, 0.0);

    let mut half = Vec::with_capacity(n + 1);
    half.push(dc);
    half.extend_from_slice(&s_grid);

    // Right half of a symmetric window centred on DC
    let full = cosine_window(2 * n + 1, options.window.coefficients());
    let w = Array1::from_vec(full[n..].to_vec()).mapv(|x| Complex64::new(x, 0.0));
    let half = Array1::from_vec(half) * &w;

    let m = transform_length(2 * n, options.pad_to_power_of_two);
    let mut spectrum = vec![Complex64::new(0.0, 0.0); m];
    spectrum[0] = half[0];
    for k in 1..=n {
        if k < m - k {
            spectrum[k] = half[k];
            spectrum[m - k] = half[k].conj();
        } else if k == m - k {
            spectrum[k] = Complex64::new(half[k].re, 0.0);
        }
    }

    let x: Vec<f64> = ifft(&spectrum).iter().map(|c| c.re).collect();
    fft_shift(&x, df)
}

fn band_pass(options: &TimeDomainOptions, f: &[f64], s: &[Complex64]) -> (Vec<f64>, Vec<f64>) {
    let n = f.len();
    let s_grid = if is_uniform(f) {
        s.to_vec()
    } else {
        debug!(npoints = n, "resampling sweep onto uniform grid for band-pass transform");
        interpolate_complex_all(f, s, &linear_spacing(f[0], f[n - 1], n))
    };
    let df = (f[n - 1] - f[0]) / (n - 1) as f64;

    let w = Array1::from_vec(cosine_window(n, options.window.coefficients()))
        .mapv(|x| Complex64::new(x, 0.0));
    let windowed = Array1::from_vec(s_grid) * &w;

    let m = transform_length(n, options.pad_to_power_of_two);
    let mut spectrum = vec![Complex64::new(0.0, 0.0); m];
    for (dst, src) in spectrum.iter_mut().zip(windowed.iter()) {
        *dst = *src;
    }

    let x: Vec<f64> = ifft(&spectrum).iter().map(|c| c.norm()).collect();
    fft_shift(&x, df)
}

fn transform_length(n: usize, pad_to_power_of_two: bool) -> usize {
    if pad_to_power_of_two {
        n.next_power_of_two()
    } else {
        n
    }
}

/// Rotate so that zero time sits in the middle and build the time axis
fn fft_shift(x: &[f64], df: f64) -> (Vec<f64>, Vec<f64>) {
    let m = x.len();
    let dt = 1.0 / (df * m as f64);
    let shift = m / 2;
    let t = (0..m).map(|k| (k as f64 - shift as f64) * dt).collect();
    let shifted = (0..m).map(|k| x[(k + shift) % m]).collect();
    (t, shifted)
}

/// Generalized cosine window: w[n] = sum((-1)^k * coeffs[k] * cos(k * 2π * n / (N-1)))
fn cosine_window(n: usize, coeffs: &[f64]) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / (n - 1) as f64;
            coeffs
                .iter()
                .enumerate()
                .map(|(k, &c)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * c * (k as f64 * x).cos()
                })
                .sum()
        })
        .collect()
}

/// Normalized inverse FFT (rustfft)
fn ifft(data: &[Complex64]) -> Vec<Complex64> {
    use rustfft::FftPlanner;

    let n = data.len();
    if n == 0 {
        return vec![];
    }

    let mut buffer = data.to_vec();
    let mut planner = FftPlanner::new();
    planner.plan_fft_inverse(n).process(&mut buffer);

    let scale = 1.0 / n as f64;
    for c in buffer.iter_mut() {
        *c *= scale;
    }
    buffer
}
