//! Measured S-parameter samples

use ndarray::Array3;
use num_complex::Complex64;

/// Two-port S-parameters measured at one frequency
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SParameterMeasurementPoint {
    pub frequency_hz: f64,
    pub s11: Complex64,
    pub s21: Complex64,
    pub s12: Complex64,
    pub s22: Complex64,
}

impl SParameterMeasurementPoint {
    pub fn new(
        frequency_hz: f64,
        s11: Complex64,
        s21: Complex64,
        s12: Complex64,
        s22: Complex64,
    ) -> Self {
        Self {
            frequency_hz,
            s11,
            s21,
            s12,
            s22,
        }
    }

    /// Build from a 2x2 matrix `s[i][j]` = S(i+1)(j+1)
    pub fn from_matrix(frequency_hz: f64, s: [[Complex64; 2]; 2]) -> Self {
        Self::new(frequency_hz, s[0][0], s[1][0], s[0][1], s[1][1])
    }

    /// The four parameters as a 2x2 matrix, `m[i][j]` = S(i+1)(j+1)
    pub fn matrix(&self) -> [[Complex64; 2]; 2] {
        [[self.s11, self.s12], [self.s21, self.s22]]
    }

    /// The four parameters in display order: s11, s21, s12, s22
    pub fn parameters(&self) -> [Complex64; 4] {
        [self.s11, self.s21, self.s12, self.s22]
    }

    pub fn get(&self, parameter: MeasurementParameter) -> Complex64 {
        match parameter {
            MeasurementParameter::S11 => self.s11,
            MeasurementParameter::S21 => self.s21,
            MeasurementParameter::S12 => self.s12,
            MeasurementParameter::S22 => self.s22,
        }
    }
}

/// Selects one of the four S-parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementParameter {
    S11,
    S21,
    S12,
    S22,
}

impl MeasurementParameter {
    /// Display order used by every printed or exported table
    pub const ALL: [MeasurementParameter; 4] = [
        MeasurementParameter::S11,
        MeasurementParameter::S21,
        MeasurementParameter::S12,
        MeasurementParameter::S22,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MeasurementParameter::S11 => "s11",
            MeasurementParameter::S21 => "s21",
            MeasurementParameter::S12 => "s12",
            MeasurementParameter::S22 => "s22",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "s11" => Some(MeasurementParameter::S11),
            "s21" => Some(MeasurementParameter::S21),
            "s12" => Some(MeasurementParameter::S12),
            "s22" => Some(MeasurementParameter::S22),
            _ => None,
        }
    }
}

/// Stack samples into an S-matrix array of shape [nfreq, 2, 2]
pub fn to_s_matrix(samples: &[SParameterMeasurementPoint]) -> Array3<Complex64> {
    Array3::from_shape_fn((samples.len(), 2, 2), |(f, i, j)| samples[f].matrix()[i][j])
}
