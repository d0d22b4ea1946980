//! Touchstone file I/O module
//!
//! Writes sweeps as version 1 `.s2p`/`.s1p` files and reads 2-port
//! version 1 files back into samples.

mod reader;
mod writer;

pub use reader::{parse_s2p, read_s2p};
pub use writer::{Separator, TouchstoneWriter};

use num_complex::Complex64;

use crate::math::conversions::{
    dbdeg_2_reim, magdeg_2_reim, magnitude_2_db, radian_2_degree,
};

/// S-parameter data format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SParamFormat {
    #[default]
    RI, // Real-Imaginary
    MA, // Magnitude-Angle (degrees)
    DB, // dB-Angle (degrees)
}

impl SParamFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "RI" => Some(SParamFormat::RI),
            "MA" => Some(SParamFormat::MA),
            "DB" => Some(SParamFormat::DB),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SParamFormat::RI => "RI",
            SParamFormat::MA => "MA",
            SParamFormat::DB => "DB",
        }
    }

    /// Split a value into the two numbers written for it
    pub fn split(&self, c: Complex64) -> (f64, f64) {
        match self {
            SParamFormat::RI => (c.re, c.im),
            SParamFormat::MA => (c.norm(), radian_2_degree(c.arg())),
            SParamFormat::DB => (magnitude_2_db(c.norm()), radian_2_degree(c.arg())),
        }
    }

    /// Inverse of [`SParamFormat::split`]
    pub fn join(&self, a: f64, b: f64) -> Complex64 {
        match self {
            SParamFormat::RI => Complex64::new(a, b),
            SParamFormat::MA => magdeg_2_reim(a, b),
            SParamFormat::DB => dbdeg_2_reim(a, b),
        }
    }
}
