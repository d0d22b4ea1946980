//! Mathematical functions module
//!
//! Unit conversions and interpolation of complex frequency-domain data.

pub mod conversions;
pub mod interpolation;

pub use conversions::*;
pub use interpolation::*;
