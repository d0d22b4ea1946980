//! Result formatting
//!
//! Decomposes samples into real/imaginary or log-magnitude/phase pairs and
//! renders them as tab-separated console tables.

use std::io::{self, Write};

use crate::math::conversions::{to_imaginary, to_log_mag, to_phase_deg, to_real};
use crate::measurement::{MeasurementParameter, SParameterMeasurementPoint};
use crate::time_domain::{TimeDomainOptions, TimeDomainSample};

/// Column pair used for each S-parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// (real, imaginary)
    #[default]
    RealImaginary,
    /// (20·log10|z| in dB, phase in degrees)
    LogMagPhase,
}

/// Real and imaginary parts of s11, s21, s12, s22
pub fn to_real_imaginary(sample: &SParameterMeasurementPoint) -> [(f64, f64); 4] {
    sample.parameters().map(|z| (to_real(z), to_imaginary(z)))
}

/// Log magnitude (dB) and phase (degrees) of s11, s21, s12, s22
///
/// A parameter whose magnitude is exactly zero maps to
/// `(f64::NEG_INFINITY, 0.0)`: the log of zero is unbounded below and
/// `atan2(0, 0)` is defined as 0.
pub fn to_log_mag_phase(sample: &SParameterMeasurementPoint) -> [(f64, f64); 4] {
    sample.parameters().map(|z| (to_log_mag(z), to_phase_deg(z)))
}

/// Decompose according to `format`
pub fn decompose(sample: &SParameterMeasurementPoint, format: SampleFormat) -> [(f64, f64); 4] {
    match format {
        SampleFormat::RealImaginary => to_real_imaginary(sample),
        SampleFormat::LogMagPhase => to_log_mag_phase(sample),
    }
}

/// Format `v` like C's `%0.06e`: six fraction digits, signed two-digit exponent.
pub fn sci(v: f64) -> String {
    if !v.is_finite() {
        return if v.is_nan() {
            "nan".to_string()
        } else if v > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        };
    }
    let s = format!("{:.6e}", v);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s,
    }
}

/// Header row for a sample table (without trailing newline)
pub fn header(format: SampleFormat) -> String {
    let (a, b) = match format {
        SampleFormat::RealImaginary => ("re/U", "im/U"),
        SampleFormat::LogMagPhase => ("mag/dB", "phase/deg"),
    };
    let mut line = String::from("frequency / Hz");
    for p in MeasurementParameter::ALL {
        line.push_str(&format!("\t{} {}\t\t{} {}\t", p.name(), a, p.name(), b));
    }
    line
}

/// One table row for `sample` (without trailing newline)
pub fn row(sample: &SParameterMeasurementPoint, format: SampleFormat) -> String {
    let mut line = format!("{:.1}\t", sample.frequency_hz);
    for (a, b) in decompose(sample, format) {
        line.push_str(&format!("\t{}\t{}", sci(a), sci(b)));
    }
    line
}

/// Writes sample and time-domain tables to any writer
pub struct SweepPrinter<W: Write> {
    out: W,
    format: SampleFormat,
}

impl<W: Write> SweepPrinter<W> {
    pub fn new(out: W, format: SampleFormat) -> Self {
        Self { out, format }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn print_header(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", header(self.format))
    }

    pub fn print_sample(&mut self, sample: &SParameterMeasurementPoint) -> io::Result<()> {
        writeln!(self.out, "{}", row(sample, self.format))
    }

    /// Header followed by every sample
    pub fn print_points(&mut self, samples: &[SParameterMeasurementPoint]) -> io::Result<()> {
        self.print_header()?;
        samples.iter().try_for_each(|s| self.print_sample(s))
    }

    /// Print a banner line such as `----- Sweep 1 (Sync) -----`
    pub fn print_banner(&mut self, title: &str) -> io::Result<()> {
        let dashes = "-".repeat(45);
        writeln!(self.out, "{} {} {}", dashes, title, dashes)
    }

    pub fn print_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    pub fn print_time_domain(
        &mut self,
        options: &TimeDomainOptions,
        parameter: MeasurementParameter,
        samples: &[TimeDomainSample],
    ) -> io::Result<()> {
        writeln!(
            self.out,
            "time / s\t{} {}",
            parameter.name(),
            options.response.label()
        )?;
        for s in samples {
            writeln!(self.out, "{}\t{}", sci(s.time_s), sci(s.value))?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn sample() -> SParameterMeasurementPoint {
        SParameterMeasurementPoint::new(
            1.5e9,
            Complex64::new(0.1, -0.2),
            Complex64::new(0.0, 1.0),
            Complex64::new(0.0, 0.0),
            Complex64::new(-1.0, 0.0),
        )
    }

    #[test]
    fn test_sci_matches_c_printf() {
        assert_eq!(sci(1.0), "1.000000e+00");
        assert_eq!(sci(-0.000123456789), "-1.234568e-04");
        assert_eq!(sci(6e9), "6.000000e+09");
        assert_eq!(sci(0.0), "0.000000e+00");
        assert_eq!(sci(1e-120), "1.000000e-120");
        assert_eq!(sci(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn test_real_imaginary() {
        let ri = to_real_imaginary(&sample());
        assert_eq!(ri[0], (0.1, -0.2));
        assert_eq!(ri[1], (0.0, 1.0));
        assert_eq!(ri[3], (-1.0, 0.0));
    }

    #[test]
    fn test_log_mag_phase_zero_magnitude() {
        let lp = to_log_mag_phase(&sample());
        assert_relative_eq!(lp[1].0, 0.0, epsilon = 1e-12);
        assert_relative_eq!(lp[1].1, 90.0, epsilon = 1e-12);
        assert_eq!(lp[2], (f64::NEG_INFINITY, 0.0));
        assert_relative_eq!(lp[3].1, 180.0, epsilon = 1e-12);
    }

    #[test]
    fn test_header_and_row_layout() {
        let h = header(SampleFormat::RealImaginary);
        assert!(h.starts_with("frequency / Hz\ts11 re/U\t\ts11 im/U\t\ts21 re/U"));
        assert!(header(SampleFormat::LogMagPhase).contains("s22 mag/dB\t\ts22 phase/deg\t"));

        let r = row(&sample(), SampleFormat::RealImaginary);
        assert!(r.starts_with("1500000000.0\t\t1.000000e-01\t-2.000000e-01\t"));
        assert_eq!(r.split('\t').count(), 10);
    }

    #[test]
    fn test_printer_writes_table() {
        let mut printer = SweepPrinter::new(Vec::new(), SampleFormat::LogMagPhase);
        printer.print_points(&[sample(), sample()]).unwrap();
        let text = String::from_utf8(printer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("mag/dB"));
        assert!(lines[1].contains("-inf"));
    }
}
