//! Touchstone v1 two-port reader

use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::path::Path;

use super::SParamFormat;
use crate::error::{Result, VnaError};
use crate::frequency::FrequencyUnit;
use crate::measurement::SParameterMeasurementPoint;

/// Values per frequency in a 2-port file: f, then four (a, b) pairs
const VALUES_PER_POINT: usize = 9;

fn parse_error<S: Into<String>>(line: usize, message: S) -> VnaError {
    VnaError::Touchstone {
        line,
        message: message.into(),
    }
}

struct ParserState {
    freq_unit: FrequencyUnit,
    format: SParamFormat,
    option_parsed: bool,
    buffer: Vec<f64>,
    samples: Vec<SParameterMeasurementPoint>,
}

impl ParserState {
    /// Touchstone v1 defaults: `# GHz S MA R 50`
    fn new() -> Self {
        Self {
            freq_unit: FrequencyUnit::GHz,
            format: SParamFormat::MA,
            option_parsed: false,
            buffer: Vec::with_capacity(VALUES_PER_POINT),
            samples: Vec::new(),
        }
    }

    /// Parse the option line (# Hz S RI R 50)
    fn parse_option_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        let parts: Vec<&str> = line[1..].split_whitespace().collect();
        let mut i = 0;
        while i < parts.len() {
            let part = parts[i].to_uppercase();
            if let Some(unit) = FrequencyUnit::from_str(&part) {
                self.freq_unit = unit;
            } else if let Some(fmt) = SParamFormat::from_str(&part) {
                self.format = fmt;
            } else if part == "R" {
                // Reference impedance is not needed for S-parameters
                i += 1;
            } else if part != "S" {
                return Err(parse_error(
                    line_no,
                    format!("unsupported option {:?}, only S-parameters can be read", parts[i]),
                ));
            }
            i += 1;
        }
        self.option_parsed = true;
        Ok(())
    }

    fn parse_data_line(&mut self, line_no: usize, line: &str) -> Result<()> {
        // Strip trailing comment
        let clean = match line.find('!') {
            Some(idx) => &line[..idx],
            None => line,
        };
        for part in clean.split_whitespace() {
            let value = part
                .parse::<f64>()
                .map_err(|_| parse_error(line_no, format!("invalid number {:?}", part)))?;
            self.buffer.push(value);
            if self.buffer.len() == VALUES_PER_POINT {
                self.push_point(line_no)?;
            }
        }
        Ok(())
    }

    fn push_point(&mut self, line_no: usize) -> Result<()> {
        let v = std::mem::take(&mut self.buffer);
        let frequency_hz = v[0] * self.freq_unit.multiplier();
        if let Some(prev) = self.samples.last() {
            if frequency_hz <= prev.frequency_hz {
                return Err(parse_error(line_no, "frequencies must be strictly ascending"));
            }
        }
        let f = self.format;
        // Two-port order: S11, S21, S12, S22
        self.samples.push(SParameterMeasurementPoint::new(
            frequency_hz,
            f.join(v[1], v[2]),
            f.join(v[3], v[4]),
            f.join(v[5], v[6]),
            f.join(v[7], v[8]),
        ));
        Ok(())
    }

    fn finalize(self, last_line: usize) -> Result<Vec<SParameterMeasurementPoint>> {
        if !self.buffer.is_empty() {
            return Err(parse_error(
                last_line,
                format!(
                    "incomplete data point: {} trailing values",
                    self.buffer.len()
                ),
            ));
        }
        if self.samples.is_empty() {
            return Err(parse_error(last_line, "file contains no data"));
        }
        Ok(self.samples)
    }
}

fn parse<R: BufRead>(reader: R) -> Result<Vec<SParameterMeasurementPoint>> {
    let mut state = ParserState::new();
    let mut line_no = 0;

    for line_result in reader.lines() {
        let line = line_result?;
        line_no += 1;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('!') {
            continue;
        }
        if trimmed.starts_with('[') {
            return Err(parse_error(line_no, "Touchstone 2.0 keywords are not supported"));
        }
        if trimmed.starts_with('#') {
            // Only the first option line counts
            if !state.option_parsed {
                state.parse_option_line(line_no, trimmed)?;
            }
            continue;
        }
        state.parse_data_line(line_no, trimmed)?;
    }

    state.finalize(line_no)
}

/// Parse two-port Touchstone v1 content
pub fn parse_s2p(content: &str) -> Result<Vec<SParameterMeasurementPoint>> {
    parse(Cursor::new(content))
}

/// Read a two-port Touchstone v1 file
pub fn read_s2p<P: AsRef<Path>>(path: P) -> Result<Vec<SParameterMeasurementPoint>> {
    let file = File::open(path)?;
    parse(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_ri_with_comments() {
        let content = "! header comment\n# MHz S RI R 50\n100 0.1 0.0 0.9 0.1 0.9 0.1 0.2 0.0 ! inline\n200 0.2 0.0 0.8 0.2 0.8 0.2 0.3 0.0\n";
        let samples = parse_s2p(content).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].frequency_hz, 100e6);
        assert_eq!(samples[1].s21, Complex64::new(0.8, 0.2));
        assert_eq!(samples[1].s22, Complex64::new(0.3, 0.0));
    }

    #[test]
    fn test_defaults_are_ghz_ma() {
        let samples = parse_s2p("1.5 1 0 0.5 90 0.5 90 1 180\n").unwrap();
        assert_eq!(samples[0].frequency_hz, 1.5e9);
        assert!((samples[0].s21 - Complex64::new(0.0, 0.5)).norm() < 1e-12);
        assert!((samples[0].s22 - Complex64::new(-1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_point_split_over_lines() {
        let content = "# Hz S DB R 50\n1000 0 0 -6 0\n -6 0 0 0\n";
        let samples = parse_s2p(content).unwrap();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].s21.norm() - 10f64.powf(-6.0 / 20.0)).abs() < 1e-12);
    }

    #[test]
    fn test_errors_carry_line_numbers() {
        match parse_s2p("# GHz S RI R 50\n1 0 0 0 0\n") {
            Err(VnaError::Touchstone { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other.map(|s| s.len())),
        }
        assert!(matches!(
            parse_s2p("# GHz Z RI R 50\n"),
            Err(VnaError::Touchstone { line: 1, .. })
        ));
        assert!(matches!(
            parse_s2p("2 0 0 0 0 0 0 0 0\n1 0 0 0 0 0 0 0 0\n"),
            Err(VnaError::Touchstone { line: 2, .. })
        ));
    }
}
