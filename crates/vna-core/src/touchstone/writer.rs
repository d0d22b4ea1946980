//! Touchstone file writer
//!
//! Writes measured sweeps to Touchstone v1 files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::SParamFormat;
use crate::constants::DEFAULT_Z0;
use crate::error::{Result, VnaError};
use crate::frequency::FrequencyUnit;
use crate::measurement::{to_s_matrix, MeasurementParameter, SParameterMeasurementPoint};

/// Column separator of data lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    /// Right-aligned, space padded columns
    #[default]
    Spaces,
    Tabs,
}

/// Serialises samples as `.s2p`, or `.s1p` for a single reflection parameter
#[derive(Debug, Clone)]
pub struct TouchstoneWriter {
    format: SParamFormat,
    unit: FrequencyUnit,
    z0: f64,
    separator: Separator,
    one_port: Option<MeasurementParameter>,
    comments: Vec<String>,
}

impl Default for TouchstoneWriter {
    fn default() -> Self {
        Self {
            format: SParamFormat::RI,
            unit: FrequencyUnit::Hz,
            z0: DEFAULT_Z0,
            separator: Separator::Spaces,
            one_port: None,
            comments: Vec::new(),
        }
    }
}

impl TouchstoneWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: SParamFormat) -> Self {
        self.format = format;
        self
    }

    pub fn unit(mut self, unit: FrequencyUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn z0(mut self, z0: f64) -> Self {
        self.z0 = z0;
        self
    }

    pub fn separator(mut self, separator: Separator) -> Self {
        self.separator = separator;
        self
    }

    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comments.push(comment.into());
        self
    }

    /// Write a one-port file holding only `parameter` (S11 or S22)
    pub fn one_port(mut self, parameter: MeasurementParameter) -> Result<Self> {
        match parameter {
            MeasurementParameter::S11 | MeasurementParameter::S22 => {
                self.one_port = Some(parameter);
                Ok(self)
            }
            _ => Err(VnaError::invalid(format!(
                "{} is not a reflection parameter",
                parameter.name()
            ))),
        }
    }

    /// Number of ports of the written file
    pub fn nports(&self) -> usize {
        if self.one_port.is_some() {
            1
        } else {
            2
        }
    }

    /// File extension matching the port count
    pub fn extension(&self) -> &'static str {
        if self.one_port.is_some() {
            "s1p"
        } else {
            "s2p"
        }
    }

    /// Write to a Touchstone file
    pub fn write<P: AsRef<Path>>(
        &self,
        path: P,
        samples: &[SParameterMeasurementPoint],
    ) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer, samples)?;
        writer.flush()?;
        Ok(())
    }

    pub fn to_string(&self, samples: &[SParameterMeasurementPoint]) -> Result<String> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, samples)?;
        String::from_utf8(buf).map_err(|e| VnaError::invalid(e.to_string()))
    }

    /// Write to a writer
    pub fn write_to<W: Write>(
        &self,
        writer: &mut W,
        samples: &[SParameterMeasurementPoint],
    ) -> Result<()> {
        if samples
            .windows(2)
            .any(|w| w[1].frequency_hz <= w[0].frequency_hz)
        {
            return Err(VnaError::invalid(
                "Touchstone v1 data must have strictly ascending frequencies",
            ));
        }

        for comment in &self.comments {
            writeln!(writer, "! {}", comment)?;
        }

        // Option line
        writeln!(
            writer,
            "# {} S {} R {}",
            self.unit.label(),
            self.format.label(),
            self.z0
        )?;

        // For 2-port, use standard order: S11, S21, S12, S22
        let order: &[(usize, usize)] = match self.one_port {
            Some(MeasurementParameter::S22) => &[(1, 1)],
            Some(_) => &[(0, 0)],
            None => &[(0, 0), (1, 0), (0, 1), (1, 1)],
        };

        let s = to_s_matrix(samples);
        for (sample, matrix) in samples.iter().zip(s.outer_iter()) {
            let freq = sample.frequency_hz / self.unit.multiplier();
            let mut line = self.column(freq, true);
            for &(i, j) in order {
                let (v1, v2) = self.format.split(matrix[[i, j]]);
                line.push_str(&self.column(v1, false));
                line.push_str(&self.column(v2, false));
            }
            writeln!(writer, "{}", line)?;
        }

        Ok(())
    }

    fn column(&self, value: f64, first: bool) -> String {
        match (self.separator, first) {
            (Separator::Spaces, true) => format!("{:>15.9}", value),
            (Separator::Spaces, false) => format!(" {:>15.9}", value),
            (Separator::Tabs, true) => format!("{}", value),
            (Separator::Tabs, false) => format!("\t{}", value),
        }
    }
}
