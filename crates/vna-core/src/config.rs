//! Runtime configuration
//!
//! Loaded from TOML; every section and key is optional.
//!
//! ```toml
//! [session]
//! channel_capacity = 64
//! trigger_timeout_ms = 5000
//!
//! [demo]
//! serial = "DEMO-0001"
//! point_delay_us = 50
//! dut = { kind = "attenuator", db = 6.0 }
//!
//! [scpi]
//! endpoints = ["127.0.0.1:5025"]
//! timeout_ms = 2000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_SCPI_PORT, DEMO_MAX_FREQUENCY_HZ, DEMO_MIN_FREQUENCY_HZ,
};
use crate::device::DemoDut;
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VnaConfig {
    pub session: SessionConfig,
    pub demo: DemoConfig,
    pub scpi: ScpiConfig,
}

/// Asynchronous measurement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Samples buffered between the worker thread and the consumer
    pub channel_capacity: usize,
    /// How long a triggered sweep waits for the rising edge.
    /// Unset means wait forever.
    pub trigger_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            trigger_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    pub fn trigger_timeout(&self) -> Option<Duration> {
        self.trigger_timeout_ms.map(Duration::from_millis)
    }
}

/// Simulated instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub serial: String,
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
    /// Simulated acquisition time per point
    pub point_delay_us: u64,
    /// Fire the external trigger on its own this long after the sweep is armed
    pub auto_trigger_ms: Option<u64>,
    /// Drop the link after this many points
    pub fail_after: Option<usize>,
    /// Distort readings with a typical uncalibrated error model
    pub systematic_errors: bool,
    pub dut: DemoDut,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            serial: "DEMO-0001".to_string(),
            min_frequency_hz: DEMO_MIN_FREQUENCY_HZ,
            max_frequency_hz: DEMO_MAX_FREQUENCY_HZ,
            point_delay_us: 0,
            auto_trigger_ms: None,
            fail_after: None,
            systematic_errors: false,
            dut: DemoDut::default(),
        }
    }
}

impl DemoConfig {
    pub fn point_delay(&self) -> Duration {
        Duration::from_micros(self.point_delay_us)
    }

    pub fn auto_trigger(&self) -> Option<Duration> {
        self.auto_trigger_ms.map(Duration::from_millis)
    }
}

/// Analyzer software reachable over SCPI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScpiConfig {
    /// Tried in order by `Device::open_any`
    pub endpoints: Vec<String>,
    pub timeout_ms: u64,
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
}

impl Default for ScpiConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![format!("127.0.0.1:{}", DEFAULT_SCPI_PORT)],
            timeout_ms: 2000,
            min_frequency_hz: DEMO_MIN_FREQUENCY_HZ,
            max_frequency_hz: DEMO_MAX_FREQUENCY_HZ,
        }
    }
}

impl ScpiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl VnaConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VnaError;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = VnaConfig::from_toml_str("").unwrap();
        assert_eq!(config, VnaConfig::default());
        assert_eq!(config.session.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.session.trigger_timeout(), None);
        assert_eq!(config.scpi.endpoints, vec!["127.0.0.1:5025".to_string()]);
    }

    #[test]
    fn test_partial_sections() {
        let config = VnaConfig::from_toml_str(
            r#"
            [session]
            trigger_timeout_ms = 250

            [demo]
            fail_after = 10
            dut = { kind = "attenuator", db = 6.0 }
            "#,
        )
        .unwrap();
        assert_eq!(
            config.session.trigger_timeout(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.session.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.demo.fail_after, Some(10));
        assert_eq!(config.demo.dut, DemoDut::Attenuator { db: 6.0 });
        assert_eq!(config.demo.serial, "DEMO-0001");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scpi]\nendpoints = [\"10.0.0.5:5025\"]\ntimeout_ms = 500").unwrap();
        let config = VnaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.scpi.endpoints, vec!["10.0.0.5:5025".to_string()]);
        assert_eq!(config.scpi.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = VnaConfig::from_toml_str("[session\nchannel_capacity = ").unwrap_err();
        assert!(matches!(err, VnaError::Config(_)));
    }
}
