//! Touchstone I/O Tests
//!
//! Export of measured sweeps and reading of bench data back in.

use approx::assert_relative_eq;
use num_complex::Complex64;
use vna_core::device::DemoDut;
use vna_core::frequency::FrequencyUnit;
use vna_core::measurement::MeasurementParameter;
use vna_core::touchstone::{read_s2p, SParamFormat, Separator, TouchstoneWriter};
use vna_core::{Device, MeasurementConfiguration, MeasurementPoint, VnaConfig, VnaError};

const TEST_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/data");

fn assert_complex_eq(a: Complex64, b: Complex64, epsilon: f64) {
    assert_relative_eq!(a.re, b.re, epsilon = epsilon);
    assert_relative_eq!(a.im, b.im, epsilon = epsilon);
}

/// Test reading the bench band-pass file with known values
#[test]
fn test_read_bandpass() {
    let path = format!("{}/bandpass.s2p", TEST_DATA_DIR);
    let samples = read_s2p(&path).expect("Failed to load file");

    assert_eq!(samples.len(), 5);
    assert_relative_eq!(samples[0].frequency_hz, 0.5e9);
    assert_relative_eq!(samples[4].frequency_hz, 1.5e9);

    // Centre frequency: |S21| 0.992 at 0 degrees, S11 -90 degrees
    assert_complex_eq(samples[2].s21, Complex64::new(0.992, 0.0), 1e-12);
    assert_complex_eq(samples[2].s11, Complex64::new(0.0, -0.0398), 1e-12);

    // Last point is split over two lines
    assert_relative_eq!(samples[4].s22.norm(), 0.9123, epsilon = 1e-12);
    assert_relative_eq!(samples[4].s22.arg().to_degrees(), 55.0, epsilon = 1e-9);
}

/// Measured sweep exported in every format reads back unchanged
#[test]
fn test_export_then_read() {
    let device = Device::open_demo(&VnaConfig::default()).unwrap();
    let mut plan = MeasurementConfiguration::new();
    plan.add_uniform_sweep(101, 100e6, 3e9, 0.0, 1e3).unwrap();
    let measured = device.perform_measurement(&plan).unwrap();

    let dir = tempfile::tempdir().unwrap();
    for (format, unit) in [
        (SParamFormat::RI, FrequencyUnit::Hz),
        (SParamFormat::MA, FrequencyUnit::MHz),
        (SParamFormat::DB, FrequencyUnit::GHz),
    ] {
        let writer = TouchstoneWriter::new()
            .format(format)
            .unit(unit)
            .separator(Separator::Tabs)
            .comment("demo band-pass");
        let path = dir.path().join(format!("sweep_{}.{}", format.label(), writer.extension()));
        writer.write(&path, &measured).unwrap();

        let read = read_s2p(&path).unwrap();
        assert_eq!(read.len(), measured.len());
        for (a, b) in read.iter().zip(&measured) {
            assert_relative_eq!(a.frequency_hz, b.frequency_hz, max_relative = 1e-12);
            for (x, y) in a.parameters().iter().zip(b.parameters().iter()) {
                assert_complex_eq(*x, *y, 1e-9);
            }
        }
    }
}

/// One-port export only carries the chosen reflection
#[test]
fn test_one_port_export() {
    let device = Device::open_demo(&VnaConfig::default()).unwrap();
    let mut plan = MeasurementConfiguration::new();
    plan.add_uniform_sweep(11, 1e9, 2e9, 0.0, 1e3).unwrap();
    let measured = device.perform_measurement(&plan).unwrap();

    let writer = TouchstoneWriter::new()
        .one_port(MeasurementParameter::S11)
        .unwrap();
    assert_eq!(writer.nports(), 1);
    assert_eq!(writer.extension(), "s1p");

    let text = writer.to_string(&measured).unwrap();
    let data: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(data.len(), 11);
    for line in data {
        assert_eq!(line.split_whitespace().count(), 3);
    }
}

/// The simulated analyzer reproduces a tabulated DUT at its own frequencies
#[test]
fn test_demo_measures_touchstone_dut() {
    let path = format!("{}/bandpass.s2p", TEST_DATA_DIR);
    let table = read_s2p(&path).unwrap();

    let mut config = VnaConfig::default();
    config.demo.dut = DemoDut::Touchstone { path: path.into() };
    let device = Device::open_demo(&config).unwrap();

    let mut plan = MeasurementConfiguration::new();
    for s in &table {
        plan.add_point(MeasurementPoint::new(s.frequency_hz, 0.0, 1e3))
            .unwrap();
    }
    let measured = device.perform_measurement(&plan).unwrap();

    for (a, b) in measured.iter().zip(&table) {
        for (x, y) in a.parameters().iter().zip(b.parameters().iter()) {
            assert_complex_eq(*x, *y, 1e-12);
        }
    }
}

#[test]
fn test_missing_dut_file() {
    let mut config = VnaConfig::default();
    config.demo.dut = DemoDut::Touchstone {
        path: format!("{}/missing.s2p", TEST_DATA_DIR).into(),
    };
    assert!(matches!(Device::open_demo(&config), Err(VnaError::Io(_))));
}
