//! Time-domain transforms of measured sweeps

use approx::assert_relative_eq;
use vna_core::device::DemoDut;
use vna_core::time_domain::{transform, TimeDomainOptions, TimeDomainResponse, WindowFunction};
use vna_core::{Device, MeasurementConfiguration, MeasurementParameter, VnaConfig};

fn measure(dut: DemoDut) -> Vec<vna_core::SParameterMeasurementPoint> {
    let mut config = VnaConfig::default();
    config.demo.dut = dut;
    let device = Device::open_demo(&config).unwrap();
    let mut plan = MeasurementConfiguration::new();
    // Harmonic grid: 10 MHz steps starting at 10 MHz
    plan.add_uniform_sweep(256, 10e6, 2.56e9, 0.0, 1e3).unwrap();
    device.perform_measurement(&plan).unwrap()
}

#[test]
fn test_attenuator_step_settles_to_transmission() {
    let samples = measure(DemoDut::Attenuator { db: 6.0 });
    let options = TimeDomainOptions {
        window: WindowFunction::Hamming,
        ..Default::default()
    };
    let step = transform(&options, MeasurementParameter::S21, &samples).unwrap();
    assert_eq!(step.len(), 512);
    assert_relative_eq!(step.last().unwrap().value, 10f64.powf(-6.0 / 20.0), epsilon = 1e-9);
}

#[test]
fn test_band_pass_impulse_is_delayed() {
    let samples = measure(DemoDut::BandPass);
    let options = TimeDomainOptions {
        response: TimeDomainResponse::Impulse,
        window: WindowFunction::Hanning,
        ..Default::default()
    };
    let impulse = transform(&options, MeasurementParameter::S21, &samples).unwrap();

    // Two 0.5 ns line sections precede the resonator
    let peak = impulse
        .iter()
        .max_by(|a, b| a.value.abs().total_cmp(&b.value.abs()))
        .unwrap();
    assert!(peak.time_s > 0.5e-9, "peak at {} s", peak.time_s);
    assert!(peak.time_s < 5e-9, "peak at {} s", peak.time_s);
}

#[test]
fn test_short_reflection_is_negative() {
    let samples = measure(DemoDut::Short);
    let options = TimeDomainOptions::default();
    let step = transform(&options, MeasurementParameter::S11, &samples).unwrap();
    assert_relative_eq!(step.last().unwrap().value, -1.0, epsilon = 1e-9);
}
