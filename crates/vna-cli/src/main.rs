//! Command-line front end for vector network analyzers
//!
//! Runs sweeps on an analyzer reachable over SCPI or on the built-in
//! simulator, applies calibrations, and prints or exports the results.
//!
//! # Usage Examples
//!
//! ## Simple sweep on the simulator
//! ```bash
//! vna --demo sweep
//! ```
//!
//! ## Calibrated sweep, log-magnitude/phase output
//! ```bash
//! vna cal-sweep --calibration solt.json
//! ```
//!
//! ## Step response of S21
//! ```bash
//! vna --demo -v time-domain --window hanning
//! ```
//!
//! ## Wait for an external trigger
//! ```bash
//! vna --config bench.toml trigger
//! ```

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use vna_core::device::{DemoDut, DemoFixture, DemoInstrument, DemoTrigger};
use vna_core::format::{SampleFormat, SweepPrinter};
use vna_core::frequency::FrequencyUnit;
use vna_core::time_domain::{
    transform, TimeDomainMode, TimeDomainOptions, TimeDomainResponse, WindowFunction,
};
use vna_core::touchstone::{SParamFormat, TouchstoneWriter};
use vna_core::{
    Calibration, Device, MeasurementConfiguration, MeasurementParameter,
    SParameterMeasurementPoint, SoltStandards, TriggerMode, VnaConfig, VnaError,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Vector network analyzer sweeps, calibration and export", long_about = None)]
struct Args {
    /// Use the simulated analyzer instead of searching for hardware
    #[arg(long, default_value_t = false)]
    demo: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level (-v=info, -vv=debug, -vvv=trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Uniform sweep over the instrument range, once blocking and once streamed
    Sweep {
        /// Number of points
        #[arg(short, long, default_value_t = 2001)]
        points: usize,

        /// Power level in dBm
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        power: f64,

        /// IF bandwidth in Hz
        #[arg(long, default_value_t = 1000.0)]
        bandwidth: f64,
    },

    /// Load a calibration and sweep over exactly its grid
    CalSweep {
        /// Calibration file written by `calibrate`
        #[arg(long)]
        calibration: PathBuf,
    },

    /// Transform one S-parameter of a harmonic sweep to the time domain
    TimeDomain {
        /// Number of frequency points
        #[arg(short, long, default_value_t = 512)]
        points: usize,

        /// S-parameter to transform (s11, s21, s12, s22)
        #[arg(long, default_value = "s21")]
        parameter: String,

        /// Window function (rectangular, hanning, hamming, blackman)
        #[arg(long, default_value = "hanning")]
        window: String,

        #[arg(long, default_value = "low-pass")]
        mode: ModeArg,

        #[arg(long, default_value = "step")]
        response: ResponseArg,

        /// Zero-pad the transform to a power of two
        #[arg(long, default_value_t = false)]
        pad: bool,
    },

    /// Sweep with exponentially growing frequency steps
    LogSweep {
        /// Start frequency in Hz
        #[arg(long, default_value_t = 0.3e6)]
        start: f64,

        /// Ratio between neighbouring frequencies
        #[arg(long, default_value_t = 1.01)]
        ratio: f64,
    },

    /// Wait for a rising edge on the trigger input, then stream the sweep
    Trigger {
        #[arg(short, long, default_value_t = 2001)]
        points: usize,

        /// Simulator only: fire the trigger after this many milliseconds
        #[arg(long, default_value_t = 1000)]
        fire_after_ms: u64,
    },

    /// Sweep and write the result as a Touchstone file
    Export {
        /// Output file; the extension follows the port count if missing
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, default_value_t = 201)]
        points: usize,

        #[arg(long, default_value = "ri")]
        format: FormatArg,

        #[arg(long, default_value = "hz")]
        unit: UnitArg,

        /// Write a one-port file with only this reflection (s11 or s22)
        #[arg(long)]
        one_port: Option<String>,
    },

    /// Simulator only: measure SOLT standards, solve and save a calibration
    Calibrate {
        /// Calibration file to write
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, default_value_t = 401)]
        points: usize,

        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        power: f64,

        #[arg(long, default_value_t = 1000.0)]
        bandwidth: f64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    LowPass,
    BandPass,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResponseArg {
    Step,
    Impulse,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Ri,
    Ma,
    Db,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum UnitArg {
    Hz,
    Khz,
    Mhz,
    Ghz,
}

/// An opened analyzer, plus the simulator's extra inputs when it is one
struct Analyzer {
    device: Device,
    trigger: Option<DemoTrigger>,
    fixture: Option<DemoFixture>,
}

fn open(args: &Args, config: &VnaConfig) -> anyhow::Result<Analyzer> {
    if !args.demo {
        match Device::open_any(config) {
            Ok(device) => {
                return Ok(Analyzer {
                    device,
                    trigger: None,
                    fixture: None,
                })
            }
            Err(VnaError::DeviceNotFound) => {
                bail!(
                    "no analyzer found at {:?}; pass --demo to use the simulator",
                    config.scpi.endpoints
                )
            }
            Err(e) => return Err(e.into()),
        }
    }

    let demo = DemoInstrument::new(&config.demo)?;
    let trigger = demo.trigger();
    let fixture = demo.fixture();
    Ok(Analyzer {
        device: Device::from_instrument(Box::new(demo), config.session.clone()),
        trigger: Some(trigger),
        fixture: Some(fixture),
    })
}

fn uniform_plan(
    points: usize,
    start_hz: f64,
    stop_hz: f64,
    power_dbm: f64,
    bandwidth_hz: f64,
) -> vna_core::Result<MeasurementConfiguration> {
    let mut plan = MeasurementConfiguration::new();
    plan.add_uniform_sweep(points, start_hz, stop_hz, power_dbm, bandwidth_hz)?;
    Ok(plan)
}

fn print_streamed<W: std::io::Write>(
    device: &Device,
    plan: &MeasurementConfiguration,
    printer: &mut SweepPrinter<W>,
) -> anyhow::Result<()> {
    let mut measurement = device.start_measurement(plan)?;
    printer.print_header()?;
    while measurement.has_more_points() {
        let sample = measurement.next_point()?;
        printer.print_sample(&sample)?;
    }
    Ok(())
}

fn sweep(device: &Device, points: usize, power: f64, bandwidth: f64) -> anyhow::Result<()> {
    let info = device.info();
    let plan = uniform_plan(
        points,
        info.min_sweep_frequency_hz,
        info.max_sweep_frequency_hz,
        power,
        bandwidth,
    )?;

    let mut printer = SweepPrinter::new(std::io::stdout().lock(), SampleFormat::RealImaginary);

    printer.print_banner("Sweep 1 (Sync)")?;
    let samples = device.perform_measurement(&plan)?;
    printer.print_points(&samples)?;

    printer.print_banner("Sweep 2 (Async)")?;
    print_streamed(device, &plan, &mut printer)?;

    printer.print_banner("Done")?;
    printer.flush()?;
    Ok(())
}

fn cal_sweep(device: &mut Device, calibration: &Path) -> anyhow::Result<()> {
    device
        .apply_calibration_from_file(calibration)
        .with_context(|| format!("loading calibration {}", calibration.display()))?;
    let meta = device
        .calibration_metadata()
        .context("calibration has no metadata")?;
    info!(
        points = meta.num_points,
        start_hz = meta.start_freq_hz,
        stop_hz = meta.stop_freq_hz,
        "sweeping calibrated grid"
    );

    let plan = uniform_plan(
        meta.num_points,
        meta.start_freq_hz,
        meta.stop_freq_hz,
        meta.power_level_dbm,
        meta.bandwidth_hz,
    )?;

    let mut printer = SweepPrinter::new(std::io::stdout().lock(), SampleFormat::LogMagPhase);
    printer.print_banner("Asynchronous sweep")?;
    print_streamed(device, &plan, &mut printer)?;
    printer.print_banner("Done")?;
    printer.flush()?;
    Ok(())
}

fn time_domain(
    device: &Device,
    points: usize,
    options: TimeDomainOptions,
    parameter: MeasurementParameter,
) -> anyhow::Result<()> {
    // Harmonic grid starting at the lowest supported frequency
    let f0 = device.info().min_sweep_frequency_hz;
    let plan = uniform_plan(points, f0, f0 * points as f64, 0.0, 1000.0)?;

    let mut printer = SweepPrinter::new(std::io::stdout().lock(), SampleFormat::RealImaginary);
    printer.print_banner("Sweeping")?;
    let samples = device.perform_measurement(&plan)?;

    printer.print_banner("Time domain")?;
    let result = transform(&options, parameter, &samples)?;
    printer.print_time_domain(&options, parameter, &result)?;
    printer.print_banner("Done")?;
    printer.flush()?;
    Ok(())
}

fn log_sweep(device: &Device, start: f64, ratio: f64) -> anyhow::Result<()> {
    let mut plan = MeasurementConfiguration::new();
    plan.add_log_sweep(start, device.info().max_sweep_frequency_hz, ratio, 0.0, 10e3)
        .context("sweep exceeds the point limit, not sweeping")?;
    debug!(points = plan.len(), "log sweep planned");

    let mut printer = SweepPrinter::new(std::io::stdout().lock(), SampleFormat::RealImaginary);
    printer.print_banner("Sweeping")?;
    let samples = device.perform_measurement(&plan)?;
    for s in &samples {
        printer.print_line(&format!(
            "{} Hz: s11: {}  s21: {}  s12: {}  s22: {}",
            s.frequency_hz, s.s11, s.s21, s.s12, s.s22
        ))?;
    }
    printer.print_banner("Done")?;
    printer.flush()?;
    Ok(())
}

fn trigger(analyzer: &Analyzer, points: usize, fire_after: Duration) -> anyhow::Result<()> {
    let device = &analyzer.device;
    let info = device.info();
    let mut plan = uniform_plan(
        points,
        info.min_sweep_frequency_hz,
        info.max_sweep_frequency_hz,
        0.0,
        1000.0,
    )?;
    plan.set_trigger_mode(TriggerMode::RisingEdge);

    let mut printer = SweepPrinter::new(std::io::stdout().lock(), SampleFormat::RealImaginary);
    printer.print_banner("Waiting for trigger")?;
    printer.flush()?;

    let mut measurement = device.start_measurement(&plan)?;
    let firing = analyzer.trigger.clone().map(|trigger| {
        thread::spawn(move || {
            thread::sleep(fire_after);
            trigger.fire();
        })
    });

    let mut first = true;
    while measurement.has_more_points() {
        let sample = measurement.next_point()?;
        if first {
            printer.print_line("Trigger event occurred")?;
            printer.print_banner("Sweeping")?;
            printer.print_header()?;
            first = false;
        }
        printer.print_sample(&sample)?;
    }
    printer.print_banner("Done")?;
    printer.flush()?;

    if let Some(handle) = firing {
        if handle.join().is_err() {
            warn!("trigger thread panicked");
        }
    }
    Ok(())
}

fn export(
    device: &Device,
    output: &Path,
    points: usize,
    writer: TouchstoneWriter,
) -> anyhow::Result<()> {
    let info = device.info();
    let plan = uniform_plan(
        points,
        info.min_sweep_frequency_hz,
        info.max_sweep_frequency_hz,
        0.0,
        1000.0,
    )?;
    let samples = device.perform_measurement(&plan)?;

    let path = if output.extension().is_some() {
        output.to_path_buf()
    } else {
        output.with_extension(writer.extension())
    };
    let writer = writer.comment(format!(
        "{} {}, {} points",
        info.model,
        info.serial,
        samples.len()
    ));
    writer
        .write(&path, &samples)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), points = samples.len(), "Touchstone file written");
    Ok(())
}

fn calibrate(
    analyzer: &Analyzer,
    output: &Path,
    plan: &MeasurementConfiguration,
) -> anyhow::Result<()> {
    let Some(fixture) = &analyzer.fixture else {
        bail!("calibrate drives the simulator's fixture; run it with --demo");
    };
    let device = &analyzer.device;

    let measure = |name: &str, dut: DemoDut| -> anyhow::Result<Vec<SParameterMeasurementPoint>> {
        info!(standard = name, "measuring calibration standard");
        fixture.connect(dut)?;
        Ok(device.perform_measurement(plan)?)
    };
    let standards = SoltStandards {
        short: measure("short", DemoDut::Short)?,
        open: measure("open", DemoDut::Open)?,
        load: measure("load", DemoDut::Load)?,
        thru: measure("thru", DemoDut::Through)?,
    };
    fixture.connect(DemoDut::BandPass)?;

    let calibration = Calibration::solve_solt(plan, &standards)?;
    calibration
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!(
        "Calibration with {} points written to {}",
        calibration.points().len(),
        output.display()
    );
    Ok(())
}

/// Calibrating and applying a calibration both need the simulator to behave
/// like a raw, uncorrected analyzer, so the two commands agree on its errors.
fn needs_raw_simulator(command: &Command) -> bool {
    matches!(command, Command::Calibrate { .. } | Command::CalSweep { .. })
}

fn parse_parameter(name: &str) -> anyhow::Result<MeasurementParameter> {
    MeasurementParameter::from_str(name)
        .with_context(|| format!("unknown S-parameter {:?}", name))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 0 = WARN (quiet), 1 = INFO, 2 = DEBUG, 3+ = TRACE; RUST_LOG wins if set
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let mut config = match &args.config {
        Some(path) => VnaConfig::from_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => VnaConfig::default(),
    };
    if needs_raw_simulator(&args.command) {
        config.demo.systematic_errors = true;
    }

    let mut analyzer = open(&args, &config)?;
    println!("Instrument connected: {}", analyzer.device.info().serial);

    match &args.command {
        Command::Sweep {
            points,
            power,
            bandwidth,
        } => sweep(&analyzer.device, *points, *power, *bandwidth)?,
        Command::CalSweep { calibration } => cal_sweep(&mut analyzer.device, calibration)?,
        Command::TimeDomain {
            points,
            parameter,
            window,
            mode,
            response,
            pad,
        } => {
            let options = TimeDomainOptions {
                mode: match mode {
                    ModeArg::LowPass => TimeDomainMode::LowPass,
                    ModeArg::BandPass => TimeDomainMode::BandPass,
                },
                response: match response {
                    ResponseArg::Step => TimeDomainResponse::Step,
                    ResponseArg::Impulse => TimeDomainResponse::Impulse,
                },
                window: WindowFunction::from_str(window)
                    .with_context(|| format!("unknown window {:?}", window))?,
                pad_to_power_of_two: *pad,
            };
            time_domain(&analyzer.device, *points, options, parse_parameter(parameter)?)?
        }
        Command::LogSweep { start, ratio } => log_sweep(&analyzer.device, *start, *ratio)?,
        Command::Trigger {
            points,
            fire_after_ms,
        } => trigger(&analyzer, *points, Duration::from_millis(*fire_after_ms))?,
        Command::Export {
            output,
            points,
            format,
            unit,
            one_port,
        } => {
            let mut writer = TouchstoneWriter::new()
                .format(match format {
                    FormatArg::Ri => SParamFormat::RI,
                    FormatArg::Ma => SParamFormat::MA,
                    FormatArg::Db => SParamFormat::DB,
                })
                .unit(match unit {
                    UnitArg::Hz => FrequencyUnit::Hz,
                    UnitArg::Khz => FrequencyUnit::KHz,
                    UnitArg::Mhz => FrequencyUnit::MHz,
                    UnitArg::Ghz => FrequencyUnit::GHz,
                });
            if let Some(name) = one_port {
                writer = writer.one_port(parse_parameter(name)?)?;
            }
            export(&analyzer.device, output, *points, writer)?
        }
        Command::Calibrate {
            output,
            points,
            power,
            bandwidth,
        } => {
            let info = analyzer.device.info();
            let plan = uniform_plan(
                *points,
                info.min_sweep_frequency_hz,
                info.max_sweep_frequency_hz,
                *power,
                *bandwidth,
            )?;
            calibrate(&analyzer, output, &plan)?
        }
    }

    Ok(())
}
