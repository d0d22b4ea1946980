//! SCPI-over-TCP driver
//!
//! Talks to analyzer software listening on a raw socket (port 5025 by
//! default). Every command, settings included, is answered with exactly one
//! newline-terminated line; a reply starting with `ERR` is a rejection.
//! Trace data is requested per parameter as comma-separated ASCII values.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use num_complex::Complex64;
use tracing::{debug, trace};

use super::{DeviceInfo, Instrument, SweepContext};
use crate::config::ScpiConfig;
use crate::error::{Result, VnaError};
use crate::measurement::{MeasurementParameter, SParameterMeasurementPoint};
use crate::sweep::{MeasurementConfiguration, TriggerMode};

pub struct ScpiInstrument {
    endpoint: String,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    timeout: Duration,
    info: DeviceInfo,
    /// Replies still owed for commands whose wait was abandoned
    stale_replies: usize,
}

/// Read slice while waiting for a triggered sweep, so a cancel is noticed
const TRIGGER_POLL: Duration = Duration::from_millis(50);

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// First whitespace-separated token of a reply, e.g. `"1.0E6 Hz"` -> `1.0E6`
fn parse_number(reply: &str) -> Option<f64> {
    reply.split_whitespace().next()?.parse().ok()
}

impl ScpiInstrument {
    /// Connect to `endpoint` (`host:port`) and identify the instrument
    pub fn connect(endpoint: &str, config: &ScpiConfig) -> Result<Self> {
        let addr = endpoint
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| VnaError::invalid(format!("cannot resolve {}", endpoint)))?;
        let timeout = config.timeout();
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;

        let mut instrument = Self {
            endpoint: endpoint.to_string(),
            reader: BufReader::new(stream),
            writer,
            timeout,
            stale_replies: 0,
            info: DeviceInfo {
                serial: String::new(),
                model: String::new(),
                min_sweep_frequency_hz: config.min_frequency_hz,
                max_sweep_frequency_hz: config.max_frequency_hz,
            },
        };

        // <vendor>,<model>,<serial>,<firmware>
        let idn = instrument.query("*IDN?")?;
        let fields: Vec<&str> = idn.split(',').map(str::trim).collect();
        instrument.info.model = fields.get(1).copied().unwrap_or("unknown").to_string();
        instrument.info.serial = fields.get(2).copied().unwrap_or("unknown").to_string();
        instrument.query("FORMAT ASCII")?;
        debug!(endpoint, idn = %idn, "SCPI instrument connected");
        Ok(instrument)
    }

    fn read_reply(&mut self, command: &str) -> io::Result<String> {
        while self.stale_replies > 0 {
            let mut stale = String::new();
            self.reader.read_line(&mut stale)?;
            trace!(reply = %stale.trim_end(), "scpi < (discarded)");
            self.stale_replies -= 1;
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed while waiting for reply to {}", command),
            ));
        }
        Ok(line.trim_end().to_string())
    }

    fn send(&mut self, command: &str) -> Result<()> {
        trace!(command, "scpi >");
        writeln!(self.writer, "{}", command)
            .and_then(|_| self.writer.flush())
            .map_err(|e| VnaError::device(format!("{}: {}", self.endpoint, e)))
    }

    fn check_reply(command: &str, reply: String) -> Result<String> {
        trace!(reply = %reply, "scpi <");
        if reply.starts_with("ERR") {
            return Err(VnaError::device(format!("{} rejected: {}", command, reply)));
        }
        Ok(reply)
    }

    /// Send one command and return its reply line
    fn query(&mut self, command: &str) -> Result<String> {
        self.send(command)?;
        let reply = self
            .read_reply(command)
            .map_err(|e| VnaError::device(format!("{}: {}", self.endpoint, e)))?;
        Self::check_reply(command, reply)
    }

    fn query_values(&mut self, command: &str) -> Result<Vec<f64>> {
        let reply = self.query(command)?;
        reply
            .split(',')
            .map(|v| {
                v.trim().parse::<f64>().map_err(|_| {
                    VnaError::device(format!("{}: malformed value {:?}", command, v.trim()))
                })
            })
            .collect()
    }

    /// Start the sweep.
    ///
    /// With an external trigger the `INIT` reply only arrives once the edge
    /// has been seen. The reply is read in short slices so that a cancelled
    /// session or an expired trigger timeout ends the wait; `Ok(false)`
    /// means the sweep was cancelled before it started.
    fn initiate(&mut self, mode: TriggerMode, ctx: &SweepContext<'_>) -> Result<bool> {
        if mode == TriggerMode::FreeRun {
            self.query("INIT")?;
            return Ok(true);
        }

        self.send("INIT")?;
        self.reader.get_ref().set_read_timeout(Some(TRIGGER_POLL))?;
        let reply = self.wait_for_trigger(ctx);
        self.reader.get_ref().set_read_timeout(Some(self.timeout))?;
        match reply? {
            Some(reply) => Self::check_reply("INIT", reply).map(|_| true),
            None => {
                debug!(endpoint = %self.endpoint, "trigger wait cancelled");
                Ok(false)
            }
        }
    }

    /// Read the `INIT` reply; `None` when the session was cancelled first
    fn wait_for_trigger(&mut self, ctx: &SweepContext<'_>) -> Result<Option<String>> {
        let started = Instant::now();
        let mut line = Vec::new();
        loop {
            if ctx.is_cancelled() {
                self.stale_replies += 1;
                return Ok(None);
            }
            if let Some(limit) = ctx.trigger_timeout() {
                if started.elapsed() >= limit {
                    self.stale_replies += 1;
                    return Err(VnaError::TriggerTimeout(limit));
                }
            }
            // Bytes read before a timeout stay in `line`
            match self.reader.read_until(b'\n', &mut line) {
                Ok(_) if line.ends_with(b"\n") => {
                    return Ok(Some(String::from_utf8_lossy(&line).trim_end().to_string()));
                }
                Ok(_) => {
                    return Err(VnaError::device(format!(
                        "{}: connection closed while waiting for trigger",
                        self.endpoint
                    )));
                }
                Err(e) if is_timeout(&e) || e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(VnaError::device(format!("{}: {}", self.endpoint, e))),
            }
        }
    }
}

impl Instrument for ScpiInstrument {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn check_plan(&self, plan: &MeasurementConfiguration) -> Result<()> {
        if plan.as_uniform().is_none() {
            return Err(VnaError::invalid(
                "SCPI instruments only run uniform sweeps with one power level and bandwidth",
            ));
        }
        Ok(())
    }

    fn run_sweep(
        &mut self,
        plan: &MeasurementConfiguration,
        ctx: &mut SweepContext<'_>,
    ) -> Result<()> {
        self.check_plan(plan)?;
        let sweep = match plan.as_uniform() {
            Some(sweep) => sweep,
            None => return Ok(()),
        };

        self.query(&format!("SENSE:FREQUENCY:START {}", sweep.start_freq_hz))?;
        self.query(&format!("SENSE:FREQUENCY:STOP {}", sweep.stop_freq_hz))?;
        self.query(&format!("SENSE:SWEEP:POINTS {}", sweep.num_points))?;
        self.query(&format!("SOURCE:POWER {}", sweep.power_level_dbm))?;
        self.query(&format!("SENSE:BANDWIDTH {}", sweep.bandwidth_hz))?;
        let source = match plan.trigger_mode() {
            TriggerMode::FreeRun => "IMMEDIATE",
            TriggerMode::RisingEdge => "EXTERNAL",
        };
        self.query(&format!("TRIGGER:SOURCE {}", source))?;

        if ctx.is_cancelled() {
            return Ok(());
        }
        if !self.initiate(plan.trigger_mode(), ctx)? {
            return Ok(());
        }

        let reply = self.query("SENSE:SWEEP:POINTS?")?;
        let npoints = parse_number(&reply)
            .ok_or_else(|| VnaError::device(format!("malformed point count {:?}", reply)))?;
        if npoints as usize != plan.len() {
            return Err(VnaError::device(format!(
                "instrument reports {} points, plan has {}",
                npoints,
                plan.len()
            )));
        }

        let mut traces: Vec<Vec<Complex64>> = Vec::with_capacity(4);
        for parameter in MeasurementParameter::ALL {
            let name = parameter.name().to_uppercase();
            let re = self.query_values(&format!("CALC:DATA {},REAL", name))?;
            let im = self.query_values(&format!("CALC:DATA {},IMAG", name))?;
            if re.len() != plan.len() || im.len() != plan.len() {
                return Err(VnaError::device(format!(
                    "{} trace has {}/{} values, expected {}",
                    name,
                    re.len(),
                    im.len(),
                    plan.len()
                )));
            }
            traces.push(re.into_iter().zip(im).map(|(r, i)| Complex64::new(r, i)).collect());
        }

        // Traces come back in MeasurementParameter::ALL order: s11, s21, s12, s22
        for (i, point) in plan.points().iter().enumerate() {
            let sample = SParameterMeasurementPoint::new(
                point.frequency_hz,
                traces[0][i],
                traces[1][i],
                traces[2][i],
                traces[3][i],
            );
            if ctx.emit(sample).is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::device::Device;
    use crate::sweep::MeasurementPoint;
    use std::net::TcpListener;
    use std::ops::ControlFlow;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    /// Minimal analyzer: answers each line with `respond(command, points)`,
    /// or stays silent when it returns `None`
    fn fake_analyzer(respond: fn(&str, usize) -> Option<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut points = 0usize;
            for line in BufReader::new(stream).lines() {
                let Ok(line) = line else { break };
                if let Some(n) = line.strip_prefix("SENSE:SWEEP:POINTS ") {
                    points = n.parse().unwrap();
                }
                let Some(reply) = respond(&line, points) else {
                    continue;
                };
                if writeln!(writer, "{}", reply).is_err() {
                    break;
                }
            }
        });
        addr
    }

    fn well_behaved(command: &str, points: usize) -> Option<String> {
        let reply = match command {
            "*IDN?" => "Pico Technology,PicoVNA 106,SN0042,5.2".to_string(),
            "SENSE:SWEEP:POINTS?" => points.to_string(),
            c if c.starts_with("CALC:DATA S21,REAL") => vec!["0.5"; points].join(","),
            c if c.starts_with("CALC:DATA S11,IMAG") => (0..points)
                .map(|i| format!("{}", i as f64 * 0.1))
                .collect::<Vec<_>>()
                .join(","),
            c if c.starts_with("CALC:DATA") => vec!["0"; points].join(","),
            _ => "OK".to_string(),
        };
        Some(reply)
    }

    fn rejects_power(command: &str, points: usize) -> Option<String> {
        if command.starts_with("SOURCE:POWER") {
            Some("ERR -222,Data out of range".to_string())
        } else {
            well_behaved(command, points)
        }
    }

    fn collect(
        instrument: &mut ScpiInstrument,
        plan: &MeasurementConfiguration,
    ) -> Result<Vec<SParameterMeasurementPoint>> {
        let cancel = AtomicBool::new(false);
        let mut out = Vec::new();
        let mut sink = |s: SParameterMeasurementPoint| {
            out.push(s);
            ControlFlow::Continue(())
        };
        let mut ctx = SweepContext::new(&cancel, None, &mut sink);
        instrument.run_sweep(plan, &mut ctx)?;
        drop(ctx);
        Ok(out)
    }

    #[test]
    fn test_identify_and_sweep() {
        let addr = fake_analyzer(well_behaved);
        let mut instrument = ScpiInstrument::connect(&addr, &ScpiConfig::default()).unwrap();
        let info = instrument.info();
        assert_eq!(info.model, "PicoVNA 106");
        assert_eq!(info.serial, "SN0042");

        let mut plan = MeasurementConfiguration::new();
        plan.add_uniform_sweep(5, 1e6, 5e6, 0.0, 1e3).unwrap();
        let samples = collect(&mut instrument, &plan).unwrap();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[4].frequency_hz, 5e6);
        assert_eq!(samples[2].s21, Complex64::new(0.5, 0.0));
        assert!((samples[3].s11.im - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_err_reply_is_device_error() {
        let addr = fake_analyzer(rejects_power);
        let mut instrument = ScpiInstrument::connect(&addr, &ScpiConfig::default()).unwrap();
        let mut plan = MeasurementConfiguration::new();
        plan.add_uniform_sweep(3, 1e6, 3e6, 10.0, 1e3).unwrap();
        match collect(&mut instrument, &plan) {
            Err(VnaError::DeviceError(msg)) => assert!(msg.contains("Data out of range")),
            other => panic!("expected DeviceError, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_non_uniform_plan_rejected() {
        let addr = fake_analyzer(well_behaved);
        let instrument = ScpiInstrument::connect(&addr, &ScpiConfig::default()).unwrap();
        let mut plan = MeasurementConfiguration::new();
        plan.add_point(MeasurementPoint::new(1e6, 0.0, 1e3)).unwrap();
        plan.add_point(MeasurementPoint::new(2e6, 0.0, 1e3)).unwrap();
        plan.add_point(MeasurementPoint::new(5e6, 0.0, 1e3)).unwrap();
        assert!(matches!(
            instrument.check_plan(&plan),
            Err(VnaError::InvalidParameter(_))
        ));
    }

    /// Armed for an external trigger that never arrives
    fn never_triggered(command: &str, points: usize) -> Option<String> {
        if command == "INIT" {
            None
        } else {
            well_behaved(command, points)
        }
    }

    fn triggered_plan() -> MeasurementConfiguration {
        let mut plan = MeasurementConfiguration::new();
        plan.add_uniform_sweep(5, 1e6, 5e6, 0.0, 1e3).unwrap();
        plan.set_trigger_mode(TriggerMode::RisingEdge);
        plan
    }

    #[test]
    fn test_trigger_timeout_bounds_init_wait() {
        let addr = fake_analyzer(never_triggered);
        let mut instrument = ScpiInstrument::connect(&addr, &ScpiConfig::default()).unwrap();
        let cancel = AtomicBool::new(false);
        let mut sink = |_: SParameterMeasurementPoint| ControlFlow::Continue(());
        let mut ctx = SweepContext::new(&cancel, Some(Duration::from_millis(120)), &mut sink);

        let start = Instant::now();
        assert!(matches!(
            instrument.run_sweep(&triggered_plan(), &mut ctx),
            Err(VnaError::TriggerTimeout(d)) if d == Duration::from_millis(120)
        ));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_abort_ends_untriggered_session() {
        let addr = fake_analyzer(never_triggered);
        let instrument = ScpiInstrument::connect(&addr, &ScpiConfig::default()).unwrap();
        // No trigger timeout: only the abort can end the wait
        let device = Device::from_instrument(Box::new(instrument), SessionConfig::default());

        let mut measurement = device.start_measurement(&triggered_plan()).unwrap();
        let handle = measurement.abort_handle();
        let aborter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            handle.abort();
        });

        let start = Instant::now();
        assert!(matches!(
            measurement.next_point(),
            Err(VnaError::SessionAborted(_))
        ));
        assert!(start.elapsed() < Duration::from_secs(2));
        aborter.join().unwrap();
        drop(measurement);
        assert!(!device.is_busy());
    }

    #[test]
    fn test_parse_number_with_unit() {
        assert_eq!(parse_number("1.0E6 Hz"), Some(1.0e6));
        assert_eq!(parse_number("201"), Some(201.0));
        assert_eq!(parse_number(""), None);
    }
}
