//! Asynchronous measurement sessions
//!
//! A worker thread runs the sweep and pushes samples through a bounded
//! channel; [`ActiveMeasurement`] hands them out one at a time in plan order.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::calibration::Calibration;
use crate::device::{correct, lock_instrument, SharedInstrument, SweepContext};
use crate::error::{Result, VnaError};
use crate::measurement::SParameterMeasurementPoint;
use crate::sweep::MeasurementConfiguration;

/// How often a worker blocked on a full channel rechecks for abort
const SEND_POLL: Duration = Duration::from_millis(10);

/// Marks a device busy for as long as it lives
pub(crate) struct SessionGuard {
    busy: Arc<AtomicBool>,
}

impl SessionGuard {
    pub(crate) fn acquire(busy: &Arc<AtomicBool>) -> Result<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| VnaError::SessionActive)?;
        Ok(Self {
            busy: Arc::clone(busy),
        })
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Everything the worker thread needs to run one plan
pub(crate) struct SweepJob {
    pub instrument: SharedInstrument,
    pub plan: MeasurementConfiguration,
    pub calibration: Option<Arc<Calibration>>,
    pub trigger_timeout: Option<Duration>,
    pub capacity: usize,
    pub guard: SessionGuard,
}

type Item = Result<SParameterMeasurementPoint>;

/// Stops a running measurement from any thread
#[derive(Debug, Clone)]
pub struct AbortHandle {
    cancel: Arc<AtomicBool>,
    wake: Sender<()>,
}

impl AbortHandle {
    /// Request the worker to stop and wake a blocked `next_point()`
    pub fn abort(&self) {
        if !self.cancel.swap(true, Ordering::AcqRel) {
            let _ = self.wake.try_send(());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// A measurement running on a worker thread.
///
/// Dropping it before every point has been read aborts the sweep.
pub struct ActiveMeasurement {
    rx: Receiver<Item>,
    wake_rx: Receiver<()>,
    abort: AbortHandle,
    planned: usize,
    cursor: usize,
    finished: bool,
    worker: Option<JoinHandle<()>>,
}

enum Event {
    Item(Item),
    Closed,
    Aborted,
}

pub(crate) fn start(job: SweepJob) -> Result<ActiveMeasurement> {
    let (tx, rx) = bounded(job.capacity.max(1));
    let (wake, wake_rx) = bounded(1);
    let cancel = Arc::new(AtomicBool::new(false));
    let planned = job.plan.len();

    let worker_cancel = Arc::clone(&cancel);
    let worker = thread::Builder::new()
        .name("vna-sweep".to_string())
        .spawn(move || run_worker(job, worker_cancel, tx))?;

    info!(npoints = planned, "measurement session started");
    Ok(ActiveMeasurement {
        rx,
        wake_rx,
        abort: AbortHandle { cancel, wake },
        planned,
        cursor: 0,
        finished: false,
        worker: Some(worker),
    })
}

/// Block on a full channel without missing an abort
fn forward<T>(tx: &Sender<T>, cancel: &AtomicBool, mut item: T) -> ControlFlow<()> {
    loop {
        if cancel.load(Ordering::Acquire) {
            return ControlFlow::Break(());
        }
        match tx.send_timeout(item, SEND_POLL) {
            Ok(()) => return ControlFlow::Continue(()),
            Err(SendTimeoutError::Timeout(back)) => item = back,
            Err(SendTimeoutError::Disconnected(_)) => return ControlFlow::Break(()),
        }
    }
}

fn run_worker(job: SweepJob, cancel: Arc<AtomicBool>, tx: Sender<Item>) {
    let SweepJob {
        instrument,
        plan,
        calibration,
        trigger_timeout,
        guard,
        ..
    } = job;

    let outcome = (|| -> Result<usize> {
        let mut instrument = lock_instrument(&instrument)?;
        let calibration = calibration.as_deref();
        let mut sink = |sample| forward(&tx, &cancel, Ok(correct(calibration, sample)));
        let mut ctx = SweepContext::new(&cancel, trigger_timeout, &mut sink);
        instrument.run_sweep(&plan, &mut ctx)?;
        Ok(ctx.emitted())
    })();

    match outcome {
        Ok(n) => debug!(npoints = n, "sweep worker finished"),
        Err(e) => {
            warn!(error = %e, "sweep failed");
            let _ = forward(&tx, &cancel, Err(e));
        }
    }
    drop(guard);
}

impl ActiveMeasurement {
    /// Number of points in the plan
    pub fn planned(&self) -> usize {
        self.planned
    }

    /// Number of points handed out so far
    pub fn delivered(&self) -> usize {
        self.cursor
    }

    /// False once every point was delivered or the session ended early
    pub fn has_more_points(&self) -> bool {
        !self.finished && self.cursor < self.planned
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Block until the next sample is available.
    ///
    /// A failure on the device side ends the session with `SessionAborted`;
    /// an expired trigger wait is reported as `TriggerTimeout`.
    pub fn next_point(&mut self) -> Result<SParameterMeasurementPoint> {
        if self.abort.is_aborted() && !self.finished {
            return Err(self.end(VnaError::aborted("measurement aborted")));
        }
        if !self.has_more_points() {
            return Err(if self.abort.is_aborted() {
                VnaError::aborted("measurement aborted")
            } else if self.cursor < self.planned {
                VnaError::aborted("measurement session has ended")
            } else {
                VnaError::invalid(format!("all {} points have been delivered", self.planned))
            });
        }

        let event = select! {
            recv(self.rx) -> msg => match msg {
                Ok(item) => Event::Item(item),
                Err(_) => Event::Closed,
            },
            recv(self.wake_rx) -> _ => Event::Aborted,
        };

        match event {
            Event::Item(Ok(sample)) => {
                self.cursor += 1;
                if self.cursor == self.planned {
                    self.finished = true;
                    // The device is free again once this returns
                    self.join_worker();
                    info!(npoints = self.planned, "measurement complete");
                }
                Ok(sample)
            }
            Event::Item(Err(e @ VnaError::TriggerTimeout(_))) => Err(self.end(e)),
            Event::Item(Err(e)) => Err(self.end(VnaError::aborted(e.to_string()))),
            Event::Closed if self.abort.is_aborted() => {
                Err(self.end(VnaError::aborted("measurement aborted")))
            }
            Event::Closed => Err(self.end(VnaError::aborted(format!(
                "instrument stopped after {} of {} points",
                self.cursor, self.planned
            )))),
            Event::Aborted => Err(self.end(VnaError::aborted("measurement aborted"))),
        }
    }

    /// Stop the sweep and release the device
    pub fn abort(&mut self) {
        if !self.finished {
            info!(delivered = self.cursor, planned = self.planned, "aborting measurement");
        }
        self.abort.abort();
        self.finished = true;
        self.join_worker();
    }

    fn end(&mut self, err: VnaError) -> VnaError {
        debug!(error = %err, delivered = self.cursor, "measurement session ended");
        self.abort.abort();
        self.finished = true;
        self.join_worker();
        err
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("sweep worker panicked");
            }
        }
    }
}

impl Iterator for ActiveMeasurement {
    type Item = Result<SParameterMeasurementPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_more_points() {
            Some(self.next_point())
        } else {
            None
        }
    }
}

impl Drop for ActiveMeasurement {
    fn drop(&mut self) {
        if self.has_more_points() {
            self.abort();
        } else {
            self.join_worker();
        }
    }
}
