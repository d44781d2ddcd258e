//! Reconnect supervisor: owns the worker thread that polls for the target
//! process, captures its audio, and runs the hop/scoring loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use ggwatch_audio::{CaptureBackend, CaptureSession, HopAccumulator, ProcessLocator, ReferenceLibrary};
use ggwatch_detect::{HopDecider, HopOutcome};
use ggwatch_foundation::{Backoff, ListenerError, SharedClock};

use crate::config::ListenerConfig;

/// Bounded read so the worker observes the stop flag promptly.
const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// How long `stop()` waits for the worker to wind down before detaching.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Detections buffered toward the host before the worker starts dropping.
const EVENT_QUEUE_DEPTH: usize = 16;

/// A confirmed detection, delivered on the host's receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvent {
    pub label: String,
    pub score: f32,
}

/// Why one capture session ended.
enum RunEnd {
    Fault,
    SilenceTimeout,
    Stopped,
}

/// Everything the worker thread takes ownership of on `start()`.
struct WorkerDeps {
    backend: Box<dyn CaptureBackend>,
    locator: Box<dyn ProcessLocator>,
    library: ReferenceLibrary,
    events_tx: Sender<MatchEvent>,
}

pub struct MatchListener {
    cfg: ListenerConfig,
    clock: SharedClock,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    deps: Option<WorkerDeps>,
}

impl MatchListener {
    /// Builds a listener. Refuses when the reference library is empty:
    /// a detector with nothing to match is a configuration error, not a
    /// runtime fault.
    pub fn new(
        cfg: ListenerConfig,
        backend: Box<dyn CaptureBackend>,
        locator: Box<dyn ProcessLocator>,
        library: ReferenceLibrary,
        clock: SharedClock,
    ) -> Result<(Self, Receiver<MatchEvent>), ListenerError> {
        if library.is_empty() {
            return Err(ListenerError::NoReferences);
        }
        let (events_tx, events_rx) = bounded(EVENT_QUEUE_DEPTH);
        let listener = Self {
            cfg,
            clock,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            deps: Some(WorkerDeps {
                backend,
                locator,
                library,
                events_tx,
            }),
        };
        Ok((listener, events_rx))
    }

    /// Spawns the worker. A no-op while already running; a listener that
    /// has been stopped is done and cannot be restarted.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            tracing::debug!("listener already started");
            return;
        }
        let Some(deps) = self.deps.take() else {
            tracing::warn!("listener was stopped; build a new one to restart");
            return;
        };

        self.running.store(true, Ordering::SeqCst);
        let worker = Worker {
            cfg: self.cfg.clone(),
            clock: self.clock.clone(),
            running: self.running.clone(),
            backend: deps.backend,
            locator: deps.locator,
            library: deps.library,
            events_tx: deps.events_tx,
        };

        match thread::Builder::new()
            .name("ggwatch-listener".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => self.handle = Some(handle),
            Err(err) => {
                tracing::error!(%err, "failed to spawn listener worker");
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Requests a cooperative stop and joins the worker with a bounded
    /// timeout. Safe to call repeatedly and when never started.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + STOP_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            tracing::warn!(timeout = ?STOP_TIMEOUT, "listener worker did not stop in time");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

struct Worker {
    cfg: ListenerConfig,
    clock: SharedClock,
    running: Arc<AtomicBool>,
    backend: Box<dyn CaptureBackend>,
    locator: Box<dyn ProcessLocator>,
    library: ReferenceLibrary,
    events_tx: Sender<MatchEvent>,
}

impl Worker {
    fn run(mut self) {
        let mut backoff = Backoff::new(
            Duration::from_secs_f32(self.cfg.backoff_base_secs),
            Duration::from_secs_f32(self.cfg.backoff_cap_secs),
        );

        while self.running.load(Ordering::SeqCst) {
            let Some(pid) = self.wait_for_process() else {
                break;
            };

            // Guard against pid reuse between discovery and capture open.
            let verified = self.locator.find_pid(&self.cfg.exe_name);
            if verified != Some(pid) {
                tracing::warn!(
                    pid,
                    exe = %self.cfg.exe_name,
                    "pid no longer belongs to the target executable, retrying"
                );
                self.sleep_while_running(Duration::from_secs_f32(self.cfg.poll_interval_secs));
                continue;
            }

            tracing::info!(pid, exe = %self.cfg.exe_name, "capturing process audio");
            let mut session = match self.backend.open(pid) {
                Ok(session) => session,
                Err(err) if err.is_permanent() => {
                    tracing::error!(%err, "capture backend unavailable, listener disabled");
                    return;
                }
                Err(err) => {
                    tracing::warn!(%err, "failed to open capture session");
                    backoff.on_fault();
                    self.sleep_while_running(backoff.delay());
                    continue;
                }
            };

            let end = self.hop_loop(session.as_mut());
            // The session is always closed before another one is opened.
            session.close();

            match end {
                RunEnd::Fault => backoff.on_fault(),
                RunEnd::SilenceTimeout | RunEnd::Stopped => backoff.on_success(),
            }

            if self.running.load(Ordering::SeqCst) {
                tracing::info!(delay = ?backoff.delay(), "capture ended, reconnecting");
                self.sleep_while_running(backoff.delay());
            }
        }

        tracing::info!("listener worker stopped");
    }

    /// Polls until the target executable is found or a stop is requested.
    fn wait_for_process(&mut self) -> Option<u32> {
        tracing::info!(exe = %self.cfg.exe_name, "waiting for target process");
        let poll = Duration::from_secs_f32(self.cfg.poll_interval_secs);
        while self.running.load(Ordering::SeqCst) {
            if let Some(pid) = self.locator.find_pid(&self.cfg.exe_name) {
                tracing::info!(pid, exe = %self.cfg.exe_name, "found target process");
                return Some(pid);
            }
            self.sleep_while_running(poll);
        }
        None
    }

    fn hop_loop(&mut self, session: &mut dyn CaptureSession) -> RunEnd {
        let det = self.cfg.detector.clone();
        let mut accumulator =
            HopAccumulator::new(session.channels(), det.hop_samples(), det.ring_samples());
        let mut decider = HopDecider::new(det, self.clock.clone());

        tracing::info!("hop loop started");
        while self.running.load(Ordering::SeqCst) {
            let chunk = match session.read(READ_TIMEOUT) {
                Ok(chunk) => chunk,
                Err(err) => {
                    tracing::warn!(%err, "capture read failed");
                    return RunEnd::Fault;
                }
            };
            if chunk.is_empty() {
                continue;
            }
            if !accumulator.push(&chunk) {
                continue;
            }

            match decider.on_hop(accumulator.ring(), self.library.iter()) {
                HopOutcome::SilenceTimeout => {
                    tracing::info!("prolonged silence, tearing capture session down");
                    return RunEnd::SilenceTimeout;
                }
                HopOutcome::Fired { label, score } => {
                    tracing::info!(%label, score, "match confirmed");
                    let event = MatchEvent { label, score };
                    if self.events_tx.try_send(event).is_err() {
                        tracing::warn!("host event queue full, detection dropped");
                    }
                }
                _ => {}
            }
        }
        RunEnd::Stopped
    }

    /// Sleeps in short steps so a stop request is observed quickly even
    /// inside a long backoff delay.
    fn sleep_while_running(&self, total: Duration) {
        let mut remaining = total;
        while remaining > Duration::ZERO && self.running.load(Ordering::SeqCst) {
            let step = remaining.min(Duration::from_millis(200));
            self.clock.sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }
}
