//! Supervisor tests with a scripted capture backend and process locator.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use ggwatch_app::{ListenerConfig, MatchEvent, MatchListener};
use ggwatch_audio::refs::ReferenceClip;
use ggwatch_audio::{CaptureBackend, CaptureSession, ProcessLocator, ReferenceLibrary};
use ggwatch_detect::DetectorConfig;
use ggwatch_foundation::{real_clock, CaptureError, ListenerError};

const RATE: u32 = 8_000;

fn test_config() -> ListenerConfig {
    ListenerConfig {
        detector: DetectorConfig {
            chunk_duration_secs: 0.5,
            hop_duration_secs: 0.05,
            cooldown_secs: 60.0,
            match_threshold: 0.25,
            match_margin: 0.10,
            confirm_hops: 2,
            min_rms: 1e-4,
            silence_reconnect_secs: 60.0,
            sample_rate_hz: RATE,
        },
        exe_name: "game.exe".to_string(),
        poll_interval_secs: 0.005,
        backoff_base_secs: 0.005,
        backoff_cap_secs: 0.02,
        refs_dir: PathBuf::from("."),
        labels: Vec::new(),
    }
}

/// Aperiodic chirp so a match is unambiguous.
fn sweep(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f32 / RATE as f32;
            0.6 * (2.0 * std::f32::consts::PI * (200.0 + 4_000.0 * t) * t).sin()
        })
        .collect()
}

fn library(label: &str, samples: Vec<f32>) -> ReferenceLibrary {
    ReferenceLibrary::from_clips(vec![ReferenceClip {
        label: label.to_string(),
        samples,
        sample_rate: RATE,
    }])
}

struct FakeLocator {
    script: VecDeque<Option<u32>>,
    fallback: Option<u32>,
    calls: Arc<AtomicUsize>,
}

impl FakeLocator {
    fn constant(pid: u32) -> Self {
        Self::scripted(Vec::new(), Some(pid))
    }

    fn scripted(script: Vec<Option<u32>>, fallback: Option<u32>) -> Self {
        Self {
            script: script.into(),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ProcessLocator for FakeLocator {
    fn find_pid(&mut self, _exe_name: &str) -> Option<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

enum AfterScript {
    Idle,
    Fault,
    Silence(usize),
}

struct ScriptedSession {
    chunks: VecDeque<Vec<f32>>,
    after: AfterScript,
    pace: Duration,
    closes: Arc<AtomicUsize>,
}

impl CaptureSession for ScriptedSession {
    fn read(&mut self, _timeout: Duration) -> Result<Vec<f32>, CaptureError> {
        thread::sleep(self.pace);
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(chunk);
        }
        match &self.after {
            AfterScript::Idle => Ok(Vec::new()),
            AfterScript::Fault => Err(CaptureError::Fault("scripted fault".to_string())),
            AfterScript::Silence(len) => Ok(vec![0.0; *len]),
        }
    }

    fn channels(&self) -> u16 {
        1
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

type SessionFactory = Box<dyn Fn() -> Result<Box<dyn CaptureSession>, CaptureError> + Send + Sync>;

struct FakeBackend {
    opens: Arc<AtomicUsize>,
    last_pid: Arc<AtomicU32>,
    factory: SessionFactory,
}

impl FakeBackend {
    fn new(factory: SessionFactory) -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            last_pid: Arc::new(AtomicU32::new(0)),
            factory,
        }
    }
}

impl CaptureBackend for FakeBackend {
    fn open(&self, pid: u32) -> Result<Box<dyn CaptureSession>, CaptureError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.last_pid.store(pid, Ordering::SeqCst);
        (self.factory)()
    }
}

fn idle_session_factory(closes: Arc<AtomicUsize>) -> SessionFactory {
    Box::new(move || {
        Ok(Box::new(ScriptedSession {
            chunks: VecDeque::new(),
            after: AfterScript::Idle,
            pace: Duration::from_millis(1),
            closes: closes.clone(),
        }))
    })
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn assert_no_event(events: &Receiver<MatchEvent>, window: Duration) {
    match events.recv_timeout(window) {
        Ok(event) => panic!("unexpected extra event: {event:?}"),
        Err(_) => {}
    }
}

#[test]
fn detects_victory_exactly_once() {
    let reference = sweep(1_600);
    // Live signal: the announcement repeating back to back, chunked the
    // way a capture stream would deliver it.
    let mut signal = Vec::new();
    for _ in 0..12 {
        signal.extend_from_slice(&reference);
    }
    let chunks: VecDeque<Vec<f32>> = signal.chunks(400).map(|c| c.to_vec()).collect();

    let closes = Arc::new(AtomicUsize::new(0));
    let session_closes = closes.clone();
    let backend = FakeBackend::new(Box::new(move || {
        Ok(Box::new(ScriptedSession {
            chunks: chunks.clone(),
            after: AfterScript::Idle,
            pace: Duration::from_millis(1),
            closes: session_closes.clone(),
        }))
    }));

    let (mut listener, events) = MatchListener::new(
        test_config(),
        Box::new(backend),
        Box::new(FakeLocator::constant(7)),
        library("VICTORY", reference),
        real_clock(),
    )
    .unwrap();
    listener.start();

    let event = events
        .recv_timeout(Duration::from_secs(5))
        .expect("expected a detection");
    assert_eq!(event.label, "VICTORY");
    assert!(event.score > 0.9, "score {}", event.score);

    // Every later qualifying hop falls inside the cooldown window.
    assert_no_event(&events, Duration::from_millis(300));

    listener.stop();
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn prolonged_silence_reopens_the_capture_session() {
    let mut cfg = test_config();
    cfg.detector.silence_reconnect_secs = 0.05;

    let closes = Arc::new(AtomicUsize::new(0));
    let session_closes = closes.clone();
    let backend = FakeBackend::new(Box::new(move || {
        Ok(Box::new(ScriptedSession {
            chunks: VecDeque::new(),
            after: AfterScript::Silence(400),
            pace: Duration::from_millis(2),
            closes: session_closes.clone(),
        }))
    }));
    let opens = backend.opens.clone();

    let (mut listener, _events) = MatchListener::new(
        cfg,
        Box::new(backend),
        Box::new(FakeLocator::constant(7)),
        library("VICTORY", sweep(800)),
        real_clock(),
    )
    .unwrap();
    listener.start();

    assert!(
        wait_until(Duration::from_secs(2), || opens.load(Ordering::SeqCst) >= 2),
        "capture session was not reopened after silence"
    );
    listener.stop();
    // Every opened session was closed exactly once.
    assert_eq!(closes.load(Ordering::SeqCst), opens.load(Ordering::SeqCst));
}

#[test]
fn polls_until_the_process_appears() {
    let closes = Arc::new(AtomicUsize::new(0));
    let backend = FakeBackend::new(idle_session_factory(closes));
    let opens = backend.opens.clone();
    let last_pid = backend.last_pid.clone();

    let locator = FakeLocator::scripted(vec![None, None, None], Some(7));
    let calls = locator.calls.clone();

    let (mut listener, _events) = MatchListener::new(
        test_config(),
        Box::new(backend),
        Box::new(locator),
        library("VICTORY", sweep(800)),
        real_clock(),
    )
    .unwrap();
    listener.start();

    assert!(wait_until(Duration::from_secs(2), || {
        opens.load(Ordering::SeqCst) >= 1
    }));
    assert_eq!(last_pid.load(Ordering::SeqCst), 7);
    // Three empty polls, one discovery, one re-verification.
    assert!(calls.load(Ordering::SeqCst) >= 5);
    listener.stop();
}

#[test]
fn recycled_pid_is_discarded_before_capture() {
    let closes = Arc::new(AtomicUsize::new(0));
    let backend = FakeBackend::new(idle_session_factory(closes));
    let opens = backend.opens.clone();
    let last_pid = backend.last_pid.clone();

    // Discovery sees pid 5, but by verification time the name maps to 6.
    let locator = FakeLocator::scripted(vec![Some(5), Some(6)], Some(6));

    let (mut listener, _events) = MatchListener::new(
        test_config(),
        Box::new(backend),
        Box::new(locator),
        library("VICTORY", sweep(800)),
        real_clock(),
    )
    .unwrap();
    listener.start();

    assert!(wait_until(Duration::from_secs(2), || {
        opens.load(Ordering::SeqCst) >= 1
    }));
    assert_eq!(last_pid.load(Ordering::SeqCst), 6);
    listener.stop();
}

#[test]
fn open_faults_back_off_and_keep_retrying() {
    let backend = FakeBackend::new(Box::new(|| {
        Err(CaptureError::Fault("open failed".to_string()))
    }));
    let opens = backend.opens.clone();

    let (mut listener, _events) = MatchListener::new(
        test_config(),
        Box::new(backend),
        Box::new(FakeLocator::constant(7)),
        library("VICTORY", sweep(800)),
        real_clock(),
    )
    .unwrap();
    listener.start();

    assert!(
        wait_until(Duration::from_secs(2), || opens.load(Ordering::SeqCst) >= 3),
        "supervisor stopped retrying after faults"
    );
    listener.stop();
    assert!(!listener.is_running());
}

#[test]
fn unavailable_backend_disables_the_listener() {
    let backend = FakeBackend::new(Box::new(|| {
        Err(CaptureError::Unavailable("no loopback support".to_string()))
    }));
    let opens = backend.opens.clone();

    let (mut listener, events) = MatchListener::new(
        test_config(),
        Box::new(backend),
        Box::new(FakeLocator::constant(7)),
        library("VICTORY", sweep(800)),
        real_clock(),
    )
    .unwrap();
    listener.start();

    // The worker exits and drops its event sender.
    match events.recv_timeout(Duration::from_secs(2)) {
        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {}
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert_eq!(opens.load(Ordering::SeqCst), 1);
    listener.stop();
}

#[test]
fn empty_reference_library_refuses_to_start() {
    let backend = FakeBackend::new(idle_session_factory(Arc::new(AtomicUsize::new(0))));
    let result = MatchListener::new(
        test_config(),
        Box::new(backend),
        Box::new(FakeLocator::constant(7)),
        ReferenceLibrary::from_clips(Vec::new()),
        real_clock(),
    );
    assert!(matches!(result, Err(ListenerError::NoReferences)));
}

#[test]
fn start_and_stop_are_idempotent() {
    let backend = FakeBackend::new(idle_session_factory(Arc::new(AtomicUsize::new(0))));

    let (mut listener, _events) = MatchListener::new(
        test_config(),
        Box::new(backend),
        Box::new(FakeLocator::constant(7)),
        library("VICTORY", sweep(800)),
        real_clock(),
    )
    .unwrap();

    listener.stop(); // never started

    listener.start();
    listener.start(); // no-op while running
    assert!(wait_until(Duration::from_secs(1), || listener.is_running()));

    let stopped_at = Instant::now();
    listener.stop();
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    listener.stop(); // no-op when already stopped

    listener.start(); // a stopped listener stays stopped
    assert!(!listener.is_running());
}
