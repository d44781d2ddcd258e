//! cpal-backed loopback capture of the system output stream.
//!
//! cpal exposes loopback at device granularity, not per process, so the
//! pid decides *when* capture runs (the supervisor only opens a session
//! while the verified target process is alive); the tapped stream is the
//! default output device.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use ggwatch_foundation::CaptureError;

use crate::capture::{CaptureBackend, CaptureSession, CAPTURE_CHANNELS, CAPTURE_SAMPLE_RATE};

/// Chunks buffered between the stream callback and `read`. The callback
/// drops chunks when the reader falls this far behind.
const CHUNK_QUEUE_DEPTH: usize = 64;

pub struct LoopbackBackend;

impl LoopbackBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for LoopbackBackend {
    fn open(&self, pid: u32) -> Result<Box<dyn CaptureSession>, CaptureError> {
        let host = cpal::default_host();
        let device = match host.default_output_device() {
            Some(device) => device,
            None => {
                // Distinguish "no devices right now" from a host that
                // cannot do audio at all.
                return match host.output_devices() {
                    Ok(_) => Err(CaptureError::NoDevice),
                    Err(err) => Err(CaptureError::Unavailable(err.to_string())),
                };
            }
        };

        if let Ok(name) = device.name() {
            tracing::info!(pid, device = %name, "opening loopback capture");
        }

        let sample_format = device
            .default_output_config()
            .map_err(|err| CaptureError::Unavailable(err.to_string()))?
            .sample_format();

        let config = StreamConfig {
            channels: CAPTURE_CHANNELS,
            sample_rate: SampleRate(CAPTURE_SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = bounded::<Vec<f32>>(CHUNK_QUEUE_DEPTH);
        let fault = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let err_fault = Arc::clone(&fault);
        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("loopback stream error: {err}");
            err_fault.store(true, Ordering::SeqCst);
        };

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                feed(tx, Arc::clone(&dropped), |s: &f32| *s),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                feed(tx, Arc::clone(&dropped), |s: &i16| *s as f32 / 32_768.0),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                feed(tx, Arc::clone(&dropped), |s: &u16| {
                    (*s as i32 - 32_768) as f32 / 32_768.0
                }),
                err_fn,
                None,
            )?,
            other => {
                return Err(CaptureError::FormatNotSupported {
                    format: format!("{other:?}"),
                });
            }
        };
        stream.play()?;

        Ok(Box::new(LoopbackSession {
            stream: Some(stream),
            rx,
            fault,
            dropped,
        }))
    }
}

/// Builds a stream data callback that converts samples to f32 and hands
/// whole chunks to the reader. Never blocks inside the audio callback.
fn feed<T: Copy>(
    tx: Sender<Vec<f32>>,
    dropped: Arc<AtomicU64>,
    convert: impl Fn(&T) -> f32 + Send + 'static,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static {
    move |data: &[T], _: &cpal::InputCallbackInfo| {
        let chunk: Vec<f32> = data.iter().map(&convert).collect();
        if tx.try_send(chunk).is_err() {
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

struct LoopbackSession {
    stream: Option<cpal::Stream>,
    rx: Receiver<Vec<f32>>,
    fault: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl CaptureSession for LoopbackSession {
    fn read(&mut self, timeout: Duration) -> Result<Vec<f32>, CaptureError> {
        if self.fault.load(Ordering::SeqCst) {
            return Err(CaptureError::Fault("stream error reported".into()));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(chunk) => Ok(chunk),
            Err(RecvTimeoutError::Timeout) => Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::Fault("capture stream closed".into()))
            }
        }
    }

    fn channels(&self) -> u16 {
        CAPTURE_CHANNELS
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                tracing::warn!(dropped, "loopback reader fell behind; chunks were dropped");
            }
        }
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        self.close();
    }
}
