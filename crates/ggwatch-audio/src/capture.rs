//! Contract between the listener and the audio capture mechanism.

use std::time::Duration;

use ggwatch_foundation::CaptureError;

/// Fixed output format every backend must deliver.
pub const CAPTURE_SAMPLE_RATE: u32 = 48_000;
pub const CAPTURE_CHANNELS: u16 = 2;

/// One open capture stream bound to a process id. Created inside the
/// worker thread and never crosses it.
pub trait CaptureSession {
    /// Returns one interleaved f32 chunk of arbitrary size, an empty vec
    /// when the timeout elapsed with no data, or `CaptureError::Fault`
    /// once the stream is permanently unusable.
    fn read(&mut self, timeout: Duration) -> Result<Vec<f32>, CaptureError>;

    /// Number of interleaved channels in chunks returned by `read`.
    fn channels(&self) -> u16;

    /// Releases resources. Idempotent and safe to call after a fault.
    fn close(&mut self);
}

pub trait CaptureBackend: Send {
    fn open(&self, pid: u32) -> Result<Box<dyn CaptureSession>, CaptureError>;
}
