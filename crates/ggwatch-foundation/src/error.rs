use thiserror::Error;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("no reference clips loaded, nothing to match against")]
    NoReferences,

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    /// The capture mechanism does not exist on this host at all. The
    /// listener logs this once and stays disabled instead of retrying.
    #[error("capture backend unavailable: {0}")]
    Unavailable(String),

    /// The stream became permanently unusable (e.g. the process exited).
    /// Recoverable at the supervisor level via reconnect.
    #[error("capture stream fault: {0}")]
    Fault(String),

    #[error("no loopback-capable output device found")]
    NoDevice,

    #[error("format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

impl CaptureError {
    /// Whether the supervisor should give up entirely rather than back off
    /// and reconnect.
    pub fn is_permanent(&self) -> bool {
        matches!(self, CaptureError::Unavailable(_))
    }
}
