pub mod capture;
pub mod hop;
pub mod loopback;
pub mod process;
pub mod refs;

pub use capture::{CaptureBackend, CaptureSession, CAPTURE_CHANNELS, CAPTURE_SAMPLE_RATE};
pub use hop::HopAccumulator;
pub use loopback::LoopbackBackend;
pub use process::{ProcessLocator, SysinfoLocator};
pub use refs::{ReferenceClip, ReferenceLibrary};
