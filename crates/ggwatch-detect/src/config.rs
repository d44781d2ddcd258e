use serde::{Deserialize, Serialize};

/// Matching and confirmation parameters. Immutable for the lifetime of a
/// listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Seconds of audio held in the ring buffer.
    pub chunk_duration_secs: f32,
    /// Seconds of audio between scoring decisions.
    pub hop_duration_secs: f32,
    /// Minimum seconds between two fired detections.
    pub cooldown_secs: f32,
    /// Peak NCC a label must reach to be accepted.
    pub match_threshold: f32,
    /// How far the winner must beat the runner-up.
    pub match_margin: f32,
    /// Consecutive accepted hops required before firing.
    pub confirm_hops: u32,
    /// Minimum ring-buffer RMS to attempt matching at all.
    pub min_rms: f32,
    /// Seconds of sustained silence after which the capture session is
    /// considered dead and torn down. Independent of `cooldown_secs`.
    pub silence_reconnect_secs: f32,
    pub sample_rate_hz: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: 4.0,
            hop_duration_secs: 0.5,
            cooldown_secs: 30.0,
            match_threshold: 0.25,
            match_margin: 0.10,
            confirm_hops: 2,
            min_rms: 0.0005,
            silence_reconnect_secs: 30.0,
            sample_rate_hz: 48_000,
        }
    }
}

impl DetectorConfig {
    pub fn hop_samples(&self) -> usize {
        (self.hop_duration_secs * self.sample_rate_hz as f32) as usize
    }

    pub fn ring_samples(&self) -> usize {
        (self.chunk_duration_secs * self.sample_rate_hz as f32) as usize
    }
}
