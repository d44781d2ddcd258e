//! Turns irregular capture chunks into fixed hops and maintains the
//! sliding window of the most recent audio.

/// Accumulates interleaved capture chunks until a full hop of mono samples
/// is ready, then folds it into a fixed-length ring buffer.
///
/// The ring buffer length never changes; it always holds the most recent
/// `ring_samples` mono samples in arrival order.
pub struct HopAccumulator {
    channels: usize,
    hop_samples: usize,
    ring: Vec<f32>,
    pending: Vec<f32>,
}

impl HopAccumulator {
    pub fn new(channels: u16, hop_samples: usize, ring_samples: usize) -> Self {
        assert!(channels > 0 && hop_samples > 0 && ring_samples > 0);
        Self {
            channels: channels as usize,
            hop_samples,
            ring: vec![0.0; ring_samples],
            pending: Vec::with_capacity(hop_samples * 2),
        }
    }

    /// Downmixes one interleaved chunk and appends it to the pending
    /// accumulator. Returns `true` when a full hop was folded into the
    /// ring buffer, at which point `ring()` reflects the new window.
    pub fn push(&mut self, interleaved: &[f32]) -> bool {
        if self.channels == 1 {
            self.pending.extend_from_slice(interleaved);
        } else {
            self.pending.extend(
                interleaved
                    .chunks_exact(self.channels)
                    .map(|frame| frame.iter().sum::<f32>() / self.channels as f32),
            );
        }

        if self.pending.len() < self.hop_samples {
            return false;
        }

        let ring_len = self.ring.len();
        if self.pending.len() >= ring_len {
            let tail = self.pending.len() - ring_len;
            self.ring.copy_from_slice(&self.pending[tail..]);
        } else {
            let n = self.pending.len();
            self.ring.copy_within(n.., 0);
            self.ring[ring_len - n..].copy_from_slice(&self.pending);
        }
        self.pending.clear();
        true
    }

    pub fn ring(&self) -> &[f32] {
        &self.ring
    }
}
