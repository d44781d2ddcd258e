//! Turns noisy per-hop match scores into a single debounced detection.
//!
//! Gate order per hop: cooldown, energy, threshold, margin, hysteresis.
//! `IDLE <-> CANDIDATE(label, count)`; any rejection drops back to idle and
//! a fire only happens once `count` reaches the configured confirm-hop
//! count, at most once per cooldown window.

use std::time::{Duration, Instant};

use ggwatch_foundation::SharedClock;

use crate::config::DetectorConfig;
use crate::{energy, matcher};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchScore {
    pub label: String,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HopOutcome {
    /// Inside the cooldown window; scoring skipped.
    CoolingDown,
    /// Ring buffer RMS below the minimum; scoring skipped.
    TooQuiet,
    /// Silence has persisted past the reconnect threshold; the supervisor
    /// should tear the capture session down.
    SilenceTimeout,
    /// Best score failed the threshold or margin rule; candidate dropped.
    Rejected,
    /// Same label accepted again, not yet enough consecutive hops.
    Building { label: String, count: u32 },
    /// Confirmed detection. Emitted exactly once per qualifying run.
    Fired { label: String, score: f32 },
}

pub struct HopDecider {
    cfg: DetectorConfig,
    clock: SharedClock,
    candidate: Option<String>,
    count: u32,
    last_trigger: Option<Instant>,
    last_loud: Instant,
}

impl HopDecider {
    pub fn new(cfg: DetectorConfig, clock: SharedClock) -> Self {
        let last_loud = clock.now();
        Self {
            cfg,
            clock,
            candidate: None,
            count: 0,
            last_trigger: None,
            last_loud,
        }
    }

    /// Score the ring buffer against every reference and run the decision
    /// pipeline. `refs` yields `(label, samples)` pairs at the pipeline
    /// sample rate.
    pub fn on_hop<'a, I>(&mut self, ring: &[f32], refs: I) -> HopOutcome
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        let now = self.clock.now();
        if self.in_cooldown(now) {
            return HopOutcome::CoolingDown;
        }

        let rms = energy::rms(ring);
        if rms < self.cfg.min_rms {
            return self.quiet_outcome(now);
        }
        self.last_loud = now;

        let scores: Vec<MatchScore> = refs
            .into_iter()
            .map(|(label, samples)| {
                let value = matcher::ncc_peak(ring, samples);
                tracing::trace!(label, value, rms, "hop score");
                MatchScore {
                    label: label.to_string(),
                    value,
                }
            })
            .collect();

        self.on_scores(scores)
    }

    /// Decision pipeline below the energy gate, driven directly by tests
    /// that do not want to synthesize waveforms.
    pub fn on_scores(&mut self, mut scores: Vec<MatchScore>) -> HopOutcome {
        let now = self.clock.now();
        if self.in_cooldown(now) {
            return HopOutcome::CoolingDown;
        }
        if scores.is_empty() {
            self.reset();
            return HopOutcome::Rejected;
        }

        scores.sort_by(|a, b| b.value.total_cmp(&a.value));
        let best = &scores[0];

        if best.value < self.cfg.match_threshold {
            self.reset();
            return HopOutcome::Rejected;
        }

        if let Some(runner_up) = scores.get(1) {
            if best.value - runner_up.value < self.cfg.match_margin {
                tracing::debug!(
                    best = %best.label,
                    best_score = best.value,
                    runner_up = %runner_up.label,
                    runner_up_score = runner_up.value,
                    "match rejected: margin too small"
                );
                self.reset();
                return HopOutcome::Rejected;
            }
        }

        if self.candidate.as_deref() == Some(best.label.as_str()) {
            self.count += 1;
        } else {
            self.candidate = Some(best.label.clone());
            self.count = 1;
        }

        if self.count < self.cfg.confirm_hops {
            tracing::debug!(
                label = %best.label,
                count = self.count,
                needed = self.cfg.confirm_hops,
                score = best.value,
                "building confirmation"
            );
            return HopOutcome::Building {
                label: best.label.clone(),
                count: self.count,
            };
        }

        let fired = HopOutcome::Fired {
            label: best.label.clone(),
            score: best.value,
        };
        self.last_trigger = Some(now);
        self.reset();
        fired
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    fn in_cooldown(&self, now: Instant) -> bool {
        self.last_trigger.is_some_and(|t| {
            now.duration_since(t) < Duration::from_secs_f32(self.cfg.cooldown_secs)
        })
    }

    fn quiet_outcome(&mut self, now: Instant) -> HopOutcome {
        let silent_for = now.duration_since(self.last_loud);
        if silent_for > Duration::from_secs_f32(self.cfg.silence_reconnect_secs) {
            self.last_loud = now;
            return HopOutcome::SilenceTimeout;
        }
        HopOutcome::TooQuiet
    }

    fn reset(&mut self) {
        self.candidate = None;
        self.count = 0;
    }
}
