use std::time::Duration;

/// Bounded exponential retry delay for capture reconnect attempts.
///
/// Doubles on every fault up to the cap; a clean run resets it to the base.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    pub fn delay(&self) -> Duration {
        self.current
    }

    pub fn on_fault(&mut self) {
        self.current = (self.current * 2).min(self.cap);
    }

    pub fn on_success(&mut self) {
        self.current = self.base;
    }
}
