//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

use ember_domain::config::ReconnectConfig;

/// Controls how long the session manager waits before reopening a dropped
/// connection. Retries are unbounded; the attempt counter lives in the
/// session manager and is reset on every successful handshake.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Initial delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap, before jitter).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Mixed into the jitter so nodes sharing a process spread out.
    pub seed: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            seed: 0,
        }
    }
}

impl From<&ReconnectConfig> for ReconnectBackoff {
    fn from(cfg: &ReconnectConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(cfg.initial_ms),
            max_delay: Duration::from_millis(cfg.max_ms),
            backoff_factor: cfg.factor.max(1.0),
            seed: 0,
        }
    }
}

impl ReconnectBackoff {
    /// Seed the jitter from a stable string, typically the node identifier.
    pub fn seeded(mut self, key: &str) -> Self {
        self.seed = key
            .bytes()
            .fold(0x811c_9dc5u32, |h, b| (h ^ u32::from(b)).wrapping_mul(0x0100_0193));
        self
    }

    /// Compute the delay for the given attempt number (0-indexed).
    ///
    /// Never exceeds `max_delay * 1.25`; the un-jittered base is
    /// non-decreasing in `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let exp = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = base_ms * self.backoff_factor.powi(exp);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let jitter = capped_ms * 0.25 * pseudo_random_fraction(attempt ^ self.seed);
        Duration::from_millis((capped_ms + jitter) as u64)
    }
}

/// Cheap deterministic fraction in [0, 1).
fn pseudo_random_fraction(x: u32) -> f64 {
    let hash = x.wrapping_mul(2_654_435_761); // Knuth multiplicative hash
    f64::from(hash) / (f64::from(u32::MAX) + 1.0)
}
