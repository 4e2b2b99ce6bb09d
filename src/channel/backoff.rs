// src/channel/backoff.rs
use rand::Rng;
use std::time::Duration;

use crate::config::ChannelConfig;

/// Reconnect delay: `min(base * 2^retry, cap)` plus uniform jitter in `[0, jitter]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter: Duration) -> Self {
        Self {
            base,
            cap: cap.max(base),
            jitter,
        }
    }

    pub fn from_config(cfg: &ChannelConfig) -> Self {
        Self::new(
            Duration::from_millis(cfg.backoff_base_ms),
            Duration::from_millis(cfg.backoff_cap_ms),
            Duration::from_millis(cfg.jitter_ms),
        )
    }

    /// Delay before jitter. Saturates instead of overflowing for large retry counts.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base.checked_mul(factor).unwrap_or(self.cap).min(self.cap)
    }

    /// `base_delay` plus a caller-supplied jitter sample, clamped to the jitter bound.
    pub fn delay_with_jitter(&self, retry: u32, sample: Duration) -> Duration {
        self.base_delay(retry) + sample.min(self.jitter)
    }

    /// `base_delay` plus a random jitter sample.
    pub fn delay(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let sample = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.delay_with_jitter(retry, Duration::from_millis(sample))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&ChannelConfig::default())
    }
}
