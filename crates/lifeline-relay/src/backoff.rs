// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with bounded upward jitter.
//!
//! `delay(n) = min(base * 2^(n-1) * (1 + jitter * r), max)` with `r` in
//! `[0, 1)`. Jitter only ever lengthens a delay and is at most `jitter`
//! times the un-jittered value, so with `jitter <= 1` the doubling of the
//! next step always dominates and the schedule never shrinks.

use std::time::Duration;

use lifeline_config::model::RelayConfig;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added as random jitter, within `0.0..=1.0`.
    pub jitter_ratio: f64,
}

impl BackoffPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
        }
    }

    /// Delay after failed attempt `attempt` (1-based) for a given jitter
    /// sample `unit` in `[0, 1)`.
    pub fn delay_for(&self, attempt: u32, unit: f64) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30);
        let raw = self.base_delay.as_secs_f64() * f64::from(1u32 << exponent);
        let jittered = raw * (1.0 + self.jitter_ratio * unit.clamp(0.0, 1.0));
        let capped = jittered.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// Delay after failed attempt `attempt` with a fresh jitter sample.
    pub fn delay(&self, attempt: u32) -> Duration {
        let unit = if self.jitter_ratio > 0.0 {
            rand::thread_rng().gen_range(0.0..1.0)
        } else {
            0.0
        };
        self.delay_for(attempt, unit)
    }

    /// Whether `attempts` started attempts use up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}
