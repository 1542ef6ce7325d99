//! Exponential backoff computation
//!
//! One shape shared by two independent policies: the connection-probe
//! retry loop and the per-request retry proxy.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff configuration
///
/// The wait before re-running attempt `n` (1-indexed) is
/// `clamp(base * 2^(n-1) * U(1-jitter, 1+jitter), min, max)`, where the
/// uniform multiplier is applied only when `jitter > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Base delay in seconds for the first retry
    pub base: f64,
    /// Lower clamp on the computed wait, in seconds
    pub min: Option<f64>,
    /// Upper clamp on the computed wait, in seconds
    pub max: Option<f64>,
    /// Jitter ratio in [0, 1]; 0.2 means the wait varies within ±20%
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: 2.0,
            min: None,
            max: None,
            jitter: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a policy with the given base delay and no clamp or jitter
    pub fn new(base: f64) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    /// Set the min/max clamp window
    pub fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the jitter ratio
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Compute the wait inserted after a failed attempt `n` (1-indexed)
    ///
    /// Never negative; an attempt number of 0 is treated as 1.
    pub fn wait_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let mut wait = self.base * 2f64.powi(exponent.min(i32::MAX as u32) as i32);
        if self.jitter > 0.0 {
            let jitter = self.jitter.clamp(0.0, 1.0);
            let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
            wait *= factor;
        }
        if let Some(min) = self.min {
            wait = wait.max(min);
        }
        if let Some(max) = self.max {
            wait = wait.min(max);
        }
        Duration::try_from_secs_f64(wait.max(0.0)).unwrap_or(Duration::MAX)
    }
}
