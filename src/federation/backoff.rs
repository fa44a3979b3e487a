//! Exponential reconnect backoff.

use std::time::Duration;

use rand::Rng;

use super::config::ReconnectPolicy;

/// Backoff state for one peer.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    current: Duration,
    failures: u32,
}

impl Backoff {
    /// Start at the policy's initial delay.
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            current: policy.initial_delay,
            policy,
            failures: 0,
        }
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let base = self.current;
        self.current = scale(base, self.policy.multiplier).min(self.policy.max_delay);

        if self.policy.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.policy.jitter);
            scale(base, 1.0 + extra)
        } else {
            base
        }
    }

    /// Back to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.policy.initial_delay;
        self.failures = 0;
    }
}

fn scale(d: Duration, factor: f64) -> Duration {
    let nanos = (d.as_nanos() as f64 * factor).round();
    if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
