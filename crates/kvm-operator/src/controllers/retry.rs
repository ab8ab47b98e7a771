//! Requeue policy with exponential backoff for failed passes
//!
//! A pass never retries internally. When one fails, the watch wiring asks
//! this module when the next pass should run: soon for transient failures,
//! only after the cluster spec changes for permanent ones.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use kube::runtime::controller::Action;
use tracing::{debug, warn};

/// Maximum number of retries before waiting for a spec change
const MAX_RETRIES: u32 = 10;

/// Base delay for exponential backoff (seconds)
const BASE_DELAY_SECS: u64 = 5;

/// Maximum delay between retries (1 hour)
const MAX_DELAY_SECS: u64 = 3600;

/// Tracks consecutive failed passes per cluster
#[derive(Debug, Default)]
pub struct RetryTracker {
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed pass and return the number of consecutive failures
    pub fn increment(&self, cluster: &str) -> u32 {
        let mut attempts = self.lock();
        let count = attempts.entry(cluster.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Forget failures after a successful pass
    pub fn reset(&self, cluster: &str) {
        self.lock().remove(cluster);
    }

    pub fn get(&self, cluster: &str) -> u32 {
        self.lock().get(cluster).copied().unwrap_or(0)
    }

    /// Drop entries for clusters that no longer exist
    pub fn cleanup(&self, active: &[String]) {
        self.lock().retain(|cluster, _| active.contains(cluster));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        // Counters stay meaningful even if a holder panicked
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Error classification for retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// API unavailable, rate limited, or an object changed mid-pass
    Transient,
    /// Bad cluster spec or a rejected request; needs a spec change
    Permanent,
}

/// Exponential backoff delay for the given attempt: 5s, 10s, 20s, ... up to 1 hour
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32);
    let delay_secs = BASE_DELAY_SECS.saturating_mul(2u64.saturating_pow(exponent));
    Duration::from_secs(delay_secs.min(MAX_DELAY_SECS))
}

/// Determine when the next pass should run after a failure
pub fn compute_backoff(attempt: u32, kind: ErrorKind) -> Action {
    match kind {
        ErrorKind::Transient if attempt >= MAX_RETRIES => {
            warn!(
                attempt,
                max_retries = MAX_RETRIES,
                "Max retries exceeded, waiting for cluster change"
            );
            Action::await_change()
        }
        ErrorKind::Transient => {
            let delay = backoff_delay(attempt);
            debug!(
                attempt,
                delay_secs = delay.as_secs(),
                "Scheduling retry with exponential backoff"
            );
            Action::requeue(delay)
        }
        ErrorKind::Permanent => {
            warn!("Permanent error, waiting for cluster change");
            Action::await_change()
        }
    }
}
