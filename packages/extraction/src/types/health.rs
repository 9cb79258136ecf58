//! Rolling reliability state for one source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Attempts flow normally
    Closed,
    /// Source is disabled until backoff elapses
    Open,
    /// One probe attempt is allowed through
    HalfOpen,
}

/// Rolling reliability record for one source.
///
/// Owned exclusively by the health monitor and mutated only through
/// `record_outcome`; persisted to the durable store after every mutation.
/// Never deleted, only reset.
///
/// The outcome window is proportionally folded rather than truncated: when
/// the effective sample count reaches the configured maximum, both counters
/// are scaled down before the new sample lands, so the success rate is not
/// biased by which samples happen to fall off the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Effective number of samples in the window (≤ configured max)
    pub sample_count: f64,

    /// Effective number of successes in the window
    pub success_count: f64,

    pub consecutive_failures: u32,

    pub state: CircuitState,

    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,

    /// Structural fingerprint observed on the last successful extraction
    pub last_fingerprint: Option<String>,
}

impl HealthRecord {
    pub fn new() -> Self {
        Self {
            sample_count: 0.0,
            success_count: 0.0,
            consecutive_failures: 0,
            state: CircuitState::Closed,
            last_success_at: None,
            last_failure_at: None,
            last_fingerprint: None,
        }
    }

    /// Success rate over the folded window; 0.0 with no samples.
    pub fn success_rate(&self) -> f64 {
        if self.sample_count <= 0.0 {
            return 0.0;
        }
        self.success_count / self.sample_count
    }

    /// Fold the window so the next sample keeps the count within `max_samples`.
    pub fn fold(&mut self, max_samples: u32) {
        let max = f64::from(max_samples);
        if self.sample_count >= max {
            let scale = (max - 1.0) / max;
            self.sample_count *= scale;
            self.success_count *= scale;
        }
    }

    /// Back to a clean closed circuit with no history.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self::new()
    }
}
