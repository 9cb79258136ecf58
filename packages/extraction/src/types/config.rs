//! Configuration for the health monitor, extractor, and orchestrator.
//!
//! Empirically chosen constants (eviction thresholds, confidence bonus
//! weights, the empty-result policy) are fields with sensible defaults,
//! not hard-coded invariants.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker and rolling-window tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Maximum effective samples in the folded outcome window
    pub max_window: u32,

    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,

    /// Minimum samples before the success-rate rule applies
    pub min_samples_for_rate: u32,

    /// Success rate below which the circuit trips
    pub min_success_rate: f64,

    /// Backoff for the first failure
    pub initial_backoff: Duration,

    /// Backoff multiplier per further consecutive failure
    pub backoff_multiplier: f64,

    /// Backoff ceiling
    pub max_backoff: Duration,

    /// Count a zero-item fetch as a failure. An empty result on a live
    /// source usually means extraction broke, not that the catalog is
    /// empty; relax this for sources where empty result sets are routine.
    pub empty_is_failure: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_window: 20,
            failure_threshold: 3,
            min_samples_for_rate: 3,
            min_success_rate: 0.2,
            initial_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(3600),
            empty_is_failure: true,
        }
    }
}

impl HealthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backoff for a given consecutive-failure count:
    /// `min(initial × multiplier^(n−1), max)`.
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        let exp = consecutive_failures.saturating_sub(1).min(63);
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exp as i32);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    pub fn with_empty_is_failure(mut self, empty_is_failure: bool) -> Self {
        self.empty_is_failure = empty_is_failure;
        self
    }
}

/// Tiered-extraction tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Candidates returned per extraction pass
    pub max_candidates: usize,

    /// Candidates below this confidence are dropped
    pub min_confidence: f32,

    /// Stop escalating tiers once this many de-duplicated candidates exist
    pub enough_candidates: usize,

    /// Confidence for page-labeled product markup
    pub structured_confidence: f32,

    /// Confidence for hydration-payload matches
    pub embedded_confidence: f32,

    /// Compositional bonus: valid name
    pub bonus_name: f32,
    /// Compositional bonus: valid price
    pub bonus_price: f32,
    /// Compositional bonus: image present
    pub bonus_image: f32,
    /// Compositional bonus: detail URL present
    pub bonus_detail_url: f32,

    /// Heuristic confidence at which a selector is learned
    pub selector_learn_threshold: f32,

    /// Consecutive empty replays after which a learned selector is evicted
    pub selector_eviction_misses: u32,

    /// Plausible price bounds, in source currency units
    pub min_price: f64,
    pub max_price: f64,

    /// An original price may exceed the selling price by at most this factor
    pub max_original_price_ratio: f64,

    /// Name length bounds
    pub min_name_len: usize,
    pub max_name_len: usize,

    /// Depth bound for the structural fingerprint traversal
    pub fingerprint_depth: usize,

    /// Minimum sibling-group size treated as a product grid
    pub min_group_size: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_candidates: 15,
            min_confidence: 0.5,
            enough_candidates: 5,
            structured_confidence: 0.95,
            embedded_confidence: 0.85,
            bonus_name: 0.3,
            bonus_price: 0.3,
            bonus_image: 0.2,
            bonus_detail_url: 0.2,
            selector_learn_threshold: 0.8,
            selector_eviction_misses: 3,
            min_price: 1.0,
            max_price: 50_000.0,
            max_original_price_ratio: 3.0,
            min_name_len: 3,
            max_name_len: 150,
            fingerprint_depth: 10,
            min_group_size: 3,
        }
    }
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn with_min_confidence(mut self, min: f32) -> Self {
        self.min_confidence = min;
        self
    }

    pub fn with_selector_eviction_misses(mut self, misses: u32) -> Self {
        self.selector_eviction_misses = misses;
        self
    }
}

/// Orchestrator scheduling, timeout, and confidence-tagging tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Sources attempted concurrently; bounds rendering-engine usage
    pub batch_size: usize,

    /// Per-call timeout for the native API tier
    pub api_timeout: Duration,

    /// Per-call timeout for static fetches
    pub fetch_timeout: Duration,

    /// Per-call timeout for rendered fetches
    pub render_timeout: Duration,

    /// Timeout for the batched AI escalation call
    pub escalation_timeout: Duration,

    /// Confidence tag for native-API results
    pub api_confidence: f32,

    /// Confidence tag for fresh cached results
    pub cache_confidence: f32,

    /// Confidence tag for stale cached results
    pub stale_cache_confidence: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            api_timeout: Duration::from_secs(4),
            fetch_timeout: Duration::from_secs(4),
            render_timeout: Duration::from_secs(10),
            escalation_timeout: Duration::from_secs(15),
            api_confidence: 0.95,
            cache_confidence: 0.5,
            stale_cache_confidence: 0.35,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_escalation_timeout(mut self, timeout: Duration) -> Self {
        self.escalation_timeout = timeout;
        self
    }
}
