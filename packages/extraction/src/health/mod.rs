//! Per-source reliability tracking and circuit breaking.
//!
//! Each source has one [`HealthRecord`] behind a concurrent map entry, so
//! concurrent pipelines mutate and persist records without interleaving
//! across sources. State transitions:
//!
//! - Closed → Open on `failure_threshold` consecutive failures, or once the
//!   window holds `min_samples_for_rate` samples with a success rate below
//!   `min_success_rate`.
//! - Open → HalfOpen when the backoff window has elapsed, checked lazily
//!   inside [`HealthMonitor::should_attempt`].
//! - HalfOpen → Closed on a recorded success; HalfOpen → Open on a recorded
//!   failure, restarting the backoff clock.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::traits::HealthStore;
use crate::types::{CircuitState, HealthConfig, HealthRecord, SourceId};

/// Per-source reliability tracker and circuit breaker.
pub struct HealthMonitor {
    config: HealthConfig,
    records: DashMap<SourceId, HealthRecord>,
    store: Arc<dyn HealthStore>,
}

impl HealthMonitor {
    /// Create a monitor with default tuning, restoring records from the
    /// durable store.
    pub async fn new(store: Arc<dyn HealthStore>) -> Self {
        Self::with_config(store, HealthConfig::default()).await
    }

    /// Create with custom tuning.
    pub async fn with_config(store: Arc<dyn HealthStore>, config: HealthConfig) -> Self {
        let records = match store.load().await {
            Ok(loaded) => {
                tracing::debug!(count = loaded.len(), "restored health records");
                loaded.into_iter().collect()
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to load health records, starting empty");
                DashMap::new()
            }
        };

        Self {
            config,
            records,
            store,
        }
    }

    /// Record the final verdict of one source attempt. Never fails: a
    /// persistence error is logged, not propagated.
    ///
    /// A success requires both a successful fetch and a non-zero item
    /// count; an empty result on a live source usually means extraction
    /// broke (tunable via [`HealthConfig::empty_is_failure`]).
    pub async fn record_outcome(
        &self,
        source: &SourceId,
        success: bool,
        item_count: usize,
        fingerprint: Option<&str>,
    ) {
        let effective = success && (item_count > 0 || !self.config.empty_is_failure);
        let now = Utc::now();

        // Mutate inside the map entry, snapshot for persistence outside it:
        // the entry guard must not be held across an await point.
        let snapshot = {
            let mut entry = self.records.entry(source.clone()).or_default();
            let record = entry.value_mut();

            record.fold(self.config.max_window);
            record.sample_count += 1.0;

            if effective {
                record.success_count += 1.0;
                record.last_success_at = Some(now);
                record.consecutive_failures = 0;
                if record.state != CircuitState::Closed {
                    tracing::info!(source = %source, "circuit closed after successful attempt");
                }
                record.state = CircuitState::Closed;

                if let Some(fp) = fingerprint {
                    if record
                        .last_fingerprint
                        .as_deref()
                        .is_some_and(|prev| prev != fp)
                    {
                        tracing::info!(source = %source, "structure fingerprint changed, likely redesign");
                    }
                    record.last_fingerprint = Some(fp.to_string());
                }
            } else {
                record.last_failure_at = Some(now);
                record.consecutive_failures += 1;

                match record.state {
                    CircuitState::HalfOpen => {
                        tracing::warn!(source = %source, "probe failed, circuit reopened");
                        record.state = CircuitState::Open;
                    }
                    CircuitState::Closed => {
                        let tripped = record.consecutive_failures >= self.config.failure_threshold
                            || (record.sample_count
                                >= f64::from(self.config.min_samples_for_rate)
                                && record.success_rate() < self.config.min_success_rate);
                        if tripped {
                            tracing::warn!(
                                source = %source,
                                consecutive_failures = record.consecutive_failures,
                                success_rate = record.success_rate(),
                                "circuit opened"
                            );
                            record.state = CircuitState::Open;
                        }
                    }
                    CircuitState::Open => {}
                }
            }

            record.clone()
        };

        if let Err(error) = self.store.save(source, &snapshot).await {
            tracing::warn!(source = %source, error = %error, "failed to persist health record");
        }
    }

    /// Whether the source may be attempted right now.
    ///
    /// Closed and HalfOpen pass. Open passes only once the backoff window
    /// has elapsed, in which case the record advances to HalfOpen and this
    /// call authorizes the probe attempt. Unknown sources are fail-open so
    /// newly added sources are never blocked by default.
    pub fn should_attempt(&self, source: &SourceId) -> bool {
        let Some(mut entry) = self.records.get_mut(source) else {
            return true;
        };
        let record = entry.value_mut();

        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let Some(last_failure) = record.last_failure_at else {
                    // Open with no failure timestamp cannot hold a backoff clock.
                    record.state = CircuitState::HalfOpen;
                    return true;
                };

                let backoff = self.backoff(record.consecutive_failures);
                let elapsed = Utc::now().signed_duration_since(last_failure);
                let backoff = chrono::Duration::from_std(backoff)
                    .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000));

                if elapsed >= backoff {
                    tracing::info!(source = %source, "backoff elapsed, allowing probe");
                    record.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Current circuit state; unknown sources read as Closed.
    pub fn current_state(&self, source: &SourceId) -> CircuitState {
        self.records
            .get(source)
            .map(|entry| entry.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Wipe a source's history back to a clean closed circuit.
    pub async fn reset(&self, source: &SourceId) {
        let snapshot = {
            let mut entry = self.records.entry(source.clone()).or_default();
            entry.value_mut().reset();
            entry.value().clone()
        };

        if let Err(error) = self.store.save(source, &snapshot).await {
            tracing::warn!(source = %source, error = %error, "failed to persist health record");
        }
    }

    /// Sources whose circuit is currently open, sorted for determinism.
    pub fn disabled_sources(&self) -> Vec<SourceId> {
        let mut disabled: Vec<SourceId> = self
            .records
            .iter()
            .filter(|entry| entry.value().state == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect();
        disabled.sort();
        disabled
    }

    /// Backoff for a given consecutive-failure count.
    pub fn backoff(&self, consecutive_failures: u32) -> Duration {
        self.config.backoff_for(consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryHealthStore;
    use proptest::prelude::*;

    async fn monitor() -> HealthMonitor {
        HealthMonitor::new(Arc::new(MemoryHealthStore::new())).await
    }

    fn id(s: &str) -> SourceId {
        SourceId::new(s)
    }

    #[tokio::test]
    async fn unknown_source_is_fail_open() {
        let monitor = monitor().await;
        assert!(monitor.should_attempt(&id("never-seen")));
        assert_eq!(monitor.current_state(&id("never-seen")), CircuitState::Closed);
    }

    #[tokio::test]
    async fn three_consecutive_failures_open_the_circuit() {
        let monitor = monitor().await;
        let source = id("flaky");

        for _ in 0..2 {
            monitor.record_outcome(&source, false, 0, None).await;
            assert_eq!(monitor.current_state(&source), CircuitState::Closed);
        }
        monitor.record_outcome(&source, false, 0, None).await;
        assert_eq!(monitor.current_state(&source), CircuitState::Open);
        assert!(!monitor.should_attempt(&source));
        assert_eq!(monitor.disabled_sources(), vec![source]);
    }

    #[tokio::test]
    async fn zero_items_counts_as_failure() {
        let monitor = monitor().await;
        let source = id("empty");

        for _ in 0..3 {
            monitor.record_outcome(&source, true, 0, None).await;
        }
        assert_eq!(monitor.current_state(&source), CircuitState::Open);
    }

    #[tokio::test]
    async fn empty_policy_is_tunable() {
        let store = Arc::new(MemoryHealthStore::new());
        let config = HealthConfig::default().with_empty_is_failure(false);
        let monitor = HealthMonitor::with_config(store, config).await;
        let source = id("sparse-catalog");

        for _ in 0..5 {
            monitor.record_outcome(&source, true, 0, None).await;
        }
        assert_eq!(monitor.current_state(&source), CircuitState::Closed);
    }

    #[tokio::test]
    async fn low_success_rate_opens_the_circuit() {
        // High consecutive threshold isolates the success-rate rule.
        let config = HealthConfig::default().with_failure_threshold(10);
        let monitor = HealthMonitor::with_config(Arc::new(MemoryHealthStore::new()), config).await;
        let source = id("mostly-broken");

        monitor.record_outcome(&source, true, 5, None).await;
        for _ in 0..4 {
            monitor.record_outcome(&source, false, 0, None).await;
        }
        // 1/5 = 0.2 is not yet below the floor.
        assert_eq!(monitor.current_state(&source), CircuitState::Closed);

        monitor.record_outcome(&source, false, 0, None).await;
        // 1/6 < 0.2 with only 5 consecutive failures.
        assert_eq!(monitor.current_state(&source), CircuitState::Open);
    }

    #[tokio::test]
    async fn probe_success_closes_and_resets_failures() {
        let monitor = monitor().await;
        let source = id("recovering");

        for _ in 0..3 {
            monitor.record_outcome(&source, false, 0, None).await;
        }
        assert_eq!(monitor.current_state(&source), CircuitState::Open);

        // Rewind the backoff clock so the probe is allowed.
        monitor
            .records
            .get_mut(&source)
            .unwrap()
            .last_failure_at = Some(Utc::now() - chrono::Duration::hours(2));

        assert!(monitor.should_attempt(&source));
        assert_eq!(monitor.current_state(&source), CircuitState::HalfOpen);

        monitor.record_outcome(&source, true, 7, Some("fp-1")).await;
        assert_eq!(monitor.current_state(&source), CircuitState::Closed);
        assert_eq!(
            monitor.records.get(&source).unwrap().consecutive_failures,
            0
        );
    }

    #[tokio::test]
    async fn probe_failure_reopens_and_restarts_backoff() {
        let monitor = monitor().await;
        let source = id("still-broken");

        for _ in 0..3 {
            monitor.record_outcome(&source, false, 0, None).await;
        }
        monitor
            .records
            .get_mut(&source)
            .unwrap()
            .last_failure_at = Some(Utc::now() - chrono::Duration::hours(2));

        assert!(monitor.should_attempt(&source));
        monitor.record_outcome(&source, false, 0, None).await;

        assert_eq!(monitor.current_state(&source), CircuitState::Open);
        // Fresh failure timestamp: the next attempt is refused again.
        assert!(!monitor.should_attempt(&source));
    }

    #[tokio::test]
    async fn backoff_values_match_schedule() {
        let monitor = monitor().await;
        assert_eq!(monitor.backoff(1), Duration::from_secs(60));
        assert_eq!(monitor.backoff(2), Duration::from_secs(120));
        assert_eq!(monitor.backoff(3), Duration::from_secs(240));
        assert_eq!(monitor.backoff(20), Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn reset_clears_history() {
        let monitor = monitor().await;
        let source = id("resettable");

        for _ in 0..4 {
            monitor.record_outcome(&source, false, 0, None).await;
        }
        assert_eq!(monitor.current_state(&source), CircuitState::Open);

        monitor.reset(&source).await;
        assert_eq!(monitor.current_state(&source), CircuitState::Closed);
        assert!(monitor.should_attempt(&source));
    }

    #[tokio::test]
    async fn records_survive_reload_through_store() {
        let store = Arc::new(MemoryHealthStore::new());
        let source = id("persistent");

        {
            let monitor = HealthMonitor::new(store.clone()).await;
            for _ in 0..3 {
                monitor.record_outcome(&source, false, 0, None).await;
            }
        }

        let reloaded = HealthMonitor::new(store).await;
        assert_eq!(reloaded.current_state(&source), CircuitState::Open);
    }

    #[tokio::test]
    async fn fingerprint_is_tracked_on_success() {
        let monitor = monitor().await;
        let source = id("fp");

        monitor.record_outcome(&source, true, 3, Some("aaa")).await;
        monitor.record_outcome(&source, true, 3, Some("bbb")).await;

        assert_eq!(
            monitor.records.get(&source).unwrap().last_fingerprint.as_deref(),
            Some("bbb")
        );
    }

    proptest! {
        #[test]
        fn backoff_is_monotonic_and_capped(a in 0u32..1000, b in 0u32..1000) {
            let config = HealthConfig::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(config.backoff_for(lo) <= config.backoff_for(hi));
            prop_assert!(config.backoff_for(hi) <= Duration::from_secs(3600));
        }
    }
}
