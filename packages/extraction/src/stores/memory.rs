//! In-memory health store and result cache.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::error::StoreResult;
use crate::traits::{CachedResult, HealthStore, ResultCache};
use crate::types::{HealthRecord, ProductCandidate, SourceId};

/// Health store backed by a process-local map.
#[derive(Default)]
pub struct MemoryHealthStore {
    records: RwLock<HashMap<SourceId, HealthRecord>>,
}

impl MemoryHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed records, e.g. to restore a known circuit state in tests.
    pub fn with_records(records: impl IntoIterator<Item = (SourceId, HealthRecord)>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().collect()),
        }
    }
}

#[async_trait]
impl HealthStore for MemoryHealthStore {
    async fn load(&self) -> StoreResult<HashMap<SourceId, HealthRecord>> {
        Ok(self.records.read().unwrap().clone())
    }

    async fn save(&self, source: &SourceId, record: &HealthRecord) -> StoreResult<()> {
        self.records
            .write()
            .unwrap()
            .insert(source.clone(), record.clone());
        Ok(())
    }
}

struct CacheEntry {
    items: Vec<ProductCandidate>,
    stored_at: DateTime<Utc>,
}

/// Result cache with a fixed freshness window.
///
/// Entries never expire out of the map; past the window they are served
/// with `is_stale = true`, which is exactly the degraded-result behavior
/// the orchestrator wants.
pub struct MemoryCache {
    entries: RwLock<HashMap<(String, SourceId, String), CacheEntry>>,
    fresh_for: Duration,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_fresh_for(Duration::from_secs(15 * 60))
    }

    pub fn with_fresh_for(fresh_for: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            fresh_for,
        }
    }

    /// Insert an entry with an explicit timestamp, e.g. an already-stale
    /// one in tests.
    pub fn seed(
        &self,
        query: &str,
        source: &SourceId,
        locale: &str,
        items: Vec<ProductCandidate>,
        stored_at: DateTime<Utc>,
    ) {
        self.entries.write().unwrap().insert(
            (query.to_string(), source.clone(), locale.to_string()),
            CacheEntry { items, stored_at },
        );
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(
        &self,
        query: &str,
        source: &SourceId,
        locale: &str,
    ) -> StoreResult<Option<CachedResult>> {
        let entries = self.entries.read().unwrap();
        let key = (query.to_string(), source.clone(), locale.to_string());

        Ok(entries.get(&key).map(|entry| {
            let age = Utc::now().signed_duration_since(entry.stored_at);
            let fresh_for = ChronoDuration::from_std(self.fresh_for)
                .unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 1_000));
            CachedResult {
                items: entry.items.clone(),
                is_stale: age > fresh_for,
            }
        }))
    }

    async fn set(
        &self,
        query: &str,
        source: &SourceId,
        locale: &str,
        items: &[ProductCandidate],
    ) -> StoreResult<()> {
        self.entries.write().unwrap().insert(
            (query.to_string(), source.clone(), locale.to_string()),
            CacheEntry {
                items: items.to_vec(),
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractionMethod;

    fn item() -> ProductCandidate {
        ProductCandidate::new("Milk", 29.0, 0.9, ExtractionMethod::StructuredData)
    }

    #[tokio::test]
    async fn cache_round_trip_is_fresh() {
        let cache = MemoryCache::new();
        let source = SourceId::new("shop");

        cache.set("milk", &source, "en", &[item()]).await.unwrap();
        let hit = cache.get("milk", &source, "en").await.unwrap().unwrap();

        assert_eq!(hit.items.len(), 1);
        assert!(!hit.is_stale);
    }

    #[tokio::test]
    async fn old_entries_are_served_stale() {
        let cache = MemoryCache::new();
        let source = SourceId::new("shop");

        cache.seed(
            "milk",
            &source,
            "en",
            vec![item()],
            Utc::now() - ChronoDuration::hours(2),
        );

        let hit = cache.get("milk", &source, "en").await.unwrap().unwrap();
        assert!(hit.is_stale);
    }

    #[tokio::test]
    async fn keys_are_query_source_locale() {
        let cache = MemoryCache::new();
        let source = SourceId::new("shop");

        cache.set("milk", &source, "en", &[item()]).await.unwrap();
        assert!(cache.get("milk", &source, "fr").await.unwrap().is_none());
        assert!(cache.get("bread", &source, "en").await.unwrap().is_none());
        assert!(cache
            .get("milk", &SourceId::new("other"), "en")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn health_store_round_trip() {
        let store = MemoryHealthStore::new();
        let source = SourceId::new("shop");
        let mut record = HealthRecord::new();
        record.consecutive_failures = 2;

        store.save(&source, &record).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.get(&source).unwrap().consecutive_failures, 2);
    }
}
