//! Learned per-source selectors: cache, derivation, eviction.
//!
//! A selector is learned when a DOM heuristic lands a high-confidence
//! match, replayed first on subsequent passes as the cheapest tier, and
//! evicted once it goes stale (consecutive empty replays), which usually
//! means the source shipped a redesign.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scraper::ElementRef;
use serde::{Deserialize, Serialize};

use crate::types::SourceId;

/// Attributes stable enough to identify a product container across
/// deploys, in preference order.
const STABLE_ATTRS: &[&str] = &[
    "data-testid",
    "data-test",
    "data-qa",
    "data-item-id",
    "data-product-id",
    "data-sku",
    "data-asin",
];

/// Class-name prefixes of CSS-in-JS generated names; never worth learning.
const GENERATED_CLASS_PREFIXES: &[&str] = &["css-", "sc-", "jsx-", "chakra-", "makeStyles"];

/// A cached, reusable extraction rule for one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedSelector {
    pub expression: String,
    pub successes: u32,
    pub failures: u32,
    pub consecutive_misses: u32,
    pub created_at: DateTime<Utc>,
}

impl LearnedSelector {
    fn new(expression: String) -> Self {
        Self {
            expression,
            successes: 0,
            failures: 0,
            consecutive_misses: 0,
            created_at: Utc::now(),
        }
    }
}

/// Concurrent per-source selector cache. One selector per source,
/// overwritten on change.
pub struct SelectorCache {
    entries: DashMap<SourceId, LearnedSelector>,
    eviction_misses: u32,
}

impl SelectorCache {
    /// `eviction_misses` is the number of consecutive empty replays a
    /// selector survives; one more evicts it.
    pub fn new(eviction_misses: u32) -> Self {
        Self {
            entries: DashMap::new(),
            eviction_misses,
        }
    }

    /// The replay expression for a source, if one is cached.
    pub fn expression(&self, source: &SourceId) -> Option<String> {
        self.entries.get(source).map(|e| e.expression.clone())
    }

    /// Snapshot of the full record, for inspection.
    pub fn get(&self, source: &SourceId) -> Option<LearnedSelector> {
        self.entries.get(source).map(|e| e.clone())
    }

    /// Store a newly derived selector, overwriting any previous one.
    pub fn learn(&self, source: &SourceId, expression: String) {
        let changed = self
            .entries
            .get(source)
            .map(|existing| existing.expression != expression)
            .unwrap_or(true);
        if !changed {
            return;
        }

        tracing::debug!(source = %source, selector = %expression, "learned selector");
        self.entries
            .insert(source.clone(), LearnedSelector::new(expression));
    }

    /// A replay produced candidates.
    pub fn record_hit(&self, source: &SourceId) {
        if let Some(mut entry) = self.entries.get_mut(source) {
            entry.successes += 1;
            entry.consecutive_misses = 0;
        }
    }

    /// A replay matched nothing. Returns true when this miss evicted the
    /// selector.
    pub fn record_miss(&self, source: &SourceId) -> bool {
        let evict = match self.entries.get_mut(source) {
            Some(mut entry) => {
                entry.failures += 1;
                entry.consecutive_misses += 1;
                entry.consecutive_misses > self.eviction_misses
            }
            None => false,
        };

        if evict {
            tracing::info!(source = %source, "evicting stale learned selector");
            self.entries.remove(source);
        }
        evict
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derive a stable selector for a matched container, preferring explicit
/// identifying attributes over volatile generated class names. Returns
/// None when nothing about the element looks stable.
pub fn derive_selector(element: ElementRef<'_>) -> Option<String> {
    let value = element.value();

    for attr in STABLE_ATTRS {
        if let Some(v) = value.attr(attr) {
            if !v.is_empty() && !v.contains('"') {
                return Some(format!(r#"{}[{}="{}"]"#, value.name(), attr, v));
            }
        }
    }

    if let Some(id) = value.attr("id") {
        if stable_token(id) {
            return Some(format!("#{id}"));
        }
    }

    let stable_classes: Vec<&str> = value.classes().filter(|c| stable_token(c)).take(2).collect();
    if !stable_classes.is_empty() {
        return Some(format!("{}.{}", value.name(), stable_classes.join(".")));
    }

    None
}

/// Whether an id/class token looks hand-written rather than generated.
fn stable_token(token: &str) -> bool {
    if token.len() < 3 {
        return false;
    }
    if !token.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    if token.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if GENERATED_CLASS_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
    {
        return false;
    }
    token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
