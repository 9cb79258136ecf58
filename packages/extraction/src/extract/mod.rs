//! The adaptive extractor: markup in, confidence-scored candidates out.
//!
//! Strategies are tiered, most-trustworthy first, and escalate only while
//! results are thin: a learned per-source selector replays first, then
//! page-labeled structured data, then embedded hydration state, then the
//! DOM heuristics. Escalation to the remote AI service is not performed
//! here; when every tier comes up empty the pass returns an empty list and
//! the orchestrator decides what to do with the markup.
//!
//! Extraction is pure computation over an in-memory markup string: no
//! suspension points, no network.

mod embedded;
mod fingerprint;
mod heuristics;
mod selectors;
mod structured;
mod validate;

pub use fingerprint::StructureFingerprint;
pub use selectors::{LearnedSelector, SelectorCache};

use scraper::{Html, Selector};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::types::{ExtractionMethod, ExtractorConfig, ProductCandidate, Source};

/// Context the orchestrator knows about the markup being extracted.
#[derive(Debug, Clone, Default)]
pub struct ExtractionHints {
    /// Markup came from a rendered fetch rather than a static one
    pub rendered: bool,

    /// Base URL for resolving relative image and detail links
    pub base_url: Option<String>,
}

impl ExtractionHints {
    pub fn for_source(source: &Source) -> Self {
        Self {
            rendered: false,
            base_url: Some(source.base_url.clone()),
        }
    }

    pub fn rendered(mut self) -> Self {
        self.rendered = true;
        self
    }
}

/// Resolve a possibly-relative image or detail link against the hints'
/// base URL. Absolute URLs pass through; when no base is known or either
/// URL fails to parse, the raw value is returned unchanged.
fn resolve_url(hints: &ExtractionHints, raw: &str) -> String {
    match &hints.base_url {
        Some(base) => url::Url::parse(base)
            .and_then(|base| base.join(raw))
            .map(|resolved| resolved.to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => raw.to_string(),
    }
}

/// Everything one extraction pass produced.
#[derive(Debug, Clone)]
pub struct ExtractionPass {
    /// At most `max_candidates`, confidence-filtered, de-duplicated by
    /// normalized name, sorted by descending confidence with discovery
    /// order breaking ties
    pub candidates: Vec<ProductCandidate>,

    /// Structural fingerprint of the document, for redesign detection
    pub fingerprint: StructureFingerprint,
}

impl ExtractionPass {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Mean confidence across returned candidates; 0.0 when empty.
    pub fn average_confidence(&self) -> f32 {
        if self.candidates.is_empty() {
            return 0.0;
        }
        self.candidates.iter().map(|c| c.confidence).sum::<f32>()
            / self.candidates.len() as f32
    }
}

/// Tiered extraction over arbitrary, possibly hostile markup, with a
/// learned-selector cache keyed by source.
pub struct AdaptiveExtractor {
    config: ExtractorConfig,
    selectors: SelectorCache,
}

impl AdaptiveExtractor {
    pub fn new() -> Self {
        Self::with_config(ExtractorConfig::default())
    }

    pub fn with_config(config: ExtractorConfig) -> Self {
        let selectors = SelectorCache::new(config.selector_eviction_misses);
        Self { config, selectors }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// The learned-selector cache, shared across passes.
    pub fn selectors(&self) -> &SelectorCache {
        &self.selectors
    }

    /// Run the tier chain over one markup document.
    ///
    /// Deterministic: identical markup and source metadata produce an
    /// identical ordered candidate list.
    pub fn extract(&self, markup: &str, source: &Source, hints: &ExtractionHints) -> ExtractionPass {
        let document = Html::parse_document(markup);
        let fingerprint = fingerprint::fingerprint(&document, self.config.fingerprint_depth);

        let mut pool = CandidatePool::new();

        // Tier 1: learned-selector replay, the cheapest path.
        if let Some(expression) = self.selectors.expression(&source.id) {
            let found = self.replay(&document, &expression, hints);
            if found.is_empty() {
                if self.selectors.record_miss(&source.id) {
                    tracing::info!(source = %source.id, "learned selector evicted");
                }
            } else {
                tracing::debug!(source = %source.id, count = found.len(), "selector replay hit");
                self.selectors.record_hit(&source.id);
                pool.add_all(found);
            }
        }

        // Tiers 2-4 escalate only while results are thin. A structural
        // tier always runs when the replay under-produced.
        if pool.len() < self.config.enough_candidates {
            pool.add_all(guarded("structured", || {
                structured::extract(&document, hints, &self.config)
            }));
        }

        if pool.len() < self.config.enough_candidates {
            pool.add_all(guarded("embedded", || {
                embedded::extract(&document, hints, &self.config)
            }));
        }

        if pool.len() < self.config.enough_candidates {
            let harvest = guarded("heuristics", || {
                heuristics::extract(&document, hints, &self.config)
            });
            if let Some(expression) = harvest.learnable {
                self.selectors.learn(&source.id, expression);
            }
            pool.add_all(harvest.candidates);
        }

        let candidates = pool.finish(&self.config);
        tracing::debug!(
            source = %source.id,
            count = candidates.len(),
            rendered = hints.rendered,
            "extraction pass complete"
        );

        ExtractionPass {
            candidates,
            fingerprint,
        }
    }

    fn replay(
        &self,
        document: &Html,
        expression: &str,
        hints: &ExtractionHints,
    ) -> Vec<ProductCandidate> {
        let Ok(selector) = Selector::parse(expression) else {
            tracing::warn!(selector = %expression, "cached selector no longer parses");
            return Vec::new();
        };

        document
            .select(&selector)
            .filter_map(|container| {
                validate::promote_heuristic(
                    heuristics::container_draft(container, hints, &self.config),
                    ExtractionMethod::LearnedSelector,
                    &self.config,
                )
            })
            .collect()
    }
}

impl Default for AdaptiveExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one tier, converting a panic into an empty result at the tier
/// boundary so nothing escapes a source's pipeline.
fn guarded<T: Default>(tier: &str, run: impl FnOnce() -> T) -> T {
    catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|_| {
        tracing::error!(tier = tier, "extraction tier panicked, treated as empty");
        T::default()
    })
}

impl Default for heuristics::HeuristicHarvest {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            learnable: None,
        }
    }
}

/// De-duplicating accumulator: one candidate per normalized name, highest
/// confidence wins, first discovery keeps its position.
struct CandidatePool {
    candidates: Vec<ProductCandidate>,
    by_name: HashMap<String, usize>,
}

impl CandidatePool {
    fn new() -> Self {
        Self {
            candidates: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.candidates.len()
    }

    fn add(&mut self, candidate: ProductCandidate) {
        let key = candidate.normalized_name();
        match self.by_name.get(&key) {
            Some(&index) => {
                if candidate.confidence > self.candidates[index].confidence {
                    self.candidates[index] = candidate;
                }
            }
            None => {
                self.by_name.insert(key, self.candidates.len());
                self.candidates.push(candidate);
            }
        }
    }

    fn add_all(&mut self, candidates: impl IntoIterator<Item = ProductCandidate>) {
        for candidate in candidates {
            self.add(candidate);
        }
    }

    fn finish(self, config: &ExtractorConfig) -> Vec<ProductCandidate> {
        let mut kept: Vec<ProductCandidate> = self
            .candidates
            .into_iter()
            .filter(|c| c.confidence >= config.min_confidence)
            .collect();

        // Stable sort: ties keep discovery order, so passes are
        // deterministic.
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        kept.truncate(config.max_candidates);
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceId;

    fn source() -> Source {
        Source::new(
            "freshmart",
            "FreshMart",
            "https://freshmart.example",
            "https://freshmart.example/search?q={query}",
        )
    }

    fn extract(extractor: &AdaptiveExtractor, markup: &str) -> ExtractionPass {
        let src = source();
        extractor.extract(markup, &src, &ExtractionHints::for_source(&src))
    }

    const SCHEMA_MILK: &str = r#"<html><head><script type="application/ld+json">
    {"@type":"Product","name":"Amul Toned Milk 500ml",
     "offers":{"price":29,"priceCurrency":"INR"}}
    </script></head><body><p>search results</p></body></html>"#;

    #[test]
    fn schema_tagged_product_extracts_exactly() {
        let extractor = AdaptiveExtractor::new();
        let pass = extract(&extractor, SCHEMA_MILK);

        assert_eq!(pass.candidates.len(), 1);
        let milk = &pass.candidates[0];
        assert_eq!(milk.name, "Amul Toned Milk 500ml");
        assert_eq!(milk.price, 29.0);
        assert_eq!(milk.original_price, None);
        assert!(milk.confidence >= 0.9);
    }

    #[test]
    fn passes_are_deterministic() {
        let markup = r#"
        <script type="application/ld+json">
        {"@type":"Product","name":"Basmati Rice 1kg","offers":{"price":120}}</script>
        <script>var s = {"search":[{"name":"Sunflower Oil 1L","price":189},
                                   {"name":"Basmati Rice 1kg","price":118}]};</script>
        <div>
          <div class="card"><img src="/img/a.jpg" alt="Peanut Butter 340g"><span>₹249</span></div>
        </div>"#;

        // Fresh extractor per pass: identical markup and identical learned
        // state must give an identical ordered list.
        let first = extract(&AdaptiveExtractor::new(), markup);
        let second = extract(&AdaptiveExtractor::new(), markup);
        assert_eq!(first.candidates, second.candidates);
        assert_eq!(first.fingerprint, second.fingerprint);
    }

    #[test]
    fn dedup_keeps_the_higher_confidence_tier() {
        let markup = r#"
        <script type="application/ld+json">
        {"@type":"Product","name":"Amul Butter 100g","offers":{"price":60}}</script>
        <script>var s = {"items":[{"name":"Amul  Butter 100g","price":58}]};</script>"#;

        let extractor = AdaptiveExtractor::new();
        let pass = extract(&extractor, markup);

        assert_eq!(pass.candidates.len(), 1);
        assert_eq!(pass.candidates[0].method, ExtractionMethod::StructuredData);
        assert_eq!(pass.candidates[0].price, 60.0);
    }

    #[test]
    fn results_are_capped_and_sorted() {
        let mut items = String::new();
        for i in 0..20 {
            items.push_str(&format!(
                r#"{{"@type":"Product","name":"Item Number {i:02}","offers":{{"price":{}}}}},"#,
                10 + i
            ));
        }
        let markup = format!(
            r#"<script type="application/ld+json">[{}]</script>"#,
            items.trim_end_matches(',')
        );

        let extractor = AdaptiveExtractor::new();
        let pass = extract(&extractor, &markup);

        assert_eq!(pass.candidates.len(), 15);
        // Equal confidence throughout: discovery order survives the sort.
        assert_eq!(pass.candidates[0].name, "Item Number 00");
        for pair in pass.candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn all_candidates_satisfy_the_contract() {
        let markup = r#"
        <ul class="grid">
          <li class="product-card"><img src="/i/1.jpg"><h3>Valid Product One</h3><span>₹100</span></li>
          <li class="product-card"><img src="/i/2.jpg"><h3>Valid Product Two</h3><span>₹200</span></li>
          <li class="product-card"><img src="/i/3.jpg"><h3>Add to Cart</h3><span>₹0.50</span></li>
        </ul>"#;

        let extractor = AdaptiveExtractor::new();
        let pass = extract(&extractor, markup);

        let mut names = std::collections::HashSet::new();
        for candidate in &pass.candidates {
            assert!(candidate.confidence >= 0.5 && candidate.confidence <= 1.0);
            assert!(candidate.price >= 1.0 && candidate.price <= 50_000.0);
            assert!(names.insert(candidate.normalized_name()));
        }
    }

    #[test]
    fn tier_short_circuits_once_enough_candidates() {
        let mut blocks = String::new();
        for i in 0..5 {
            blocks.push_str(&format!(
                r#"{{"@type":"Product","name":"Structured Item {i}","offers":{{"price":{}}}}},"#,
                20 + i
            ));
        }
        let markup = format!(
            r#"<script type="application/ld+json">[{}]</script>
            <script>var s = {{"name":"Embedded Only Item","price":42}};</script>"#,
            blocks.trim_end_matches(',')
        );

        let extractor = AdaptiveExtractor::new();
        let pass = extract(&extractor, &markup);

        // Five structured candidates are enough; the embedded tier never ran.
        assert_eq!(pass.candidates.len(), 5);
        assert!(pass
            .candidates
            .iter()
            .all(|c| c.method == ExtractionMethod::StructuredData));
    }

    const GRID: &str = r#"
    <ul class="plp-grid">
      <li class="product-card"><img src="/img/milk.jpg"><h3>Amul Toned Milk 500ml</h3><span>₹29</span></li>
      <li class="product-card"><img src="/img/curd.jpg"><h3>Amul Masti Curd 400g</h3><span>₹35</span></li>
      <li class="product-card"><img src="/img/paneer.jpg"><h3>Amul Paneer 200g</h3><span>₹95</span></li>
    </ul>"#;

    #[test]
    fn high_confidence_heuristics_learn_a_selector() {
        let extractor = AdaptiveExtractor::new();
        let src = source();

        let pass = extractor.extract(GRID, &src, &ExtractionHints::for_source(&src));
        assert_eq!(pass.candidates.len(), 3);

        let learned = extractor.selectors().get(&src.id).expect("selector learned");
        assert_eq!(learned.expression, "li.product-card");
    }

    #[test]
    fn learned_selector_replays_on_the_next_pass() {
        let extractor = AdaptiveExtractor::new();
        let src = source();

        extractor.extract(GRID, &src, &ExtractionHints::for_source(&src));
        let pass = extractor.extract(GRID, &src, &ExtractionHints::for_source(&src));

        assert!(pass
            .candidates
            .iter()
            .any(|c| c.method == ExtractionMethod::LearnedSelector));
        assert!(extractor.selectors().get(&src.id).unwrap().successes >= 1);
    }

    #[test]
    fn stale_selector_is_evicted_after_four_empty_replays() {
        let extractor = AdaptiveExtractor::new();
        let src = source();

        extractor.extract(GRID, &src, &ExtractionHints::for_source(&src));
        assert!(extractor.selectors().get(&src.id).is_some());

        // Redesigned page: the selector matches nothing, four times over.
        let redesigned = "<html><body><div class='totally-new'></div></body></html>";
        for _ in 0..4 {
            extractor.extract(redesigned, &src, &ExtractionHints::for_source(&src));
        }
        assert!(extractor.selectors().get(&src.id).is_none());

        // The next pass falls back to heuristic tiers and re-learns.
        let pass = extractor.extract(GRID, &src, &ExtractionHints::for_source(&src));
        assert_eq!(pass.candidates.len(), 3);
        assert!(extractor.selectors().get(&src.id).is_some());
    }

    #[test]
    fn hostile_markup_does_not_panic() {
        let extractor = AdaptiveExtractor::new();
        let hostile = "<div <span ₹29 <script>{{{{</script><li><li><li>";
        let pass = extract(&extractor, hostile);
        assert!(pass.candidates.is_empty());
    }

    #[test]
    fn selector_cache_is_per_source() {
        let extractor = AdaptiveExtractor::new();
        let a = source();
        let mut b = source();
        b.id = SourceId::new("quickkart");

        extractor.extract(GRID, &a, &ExtractionHints::for_source(&a));
        assert!(extractor.selectors().get(&a.id).is_some());
        assert!(extractor.selectors().get(&b.id).is_none());
    }
}
