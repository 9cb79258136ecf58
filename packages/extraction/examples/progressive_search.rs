//! Progressive multi-source search against mock collaborators.
//!
//! Demonstrates the full wiring: health monitor, adaptive extractor, and
//! orchestrator over scripted API/fetch/render/AI collaborators. Run with:
//!
//! ```sh
//! cargo run --example progressive_search
//! ```

use futures::StreamExt;
use std::sync::Arc;

use pricescout_extraction::{
    testing::{MockAi, MockApi, MockFetcher, MockRenderer},
    AdaptiveExtractor, ApiOutcome, Collaborators, ExtractionMethod, HealthMonitor, MemoryCache,
    MemoryHealthStore, Orchestrator, ProductCandidate, ScoutEvent, Source,
};

const GRID: &str = r#"
<ul class="plp-grid">
  <li class="product-card"><img src="/img/milk.jpg"><h3>Amul Toned Milk 500ml</h3><span>₹29</span></li>
  <li class="product-card"><img src="/img/curd.jpg"><h3>Amul Masti Curd 400g</h3><span>₹35</span></li>
  <li class="product-card"><img src="/img/paneer.jpg"><h3>Amul Paneer 200g</h3><span>₹95</span></li>
</ul>"#;

#[tokio::main]
async fn main() {
    let query = "milk";
    let locale = "en-IN";

    // One source answers over its API, one serves static markup, one is
    // completely broken.
    let apishop = Source::new(
        "apishop",
        "ApiShop",
        "https://apishop.example",
        "https://apishop.example/search?q={query}",
    );
    let webshop = Source::new(
        "webshop",
        "WebShop",
        "https://webshop.example",
        "https://webshop.example/search?q={query}",
    );
    let deadshop = Source::new(
        "deadshop",
        "DeadShop",
        "https://deadshop.example",
        "https://deadshop.example/search?q={query}",
    );

    let collaborators = Collaborators {
        api: Arc::new(MockApi::new().with_outcome(
            "apishop",
            ApiOutcome::Items(vec![ProductCandidate::new(
                "Amul Gold Milk 500ml",
                33.0,
                0.95,
                ExtractionMethod::NativeApi,
            )]),
        )),
        fetcher: Arc::new(
            MockFetcher::new().with_page(webshop.search_url(query, locale), GRID),
        ),
        renderer: Arc::new(MockRenderer::new()),
        ai: Arc::new(MockAi::new()),
        cache: Arc::new(MemoryCache::new()),
    };

    let health = Arc::new(HealthMonitor::new(Arc::new(MemoryHealthStore::new())).await);
    let orchestrator = Orchestrator::new(collaborators, health, Arc::new(AdaptiveExtractor::new()));

    let mut events = orchestrator.run(vec![apishop, webshop, deadshop], query, locale);
    while let Some(event) = events.next().await {
        match event {
            ScoutEvent::Started { source_count, .. } => {
                println!("searching {source_count} sources for {query:?}");
            }
            ScoutEvent::Result { source, items, confidence, from_cache, ai_derived } => {
                println!(
                    "{source}: {} items (confidence {confidence:.2}, cache: {from_cache}, ai: {ai_derived})",
                    items.len()
                );
                for item in items {
                    println!("  - {} @ {}", item.name, item.price);
                }
            }
            ScoutEvent::Skipped { source, reason } => println!("{source}: skipped ({reason})"),
            ScoutEvent::Failed { source, reason } => println!("{source}: failed ({reason})"),
            ScoutEvent::Completed { succeeded, total, disabled_sources } => {
                println!("done: {succeeded}/{total} sources, {} disabled", disabled_sources.len());
            }
        }
    }
}
