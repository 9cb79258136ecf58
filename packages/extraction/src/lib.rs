//! Resilient Multi-Source Product Extraction Core
//!
//! Locates products across many independently operated, frequently-changing
//! e-commerce sources and reconciles their listings for comparison. Sources
//! render their markup differently, rate-limit or block naive clients, and
//! redesign without notice; this crate is the part that survives all of
//! that.
//!
//! # Design Philosophy
//!
//! **"Assume every source is currently broken in a new way"**
//!
//! - Tiered extraction, most-trustworthy first, no hand-maintained
//!   per-source selectors
//! - Live per-source circuit breaking; broken sources cost nothing
//! - Degrade to cached or AI-derived results before failing outright
//! - Collaborators behind traits; the core owns decisions, not plumbing
//!
//! # Usage
//!
//! ```rust,ignore
//! use pricescout_extraction::{
//!     AdaptiveExtractor, Collaborators, HealthMonitor, MemoryCache,
//!     MemoryHealthStore, Orchestrator, Source,
//! };
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! let health = Arc::new(HealthMonitor::new(Arc::new(MemoryHealthStore::new())).await);
//! let extractor = Arc::new(AdaptiveExtractor::new());
//! let orchestrator = Orchestrator::new(collaborators, health, extractor);
//!
//! let mut events = orchestrator.run(sources, "toned milk 500ml", "en-IN");
//! while let Some(event) = events.next().await {
//!     println!("{event:?}");
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`] - Sources, candidates, health records, events, config
//! - [`traits`] - Collaborator contracts (API, fetch, render, AI, cache, store)
//! - [`health`] - Per-source reliability tracking and circuit breaking
//! - [`extract`] - Tiered adaptive extraction over arbitrary markup
//! - [`orchestrator`] - Self-healing multi-source runs as an event stream
//! - [`stores`] - In-memory collaborator implementations
//! - [`testing`] - Mock collaborators for testing

pub mod error;
pub mod extract;
pub mod health;
pub mod orchestrator;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{
    EscalationError, FetchError, RenderError, SecurityError, StoreError, TierError,
};
pub use extract::{
    AdaptiveExtractor, ExtractionHints, ExtractionPass, LearnedSelector, SelectorCache,
    StructureFingerprint,
};
pub use health::HealthMonitor;
pub use orchestrator::{Collaborators, Orchestrator};
pub use traits::{
    AiExtractor, ApiOutcome, CachedResult, EscalationRequest, FetchResponse, HealthStore,
    NativeApi, RateLimitedRenderer, Renderer, ResultCache, StaticFetcher, UrlValidator,
    ValidatedFetcher,
};
pub use types::{
    CircuitState, ExtractionMethod, ExtractorConfig, HealthConfig, HealthRecord,
    OrchestratorConfig, ProductCandidate, ScoutEvent, Source, SourceId,
};

// Re-export stores
pub use stores::{MemoryCache, MemoryHealthStore};
