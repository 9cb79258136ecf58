//! Testing utilities including mock collaborators.
//!
//! These are useful for testing applications that use the extraction core
//! without touching real networks, rendering engines, or AI services.
//! All mocks return deterministic, configurable responses and track their
//! calls for assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{EscalationError, EscalationResult, FetchError, FetchResult, RenderResult};
use crate::traits::{
    AiExtractor, ApiOutcome, EscalationRequest, FetchResponse, NativeApi, Renderer, StaticFetcher,
};
use crate::types::{ProductCandidate, Source, SourceId};

/// A mock native API with per-source scripted outcomes.
///
/// Unknown sources report `NotSupported`, which is what most sources
/// answer in production.
#[derive(Default)]
pub struct MockApi {
    outcomes: Arc<RwLock<HashMap<SourceId, ApiOutcome>>>,
    calls: Arc<RwLock<Vec<SourceId>>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script an outcome for a source.
    pub fn with_outcome(self, source: impl Into<SourceId>, outcome: ApiOutcome) -> Self {
        self.outcomes.write().unwrap().insert(source.into(), outcome);
        self
    }

    /// Sources called so far, in call order.
    pub fn calls(&self) -> Vec<SourceId> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl NativeApi for MockApi {
    async fn call(&self, source: &Source, _query: &str, _locale: &str) -> ApiOutcome {
        self.calls.write().unwrap().push(source.id.clone());
        self.outcomes
            .read()
            .unwrap()
            .get(&source.id)
            .cloned()
            .unwrap_or(ApiOutcome::NotSupported)
    }
}

/// A mock static fetcher serving scripted pages by URL.
///
/// Unknown URLs fail with HTTP 404.
#[derive(Default)]
pub struct MockFetcher {
    pages: Arc<RwLock<HashMap<String, FetchResponse>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a 200 response for a URL.
    pub fn with_page(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.write().unwrap().insert(
            url.into(),
            FetchResponse {
                status: 200,
                body: body.into(),
            },
        );
        self
    }

    /// Serve an arbitrary status for a URL.
    pub fn with_status(self, url: impl Into<String>, status: u16) -> Self {
        self.pages.write().unwrap().insert(
            url.into(),
            FetchResponse {
                status,
                body: String::new(),
            },
        );
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl StaticFetcher for MockFetcher {
    async fn get(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
    ) -> FetchResult<FetchResponse> {
        self.calls.write().unwrap().push(url.to_string());
        match self.pages.read().unwrap().get(url) {
            Some(response) => Ok(response.clone()),
            None => Err(FetchError::Status { code: 404 }),
        }
    }
}

/// A mock renderer serving scripted markup by URL.
///
/// Unknown URLs render to `None`, the engine's "nothing useful captured"
/// answer.
#[derive(Default)]
pub struct MockRenderer {
    pages: Arc<RwLock<HashMap<String, String>>>,
    calls: Arc<RwLock<Vec<String>>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        self.pages.write().unwrap().insert(url.into(), markup.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(
        &self,
        url: &str,
        _locale: &str,
        _wait_selector: Option<&str>,
        _timeout: Duration,
    ) -> RenderResult<Option<String>> {
        self.calls.write().unwrap().push(url.to_string());
        Ok(self.pages.read().unwrap().get(url).cloned())
    }
}

/// A mock AI-extraction service with per-source scripted items.
///
/// Unknown sources return an empty item list (a zero-count answer the
/// orchestrator refuses); `failing()` makes every call error instead.
#[derive(Default)]
pub struct MockAi {
    items: Arc<RwLock<HashMap<SourceId, Vec<ProductCandidate>>>>,
    fail: Arc<RwLock<bool>>,
    batch_calls: Arc<RwLock<Vec<usize>>>,
}

impl MockAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(self, source: impl Into<SourceId>, items: Vec<ProductCandidate>) -> Self {
        self.items.write().unwrap().insert(source.into(), items);
        self
    }

    /// Make every escalation call fail.
    pub fn failing(self) -> Self {
        *self.fail.write().unwrap() = true;
        self
    }

    /// Batch sizes of `extract_many` calls so far.
    pub fn batch_calls(&self) -> Vec<usize> {
        self.batch_calls.read().unwrap().clone()
    }

    fn lookup(&self, source: &SourceId) -> EscalationResult<Vec<ProductCandidate>> {
        if *self.fail.read().unwrap() {
            return Err(EscalationError::MalformedResponse {
                reason: "scripted failure".to_string(),
            });
        }
        Ok(self
            .items
            .read()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AiExtractor for MockAi {
    async fn extract(
        &self,
        _markup: &str,
        source: &Source,
        _query: &str,
        _base_url: &str,
    ) -> EscalationResult<Vec<ProductCandidate>> {
        self.lookup(&source.id)
    }

    async fn extract_many(
        &self,
        batch: &[EscalationRequest],
        _query: &str,
    ) -> HashMap<SourceId, EscalationResult<Vec<ProductCandidate>>> {
        self.batch_calls.write().unwrap().push(batch.len());
        batch
            .iter()
            .map(|request| (request.source.clone(), self.lookup(&request.source)))
            .collect()
    }
}
