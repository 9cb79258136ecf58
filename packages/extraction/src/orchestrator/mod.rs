//! The self-healing orchestrator: multi-source runs as an event stream.
//!
//! For each source the orchestrator walks a strategy chain (native API,
//! static fetch, rendered fetch, rendered alternates), stopping at the
//! first non-empty result, with the health monitor gating the attempt up
//! front and recording the verdict at the end. Sources whose chain is
//! exhausted with markup in hand are batched into a single AI escalation
//! call after all batches finish.
//!
//! Sources run in fixed-size batches to bound rendering-engine usage; each
//! source's chain is its own spawned task, so in-flight work runs to
//! completion (and health records stay accurate) even when the consumer
//! stops reading. Cancellation is observed cooperatively at batch
//! boundaries, never mid-source.

use async_stream::stream;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{FetchError, RenderError, TierError};
use crate::extract::{AdaptiveExtractor, ExtractionHints};
use crate::health::HealthMonitor;
use crate::traits::{
    AiExtractor, ApiOutcome, EscalationRequest, NativeApi, Renderer, ResultCache, StaticFetcher,
};
use crate::types::{OrchestratorConfig, ProductCandidate, ScoutEvent, Source};

/// External collaborators the orchestrator drives.
///
/// Constructed once at startup and handed in by the application; the
/// orchestrator holds no hidden global state.
#[derive(Clone)]
pub struct Collaborators {
    pub api: Arc<dyn NativeApi>,
    pub fetcher: Arc<dyn StaticFetcher>,
    pub renderer: Arc<dyn Renderer>,
    pub ai: Arc<dyn AiExtractor>,
    pub cache: Arc<dyn ResultCache>,
}

/// Outcome of one strategy chain. Created and consumed within a single
/// orchestrator pass; never persisted.
enum ScrapeAttempt {
    Success {
        items: Vec<ProductCandidate>,
        confidence: f32,
        fingerprint: Option<String>,
    },
    Failure {
        reason: String,
        retained_markup: Option<String>,
    },
}

/// What one source task hands back to the stream.
struct SourceReport {
    source: Source,
    events: Vec<ScoutEvent>,
    deferred_markup: Option<String>,
}

/// Everything a spawned source task needs, owned.
#[derive(Clone)]
struct TaskContext {
    collaborators: Collaborators,
    health: Arc<HealthMonitor>,
    extractor: Arc<AdaptiveExtractor>,
    config: OrchestratorConfig,
}

/// Drives per-source strategy chains for a whole run and emits progressive
/// events.
pub struct Orchestrator {
    collaborators: Collaborators,
    health: Arc<HealthMonitor>,
    extractor: Arc<AdaptiveExtractor>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        health: Arc<HealthMonitor>,
        extractor: Arc<AdaptiveExtractor>,
    ) -> Self {
        Self::with_config(collaborators, health, extractor, OrchestratorConfig::default())
    }

    pub fn with_config(
        collaborators: Collaborators,
        health: Arc<HealthMonitor>,
        extractor: Arc<AdaptiveExtractor>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            collaborators,
            health,
            extractor,
            config,
        }
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Run a query against a set of sources, streaming events as they
    /// happen.
    pub fn run(
        &self,
        sources: Vec<Source>,
        query: impl Into<String>,
        locale: impl Into<String>,
    ) -> Pin<Box<dyn Stream<Item = ScoutEvent> + Send + '_>> {
        self.run_with_cancellation(sources, query, locale, CancellationToken::new())
    }

    /// Like [`Orchestrator::run`], with cooperative cancellation observed
    /// at batch boundaries.
    pub fn run_with_cancellation(
        &self,
        sources: Vec<Source>,
        query: impl Into<String>,
        locale: impl Into<String>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Stream<Item = ScoutEvent> + Send + '_>> {
        let query = query.into();
        let locale = locale.into();

        Box::pin(stream! {
            let run_id = Uuid::now_v7();
            let total = sources.len();
            tracing::info!(run_id = %run_id, sources = total, query = %query, "run started");
            yield ScoutEvent::Started { run_id, source_count: total };

            let mut succeeded = 0usize;
            let mut deferred: Vec<(Source, String)> = Vec::new();

            for batch in sources.chunks(self.config.batch_size) {
                if cancel.is_cancelled() {
                    tracing::info!(run_id = %run_id, "cancelled, no further batches");
                    break;
                }

                let mut tasks: FuturesUnordered<_> = batch
                    .iter()
                    .cloned()
                    .map(|source| {
                        let ctx = self.task_context();
                        let query = query.clone();
                        let locale = locale.clone();
                        tokio::spawn(async move { run_source(ctx, source, query, locale).await })
                    })
                    .collect();

                // Barrier: the whole batch completes before the next starts.
                // Events surface first-come, first-served within it.
                while let Some(joined) = tasks.next().await {
                    match joined {
                        Ok(report) => {
                            if let Some(markup) = report.deferred_markup {
                                deferred.push((report.source, markup));
                            }
                            for event in report.events {
                                if event.is_result() {
                                    succeeded += 1;
                                }
                                yield event;
                            }
                        }
                        Err(join_error) => {
                            tracing::error!(error = %join_error, "source task aborted");
                        }
                    }
                }
            }

            for event in self.resolve_escalations(deferred, &query, &locale, &cancel).await {
                if event.is_result() {
                    succeeded += 1;
                }
                yield event;
            }

            let disabled_sources = self.health.disabled_sources();
            tracing::info!(
                run_id = %run_id,
                succeeded,
                total,
                disabled = disabled_sources.len(),
                "run completed"
            );
            yield ScoutEvent::Completed { succeeded, total, disabled_sources };
        })
    }

    fn task_context(&self) -> TaskContext {
        TaskContext {
            collaborators: self.collaborators.clone(),
            health: self.health.clone(),
            extractor: self.extractor.clone(),
            config: self.config.clone(),
        }
    }

    /// One batched AI call for every source that was exhausted with markup
    /// retained; verdicts are recorded here, exactly once per source.
    async fn resolve_escalations(
        &self,
        deferred: Vec<(Source, String)>,
        query: &str,
        locale: &str,
        cancel: &CancellationToken,
    ) -> Vec<ScoutEvent> {
        if deferred.is_empty() {
            return Vec::new();
        }

        let mut results = if cancel.is_cancelled() {
            // Degrade every deferred source without touching the AI service.
            HashMap::new()
        } else {
            let requests: Vec<EscalationRequest> = deferred
                .iter()
                .map(|(source, markup)| EscalationRequest {
                    source: source.id.clone(),
                    markup: markup.clone(),
                    base_url: source.base_url.clone(),
                })
                .collect();

            tracing::info!(count = requests.len(), "escalating retained markup");
            match timeout(
                self.config.escalation_timeout,
                self.collaborators.ai.extract_many(&requests, query),
            )
            .await
            {
                Ok(results) => results,
                Err(_) => {
                    tracing::warn!("escalation call timed out");
                    HashMap::new()
                }
            }
        };

        let ctx = self.task_context();
        let mut events = Vec::with_capacity(deferred.len());

        for (source, _markup) in deferred {
            match results.remove(&source.id) {
                Some(Ok(items)) if !items.is_empty() => {
                    let confidence = items.iter().map(|i| i.confidence).sum::<f32>()
                        / items.len() as f32;
                    tracing::info!(source = %source.id, count = items.len(), "escalation recovered items");

                    ctx.health
                        .record_outcome(&source.id, true, items.len(), None)
                        .await;
                    if let Err(error) = ctx
                        .collaborators
                        .cache
                        .set(query, &source.id, locale, &items)
                        .await
                    {
                        tracing::warn!(source = %source.id, error = %error, "failed to cache escalated result");
                    }

                    events.push(ScoutEvent::Result {
                        source: source.id.clone(),
                        items,
                        confidence,
                        from_cache: false,
                        ai_derived: true,
                    });
                }
                other => {
                    if let Some(Err(error)) = other {
                        tracing::warn!(source = %source.id, error = %error, "escalation failed");
                    }
                    ctx.health.record_outcome(&source.id, false, 0, None).await;
                    events.push(
                        degraded_event(
                            &ctx,
                            &source,
                            query,
                            locale,
                            "all extraction strategies exhausted",
                        )
                        .await,
                    );
                }
            }
        }

        events
    }
}

/// Full gate-chain-record sequence for one source.
async fn run_source(
    ctx: TaskContext,
    source: Source,
    query: String,
    locale: String,
) -> SourceReport {
    if !ctx.health.should_attempt(&source.id) {
        tracing::debug!(source = %source.id, "skipped, circuit open");
        return SourceReport {
            events: vec![ScoutEvent::Skipped {
                source: source.id.clone(),
                reason: "circuit open, backing off".to_string(),
            }],
            deferred_markup: None,
            source,
        };
    }

    match run_chain(&ctx, &source, &query, &locale).await {
        ScrapeAttempt::Success {
            items,
            confidence,
            fingerprint,
        } => {
            ctx.health
                .record_outcome(&source.id, true, items.len(), fingerprint.as_deref())
                .await;
            if let Err(error) = ctx
                .collaborators
                .cache
                .set(&query, &source.id, &locale, &items)
                .await
            {
                tracing::warn!(source = %source.id, error = %error, "failed to cache result");
            }

            SourceReport {
                events: vec![ScoutEvent::Result {
                    source: source.id.clone(),
                    items,
                    confidence,
                    from_cache: false,
                    ai_derived: false,
                }],
                deferred_markup: None,
                source,
            }
        }
        ScrapeAttempt::Failure {
            retained_markup: Some(markup),
            ..
        } => {
            // Verdict is deferred until the batched escalation resolves,
            // so health is recorded exactly once with the true outcome.
            tracing::debug!(source = %source.id, "chain exhausted, markup retained for escalation");
            SourceReport {
                events: Vec::new(),
                deferred_markup: Some(markup),
                source,
            }
        }
        ScrapeAttempt::Failure {
            reason,
            retained_markup: None,
        } => {
            ctx.health.record_outcome(&source.id, false, 0, None).await;
            let event = degraded_event(&ctx, &source, &query, &locale, &reason).await;
            SourceReport {
                events: vec![event],
                deferred_markup: None,
                source,
            }
        }
    }
}

/// The per-source strategy chain, in order, stopping at the first
/// non-empty result. Transport errors, render errors, empty extractions,
/// and per-tier timeouts all fall through to the next strategy.
async fn run_chain(
    ctx: &TaskContext,
    source: &Source,
    query: &str,
    locale: &str,
) -> ScrapeAttempt {
    let mut retained: Option<String> = None;
    let mut last_failure = TierError::ExtractionEmpty;

    // Strategy 1: direct native API.
    match timeout(
        ctx.config.api_timeout,
        ctx.collaborators.api.call(source, query, locale),
    )
    .await
    {
        Ok(ApiOutcome::Items(items)) if !items.is_empty() => {
            tracing::debug!(source = %source.id, count = items.len(), "native API answered");
            return ScrapeAttempt::Success {
                items,
                confidence: ctx.config.api_confidence,
                fingerprint: None,
            };
        }
        Ok(ApiOutcome::Items(_) | ApiOutcome::NoItems) => {
            tracing::debug!(source = %source.id, "native API had no items");
        }
        Ok(ApiOutcome::NotSupported) => {}
        Ok(ApiOutcome::Failed(reason)) => {
            tracing::debug!(source = %source.id, reason = %reason, "native API failed");
            last_failure = TierError::Api(reason);
        }
        Err(_) => {
            tracing::debug!(source = %source.id, "native API timed out");
            last_failure = TierError::Transport(FetchError::Timeout);
        }
    }

    // Strategy 2: static fetch of the primary search URL.
    let primary_url = source.search_url(query, locale);
    match timeout(
        ctx.config.fetch_timeout,
        ctx.collaborators
            .fetcher
            .get(&primary_url, &default_headers(locale)),
    )
    .await
    {
        Ok(Ok(response)) if response.is_success() => {
            let hints = ExtractionHints::for_source(source);
            match attempt_extraction(ctx, source, &response.body, &hints) {
                Some(success) => return success,
                None => {
                    last_failure = TierError::ExtractionEmpty;
                    retained = Some(response.body);
                }
            }
        }
        Ok(Ok(response)) => {
            tracing::debug!(source = %source.id, status = response.status, "static fetch rejected");
            last_failure = TierError::Transport(FetchError::Status {
                code: response.status,
            });
        }
        Ok(Err(error)) => {
            tracing::debug!(source = %source.id, error = %error, "static fetch failed");
            last_failure = TierError::Transport(error);
        }
        Err(_) => {
            tracing::debug!(source = %source.id, "static fetch timed out");
            last_failure = TierError::Transport(FetchError::Timeout);
        }
    }

    // Strategies 3 and 4: rendered primary, then each alternate variant.
    let mut render_urls = vec![primary_url];
    render_urls.extend(source.alternate_urls(query, locale));

    for url in render_urls {
        match timeout(
            ctx.config.render_timeout,
            ctx.collaborators.renderer.render(
                &url,
                locale,
                source.wait_selector.as_deref(),
                ctx.config.render_timeout,
            ),
        )
        .await
        {
            Ok(Ok(Some(markup))) => {
                let hints = ExtractionHints::for_source(source).rendered();
                match attempt_extraction(ctx, source, &markup, &hints) {
                    Some(success) => return success,
                    None => {
                        last_failure = TierError::ExtractionEmpty;
                        retained = Some(markup);
                    }
                }
            }
            Ok(Ok(None)) => {
                tracing::debug!(source = %source.id, url = %url, "render produced no markup");
                last_failure = TierError::Render(RenderError::EmptyOutput);
            }
            Ok(Err(error)) => {
                tracing::debug!(source = %source.id, url = %url, error = %error, "render failed");
                last_failure = TierError::Render(error);
            }
            Err(_) => {
                tracing::debug!(source = %source.id, url = %url, "render timed out");
                last_failure = TierError::Render(RenderError::Timeout);
            }
        }
    }

    ScrapeAttempt::Failure {
        reason: last_failure.to_string(),
        retained_markup: retained,
    }
}

/// Extraction is pure computation; a non-empty pass ends the chain.
fn attempt_extraction(
    ctx: &TaskContext,
    source: &Source,
    markup: &str,
    hints: &ExtractionHints,
) -> Option<ScrapeAttempt> {
    let pass = ctx.extractor.extract(markup, source, hints);
    if pass.is_empty() {
        return None;
    }

    Some(ScrapeAttempt::Success {
        confidence: pass.average_confidence(),
        fingerprint: Some(pass.fingerprint.hash.clone()),
        items: pass.candidates,
    })
}

/// Failure path: a cached (possibly stale) result beats an outright
/// failure, and either way the source gets exactly one event.
async fn degraded_event(
    ctx: &TaskContext,
    source: &Source,
    query: &str,
    locale: &str,
    reason: &str,
) -> ScoutEvent {
    match ctx.collaborators.cache.get(query, &source.id, locale).await {
        Ok(Some(cached)) if !cached.items.is_empty() => {
            let confidence = if cached.is_stale {
                ctx.config.stale_cache_confidence
            } else {
                ctx.config.cache_confidence
            };
            tracing::info!(source = %source.id, stale = cached.is_stale, "serving cached result");
            ScoutEvent::Result {
                source: source.id.clone(),
                items: cached.items,
                confidence,
                from_cache: true,
                ai_derived: false,
            }
        }
        Ok(_) => ScoutEvent::Failed {
            source: source.id.clone(),
            reason: reason.to_string(),
        },
        Err(error) => {
            tracing::warn!(source = %source.id, error = %error, "cache lookup failed");
            ScoutEvent::Failed {
                source: source.id.clone(),
                reason: reason.to_string(),
            }
        }
    }
}

fn default_headers(locale: &str) -> HashMap<String, String> {
    HashMap::from([
        (
            "accept".to_string(),
            "text/html,application/xhtml+xml".to_string(),
        ),
        ("accept-language".to_string(), locale.to_string()),
    ])
}
