//! Remote AI-extraction collaborator, used only as a last-resort escalation.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::EscalationResult;
use crate::types::{ProductCandidate, Source, SourceId};

/// One source's retained markup, queued for the batched escalation call.
#[derive(Debug, Clone)]
pub struct EscalationRequest {
    pub source: SourceId,
    pub markup: String,
    pub base_url: String,
}

/// Remote AI extraction collaborator.
///
/// `extract_many` is the batched form the orchestrator uses: one call per
/// run covering every source whose chain was exhausted with markup in hand.
#[async_trait]
pub trait AiExtractor: Send + Sync {
    async fn extract(
        &self,
        markup: &str,
        source: &Source,
        query: &str,
        base_url: &str,
    ) -> EscalationResult<Vec<ProductCandidate>>;

    async fn extract_many(
        &self,
        batch: &[EscalationRequest],
        query: &str,
    ) -> HashMap<SourceId, EscalationResult<Vec<ProductCandidate>>>;
}
