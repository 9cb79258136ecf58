//! Events emitted by the orchestrator (facts about what happened).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::candidate::ProductCandidate;
use super::source::SourceId;

/// Progressive event stream for one orchestrator run.
///
/// `Started` is always first and `Completed` always last; every source
/// yields exactly one of `Skipped`, `Result`, or `Failed` in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoutEvent {
    Started {
        run_id: Uuid,
        source_count: usize,
    },

    /// Circuit breaker refused the attempt; no network collaborator touched
    Skipped {
        source: SourceId,
        reason: String,
    },

    Result {
        source: SourceId,
        items: Vec<ProductCandidate>,
        /// Confidence tagged by source of truth: native API ≈ 0.95,
        /// extractor average otherwise, reduced for cached results
        confidence: f32,
        from_cache: bool,
        ai_derived: bool,
    },

    Failed {
        source: SourceId,
        reason: String,
    },

    Completed {
        succeeded: usize,
        total: usize,
        disabled_sources: Vec<SourceId>,
    },
}

impl ScoutEvent {
    /// The source this event belongs to, if any.
    pub fn source(&self) -> Option<&SourceId> {
        match self {
            ScoutEvent::Skipped { source, .. }
            | ScoutEvent::Result { source, .. }
            | ScoutEvent::Failed { source, .. } => Some(source),
            ScoutEvent::Started { .. } | ScoutEvent::Completed { .. } => None,
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, ScoutEvent::Result { .. })
    }
}
