//! Result-cache collaborator (TTL / stale-while-revalidate store).

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{ProductCandidate, SourceId};

/// A cached result set, possibly past its freshness window.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub items: Vec<ProductCandidate>,
    pub is_stale: bool,
}

/// Cache collaborator keyed by (query, source, locale).
///
/// Freshness policy and persistence format belong to the implementation;
/// the core only reads the staleness flag to tag degraded results.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(
        &self,
        query: &str,
        source: &SourceId,
        locale: &str,
    ) -> StoreResult<Option<CachedResult>>;

    async fn set(
        &self,
        query: &str,
        source: &SourceId,
        locale: &str,
        items: &[ProductCandidate],
    ) -> StoreResult<()>;
}
