//! Native-API collaborator: direct product search where a source offers one.

use async_trait::async_trait;

use crate::types::{ProductCandidate, Source};

/// Outcome of one native API call.
///
/// A tagged union rather than a `Result`: "no items" and "not supported"
/// are ordinary chain outcomes, not errors.
#[derive(Debug, Clone)]
pub enum ApiOutcome {
    /// The API answered with product items
    Items(Vec<ProductCandidate>),
    /// The API answered, but had nothing for this query
    NoItems,
    /// This source has no native API
    NotSupported,
    /// The call failed (auth, transport, server error)
    Failed(String),
}

/// Direct native-API search collaborator.
#[async_trait]
pub trait NativeApi: Send + Sync {
    async fn call(&self, source: &Source, query: &str, locale: &str) -> ApiOutcome;
}
