//! Durable health store: abstract persistent key-value seam.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::StoreResult;
use crate::types::{HealthRecord, SourceId};

/// Durable storage for health records.
///
/// Any embedded or networked key-value store satisfies this; records are
/// serde-serializable. `save` is called after every record mutation and
/// must be atomic per source.
#[async_trait]
pub trait HealthStore: Send + Sync {
    async fn load(&self) -> StoreResult<HashMap<SourceId, HealthRecord>>;

    async fn save(&self, source: &SourceId, record: &HealthRecord) -> StoreResult<()>;
}
