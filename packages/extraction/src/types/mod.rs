//! Core data types: sources, candidates, health records, events, config.

pub mod candidate;
pub mod config;
pub mod events;
pub mod health;
pub mod source;

pub use candidate::{CandidateDraft, ExtractionMethod, ProductCandidate};
pub use config::{ExtractorConfig, HealthConfig, OrchestratorConfig};
pub use events::ScoutEvent;
pub use health::{CircuitState, HealthRecord};
pub use source::{Source, SourceId};
