// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod cache;
pub mod classify;
pub mod collect;
pub mod config;
pub mod llm;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::cache::{AnalysisCache, CachedAnalysis, SqliteAnalysisCache};
pub use crate::classify::{ClassifierConfig, ClassifyError, HypeClassifier};
pub use crate::classify::types::{ClassificationResult, ExpansionState, Phase, PhaseOpinion};
pub use crate::collect::types::{CollectError, Collector, SourceId, SourceMetrics};
pub use crate::llm::{DeepSeekClient, LlmConfig, LlmError, PhaseClassifier};
