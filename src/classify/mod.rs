//! # Classification Orchestration Engine
//!
//! Sequences one classification transaction: cache probe, isolated collector
//! fan-out under a batch timeout, niche detection with one-shot query
//! expansion, the two-stage LLM protocol, append-only persistence, and pure
//! response assembly. Collector and per-source classifier failures are
//! localized; synthesis and persistence failures terminate the run.

pub mod assemble;
pub mod niche;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cache::{AnalysisCache, CacheError, CachedAnalysis};
use crate::collect::types::{Collector, SourceId, SourceMetrics};
use crate::llm::{LlmError, PhaseClassifier};

use assemble::{assemble, AssembleInput};
use niche::NicheThresholds;
use types::{ClassificationResult, ExpansionState, PhaseOpinion};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classify_cache_hits_total", "Analyses served from cache.");
        describe_counter!(
            "classify_cache_read_errors_total",
            "Cache lookups that errored and were treated as misses."
        );
        describe_counter!(
            "collector_failures_total",
            "Collector invocations that produced no metrics."
        );
        describe_counter!(
            "query_expansions_total",
            "Classification runs that broadened the query for a niche keyword."
        );
        describe_counter!(
            "classify_insufficient_data_total",
            "Runs aborted because fewer than the minimum sources succeeded."
        );
        describe_counter!(
            "classify_completed_total",
            "Fresh classifications persisted successfully."
        );
    });
}

/// Explicit configuration for the orchestrator; passed in, never ambient.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Synthesis over fewer opinions than this is judged unreliable.
    pub min_sources: usize,
    /// One envelope around the whole collector fan-out, not per collector.
    pub collector_timeout: Duration,
    pub cache_ttl: chrono::Duration,
    pub niche: NicheThresholds,
    pub max_keyword_len: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_sources: 3,
            collector_timeout: Duration::from_secs(120),
            cache_ttl: chrono::Duration::hours(24),
            niche: NicheThresholds::default(),
            max_keyword_len: 100,
        }
    }
}

/// Fatal outcomes of a classification run. Per-source failures never appear
/// here; they live in the result's error list.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("invalid keyword: {0}")]
    InvalidKeyword(String),

    /// The one recoverable fatal: try a broader or different keyword.
    #[error(
        "insufficient data: only {succeeded}/5 collectors succeeded, minimum {required} required; {}",
        .reasons.join("; ")
    )]
    InsufficientData {
        succeeded: usize,
        required: usize,
        reasons: Vec<String>,
    },

    #[error("per-source classification failed: {0}")]
    Classification(#[source] LlmError),

    #[error("failed to synthesize analyses: {0}")]
    Synthesis(#[source] LlmError),

    #[error("failed to persist analysis: {0}")]
    Cache(#[from] CacheError),
}

/// The orchestrator. Holds its collaborators behind traits so tests can
/// substitute every boundary.
pub struct HypeClassifier {
    collectors: BTreeMap<SourceId, Arc<dyn Collector>>,
    llm: Arc<dyn PhaseClassifier>,
    cache: Arc<dyn AnalysisCache>,
    cfg: ClassifierConfig,
}

impl HypeClassifier {
    pub fn new(
        collectors: Vec<Arc<dyn Collector>>,
        llm: Arc<dyn PhaseClassifier>,
        cache: Arc<dyn AnalysisCache>,
        cfg: ClassifierConfig,
    ) -> Self {
        let collectors = collectors.into_iter().map(|c| (c.source(), c)).collect();
        Self {
            collectors,
            llm,
            cache,
            cfg,
        }
    }

    /// Single entry point: classify a keyword, serving from cache when a
    /// live entry exists.
    pub async fn classify(&self, keyword: &str) -> Result<ClassificationResult, ClassifyError> {
        ensure_metrics_described();

        let keyword = normalize_keyword(keyword, self.cfg.max_keyword_len)?;

        // 1) Cache probe. A storage error must never block a fresh analysis.
        match self.cache.get(&keyword).await {
            Ok(Some(row)) => {
                info!(%keyword, "cache hit");
                counter!("classify_cache_hits_total").increment(1);
                return Ok(Self::assemble_cached(row));
            }
            Ok(None) => {
                info!(%keyword, "cache miss");
            }
            Err(e) => {
                warn!(%keyword, error = %e, "cache read failed, treating as miss");
                counter!("classify_cache_read_errors_total").increment(1);
            }
        }

        // 2) Fan out to all five collectors under one batch timeout.
        let mut outcomes = self.run_collectors(&keyword, None, &SourceId::ALL).await;

        // 3/4) Niche detection over social metrics, then one-shot expansion.
        let mut expansion = ExpansionState::none();
        let mut expansion_errors: Vec<String> = Vec::new();
        let social = outcomes
            .get(&SourceId::Social)
            .and_then(|r| r.as_ref().ok());
        if niche::is_niche(social, self.cfg.niche) {
            info!(%keyword, "niche keyword detected, expanding query");
            match self.llm.expand_query(&keyword).await {
                Ok(terms) => {
                    counter!("query_expansions_total").increment(1);
                    info!(%keyword, ?terms, "re-running collectors with expanded terms");
                    let targets: Vec<SourceId> = SourceId::ALL
                        .into_iter()
                        .filter(SourceId::is_expandable)
                        .collect();
                    let rerun = self.run_collectors(&keyword, Some(&terms), &targets).await;
                    // Replacement, not merge: the expanded result supersedes
                    // the sparse one for every re-run source.
                    outcomes.extend(rerun);
                    expansion = ExpansionState::applied(terms);
                }
                Err(e) => {
                    warn!(%keyword, error = %e, "query expansion unusable, continuing with original data");
                    expansion_errors.push(format!("query expansion failed: {e}"));
                }
            }
        }

        // 5) Final threshold.
        let failure_reasons: Vec<String> = outcomes
            .iter()
            .filter_map(|(id, res)| {
                res.as_ref()
                    .err()
                    .map(|reason| format!("{id} collector failed: {reason}"))
            })
            .collect();
        let present: BTreeMap<SourceId, SourceMetrics> = outcomes
            .iter()
            .filter_map(|(id, res)| res.as_ref().ok().map(|m| (*id, m.clone())))
            .collect();

        info!(
            %keyword,
            succeeded = present.len(),
            "collectors completed: {}/5 succeeded",
            present.len()
        );

        if present.len() < self.cfg.min_sources {
            counter!("classify_insufficient_data_total").increment(1);
            return Err(ClassifyError::InsufficientData {
                succeeded: present.len(),
                required: self.cfg.min_sources,
                reasons: failure_reasons,
            });
        }

        let mut errors = failure_reasons;
        errors.extend(expansion_errors);

        // 6) One verdict per present source, concurrently.
        let (opinions, classification_errors, first_failure) =
            self.classify_sources(&keyword, &present).await;
        errors.extend(classification_errors);
        if opinions.len() < self.cfg.min_sources {
            let cause = first_failure.unwrap_or_else(|| {
                LlmError::MalformedResponse("no per-source opinions produced".into())
            });
            return Err(ClassifyError::Classification(cause));
        }

        // 7) Synthesis: exactly once, no fallback final opinion.
        let final_opinion = self
            .llm
            .synthesize(&keyword, &opinions)
            .await
            .map_err(ClassifyError::Synthesis)?;

        // 8) Persist a fully assembled row before anything becomes visible.
        let created_at = chrono::Utc::now();
        let expires_at = created_at + self.cfg.cache_ttl;
        let collector_data: BTreeMap<SourceId, Option<SourceMetrics>> = SourceId::ALL
            .into_iter()
            .map(|id| (id, outcomes.get(&id).and_then(|r| r.as_ref().ok().cloned())))
            .collect();
        let row = CachedAnalysis {
            keyword: keyword.clone(),
            phase: final_opinion.phase,
            confidence: final_opinion.confidence,
            reasoning: final_opinion.reasoning.clone(),
            collector_data: collector_data.clone(),
            per_source: opinions.clone(),
            expansion: expansion.clone(),
            created_at,
            expires_at,
        };
        self.cache.put(&row).await?;
        counter!("classify_completed_total").increment(1);

        // 9) Assemble.
        Ok(assemble(AssembleInput {
            keyword,
            final_opinion,
            per_source: opinions,
            collector_data,
            expansion,
            errors,
            created_at,
            expires_at,
            cache_hit: false,
        }))
    }

    fn assemble_cached(row: CachedAnalysis) -> ClassificationResult {
        assemble(AssembleInput {
            keyword: row.keyword,
            final_opinion: PhaseOpinion {
                phase: row.phase,
                confidence: row.confidence,
                reasoning: row.reasoning,
            },
            per_source: row.per_source,
            collector_data: row.collector_data,
            expansion: row.expansion,
            errors: Vec::new(),
            created_at: row.created_at,
            expires_at: row.expires_at,
            cache_hit: true,
        })
    }

    /// Spawn the targeted collectors concurrently and harvest results until
    /// the shared deadline. One collector failing or hanging never blocks
    /// the others; whatever completed before the deadline is kept.
    async fn run_collectors(
        &self,
        keyword: &str,
        expansion_terms: Option<&[String]>,
        targets: &[SourceId],
    ) -> BTreeMap<SourceId, Result<SourceMetrics, String>> {
        let timeout_secs = self.cfg.collector_timeout.as_secs();
        let mut results: BTreeMap<SourceId, Result<SourceMetrics, String>> = targets
            .iter()
            .map(|id| {
                (
                    *id,
                    Err(format!("did not complete within {timeout_secs}s")),
                )
            })
            .collect();

        let mut set: JoinSet<(SourceId, Result<SourceMetrics, String>)> = JoinSet::new();
        for id in targets {
            let Some(collector) = self.collectors.get(id) else {
                continue;
            };
            let collector = Arc::clone(collector);
            let keyword = keyword.to_string();
            let terms = expansion_terms.map(<[String]>::to_vec);
            let id = *id;
            set.spawn(async move {
                let outcome = collector
                    .fetch(&keyword, terms.as_deref())
                    .await
                    .map_err(|e| e.to_string());
                (id, outcome)
            });
        }

        let deadline = tokio::time::Instant::now() + self.cfg.collector_timeout;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((id, outcome)))) => {
                    if let Err(reason) = &outcome {
                        warn!(source = %id, %reason, "collector failed");
                        counter!("collector_failures_total").increment(1);
                    }
                    results.insert(id, outcome);
                }
                Ok(Some(Err(join_err))) => {
                    // A panicked collector task; its preset failure entry stands.
                    warn!(error = %join_err, "collector task aborted");
                    counter!("collector_failures_total").increment(1);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        timeout_secs,
                        still_running = set.len(),
                        "collector fan-out timed out"
                    );
                    set.abort_all();
                    break;
                }
            }
        }

        results
    }

    /// Run `classify_source` for every present collector result. Failures
    /// are collected, not propagated; the caller enforces the minimum.
    async fn classify_sources(
        &self,
        keyword: &str,
        present: &BTreeMap<SourceId, SourceMetrics>,
    ) -> (
        BTreeMap<SourceId, PhaseOpinion>,
        Vec<String>,
        Option<LlmError>,
    ) {
        let mut set: JoinSet<(SourceId, Result<PhaseOpinion, LlmError>)> = JoinSet::new();
        for (id, metrics) in present {
            let llm = Arc::clone(&self.llm);
            let keyword = keyword.to_string();
            let metrics = metrics.clone();
            let id = *id;
            set.spawn(async move {
                let outcome = llm.classify_source(id, &metrics, &keyword).await;
                (id, outcome)
            });
        }

        let mut opinions = BTreeMap::new();
        let mut errors = Vec::new();
        let mut first_failure = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((id, Ok(opinion))) => {
                    opinions.insert(id, opinion);
                }
                Ok((id, Err(e))) => {
                    warn!(source = %id, error = %e, "per-source classification failed");
                    errors.push(format!("failed to analyze {id}: {e}"));
                    if first_failure.is_none() {
                        first_failure = Some(e);
                    }
                }
                Err(join_err) => {
                    warn!(error = %join_err, "classification task aborted");
                    errors.push(format!("classification task aborted: {join_err}"));
                }
            }
        }
        (opinions, errors, first_failure)
    }
}

fn normalize_keyword(raw: &str, max_len: usize) -> Result<String, ClassifyError> {
    let keyword = raw.trim();
    if keyword.is_empty() {
        return Err(ClassifyError::InvalidKeyword(
            "keyword must not be empty".into(),
        ));
    }
    if keyword.chars().count() > max_len {
        return Err(ClassifyError::InvalidKeyword(format!(
            "keyword exceeds {max_len} characters"
        )));
    }
    Ok(keyword.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_is_trimmed() {
        assert_eq!(normalize_keyword("  fusion  ", 100).unwrap(), "fusion");
    }

    #[test]
    fn empty_keyword_is_rejected() {
        assert!(matches!(
            normalize_keyword("   ", 100),
            Err(ClassifyError::InvalidKeyword(_))
        ));
    }

    #[test]
    fn overlong_keyword_is_rejected() {
        let long = "x".repeat(101);
        assert!(normalize_keyword(&long, 100).is_err());
        let ok = "x".repeat(100);
        assert!(normalize_keyword(&ok, 100).is_ok());
    }

    #[test]
    fn insufficient_data_message_names_failed_sources() {
        let err = ClassifyError::InsufficientData {
            succeeded: 2,
            required: 3,
            reasons: vec![
                "social collector failed: request timed out".into(),
                "patents collector failed: rate limited".into(),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("only 2/5"));
        assert!(msg.contains("social collector failed"));
        assert!(msg.contains("patents collector failed"));
    }
}
