//! Shared test doubles: scripted collectors, a stub classifier client, and
//! an in-memory cache. Each substitutes one orchestrator boundary.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use hype_cycle_analyzer::cache::{AnalysisCache, CacheError, CachedAnalysis};
use hype_cycle_analyzer::classify::types::{Phase, PhaseOpinion};
use hype_cycle_analyzer::classify::{ClassifierConfig, HypeClassifier};
use hype_cycle_analyzer::collect::types::{CollectError, Collector, SourceId, SourceMetrics};
use hype_cycle_analyzer::llm::{LlmError, PhaseClassifier};

pub fn opinion(phase: Phase, confidence: f64) -> PhaseOpinion {
    PhaseOpinion {
        phase,
        confidence,
        reasoning: format!("{phase} signals"),
    }
}

pub fn metrics_for(source: SourceId, keyword: &str) -> SourceMetrics {
    let mut m = SourceMetrics::new(source, keyword);
    m.set("marker", format!("{source}-data"));
    m
}

pub fn social_metrics(keyword: &str, mentions_30d: u64, mentions_total: u64) -> SourceMetrics {
    let mut m = SourceMetrics::new(SourceId::Social, keyword);
    m.mentions_30d = Some(mentions_30d);
    m.mentions_total = Some(mentions_total);
    m
}

/// Collector that plays back a script of outcomes, then repeats the last
/// one. Records every invocation and the expansion terms it saw.
pub struct ScriptedCollector {
    source: SourceId,
    script: Mutex<VecDeque<Result<SourceMetrics, CollectError>>>,
    fallback: Result<SourceMetrics, CollectError>,
    pub calls: AtomicUsize,
    pub seen_terms: Mutex<Vec<Option<Vec<String>>>>,
}

impl ScriptedCollector {
    pub fn new(
        source: SourceId,
        script: Vec<Result<SourceMetrics, CollectError>>,
    ) -> Arc<Self> {
        assert!(!script.is_empty(), "script must have at least one outcome");
        let fallback = script.last().cloned().unwrap();
        Arc::new(Self {
            source,
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            seen_terms: Mutex::new(Vec::new()),
        })
    }

    pub fn ok(source: SourceId, metrics: SourceMetrics) -> Arc<Self> {
        Self::new(source, vec![Ok(metrics)])
    }

    pub fn failing(source: SourceId, error: CollectError) -> Arc<Self> {
        Self::new(source, vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Collector for ScriptedCollector {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn fetch(
        &self,
        _keyword: &str,
        expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_terms
            .lock()
            .unwrap()
            .push(expansion_terms.map(<[String]>::to_vec));
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Collector that never completes; exercises the fan-out envelope timeout.
pub struct HangingCollector {
    source: SourceId,
    pub calls: AtomicUsize,
}

impl HangingCollector {
    pub fn new(source: SourceId) -> Arc<Self> {
        Arc::new(Self {
            source,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Collector for HangingCollector {
    fn source(&self) -> SourceId {
        self.source
    }

    async fn fetch(
        &self,
        _keyword: &str,
        _expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Classifier client stub with per-source outcomes, a synthesis outcome, and
/// an expansion outcome. Counts every call.
pub struct StubLlm {
    per_source: Mutex<BTreeMap<SourceId, Result<PhaseOpinion, LlmError>>>,
    synthesis: Mutex<Result<PhaseOpinion, LlmError>>,
    expansion: Mutex<Result<Vec<String>, LlmError>>,
    pub classify_calls: AtomicUsize,
    pub synthesize_calls: AtomicUsize,
    pub expand_calls: AtomicUsize,
}

impl StubLlm {
    pub fn happy() -> Arc<Self> {
        Arc::new(Self {
            per_source: Mutex::new(BTreeMap::new()),
            synthesis: Mutex::new(Ok(opinion(Phase::Peak, 0.78))),
            expansion: Mutex::new(Ok(vec![
                "term1".to_string(),
                "term2".to_string(),
                "term3".to_string(),
            ])),
            classify_calls: AtomicUsize::new(0),
            synthesize_calls: AtomicUsize::new(0),
            expand_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_source_outcome(&self, source: SourceId, outcome: Result<PhaseOpinion, LlmError>) {
        self.per_source.lock().unwrap().insert(source, outcome);
    }

    pub fn set_synthesis(&self, outcome: Result<PhaseOpinion, LlmError>) {
        *self.synthesis.lock().unwrap() = outcome;
    }

    pub fn set_expansion(&self, outcome: Result<Vec<String>, LlmError>) {
        *self.expansion.lock().unwrap() = outcome;
    }
}

#[async_trait]
impl PhaseClassifier for StubLlm {
    async fn classify_source(
        &self,
        source: SourceId,
        _metrics: &SourceMetrics,
        _keyword: &str,
    ) -> Result<PhaseOpinion, LlmError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        self.per_source
            .lock()
            .unwrap()
            .get(&source)
            .cloned()
            .unwrap_or_else(|| Ok(opinion(Phase::Peak, 0.8)))
    }

    async fn synthesize(
        &self,
        _keyword: &str,
        _opinions: &BTreeMap<SourceId, PhaseOpinion>,
    ) -> Result<PhaseOpinion, LlmError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        self.synthesis.lock().unwrap().clone()
    }

    async fn expand_query(&self, _keyword: &str) -> Result<Vec<String>, LlmError> {
        self.expand_calls.fetch_add(1, Ordering::SeqCst);
        self.expansion.lock().unwrap().clone()
    }
}

/// In-memory cache with switchable read/write failure.
#[derive(Default)]
pub struct MemoryCache {
    pub rows: Mutex<Vec<CachedAnalysis>>,
    pub fail_get: bool,
    pub fail_put: bool,
    pub get_calls: AtomicUsize,
    pub put_calls: AtomicUsize,
}

impl MemoryCache {
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_row(row: CachedAnalysis) -> Arc<Self> {
        let cache = Self::default();
        cache.rows.lock().unwrap().push(row);
        Arc::new(cache)
    }

    pub fn failing_reads() -> Arc<Self> {
        Arc::new(Self {
            fail_get: true,
            ..Self::default()
        })
    }

    pub fn failing_writes() -> Arc<Self> {
        Arc::new(Self {
            fail_put: true,
            ..Self::default()
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisCache for MemoryCache {
    async fn get(&self, keyword: &str) -> Result<Option<CachedAnalysis>, CacheError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get {
            return Err(CacheError::Serde("simulated read failure".into()));
        }
        let now = Utc::now();
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.keyword == keyword && r.expires_at > now)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn put(&self, entry: &CachedAnalysis) -> Result<(), CacheError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_put {
            return Err(CacheError::Serde("simulated write failure".into()));
        }
        self.rows.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

pub fn test_config() -> ClassifierConfig {
    ClassifierConfig {
        collector_timeout: Duration::from_secs(5),
        ..ClassifierConfig::default()
    }
}

pub fn classifier(
    collectors: Vec<Arc<dyn Collector>>,
    llm: Arc<StubLlm>,
    cache: Arc<MemoryCache>,
) -> HypeClassifier {
    HypeClassifier::new(collectors, llm, cache, test_config())
}

pub fn classifier_with_config(
    collectors: Vec<Arc<dyn Collector>>,
    llm: Arc<StubLlm>,
    cache: Arc<MemoryCache>,
    cfg: ClassifierConfig,
) -> HypeClassifier {
    HypeClassifier::new(collectors, llm, cache, cfg)
}

/// Five scripted collectors that all succeed, with a mainstream social
/// signal that never triggers niche detection.
pub fn five_healthy_collectors(keyword: &str) -> Vec<Arc<ScriptedCollector>> {
    vec![
        ScriptedCollector::ok(SourceId::Social, social_metrics(keyword, 245, 900)),
        ScriptedCollector::ok(SourceId::Papers, metrics_for(SourceId::Papers, keyword)),
        ScriptedCollector::ok(SourceId::Patents, metrics_for(SourceId::Patents, keyword)),
        ScriptedCollector::ok(SourceId::News, metrics_for(SourceId::News, keyword)),
        ScriptedCollector::ok(SourceId::Finance, metrics_for(SourceId::Finance, keyword)),
    ]
}

pub fn as_collectors(scripted: &[Arc<ScriptedCollector>]) -> Vec<Arc<dyn Collector>> {
    scripted
        .iter()
        .map(|c| Arc::clone(c) as Arc<dyn Collector>)
        .collect()
}
