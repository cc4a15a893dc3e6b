//! Response assembly: one pure function both the cache-hit and cache-miss
//! paths go through, so the two produce identical shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::classify::types::{ClassificationResult, ExpansionState, PhaseOpinion};
use crate::collect::types::{SourceId, SourceMetrics};

pub struct AssembleInput {
    pub keyword: String,
    pub final_opinion: PhaseOpinion,
    pub per_source: BTreeMap<SourceId, PhaseOpinion>,
    pub collector_data: BTreeMap<SourceId, Option<SourceMetrics>>,
    pub expansion: ExpansionState,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub cache_hit: bool,
}

/// Build the externally visible record. No I/O, no branching on anything
/// but the inputs.
pub fn assemble(input: AssembleInput) -> ClassificationResult {
    let mut collector_data = input.collector_data;
    // Every source always appears, absent ones as explicit nulls.
    for source in SourceId::ALL {
        collector_data.entry(source).or_insert(None);
    }
    let collectors_succeeded = collector_data.values().filter(|v| v.is_some()).count();

    ClassificationResult {
        keyword: input.keyword,
        phase: input.final_opinion.phase,
        confidence: input.final_opinion.confidence,
        reasoning: input.final_opinion.reasoning,
        timestamp: input.created_at,
        cache_hit: input.cache_hit,
        expires_at: input.expires_at,
        per_source_analyses: input.per_source,
        collector_data,
        collectors_succeeded,
        partial_data: collectors_succeeded < SourceId::ALL.len(),
        errors: input.errors,
        query_expansion_applied: input.expansion.applied,
        expanded_terms: input.expansion.terms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::types::Phase;

    fn opinion(phase: Phase) -> PhaseOpinion {
        PhaseOpinion {
            phase,
            confidence: 0.8,
            reasoning: "r".into(),
        }
    }

    #[test]
    fn all_five_sources_present_in_output() {
        let mut data = BTreeMap::new();
        data.insert(
            SourceId::Social,
            Some(SourceMetrics::new(SourceId::Social, "k")),
        );
        let now = Utc::now();
        let result = assemble(AssembleInput {
            keyword: "k".into(),
            final_opinion: opinion(Phase::Peak),
            per_source: BTreeMap::new(),
            collector_data: data,
            expansion: ExpansionState::none(),
            errors: vec![],
            created_at: now,
            expires_at: now,
            cache_hit: false,
        });
        assert_eq!(result.collector_data.len(), 5);
        assert_eq!(result.collectors_succeeded, 1);
        assert!(result.partial_data);
    }

    #[test]
    fn full_coverage_is_not_partial() {
        let mut data = BTreeMap::new();
        for source in SourceId::ALL {
            data.insert(source, Some(SourceMetrics::new(source, "k")));
        }
        let now = Utc::now();
        let result = assemble(AssembleInput {
            keyword: "k".into(),
            final_opinion: opinion(Phase::Plateau),
            per_source: BTreeMap::new(),
            collector_data: data,
            expansion: ExpansionState::applied(vec!["a".into()]),
            errors: vec![],
            created_at: now,
            expires_at: now,
            cache_hit: true,
        });
        assert_eq!(result.collectors_succeeded, 5);
        assert!(!result.partial_data);
        assert!(result.cache_hit);
        assert!(result.query_expansion_applied);
    }
}
