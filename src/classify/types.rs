//! Core data model for hype cycle classification results.
//!
//! Everything here is plain serde data; the orchestrator in `classify::mod`
//! owns the only logic that builds these values.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collect::types::{SourceId, SourceMetrics};

/// The five fixed adoption-curve phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    InnovationTrigger,
    Peak,
    Trough,
    Slope,
    Plateau,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::InnovationTrigger,
        Phase::Peak,
        Phase::Trough,
        Phase::Slope,
        Phase::Plateau,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::InnovationTrigger => "innovation_trigger",
            Phase::Peak => "peak",
            Phase::Trough => "trough",
            Phase::Slope => "slope",
            Phase::Plateau => "plateau",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "innovation_trigger" => Ok(Phase::InnovationTrigger),
            "peak" => Ok(Phase::Peak),
            "trough" => Ok(Phase::Trough),
            "slope" => Ok(Phase::Slope),
            "plateau" => Ok(Phase::Plateau),
            other => Err(format!("unknown phase: {other}")),
        }
    }
}

/// One classifier verdict: a phase, a confidence in `[0, 1]`, and a short
/// free-text justification. Produced once per source plus once by synthesis.
///
/// Construction goes through `llm::parse`, which rejects out-of-range
/// confidence and unknown phases instead of clamping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOpinion {
    pub phase: Phase,
    pub confidence: f64,
    pub reasoning: String,
}

/// Whether query expansion ran for this analysis, and with which terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionState {
    pub applied: bool,
    #[serde(default)]
    pub terms: Vec<String>,
}

impl ExpansionState {
    pub fn applied(terms: Vec<String>) -> Self {
        Self {
            applied: true,
            terms,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// The externally visible classification record, identical in shape for the
/// cache-hit and cache-miss paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub keyword: String,
    pub phase: Phase,
    pub confidence: f64,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
    pub cache_hit: bool,
    pub expires_at: DateTime<Utc>,

    /// Individual verdicts from each source that produced one (0-5 entries).
    pub per_source_analyses: BTreeMap<SourceId, PhaseOpinion>,

    /// Raw collector output for transparency; always 5 keys, `None` marks a
    /// collector that produced nothing.
    pub collector_data: BTreeMap<SourceId, Option<SourceMetrics>>,

    pub collectors_succeeded: usize,
    pub partial_data: bool,
    pub errors: Vec<String>,

    pub query_expansion_applied: bool,
    pub expanded_terms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_round_trips_through_str() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert!("hype".parse::<Phase>().is_err());
    }

    #[test]
    fn phase_serializes_snake_case() {
        let v = serde_json::to_value(Phase::InnovationTrigger).unwrap();
        assert_eq!(v, serde_json::json!("innovation_trigger"));
    }

    #[test]
    fn expansion_state_defaults_to_not_applied() {
        let e = ExpansionState::none();
        assert!(!e.applied);
        assert!(e.terms.is_empty());
    }
}
