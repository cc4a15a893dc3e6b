//! Collector contract: source identifiers, the structured metrics record,
//! and the tagged failure type every collector returns.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The five independent signal sources.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    Social,
    Papers,
    Patents,
    News,
    Finance,
}

impl SourceId {
    pub const ALL: [SourceId; 5] = [
        SourceId::Social,
        SourceId::Papers,
        SourceId::Patents,
        SourceId::News,
        SourceId::Finance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Social => "social",
            SourceId::Papers => "papers",
            SourceId::Patents => "patents",
            SourceId::News => "news",
            SourceId::Finance => "finance",
        }
    }

    /// Finance reflects real investment positions rather than search
    /// visibility, so query expansion never re-fetches it.
    pub fn is_expandable(&self) -> bool {
        !matches!(self, SourceId::Finance)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One collection attempt's output. Immutable once produced.
///
/// The volume fields the orchestrator's niche detection reads are typed;
/// everything source-specific lives in the `extra` bag so collectors can
/// vary without the orchestrator caring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetrics {
    pub source: SourceId,
    pub keyword: String,
    pub collected_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions_30d: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions_total: Option<u64>,

    /// Source-specific metrics (publication counts, filing velocity, tone,
    /// price changes, trend labels, story samples, ...).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,

    /// Non-fatal problems hit while collecting (a rate-limited window, a
    /// missing field). The result still counts as present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl SourceMetrics {
    pub fn new(source: SourceId, keyword: &str) -> Self {
        Self {
            source,
            keyword: keyword.to_string(),
            collected_at: Utc::now(),
            mentions_30d: None,
            mentions_total: None,
            extra: serde_json::Map::new(),
            errors: Vec::new(),
        }
    }

    /// Insert a source-specific field into the extra bag.
    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.extra.insert(key.to_string(), value.into());
    }
}

/// Catastrophic collection failure. Ordinary partial failures (one window
/// rate-limited, a field missing) are reported inside `SourceMetrics::errors`
/// instead; `Err` means the source produced nothing usable at all.
#[derive(Debug, Clone, Error)]
pub enum CollectError {
    #[error("rate limited")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response shape: {0}")]
    Decode(String),
    #[error("all API requests failed: {0}")]
    AllRequestsFailed(String),
}

impl CollectError {
    /// Classify a transport error the way the rest of the taxonomy expects.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return CollectError::Timeout;
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                return CollectError::RateLimited;
            }
            return CollectError::Status(status.as_u16());
        }
        CollectError::Network(err.to_string())
    }
}

/// Uniform capability every data source implements. Must be safe to invoke
/// twice for the same keyword (fresh vs. expanded) with no shared mutable
/// state between invocations.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    fn source(&self) -> SourceId;

    async fn fetch(
        &self,
        keyword: &str,
        expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finance_is_excluded_from_expansion() {
        for id in SourceId::ALL {
            assert_eq!(id.is_expandable(), id != SourceId::Finance, "{id}");
        }
    }

    #[test]
    fn source_id_is_a_valid_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(SourceId::Social, 1u32);
        map.insert(SourceId::Finance, 2u32);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"social":1,"finance":2}"#);
    }

    #[test]
    fn metrics_skip_unset_volume_fields() {
        let m = SourceMetrics::new(SourceId::Papers, "fusion");
        let v = serde_json::to_value(&m).unwrap();
        assert!(v.get("mentions_30d").is_none());
        assert!(v.get("errors").is_none());
    }
}
