//! Niche detection: a pure predicate over the social collector's metrics.
//!
//! Social volume is the canary for "direct search finds too little". The
//! other sources never participate; without social data there is no signal
//! to judge, so detection stays off.

use crate::collect::types::SourceMetrics;

/// Thresholds below which a keyword counts as niche. Configuration
/// constants, not derived at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NicheThresholds {
    pub min_mentions_30d: u64,
    pub min_mentions_total: u64,
}

impl Default for NicheThresholds {
    fn default() -> Self {
        Self {
            min_mentions_30d: 50,
            min_mentions_total: 100,
        }
    }
}

/// True when the social signal is too sparse to trust the initial pass.
pub fn is_niche(social: Option<&SourceMetrics>, thresholds: NicheThresholds) -> bool {
    let Some(metrics) = social else {
        return false;
    };
    metrics.mentions_30d.unwrap_or(0) < thresholds.min_mentions_30d
        || metrics.mentions_total.unwrap_or(0) < thresholds.min_mentions_total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::types::{SourceId, SourceMetrics};

    fn social(mentions_30d: u64, mentions_total: u64) -> SourceMetrics {
        let mut m = SourceMetrics::new(SourceId::Social, "test");
        m.mentions_30d = Some(mentions_30d);
        m.mentions_total = Some(mentions_total);
        m
    }

    #[test]
    fn low_recent_mentions_is_niche() {
        let m = social(30, 150);
        assert!(is_niche(Some(&m), NicheThresholds::default()));
    }

    #[test]
    fn low_total_mentions_is_niche() {
        let m = social(60, 80);
        assert!(is_niche(Some(&m), NicheThresholds::default()));
    }

    #[test]
    fn sufficient_mentions_is_not_niche() {
        let m = social(200, 500);
        assert!(!is_niche(Some(&m), NicheThresholds::default()));
    }

    #[test]
    fn exact_thresholds_are_not_niche() {
        let m = social(50, 100);
        assert!(!is_niche(Some(&m), NicheThresholds::default()));
    }

    #[test]
    fn missing_social_data_never_triggers() {
        assert!(!is_niche(None, NicheThresholds::default()));
    }
}
