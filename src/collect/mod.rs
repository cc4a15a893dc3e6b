//! Data collectors: five independent signal sources behind one contract.
//!
//! Each collector owns its HTTP client, tolerates partial failure by
//! recording it in the metrics' error list, and returns `Err` only when the
//! source produced nothing at all.

pub mod finance;
pub mod news;
pub mod papers;
pub mod patents;
pub mod social;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use types::Collector;

/// Per-request budget for collector HTTP calls. The orchestrator's batch
/// envelope is the real bound; this just keeps a single hung request from
/// eating the whole envelope.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("hype-cycle-analyzer/0.1")
        .connect_timeout(Duration::from_secs(4))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("reqwest client")
}

/// The production collector set, one per source.
pub fn default_collectors() -> Vec<Arc<dyn Collector>> {
    vec![
        Arc::new(social::SocialCollector::new()),
        Arc::new(papers::PapersCollector::new()),
        Arc::new(patents::PatentsCollector::new()),
        Arc::new(news::NewsCollector::new()),
        Arc::new(finance::FinanceCollector::new()),
    ]
}

/// Label the share of activity landing in the most recent window.
pub(crate) fn recency_label(recent: u64, mid: u64, old: u64) -> &'static str {
    let total = recent + mid + old;
    if total == 0 {
        return "low";
    }
    let ratio = recent as f64 / total as f64;
    if ratio > 0.5 {
        "high"
    } else if ratio > 0.2 {
        "medium"
    } else {
        "low"
    }
}

/// Compare the recent window against the historical per-window average.
/// `historical_windows` is how many recent-sized windows the older counts
/// span together.
pub(crate) fn growth_label(recent: u64, older_total: u64, historical_windows: f64) -> &'static str {
    if historical_windows <= 0.0 {
        return if recent > 0 { "stable" } else { "unknown" };
    }
    let avg = older_total as f64 / historical_windows;
    let threshold = 0.3;
    let recent = recent as f64;
    if recent > avg * (1.0 + threshold) {
        "increasing"
    } else if recent < avg * (1.0 - threshold) {
        "decreasing"
    } else {
        "stable"
    }
}

/// Compare growth rates across periods: is the recent growth faster than the
/// historical growth?
pub(crate) fn momentum_label(recent_avg: f64, mid_avg: f64, old_avg: f64) -> &'static str {
    if recent_avg == 0.0 && mid_avg == 0.0 {
        return "steady";
    }
    let mid_growth = if old_avg > 0.0 {
        (mid_avg - old_avg) / old_avg
    } else if mid_avg > 0.0 {
        1.0
    } else {
        0.0
    };
    let recent_growth = if mid_avg > 0.0 {
        (recent_avg - mid_avg) / mid_avg
    } else if recent_avg > 0.0 {
        1.0
    } else {
        0.0
    };

    if recent_growth > mid_growth * 1.2 {
        "accelerating"
    } else if recent_growth < mid_growth * 0.8 {
        "decelerating"
    } else {
        "steady"
    }
}

/// Label relative velocity (`(recent - older) / older`) for citation and
/// filing trends.
pub(crate) fn velocity(recent_avg: f64, older_avg: f64) -> f64 {
    if older_avg > 0.0 {
        (recent_avg - older_avg) / older_avg
    } else if recent_avg > 0.0 {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_follows_recent_share() {
        assert_eq!(recency_label(60, 20, 20), "high");
        assert_eq!(recency_label(30, 40, 30), "medium");
        assert_eq!(recency_label(5, 45, 50), "low");
        assert_eq!(recency_label(0, 0, 0), "low");
    }

    #[test]
    fn growth_compares_against_historical_average() {
        // 11 historical windows averaging 10/window; 20 recent is increasing.
        assert_eq!(growth_label(20, 110, 11.0), "increasing");
        assert_eq!(growth_label(10, 110, 11.0), "stable");
        assert_eq!(growth_label(2, 110, 11.0), "decreasing");
        assert_eq!(growth_label(0, 0, 0.0), "unknown");
    }

    #[test]
    fn momentum_compares_growth_rates() {
        assert_eq!(momentum_label(30.0, 10.0, 8.0), "accelerating");
        assert_eq!(momentum_label(10.0, 10.0, 10.0), "steady");
        assert_eq!(momentum_label(2.0, 10.0, 5.0), "decelerating");
        assert_eq!(momentum_label(0.0, 0.0, 5.0), "steady");
    }

    #[test]
    fn velocity_handles_zero_baseline() {
        assert!(velocity(10.0, 0.0) > 0.0);
        assert_eq!(velocity(0.0, 0.0), 0.0);
        assert!((velocity(15.0, 10.0) - 0.5).abs() < 1e-9);
    }
}
