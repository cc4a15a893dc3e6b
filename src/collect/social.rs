//! Social media collector: Hacker News via the Algolia search API.
//!
//! Queries three time windows (30 days, 6 months, 1 year) for discussion
//! volume, engagement, and trend labels. This source feeds niche detection,
//! so the typed `mentions_30d` / `mentions_total` fields are always set.

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use super::types::{CollectError, Collector, SourceId, SourceMetrics};
use super::{growth_label, http_client, momentum_label, recency_label};

const API_URL: &str = "https://hn.algolia.com/api/v1/search";
const HITS_PER_PAGE: u32 = 20;

pub struct SocialCollector {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "nbHits", default)]
    nb_hits: u64,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    created_at_i: Option<i64>,
}

impl SocialCollector {
    pub fn new() -> Self {
        Self {
            http: http_client(),
        }
    }

    async fn fetch_window(
        &self,
        query: &str,
        start_ts: i64,
        end_ts: Option<i64>,
        errors: &mut Vec<String>,
    ) -> Option<SearchResponse> {
        let numeric_filter = match end_ts {
            None => format!("created_at_i>{start_ts}"),
            Some(end) => format!("created_at_i>{start_ts},created_at_i<{end}"),
        };
        let page_size = HITS_PER_PAGE.to_string();
        let result = self
            .http
            .get(API_URL)
            .query(&[
                ("query", query),
                ("tags", "story"),
                ("numericFilters", numeric_filter.as_str()),
                ("hitsPerPage", page_size.as_str()),
            ])
            .send()
            .await;

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("{query}: {}", CollectError::from_reqwest(e)));
                return None;
            }
        };
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            errors.push(if status == 429 {
                format!("{query}: rate limited")
            } else {
                format!("{query}: HTTP {status}")
            });
            return None;
        }
        match resp.json::<SearchResponse>().await {
            Ok(body) => Some(body),
            Err(e) => {
                errors.push(format!("{query}: decode error: {e}"));
                None
            }
        }
    }
}

impl Default for SocialCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for SocialCollector {
    fn source(&self) -> SourceId {
        SourceId::Social
    }

    async fn fetch(
        &self,
        keyword: &str,
        expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError> {
        let now = Utc::now();
        let t_30d = (now - Duration::days(30)).timestamp();
        let t_6m = (now - Duration::days(180)).timestamp();
        let t_1y = (now - Duration::days(365)).timestamp();

        // Expansion broadens the search: one query per term, counts summed,
        // hit samples pooled.
        let mut queries = vec![keyword.to_string()];
        if let Some(terms) = expansion_terms {
            queries.extend(terms.iter().cloned());
        }

        let mut errors = Vec::new();
        let mut any_success = false;
        let (mut mentions_30d, mut mentions_6m, mut mentions_1y) = (0u64, 0u64, 0u64);
        let mut hits_30d: Vec<Hit> = Vec::new();
        let mut hits_6m: Vec<Hit> = Vec::new();

        for query in &queries {
            let recent = self.fetch_window(query, t_30d, None, &mut errors).await;
            let mid = self
                .fetch_window(query, t_6m, Some(t_30d), &mut errors)
                .await;
            let old = self.fetch_window(query, t_1y, Some(t_6m), &mut errors).await;

            any_success |= recent.is_some() || mid.is_some() || old.is_some();
            if let Some(r) = recent {
                mentions_30d += r.nb_hits;
                hits_30d.extend(r.hits);
            }
            if let Some(m) = mid {
                mentions_6m += m.nb_hits;
                hits_6m.extend(m.hits);
            }
            if let Some(o) = old {
                mentions_1y += o.nb_hits;
            }
        }

        if !any_success {
            return Err(CollectError::AllRequestsFailed(errors.join("; ")));
        }

        let (avg_points_30d, avg_comments_30d) = engagement(&hits_30d);
        let (avg_points_6m, avg_comments_6m) = engagement(&hits_6m);

        // 50 points is the neutral baseline; tanh keeps the score in [-1, 1].
        let sentiment = ((avg_points_30d - 50.0) / 100.0).tanh();

        let top_stories: Vec<serde_json::Value> = hits_30d
            .iter()
            .take(5)
            .map(|h| {
                let age_days = h
                    .created_at_i
                    .map(|ts| (now.timestamp() - ts).max(0) / 86_400)
                    .unwrap_or(0);
                serde_json::json!({
                    "title": h.title.clone().unwrap_or_default(),
                    "points": h.points.unwrap_or(0),
                    "comments": h.num_comments.unwrap_or(0),
                    "age_days": age_days,
                })
            })
            .collect();

        let mut metrics = SourceMetrics::new(SourceId::Social, keyword);
        metrics.mentions_30d = Some(mentions_30d);
        metrics.mentions_total = Some(mentions_30d + mentions_6m + mentions_1y);
        metrics.set("mentions_6m", mentions_6m);
        metrics.set("mentions_1y", mentions_1y);
        metrics.set("avg_points_30d", round2(avg_points_30d));
        metrics.set("avg_comments_30d", round2(avg_comments_30d));
        metrics.set("avg_points_6m", round2(avg_points_6m));
        metrics.set("avg_comments_6m", round2(avg_comments_6m));
        metrics.set("sentiment", round3(sentiment));
        metrics.set(
            "recency",
            recency_label(mentions_30d, mentions_6m, mentions_1y),
        );
        // The 6m and 1y windows together span ~11 months of history.
        metrics.set(
            "growth_trend",
            growth_label(mentions_30d, mentions_6m + mentions_1y, 11.0),
        );
        metrics.set(
            "momentum",
            momentum_label(
                mentions_30d as f64,
                mentions_6m as f64 / 5.0,
                mentions_1y as f64 / 6.0,
            ),
        );
        metrics.set("top_stories", serde_json::Value::Array(top_stories));
        metrics.errors = errors;

        debug!(
            keyword,
            mentions_30d,
            total = metrics.mentions_total.unwrap_or(0),
            "social collection complete"
        );
        Ok(metrics)
    }
}

fn engagement(hits: &[Hit]) -> (f64, f64) {
    if hits.is_empty() {
        return (0.0, 0.0);
    }
    let points: i64 = hits.iter().map(|h| h.points.unwrap_or(0)).sum();
    let comments: i64 = hits.iter().map(|h| h.num_comments.unwrap_or(0)).sum();
    let n = hits.len() as f64;
    (points as f64 / n, comments as f64 / n)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
