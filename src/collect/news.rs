//! News coverage collector: GDELT doc 2.0 API.
//!
//! Article lists over three disjoint windows (30 days, 1-3 months,
//! 3-12 months) plus a tone chart for the recent window. GDELT has no exact
//! hit counts, so window volumes come from capped article lists.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use super::types::{CollectError, Collector, SourceId, SourceMetrics};
use super::{growth_label, http_client};

const API_URL: &str = "https://api.gdeltproject.org/api/v2/doc/doc";
const MAX_RECORDS: u32 = 250;

pub struct NewsCollector {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ArtListResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    domain: Option<String>,
    #[serde(rename = "sourcecountry", default)]
    source_country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ToneChartResponse {
    #[serde(default)]
    tonechart: Vec<ToneBin>,
}

#[derive(Debug, Deserialize)]
struct ToneBin {
    #[serde(default)]
    bin: f64,
    #[serde(default)]
    count: u64,
}

impl NewsCollector {
    pub fn new() -> Self {
        Self {
            http: http_client(),
        }
    }

    async fn fetch_articles(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        errors: &mut Vec<String>,
    ) -> Option<Vec<Article>> {
        let resp = self
            .request(
                query,
                "artlist",
                start,
                end,
                errors,
            )
            .await?;
        match serde_json::from_str::<ArtListResponse>(&resp) {
            Ok(body) => Some(body.articles),
            Err(e) => {
                errors.push(format!("artlist decode error: {e}"));
                None
            }
        }
    }

    async fn fetch_tone(
        &self,
        query: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        errors: &mut Vec<String>,
    ) -> Option<f64> {
        let resp = self.request(query, "tonechart", start, end, errors).await?;
        match serde_json::from_str::<ToneChartResponse>(&resp) {
            Ok(body) => Some(mean_tone(&body.tonechart)),
            Err(e) => {
                errors.push(format!("tonechart decode error: {e}"));
                None
            }
        }
    }

    async fn request(
        &self,
        query: &str,
        mode: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        errors: &mut Vec<String>,
    ) -> Option<String> {
        let max_records = MAX_RECORDS.to_string();
        let start_dt = start.format("%Y%m%d%H%M%S").to_string();
        let end_dt = end.format("%Y%m%d%H%M%S").to_string();
        let result = self
            .http
            .get(API_URL)
            .query(&[
                ("query", query),
                ("mode", mode),
                ("format", "json"),
                ("maxrecords", max_records.as_str()),
                ("startdatetime", start_dt.as_str()),
                ("enddatetime", end_dt.as_str()),
            ])
            .send()
            .await;

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("{mode}: {}", CollectError::from_reqwest(e)));
                return None;
            }
        };
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            errors.push(if status == 429 {
                format!("{mode}: rate limited")
            } else {
                format!("{mode}: HTTP {status}")
            });
            return None;
        }
        match resp.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                errors.push(format!("{mode}: read error: {e}"));
                None
            }
        }
    }
}

impl Default for NewsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for NewsCollector {
    fn source(&self) -> SourceId {
        SourceId::News
    }

    async fn fetch(
        &self,
        keyword: &str,
        expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError> {
        let query = gdelt_query(keyword, expansion_terms);
        let now = Utc::now();
        let t_30d = now - Duration::days(30);
        let t_3m = now - Duration::days(90);
        let t_1y = now - Duration::days(365);

        let mut errors = Vec::new();
        let recent = self
            .fetch_articles(&query, t_30d, now, &mut errors)
            .await;
        let mid = self.fetch_articles(&query, t_3m, t_30d, &mut errors).await;
        let old = self.fetch_articles(&query, t_1y, t_3m, &mut errors).await;
        let avg_tone = self.fetch_tone(&query, t_30d, now, &mut errors).await;

        if recent.is_none() && mid.is_none() && old.is_none() {
            return Err(CollectError::AllRequestsFailed(errors.join("; ")));
        }

        let articles_30d = recent.as_ref().map_or(0, |a| a.len() as u64);
        let articles_mid = mid.as_ref().map_or(0, |a| a.len() as u64);
        let articles_old = old.as_ref().map_or(0, |a| a.len() as u64);
        let articles_total = articles_30d + articles_mid + articles_old;

        let mut domains = std::collections::HashSet::new();
        let mut countries = std::collections::HashSet::new();
        for article in recent
            .iter()
            .chain(mid.iter())
            .chain(old.iter())
            .flatten()
        {
            if let Some(domain) = &article.domain {
                if !domain.is_empty() {
                    domains.insert(domain.clone());
                }
            }
            if let Some(country) = &article.source_country {
                if !country.is_empty() {
                    countries.insert(country.clone());
                }
            }
        }

        let avg_tone = avg_tone.unwrap_or(0.0);
        let attention = match articles_30d {
            0..=49 => "low",
            50..=199 => "moderate",
            _ => "high",
        };
        // The two historical windows span ~11 months.
        let coverage_trend = growth_label(articles_30d, articles_mid + articles_old, 11.0);
        let sentiment_trend = if avg_tone > 0.15 {
            "positive"
        } else if avg_tone < -0.15 {
            "negative"
        } else {
            "neutral"
        };
        let adoption = match domains.len() {
            0..=9 => "niche",
            10..=29 => "growing",
            _ => "mainstream",
        };

        let mut metrics = SourceMetrics::new(SourceId::News, keyword);
        metrics.set("articles_30d", articles_30d);
        metrics.set("articles_3m", articles_30d + articles_mid);
        metrics.set("articles_1y", articles_total);
        metrics.set("articles_total", articles_total);
        metrics.set("unique_domains", domains.len());
        metrics.set("geographic_diversity", countries.len());
        metrics.set("avg_tone", round2(avg_tone));
        metrics.set("media_attention", attention);
        metrics.set("coverage_trend", coverage_trend);
        metrics.set("sentiment_trend", sentiment_trend);
        metrics.set("mainstream_adoption", adoption);
        metrics.errors = errors;

        debug!(keyword, articles_30d, articles_total, "news collection complete");
        Ok(metrics)
    }
}

/// Quoted query; with expansion, a parenthesized OR group (GDELT syntax).
fn gdelt_query(keyword: &str, expansion_terms: Option<&[String]>) -> String {
    match expansion_terms {
        None | Some([]) => format!("\"{keyword}\""),
        Some(terms) => {
            let mut parts = vec![format!("\"{keyword}\"")];
            parts.extend(terms.iter().map(|t| format!("\"{t}\"")));
            format!("({})", parts.join(" OR "))
        }
    }
}

/// Weighted mean of tone bins, normalized from GDELT's roughly [-10, 10]
/// scale into [-1, 1].
fn mean_tone(bins: &[ToneBin]) -> f64 {
    let total: u64 = bins.iter().map(|b| b.count).sum();
    if total == 0 {
        return 0.0;
    }
    let weighted: f64 = bins.iter().map(|b| b.bin * b.count as f64).sum();
    (weighted / total as f64 / 10.0).clamp(-1.0, 1.0)
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_query_is_quoted() {
        assert_eq!(gdelt_query("quantum computing", None), "\"quantum computing\"");
    }

    #[test]
    fn expanded_query_is_a_parenthesized_or_group() {
        let terms = vec!["qubits".to_string()];
        assert_eq!(
            gdelt_query("quantum computing", Some(&terms)),
            r#"("quantum computing" OR "qubits")"#
        );
    }

    #[test]
    fn mean_tone_weights_bins_and_normalizes() {
        let bins = vec![
            ToneBin { bin: -5.0, count: 1 },
            ToneBin { bin: 5.0, count: 3 },
        ];
        // (-5 + 15) / 4 = 2.5 -> 0.25 after normalization.
        assert!((mean_tone(&bins) - 0.25).abs() < 1e-9);
        assert_eq!(mean_tone(&[]), 0.0);
    }
}
