//! Patent filing collector: PatentsView search API.
//!
//! Three disjoint filing windows (0-2y, 2-5y, 5-10y) give volume and
//! velocity; assignee organizations and countries from the sample give
//! concentration and geographic reach.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use super::types::{CollectError, Collector, SourceId, SourceMetrics};
use super::{http_client, velocity};

const API_URL: &str = "https://search.patentsview.org/api/v1/patent/";

pub struct PatentsCollector {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_hits: u64,
    #[serde(default)]
    patents: Vec<Patent>,
}

#[derive(Debug, Deserialize)]
struct Patent {
    #[serde(default)]
    assignees: Vec<Assignee>,
    #[serde(rename = "patent_num_times_cited_by_us_patents", default)]
    cited_by: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Assignee {
    #[serde(rename = "assignee_organization", default)]
    organization: Option<String>,
    #[serde(rename = "assignee_country", default)]
    country: Option<String>,
}

impl PatentsCollector {
    pub fn new() -> Self {
        Self {
            http: http_client(),
        }
    }

    async fn fetch_window(
        &self,
        title_query: &serde_json::Value,
        from: &str,
        until: &str,
        errors: &mut Vec<String>,
    ) -> Option<SearchResponse> {
        let q = serde_json::json!({
            "_and": [
                title_query,
                { "_gte": { "patent_date": from } },
                { "_lt": { "patent_date": until } },
            ]
        });
        let f = serde_json::json!([
            "patent_id",
            "patent_date",
            "assignees.assignee_organization",
            "assignees.assignee_country",
            "patent_num_times_cited_by_us_patents",
        ]);
        let o = serde_json::json!({ "size": 100 });

        let result = self
            .http
            .get(API_URL)
            .query(&[
                ("q", q.to_string()),
                ("f", f.to_string()),
                ("o", o.to_string()),
            ])
            .send()
            .await;

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("{from}..{until}: {}", CollectError::from_reqwest(e)));
                return None;
            }
        };
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            errors.push(if status == 429 {
                format!("{from}..{until}: rate limited")
            } else {
                format!("{from}..{until}: HTTP {status}")
            });
            return None;
        }
        match resp.json::<SearchResponse>().await {
            Ok(body) => Some(body),
            Err(e) => {
                errors.push(format!("{from}..{until}: decode error: {e}"));
                None
            }
        }
    }
}

impl Default for PatentsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for PatentsCollector {
    fn source(&self) -> SourceId {
        SourceId::Patents
    }

    async fn fetch(
        &self,
        keyword: &str,
        expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError> {
        let title_query = title_query(keyword, expansion_terms);
        let now = Utc::now().date_naive();
        let d = |days: i64| (now - Duration::days(days)).format("%Y-%m-%d").to_string();
        let today = now.format("%Y-%m-%d").to_string();
        let (d_2y, d_5y, d_10y) = (d(365 * 2), d(365 * 5), d(365 * 10));

        let mut errors = Vec::new();
        let recent = self
            .fetch_window(&title_query, &d_2y, &today, &mut errors)
            .await;
        let mid = self
            .fetch_window(&title_query, &d_5y, &d_2y, &mut errors)
            .await;
        let old = self
            .fetch_window(&title_query, &d_10y, &d_5y, &mut errors)
            .await;

        if recent.is_none() && mid.is_none() && old.is_none() {
            return Err(CollectError::AllRequestsFailed(errors.join("; ")));
        }

        let patents_2y = recent.as_ref().map_or(0, |r| r.total_hits);
        let patents_mid = mid.as_ref().map_or(0, |r| r.total_hits);
        let patents_old = old.as_ref().map_or(0, |r| r.total_hits);
        let patents_5y = patents_2y + patents_mid;
        let patents_10y = patents_5y + patents_old;

        // Filing velocity compares yearly filing rates across windows.
        let filing_velocity = velocity(patents_2y as f64 / 2.0, patents_mid as f64 / 3.0);

        let avg_citations_2y = avg_citations(recent.as_ref());
        let avg_citations_5y = avg_citations(mid.as_ref());

        let mut organizations: HashSet<String> = HashSet::new();
        let mut countries: HashSet<String> = HashSet::new();
        for patent in recent
            .iter()
            .chain(mid.iter())
            .chain(old.iter())
            .flat_map(|r| r.patents.iter())
        {
            for assignee in &patent.assignees {
                if let Some(org) = &assignee.organization {
                    if !org.is_empty() {
                        organizations.insert(org.clone());
                    }
                }
                if let Some(country) = &assignee.country {
                    if !country.is_empty() {
                        countries.insert(country.clone());
                    }
                }
            }
        }

        let concentration = match organizations.len() {
            0..=3 => "concentrated",
            4..=20 => "moderate",
            _ => "diverse",
        };
        let reach = match countries.len() {
            0..=1 => "domestic",
            2..=5 => "regional",
            _ => "global",
        };
        let maturity = match patents_10y {
            0..=9 => "emerging",
            10..=199 => "developing",
            _ => "mature",
        };
        let momentum = if filing_velocity > 0.2 {
            "accelerating"
        } else if filing_velocity < -0.2 {
            "declining"
        } else {
            "steady"
        };

        let mut metrics = SourceMetrics::new(SourceId::Patents, keyword);
        metrics.set("patents_2y", patents_2y);
        metrics.set("patents_5y", patents_5y);
        metrics.set("patents_10y", patents_10y);
        metrics.set("patents_total", patents_10y);
        metrics.set("avg_citations_2y", round1(avg_citations_2y));
        metrics.set("avg_citations_5y", round1(avg_citations_5y));
        metrics.set("filing_velocity", round2(filing_velocity));
        metrics.set("unique_assignees", organizations.len());
        metrics.set("assignee_concentration", concentration);
        metrics.set("geographic_diversity", countries.len());
        metrics.set("geographic_reach", reach);
        metrics.set("patent_maturity", maturity);
        metrics.set("patent_momentum", momentum);
        metrics.errors = errors;

        debug!(keyword, patents_2y, patents_10y, "patents collection complete");
        Ok(metrics)
    }
}

/// Match the keyword as a title phrase; with expansion, any of the phrases.
fn title_query(keyword: &str, expansion_terms: Option<&[String]>) -> serde_json::Value {
    match expansion_terms {
        None | Some([]) => serde_json::json!({ "_text_phrase": { "patent_title": keyword } }),
        Some(terms) => {
            let mut clauses =
                vec![serde_json::json!({ "_text_phrase": { "patent_title": keyword } })];
            clauses.extend(
                terms
                    .iter()
                    .map(|t| serde_json::json!({ "_text_phrase": { "patent_title": t } })),
            );
            serde_json::json!({ "_or": clauses })
        }
    }
}

fn avg_citations(resp: Option<&SearchResponse>) -> f64 {
    let Some(resp) = resp else { return 0.0 };
    if resp.patents.is_empty() {
        return 0.0;
    }
    let total: u64 = resp.patents.iter().map(|p| p.cited_by.unwrap_or(0)).sum();
    total as f64 / resp.patents.len() as f64
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_title_query_is_a_phrase_match() {
        let q = title_query("solid state battery", None);
        assert_eq!(
            q,
            serde_json::json!({ "_text_phrase": { "patent_title": "solid state battery" } })
        );
    }

    #[test]
    fn expanded_title_query_ors_every_phrase() {
        let terms = vec!["lithium ceramic".to_string()];
        let q = title_query("solid state battery", Some(&terms));
        let clauses = q.get("_or").and_then(|v| v.as_array()).unwrap();
        assert_eq!(clauses.len(), 2);
    }
}
