//! Academic research collector: Semantic Scholar bulk search.
//!
//! Two disjoint publication windows (last 2 years, the 3 before that) give
//! volume, citation averages, and velocity; author/venue counts from the
//! returned sample approximate research breadth.

use std::collections::HashSet;

use chrono::{Datelike, Utc};
use serde::Deserialize;
use tracing::debug;

use super::types::{CollectError, Collector, SourceId, SourceMetrics};
use super::{http_client, velocity};

const API_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search/bulk";
const FIELDS: &str = "title,year,citationCount,authors,venue";

pub struct PapersCollector {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
struct Paper {
    #[serde(rename = "citationCount", default)]
    citation_count: Option<u64>,
    #[serde(default)]
    authors: Vec<Author>,
    #[serde(default)]
    venue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    name: Option<String>,
}

impl PapersCollector {
    pub fn new() -> Self {
        Self {
            http: http_client(),
        }
    }

    async fn fetch_window(
        &self,
        query: &str,
        year_range: &str,
        errors: &mut Vec<String>,
    ) -> Option<SearchResponse> {
        let result = self
            .http
            .get(API_URL)
            .query(&[("query", query), ("year", year_range), ("fields", FIELDS)])
            .send()
            .await;

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("{year_range}: {}", CollectError::from_reqwest(e)));
                return None;
            }
        };
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            errors.push(if status == 429 {
                format!("{year_range}: rate limited")
            } else {
                format!("{year_range}: HTTP {status}")
            });
            return None;
        }
        match resp.json::<SearchResponse>().await {
            Ok(body) => Some(body),
            Err(e) => {
                errors.push(format!("{year_range}: decode error: {e}"));
                None
            }
        }
    }
}

impl Default for PapersCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for PapersCollector {
    fn source(&self) -> SourceId {
        SourceId::Papers
    }

    async fn fetch(
        &self,
        keyword: &str,
        expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError> {
        let query = or_query(keyword, expansion_terms);
        let year = Utc::now().year();
        let recent_range = format!("{}-", year - 2);
        let older_range = format!("{}-{}", year - 5, year - 2);

        let mut errors = Vec::new();
        let recent = self.fetch_window(&query, &recent_range, &mut errors).await;
        let older = self.fetch_window(&query, &older_range, &mut errors).await;

        if recent.is_none() && older.is_none() {
            return Err(CollectError::AllRequestsFailed(errors.join("; ")));
        }

        let publications_2y = recent.as_ref().map_or(0, |r| r.total);
        let publications_older = older.as_ref().map_or(0, |r| r.total);
        let publications_5y = publications_2y + publications_older;

        let avg_citations_2y = avg_citations(recent.as_ref());
        let avg_citations_5y = avg_citations(older.as_ref());
        let citation_velocity = velocity(avg_citations_2y, avg_citations_5y);

        let mut author_names: HashSet<String> = HashSet::new();
        let mut venues: HashSet<String> = HashSet::new();
        for paper in recent
            .iter()
            .chain(older.iter())
            .flat_map(|r| r.data.iter())
        {
            for author in &paper.authors {
                if let Some(name) = &author.name {
                    author_names.insert(name.clone());
                }
            }
            if let Some(venue) = &paper.venue {
                if !venue.is_empty() {
                    venues.insert(venue.clone());
                }
            }
        }

        let maturity = match publications_5y {
            0..=49 => "emerging",
            50..=499 => "developing",
            _ => "mature",
        };
        let momentum = if citation_velocity > 0.2 {
            "accelerating"
        } else if citation_velocity < -0.2 {
            "declining"
        } else {
            "steady"
        };
        let breadth = match venues.len() {
            0..=4 => "narrow",
            5..=19 => "moderate",
            _ => "broad",
        };

        let mut metrics = SourceMetrics::new(SourceId::Papers, keyword);
        metrics.set("publications_2y", publications_2y);
        metrics.set("publications_5y", publications_5y);
        metrics.set("publications_total", publications_5y);
        metrics.set("avg_citations_2y", round1(avg_citations_2y));
        metrics.set("avg_citations_5y", round1(avg_citations_5y));
        metrics.set("citation_velocity", round2(citation_velocity));
        metrics.set("research_maturity", maturity);
        metrics.set("research_momentum", momentum);
        metrics.set("research_breadth", breadth);
        metrics.set("author_diversity", author_names.len());
        metrics.set("venue_diversity", venues.len());
        metrics.errors = errors;

        debug!(keyword, publications_2y, publications_5y, "papers collection complete");
        Ok(metrics)
    }
}

/// Quoted OR query: `"keyword" OR "term1" OR "term2"`.
fn or_query(keyword: &str, expansion_terms: Option<&[String]>) -> String {
    match expansion_terms {
        None | Some([]) => keyword.to_string(),
        Some(terms) => {
            let mut parts = vec![format!("\"{keyword}\"")];
            parts.extend(terms.iter().map(|t| format!("\"{t}\"")));
            parts.join(" OR ")
        }
    }
}

fn avg_citations(resp: Option<&SearchResponse>) -> f64 {
    let Some(resp) = resp else { return 0.0 };
    if resp.data.is_empty() {
        return 0.0;
    }
    let total: u64 = resp
        .data
        .iter()
        .map(|p| p.citation_count.unwrap_or(0))
        .sum();
    total as f64 / resp.data.len() as f64
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
