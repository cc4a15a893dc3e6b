//! Financial market collector: Yahoo Finance symbol search + chart history.
//!
//! Maps the keyword to up to five listed companies, then derives price
//! change, volatility, and volume trends from two years of monthly bars.
//! Never re-fetched during query expansion: holdings do not broaden the way
//! search terms do.

use serde::Deserialize;
use tracing::debug;

use super::types::{CollectError, Collector, SourceId, SourceMetrics};
use super::http_client;

const SEARCH_URL: &str = "https://query1.finance.yahoo.com/v1/finance/search";
const CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const MAX_TICKERS: usize = 5;

pub struct FinanceCollector {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    quotes: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(rename = "quoteType", default)]
    quote_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Vec<ChartResult>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteBars>,
}

#[derive(Debug, Deserialize)]
struct QuoteBars {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

/// Per-ticker figures derived from monthly bars.
#[derive(Debug, Clone, Copy)]
struct TickerStats {
    change_1m: f64,
    change_6m: f64,
    change_2y: f64,
    volatility_1m: f64,
    volatility_6m: f64,
    volume_ratio: f64,
}

impl FinanceCollector {
    pub fn new() -> Self {
        Self {
            http: http_client(),
        }
    }

    async fn search_tickers(
        &self,
        keyword: &str,
        errors: &mut Vec<String>,
    ) -> Result<Vec<String>, CollectError> {
        let result = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("q", keyword),
                ("quotesCount", "10"),
                ("newsCount", "0"),
            ])
            .send()
            .await;

        let resp = match result {
            Ok(r) => r,
            Err(e) => return Err(CollectError::from_reqwest(e)),
        };
        match resp.status().as_u16() {
            200 => {}
            429 => return Err(CollectError::RateLimited),
            status => return Err(CollectError::Status(status)),
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| CollectError::Decode(e.to_string()))?;

        let tickers: Vec<String> = body
            .quotes
            .into_iter()
            .filter(|q| q.quote_type.as_deref() == Some("EQUITY"))
            .filter_map(|q| q.symbol)
            .take(MAX_TICKERS)
            .collect();
        if tickers.is_empty() {
            errors.push("no listed companies matched the keyword".to_string());
        }
        Ok(tickers)
    }

    async fn fetch_stats(&self, ticker: &str, errors: &mut Vec<String>) -> Option<TickerStats> {
        let url = format!("{CHART_URL}/{ticker}");
        let result = self
            .http
            .get(&url)
            .query(&[("range", "2y"), ("interval", "1mo")])
            .send()
            .await;

        let resp = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(format!("{ticker}: {}", CollectError::from_reqwest(e)));
                return None;
            }
        };
        if !resp.status().is_success() {
            errors.push(format!("{ticker}: HTTP {}", resp.status().as_u16()));
            return None;
        }
        let body: ChartResponse = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                errors.push(format!("{ticker}: decode error: {e}"));
                return None;
            }
        };
        let bars = body
            .chart
            .result
            .into_iter()
            .next()
            .and_then(|r| r.indicators.quote.into_iter().next());
        let Some(bars) = bars else {
            errors.push(format!("{ticker}: empty chart"));
            return None;
        };

        let closes: Vec<f64> = bars.close.iter().filter_map(|c| *c).collect();
        let volumes: Vec<u64> = bars.volume.iter().filter_map(|v| *v).collect();
        match ticker_stats(&closes, &volumes) {
            Some(stats) => Some(stats),
            None => {
                errors.push(format!("{ticker}: not enough price history"));
                None
            }
        }
    }
}

impl Default for FinanceCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Collector for FinanceCollector {
    fn source(&self) -> SourceId {
        SourceId::Finance
    }

    async fn fetch(
        &self,
        keyword: &str,
        _expansion_terms: Option<&[String]>,
    ) -> Result<SourceMetrics, CollectError> {
        let mut errors = Vec::new();
        let tickers = self.search_tickers(keyword, &mut errors).await?;

        let mut stats: Vec<TickerStats> = Vec::new();
        for ticker in &tickers {
            if let Some(s) = self.fetch_stats(ticker, &mut errors).await {
                stats.push(s);
            }
        }

        let companies_found = stats.len();
        let avg = |f: fn(&TickerStats) -> f64| -> f64 {
            if stats.is_empty() {
                0.0
            } else {
                stats.iter().map(f).sum::<f64>() / stats.len() as f64
            }
        };

        let change_1m = avg(|s| s.change_1m);
        let change_6m = avg(|s| s.change_6m);
        let change_2y = avg(|s| s.change_2y);
        let volatility_1m = avg(|s| s.volatility_1m);
        let volatility_6m = avg(|s| s.volatility_6m);
        let volume_ratio = avg(|s| s.volume_ratio);

        let volume_trend = if companies_found == 0 {
            "unknown"
        } else if volume_ratio > 1.2 {
            "increasing"
        } else if volume_ratio < 0.8 {
            "decreasing"
        } else {
            "stable"
        };
        let maturity = if companies_found == 0 {
            "unknown"
        } else if volatility_6m > 30.0 {
            "speculative"
        } else if volatility_6m > 15.0 {
            "developing"
        } else {
            "mature"
        };
        let sentiment = if companies_found == 0 {
            "unknown"
        } else if change_6m > 10.0 {
            "positive"
        } else if change_6m < -10.0 {
            "negative"
        } else {
            "neutral"
        };
        let momentum = if companies_found == 0 {
            "unknown"
        } else if change_1m > change_6m / 6.0 + 2.0 {
            "accelerating"
        } else if change_1m < change_6m / 6.0 - 2.0 {
            "decelerating"
        } else {
            "steady"
        };

        let mut metrics = SourceMetrics::new(SourceId::Finance, keyword);
        metrics.set("companies_found", companies_found);
        metrics.set("tickers", serde_json::json!(tickers));
        metrics.set("avg_price_change_1m", round1(change_1m));
        metrics.set("avg_price_change_6m", round1(change_6m));
        metrics.set("avg_price_change_2y", round1(change_2y));
        metrics.set("avg_volatility_1m", round1(volatility_1m));
        metrics.set("avg_volatility_6m", round1(volatility_6m));
        metrics.set("volume_trend", volume_trend);
        metrics.set("market_maturity", maturity);
        metrics.set("investor_sentiment", sentiment);
        metrics.set("investment_momentum", momentum);
        metrics.errors = errors;

        debug!(keyword, companies_found, "finance collection complete");
        Ok(metrics)
    }
}

/// Percentage changes and return volatility from monthly closing prices.
fn ticker_stats(closes: &[f64], volumes: &[u64]) -> Option<TickerStats> {
    if closes.len() < 2 {
        return None;
    }
    let last = *closes.last()?;
    let pct = |from: f64| -> f64 {
        if from > 0.0 {
            (last - from) / from * 100.0
        } else {
            0.0
        }
    };
    let back = |months: usize| -> f64 {
        let idx = closes.len().saturating_sub(months + 1);
        closes[idx]
    };

    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();
    let recent_returns = &returns[returns.len().saturating_sub(6)..];

    let volume_ratio = if volumes.len() >= 6 {
        let recent: u64 = volumes[volumes.len() - 3..].iter().sum();
        let older: u64 = volumes[volumes.len() - 6..volumes.len() - 3].iter().sum();
        if older > 0 {
            recent as f64 / older as f64
        } else {
            1.0
        }
    } else {
        1.0
    };

    Some(TickerStats {
        change_1m: pct(back(1)),
        change_6m: pct(back(6)),
        change_2y: pct(closes[0]),
        volatility_1m: returns.last().copied().unwrap_or(0.0).abs(),
        volatility_6m: stddev(recent_returns),
        volume_ratio,
    })
}

fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_need_at_least_two_closes() {
        assert!(ticker_stats(&[100.0], &[]).is_none());
        assert!(ticker_stats(&[], &[]).is_none());
    }

    #[test]
    fn price_changes_are_percentages() {
        let closes: Vec<f64> = (0..24).map(|i| 100.0 + i as f64).collect();
        let stats = ticker_stats(&closes, &[]).unwrap();
        // 100 -> 123 over the full range.
        assert!((stats.change_2y - 23.0).abs() < 1e-9);
        assert!(stats.change_1m > 0.0);
        assert!(stats.change_6m > stats.change_1m);
    }

    #[test]
    fn flat_prices_have_zero_volatility() {
        let closes = vec![50.0; 24];
        let stats = ticker_stats(&closes, &[]).unwrap();
        assert_eq!(stats.volatility_6m, 0.0);
        assert_eq!(stats.change_2y, 0.0);
    }
}
