//! SQLite cache behavior: round-trip fidelity through the persisted layout,
//! expiry filtering, and most-recent-wins across historical rows.

mod support;

use std::collections::BTreeMap;

use chrono::{Duration, Utc};

use hype_cycle_analyzer::cache::{AnalysisCache, CachedAnalysis, SqliteAnalysisCache};
use hype_cycle_analyzer::classify::types::{ExpansionState, Phase};
use hype_cycle_analyzer::collect::types::SourceId;

use support::{metrics_for, opinion, social_metrics};

fn full_row(keyword: &str, confidence: f64) -> CachedAnalysis {
    let now = Utc::now();
    let mut collector_data = BTreeMap::new();
    collector_data.insert(SourceId::Social, Some(social_metrics(keyword, 245, 900)));
    collector_data.insert(SourceId::Papers, Some(metrics_for(SourceId::Papers, keyword)));
    collector_data.insert(SourceId::Patents, Some(metrics_for(SourceId::Patents, keyword)));
    collector_data.insert(SourceId::News, None);
    collector_data.insert(SourceId::Finance, None);

    let mut per_source = BTreeMap::new();
    per_source.insert(SourceId::Social, opinion(Phase::Peak, 0.85));
    per_source.insert(SourceId::Papers, opinion(Phase::Slope, 0.7));
    per_source.insert(SourceId::Patents, opinion(Phase::Peak, 0.66));

    CachedAnalysis {
        keyword: keyword.to_string(),
        phase: Phase::Peak,
        confidence,
        reasoning: "strong cross-source growth".into(),
        collector_data,
        per_source,
        expansion: ExpansionState::applied(vec!["term a".into(), "term b".into(), "term c".into()]),
        created_at: now,
        expires_at: now + Duration::hours(24),
    }
}

#[tokio::test]
async fn put_then_get_round_trips_every_field() {
    let cache = SqliteAnalysisCache::open_in_memory().unwrap();
    let row = full_row("plant cell culture", 0.81);

    cache.put(&row).await.unwrap();
    let loaded = cache.get("plant cell culture").await.unwrap().unwrap();

    assert_eq!(loaded, row);
    // The fields the fast path rebuilds the response from, spelled out:
    assert_eq!(loaded.per_source, row.per_source);
    assert_eq!(loaded.phase, Phase::Peak);
    assert!(loaded.expansion.applied);
    assert_eq!(loaded.expansion.terms.len(), 3);
}

#[tokio::test]
async fn unknown_keyword_is_absent() {
    let cache = SqliteAnalysisCache::open_in_memory().unwrap();
    assert!(cache.get("never analyzed").await.unwrap().is_none());
}

#[tokio::test]
async fn expired_row_is_equivalent_to_absent() {
    let cache = SqliteAnalysisCache::open_in_memory().unwrap();
    let mut row = full_row("stale tech", 0.5);
    row.created_at = Utc::now() - Duration::hours(48);
    row.expires_at = Utc::now() - Duration::hours(24);

    cache.put(&row).await.unwrap();
    assert!(cache.get("stale tech").await.unwrap().is_none());
}

#[tokio::test]
async fn most_recent_live_row_wins() {
    let cache = SqliteAnalysisCache::open_in_memory().unwrap();

    let mut older = full_row("blockchain", 0.60);
    older.created_at = Utc::now() - Duration::hours(2);
    older.expires_at = Utc::now() + Duration::hours(22);
    cache.put(&older).await.unwrap();

    let newer = full_row("blockchain", 0.91);
    cache.put(&newer).await.unwrap();

    let loaded = cache.get("blockchain").await.unwrap().unwrap();
    assert_eq!(loaded.confidence, 0.91);
}

#[tokio::test]
async fn rows_are_appended_not_upserted() {
    let cache = SqliteAnalysisCache::open_in_memory().unwrap();
    let row = full_row("fusion energy", 0.7);

    cache.put(&row).await.unwrap();
    cache.put(&row).await.unwrap();

    // Both inserts succeed; the reader just picks one. An upsert scheme
    // would have rejected or overwritten the second row.
    let loaded = cache.get("fusion energy").await.unwrap();
    assert!(loaded.is_some());
}

#[tokio::test]
async fn keywords_do_not_leak_across_entries() {
    let cache = SqliteAnalysisCache::open_in_memory().unwrap();
    cache.put(&full_row("keyword one", 0.6)).await.unwrap();
    cache.put(&full_row("keyword two", 0.9)).await.unwrap();

    let one = cache.get("keyword one").await.unwrap().unwrap();
    let two = cache.get("keyword two").await.unwrap().unwrap();
    assert_eq!(one.confidence, 0.6);
    assert_eq!(two.confidence, 0.9);
}
