//! SQLite-backed analysis cache.
//!
//! One row per classification attempt, append-only: a fresh analysis inserts
//! a new row and readers take the most recent live one. Rows are never
//! updated in place; expiry makes them invisible, not deleted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::classify::types::{ExpansionState, Phase, PhaseOpinion};
use crate::collect::types::{SourceId, SourceMetrics};

/// Everything a classification run persists; enough to reconstruct the
/// cache-hit fast path byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAnalysis {
    pub keyword: String,
    pub phase: Phase,
    pub confidence: f64,
    pub reasoning: String,
    pub collector_data: BTreeMap<SourceId, Option<SourceMetrics>>,
    pub per_source: BTreeMap<SourceId, PhaseOpinion>,
    pub expansion: ExpansionState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("cache lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
}

/// Keyed lookup/write of full classification results with expiry.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Most recent live entry for the keyword; a stale row is absent.
    async fn get(&self, keyword: &str) -> Result<Option<CachedAnalysis>, CacheError>;

    /// Append a new entry. Never updates an existing row.
    async fn put(&self, entry: &CachedAnalysis) -> Result<(), CacheError>;
}

#[derive(Clone)]
pub struct SqliteAnalysisCache {
    conn: Arc<Mutex<Connection>>,
    #[allow(dead_code)]
    path: Option<PathBuf>,
}

const SCHEMA: &str = "\
PRAGMA journal_mode=WAL;
PRAGMA synchronous=NORMAL;
CREATE TABLE IF NOT EXISTS analyses (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  keyword TEXT NOT NULL,
  phase TEXT NOT NULL,
  confidence REAL NOT NULL,
  reasoning TEXT NOT NULL,
  social_data TEXT,
  papers_data TEXT,
  patents_data TEXT,
  news_data TEXT,
  finance_data TEXT,
  per_source_data TEXT,
  expansion_applied INTEGER NOT NULL DEFAULT 0,
  expanded_terms_data TEXT,
  created_at TEXT NOT NULL,
  expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analyses_keyword ON analyses(keyword);
CREATE INDEX IF NOT EXISTS idx_analyses_expires ON analyses(expires_at);";

impl SqliteAnalysisCache {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, CacheError>
    where
        F: FnOnce(&Connection) -> Result<R, CacheError>,
    {
        let guard = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
        f(&guard)
    }
}

#[async_trait]
impl AnalysisCache for SqliteAnalysisCache {
    async fn get(&self, keyword: &str) -> Result<Option<CachedAnalysis>, CacheError> {
        let keyword = keyword.to_string();
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let now = Utc::now().to_rfc3339();
                let row = conn
                    .query_row(
                        "SELECT keyword, phase, confidence, reasoning,
                                social_data, papers_data, patents_data, news_data, finance_data,
                                per_source_data, expansion_applied, expanded_terms_data,
                                created_at, expires_at
                         FROM analyses
                         WHERE keyword = ?1 AND expires_at > ?2
                         ORDER BY created_at DESC, id DESC
                         LIMIT 1",
                        params![keyword, now],
                        decode_row,
                    )
                    .optional()?;
                row.transpose()
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }

    async fn put(&self, entry: &CachedAnalysis) -> Result<(), CacheError> {
        let entry = entry.clone();
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let per_source = to_json(&entry.per_source)?;
                let terms = to_json(&entry.expansion.terms)?;
                conn.execute(
                    "INSERT INTO analyses (
                        keyword, phase, confidence, reasoning,
                        social_data, papers_data, patents_data, news_data, finance_data,
                        per_source_data, expansion_applied, expanded_terms_data,
                        created_at, expires_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        entry.keyword,
                        entry.phase.as_str(),
                        entry.confidence,
                        entry.reasoning,
                        metrics_json(&entry, SourceId::Social)?,
                        metrics_json(&entry, SourceId::Papers)?,
                        metrics_json(&entry, SourceId::Patents)?,
                        metrics_json(&entry, SourceId::News)?,
                        metrics_json(&entry, SourceId::Finance)?,
                        per_source,
                        entry.expansion.applied as i64,
                        terms,
                        entry.created_at.to_rfc3339(),
                        entry.expires_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| CacheError::Join(e.to_string()))?
    }
}

fn metrics_json(entry: &CachedAnalysis, source: SourceId) -> Result<Option<String>, CacheError> {
    match entry.collector_data.get(&source) {
        Some(Some(metrics)) => Ok(Some(to_json(metrics)?)),
        _ => Ok(None),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, CacheError> {
    serde_json::to_string(value).map_err(|e| CacheError::Serde(e.to_string()))
}

fn decode_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<CachedAnalysis, CacheError>> {
    // rusqlite wants its own error type from the mapper; decode failures of
    // the JSON blobs are carried out as the inner Result.
    Ok(decode_row_inner(row))
}

fn decode_row_inner(row: &rusqlite::Row<'_>) -> Result<CachedAnalysis, CacheError> {
    let keyword: String = row.get(0)?;
    let phase_raw: String = row.get(1)?;
    let phase: Phase = phase_raw.parse().map_err(CacheError::Serde)?;
    let confidence: f64 = row.get(2)?;
    let reasoning: String = row.get(3)?;

    let mut collector_data = BTreeMap::new();
    for (idx, source) in SourceId::ALL.iter().enumerate() {
        let blob: Option<String> = row.get(4 + idx)?;
        let metrics = match blob {
            Some(json) => Some(from_json::<SourceMetrics>(&json)?),
            None => None,
        };
        collector_data.insert(*source, metrics);
    }

    let per_source: BTreeMap<SourceId, PhaseOpinion> = match row.get::<_, Option<String>>(9)? {
        Some(json) => from_json(&json)?,
        None => BTreeMap::new(),
    };

    let applied: i64 = row.get(10)?;
    let terms: Vec<String> = match row.get::<_, Option<String>>(11)? {
        Some(json) => from_json(&json)?,
        None => Vec::new(),
    };

    let created_at = parse_ts(&row.get::<_, String>(12)?)?;
    let expires_at = parse_ts(&row.get::<_, String>(13)?)?;

    Ok(CachedAnalysis {
        keyword,
        phase,
        confidence,
        reasoning,
        collector_data,
        per_source,
        expansion: ExpansionState {
            applied: applied != 0,
            terms,
        },
        created_at,
        expires_at,
    })
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, CacheError> {
    serde_json::from_str(json).map_err(|e| CacheError::Serde(e.to_string()))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::Serde(format!("bad timestamp {raw:?}: {e}")))
}
