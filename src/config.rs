//! Environment-driven settings.
//!
//! Read once at startup and handed to components as explicit values; nothing
//! reads configuration ambiently after boot.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::classify::ClassifierConfig;
use crate::llm::LlmConfig;

#[derive(Debug, Clone)]
pub struct Settings {
    pub deepseek_api_key: String,
    pub database_path: PathBuf,
    pub cache_ttl_hours: i64,
    pub collector_timeout_secs: u64,
    pub host: String,
    pub port: u16,
}

impl Settings {
    /// Load from the process environment (`.env` is loaded by the caller).
    pub fn from_env() -> anyhow::Result<Self> {
        let deepseek_api_key =
            std::env::var("DEEPSEEK_API_KEY").context("Missing DEEPSEEK_API_KEY env var")?;

        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/hype_cycle.db"));

        let cache_ttl_hours = parse_var("CACHE_TTL_HOURS", 24)?;
        let collector_timeout_secs = parse_var("COLLECTOR_TIMEOUT_SECS", 120)?;
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("PORT", 8000)?;

        Ok(Self {
            deepseek_api_key,
            database_path,
            cache_ttl_hours,
            collector_timeout_secs,
            host,
            port,
        })
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig {
            collector_timeout: Duration::from_secs(self.collector_timeout_secs),
            cache_ttl: chrono::Duration::hours(self.cache_ttl_hours),
            ..ClassifierConfig::default()
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            api_key: self.deepseek_api_key.clone(),
            ..LlmConfig::default()
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {name}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}
