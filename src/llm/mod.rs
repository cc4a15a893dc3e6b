//! Classifier client: the three LLM operations behind one trait.
//!
//! The production implementation talks to the DeepSeek chat-completions API.
//! All calls share a fixed low temperature, a per-request timeout, and the
//! same error taxonomy; replies go through `parse` for strict decoding.

pub mod parse;
pub mod prompts;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::classify::types::PhaseOpinion;
use crate::collect::types::{SourceId, SourceMetrics};

/// Failure classes for classifier calls.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("rate limited by provider")]
    RateLimited,
    #[error("authentication rejected by provider")]
    Unauthenticated,
    #[error("request timed out")]
    TimedOut,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("provider returned HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Uniform contract for the three LLM operations the orchestrator drives.
#[async_trait::async_trait]
pub trait PhaseClassifier: Send + Sync {
    /// One verdict from a single source's metrics, in isolation.
    async fn classify_source(
        &self,
        source: SourceId,
        metrics: &SourceMetrics,
        keyword: &str,
    ) -> Result<PhaseOpinion, LlmError>;

    /// The single synthesis call over all per-source verdicts.
    async fn synthesize(
        &self,
        keyword: &str,
        opinions: &BTreeMap<SourceId, PhaseOpinion>,
    ) -> Result<PhaseOpinion, LlmError>;

    /// 3-5 validated related terms for broadening a niche keyword.
    async fn expand_query(&self, keyword: &str) -> Result<Vec<String>, LlmError>;
}

/// Connection settings for the DeepSeek client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// DeepSeek chat-completions client.
#[derive(Debug)]
pub struct DeepSeekClient {
    http: reqwest::Client,
    cfg: LlmConfig,
}

/// Low temperature keeps classifications reproducible across runs.
const TEMPERATURE: f32 = 0.3;

impl DeepSeekClient {
    pub fn new(cfg: LlmConfig) -> Result<Self, LlmError> {
        if cfg.api_key.is_empty() {
            return Err(LlmError::Unauthenticated);
        }
        let http = reqwest::Client::builder()
            .user_agent("hype-cycle-analyzer/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self { http, cfg })
    }

    async fn chat(&self, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.cfg.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: TEMPERATURE,
        };

        let url = format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.cfg.api_key)
            .json(&req)
            .send()
            .await
            .map_err(classify_transport)?;

        match resp.status().as_u16() {
            200 => {}
            401 | 403 => return Err(LlmError::Unauthenticated),
            429 => return Err(LlmError::RateLimited),
            status => return Err(LlmError::Status(status)),
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::MalformedResponse("empty choices array".into()))?;
        debug!(chars = content.len(), "LLM reply received");
        Ok(content)
    }
}

fn classify_transport(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::TimedOut
    } else {
        LlmError::Transport(err.to_string())
    }
}

#[async_trait::async_trait]
impl PhaseClassifier for DeepSeekClient {
    async fn classify_source(
        &self,
        source: SourceId,
        metrics: &SourceMetrics,
        keyword: &str,
    ) -> Result<PhaseOpinion, LlmError> {
        let prompt = prompts::source_prompt(source, metrics, keyword);
        let reply = self.chat(&prompt).await?;
        parse::decode_opinion(&reply)
    }

    async fn synthesize(
        &self,
        keyword: &str,
        opinions: &BTreeMap<SourceId, PhaseOpinion>,
    ) -> Result<PhaseOpinion, LlmError> {
        let prompt = prompts::synthesis_prompt(keyword, opinions);
        let reply = self.chat(&prompt).await?;
        parse::decode_opinion(&reply)
    }

    async fn expand_query(&self, keyword: &str) -> Result<Vec<String>, LlmError> {
        let prompt = prompts::expansion_prompt(keyword);
        let reply = self.chat(&prompt).await?;
        parse::decode_expansion_terms(&reply, keyword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_an_api_key() {
        let err = DeepSeekClient::new(LlmConfig::default()).unwrap_err();
        assert!(matches!(err, LlmError::Unauthenticated));
    }
}
