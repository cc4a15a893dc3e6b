//! Prompt construction for the two-stage classification protocol.
//!
//! Each prompt pins the model to the five-phase vocabulary and demands a
//! bare JSON object so `llm::parse` can decode it strictly.

use std::collections::BTreeMap;

use crate::classify::types::PhaseOpinion;
use crate::collect::types::{SourceId, SourceMetrics};

pub const PHASE_DEFINITIONS: &str = "\
Hype Cycle Phases:
1. innovation_trigger (Innovation Trigger): new technology concept emerges, limited mentions/publications/patents, early adopters experimenting, low engagement/citations, narrow focus
2. peak (Peak of Inflated Expectations): explosive growth in all metrics, very high social media buzz, rapid increase in publications/patents, mainstream media coverage begins, high sentiment/optimism, accelerating momentum
3. trough (Trough of Disillusionment): declining mentions from peak levels, negative sentiment shift, publication/patent growth slows or reverses, media coverage drops, investor sentiment turns negative, reality check on limitations
4. slope (Slope of Enlightenment): stabilizing metrics after the trough, improving sentiment from lows, steady sustainable growth, maturing research and patents, practical applications emerge, institutional adoption begins
5. plateau (Plateau of Productivity): sustained moderate activity, neutral sentiment (technology normalized), stable publication/patent rates, broad established field, mainstream adoption, mature market";

const ANSWER_SHAPE: &str = r#"Return ONLY a JSON object with no markdown formatting:
{"phase": "one of: innovation_trigger, peak, trough, slope, plateau", "confidence": 0.75, "reasoning": "1-2 sentence explanation"}"#;

fn source_intro(source: SourceId) -> &'static str {
    match source {
        SourceId::Social => "social media signals from Hacker News",
        SourceId::Papers => "academic research signals from Semantic Scholar",
        SourceId::Patents => "patent filing signals from PatentsView",
        SourceId::News => "news media coverage signals from GDELT",
        SourceId::Finance => "financial market signals from Yahoo Finance",
    }
}

fn source_guidance(source: SourceId) -> &'static str {
    match source {
        SourceId::Social => "\
- innovation_trigger: low mentions (<50 total), low engagement, early buzz
- peak: very high mentions (>200 in 30d), high sentiment (>0.5), accelerating momentum
- trough: declining mentions from a previous peak, negative sentiment shift
- slope: stabilizing mentions, improving sentiment, steady growth
- plateau: sustained moderate volume, neutral sentiment (0.0-0.3), stable trend",
        SourceId::Papers => "\
- innovation_trigger: emerging field (<10 papers in 2y), low citations (<5 avg), narrow breadth
- peak: rapid publication growth, accelerating momentum, broad research, many authors
- trough: declining publications, negative citation velocity, narrowing focus
- slope: steady publications, maturing field, moderate citations, improving velocity
- plateau: stable publication rate, high citations, broad established field",
        SourceId::Patents => "\
- innovation_trigger: few patents (<10 in 2y), concentrated assignees (1-3 companies)
- peak: rapid filing growth, many assignees (>20), accelerating momentum
- trough: declining filings from a peak, consolidation, slowing velocity
- slope: steady filings, maturing patents, diverse assignees, moderate citations
- plateau: stable filing rate, established field, high citations",
        SourceId::News => "\
- innovation_trigger: low coverage (<50 articles), niche media, few domains
- peak: very high coverage (>500 articles), mainstream media, positive tone, increasing trend
- trough: declining coverage from a peak, negative tone shift, decreasing trend
- slope: stabilizing coverage, improving tone, steady trend, broadening media
- plateau: sustained moderate coverage, neutral tone, stable trend, mainstream domains",
        SourceId::Finance => "\
- innovation_trigger: few companies (<3), high volatility (>30%)
- peak: many companies (>10), strong positive returns, high volatility, positive sentiment
- trough: declining returns from a peak, negative price changes, very high volatility
- slope: stabilizing returns, improving sentiment, moderate volatility, steady momentum
- plateau: stable moderate returns, neutral sentiment, low volatility (<15%), mature market",
    }
}

/// Prompt for a single source's verdict, embedding that collector's metrics.
pub fn source_prompt(source: SourceId, metrics: &SourceMetrics, keyword: &str) -> String {
    let data = serde_json::to_string_pretty(metrics)
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are analyzing {intro} to determine the hype cycle phase for \"{keyword}\".\n\n\
         Data provided:\n{data}\n\n\
         {defs}\n\n\
         Interpretation guidance:\n{guidance}\n\n\
         Based on these signals, classify the hype cycle phase.\n\n\
         {shape}",
        intro = source_intro(source),
        defs = PHASE_DEFINITIONS,
        guidance = source_guidance(source),
        shape = ANSWER_SHAPE,
    )
}

/// Prompt for the one synthesis call over all per-source verdicts.
pub fn synthesis_prompt(keyword: &str, opinions: &BTreeMap<SourceId, PhaseOpinion>) -> String {
    let mut summaries = String::new();
    for (i, (source, opinion)) in opinions.iter().enumerate() {
        summaries.push_str(&format!(
            "{n}. {label}:\n   Phase: {phase}\n   Confidence: {conf:.2}\n   Reasoning: {reason}\n\n",
            n = i + 1,
            label = source_intro(*source),
            phase = opinion.phase,
            conf = opinion.confidence,
            reason = opinion.reasoning,
        ));
    }

    format!(
        "You are an expert technology analyst synthesizing multiple data sources to determine \
         the definitive hype cycle position for \"{keyword}\".\n\n\
         You have analyzed this technology from {n} independent perspectives:\n\n\
         {summaries}\
         {defs}\n\n\
         Synthesize these perspectives into ONE final classification. Consider:\n\
         - Conflicting signals may indicate transition phases\n\
         - Weight sources by confidence scores\n\
         - Social media trends faster than academic validation\n\
         - Patents and finance lag behind hype but indicate real investment\n\
         - News coverage bridges mainstream adoption\n\n\
         Return ONLY a JSON object with no markdown formatting:\n\
         {{\"phase\": \"one of: innovation_trigger, peak, trough, slope, plateau\", \
         \"confidence\": 0.85, \"reasoning\": \"2-3 sentence explanation synthesizing key \
         evidence from all sources\"}}",
        n = opinions.len(),
        defs = PHASE_DEFINITIONS,
    )
}

/// Prompt asking for related search terms to broaden a niche keyword.
pub fn expansion_prompt(keyword: &str) -> String {
    format!(
        "The technology keyword \"{keyword}\" is niche: it has very little social media \
         coverage, so direct searches return too few results to classify it reliably.\n\n\
         Generate 4-5 closely related search terms that would surface discussion of the same \
         technology area. Requirements:\n\
         - Each term must be specific to this technology (no generic words like \
         \"technology\", \"system\", or \"innovation\")\n\
         - Do not repeat the original keyword\n\
         - Prefer established umbrella fields, well-known sibling techniques, and common \
         alternative names\n\n\
         Return ONLY a JSON object with no markdown formatting:\n\
         {{\"terms\": [\"term1\", \"term2\", \"term3\", \"term4\"]}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn source_prompt_embeds_metrics_and_phases() {
        let mut m = SourceMetrics::new(SourceId::Social, "quantum computing");
        m.mentions_30d = Some(245);
        m.collected_at = Utc::now();
        let p = source_prompt(SourceId::Social, &m, "quantum computing");
        assert!(p.contains("\"mentions_30d\": 245"));
        assert!(p.contains("innovation_trigger"));
        assert!(p.contains("Hacker News"));
    }

    #[test]
    fn synthesis_prompt_lists_every_opinion() {
        let mut opinions = BTreeMap::new();
        opinions.insert(
            SourceId::Social,
            PhaseOpinion {
                phase: crate::classify::types::Phase::Peak,
                confidence: 0.8,
                reasoning: "high buzz".into(),
            },
        );
        opinions.insert(
            SourceId::Papers,
            PhaseOpinion {
                phase: crate::classify::types::Phase::Slope,
                confidence: 0.6,
                reasoning: "steady output".into(),
            },
        );
        let p = synthesis_prompt("quantum computing", &opinions);
        assert!(p.contains("2 independent perspectives"));
        assert!(p.contains("high buzz"));
        assert!(p.contains("steady output"));
    }
}
