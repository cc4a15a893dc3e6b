//! Strict parsing of LLM replies.
//!
//! The model is told to return a bare JSON object, but real replies arrive
//! wrapped in prose or markdown fences. Decoding is layered: direct decode,
//! then the first parseable fenced block, then a balanced-brace scan.
//! Splitting on ``` is deliberately avoided; it breaks as soon as the reply
//! contains more than one fence.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::classify::types::{Phase, PhaseOpinion};
use crate::llm::LlmError;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("valid fence regex"));

/// Terms too generic to broaden a search with.
const GENERIC_TERMS: &[&str] = &[
    "technology",
    "technologies",
    "system",
    "systems",
    "innovation",
    "innovations",
    "solution",
    "solutions",
    "platform",
    "software",
    "digital",
    "tool",
    "tools",
    "method",
    "methods",
    "science",
    "research",
];

/// Expansion terms more similar than this to the keyword add no reach.
const NEAR_DUPLICATE_SIMILARITY: f64 = 0.85;

const MIN_EXPANSION_TERMS: usize = 3;
const MAX_EXPANSION_TERMS: usize = 5;
const MAX_TERM_LEN: usize = 80;

/// Pull one JSON object out of a model reply.
pub fn extract_object(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();

    // 1) The reply is exactly the object we asked for.
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(v);
    }

    // 2) First fenced block that parses. Non-greedy, so a reply with several
    //    fences is walked block by block instead of spliced end to end.
    for caps in FENCED_BLOCK.captures_iter(trimmed) {
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&caps[1]) {
            return Ok(v);
        }
    }

    // 3) Balanced-brace scan over the raw text: try every candidate object,
    //    first parseable one wins. Handles prose like "Here is my answer: {...}".
    for candidate in balanced_objects(trimmed) {
        if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            return Ok(v);
        }
    }

    Err(LlmError::MalformedResponse(format!(
        "no JSON object found in reply ({} chars)",
        trimmed.chars().count()
    )))
}

/// Yield every top-level `{...}` span in `text`, respecting string literals.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            spans.push(&text[s..=i]);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

/// Decode and validate a phase opinion. Violations are errors, never
/// silently coerced.
pub fn decode_opinion(content: &str) -> Result<PhaseOpinion, LlmError> {
    let obj = extract_object(content)?;

    let phase_str = required_str(&obj, "phase")?;
    let phase: Phase = phase_str
        .parse()
        .map_err(|e: String| LlmError::MalformedResponse(e))?;

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| LlmError::MalformedResponse("missing field: confidence".into()))?;
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
        return Err(LlmError::MalformedResponse(format!(
            "confidence out of range: {confidence}"
        )));
    }

    let reasoning = required_str(&obj, "reasoning")?.to_string();

    Ok(PhaseOpinion {
        phase,
        confidence,
        reasoning,
    })
}

/// Decode and validate expansion terms: non-empty, non-generic, bounded
/// length, minimally distinct from the original keyword, 3-5 of them.
pub fn decode_expansion_terms(content: &str, keyword: &str) -> Result<Vec<String>, LlmError> {
    let obj = extract_object(content)?;
    let raw = obj
        .get("terms")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::MalformedResponse("missing field: terms".into()))?;

    let keyword_lower = keyword.trim().to_lowercase();
    let mut terms: Vec<String> = Vec::new();

    for value in raw {
        let Some(term) = value.as_str() else { continue };
        let term = term.trim();
        if term.is_empty() || term.chars().count() > MAX_TERM_LEN {
            continue;
        }
        let lower = term.to_lowercase();
        if GENERIC_TERMS.contains(&lower.as_str()) {
            continue;
        }
        if strsim::normalized_levenshtein(&lower, &keyword_lower) >= NEAR_DUPLICATE_SIMILARITY {
            continue;
        }
        if terms.iter().any(|t: &String| t.eq_ignore_ascii_case(term)) {
            continue;
        }
        terms.push(term.to_string());
    }

    if terms.len() < MIN_EXPANSION_TERMS {
        return Err(LlmError::MalformedResponse(format!(
            "only {} valid expansion terms after filtering (need {})",
            terms.len(),
            MIN_EXPANSION_TERMS
        )));
    }
    terms.truncate(MAX_EXPANSION_TERMS);
    Ok(terms)
}

fn required_str<'a>(obj: &'a Value, field: &str) -> Result<&'a str, LlmError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::MalformedResponse(format!("missing field: {field}")))
}
