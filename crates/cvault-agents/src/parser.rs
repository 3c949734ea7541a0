use std::str::FromStr;

use cvault_models::{ParsedOpinion, Signal};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use crate::error::AgentError;

/// Stand-in for replies that omit their reasoning.
pub const DEFAULT_REASONING: &str = "No reasoning provided";

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles common model reply formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    // Try parsing the whole thing as JSON first
    if trimmed.starts_with('{') && serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    // Try extracting from markdown code block
    if let Some(json_str) = extract_from_markdown_block(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    // Try finding the first { ... } pair using brace matching
    if let Some(json_str) = extract_first_object(trimmed) {
        if serde_json::from_str::<serde_json::Value>(&json_str).is_ok() {
            return Ok(json_str);
        }
    }

    Err(AgentError::Parse(format!(
        "No valid JSON object found in response (length={})",
        text.len()
    )))
}

/// Extract JSON from a markdown code block (```json ... ``` or ``` ... ```)
fn extract_from_markdown_block(text: &str) -> Option<String> {
    // Look for ```json or just ```
    let start_markers = ["```json\n", "```json\r\n", "```\n", "```\r\n"];

    for marker in &start_markers {
        if let Some(start) = text.find(marker) {
            let json_start = start + marker.len();
            if let Some(end) = text[json_start..].find("```") {
                let extracted = text[json_start..json_start + end].trim();
                return Some(extracted.to_string());
            }
        }
    }

    None
}

/// Find the first balanced { ... } in the text.
fn extract_first_object(text: &str) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a validated opinion from an analyst's raw reply text.
///
/// `signal` is required and normalized; `confidence` must be numeric (a
/// numeric string is accepted) and is clamped into 0..=100; a missing
/// `reasoning` is tolerated.
pub fn parse_opinion(raw: &str) -> Result<ParsedOpinion, AgentError> {
    if raw.trim().is_empty() {
        return Err(AgentError::Parse("Empty response".to_string()));
    }

    let json_str = extract_json(raw)?;
    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| AgentError::Parse(format!("Failed to parse opinion: {e}")))?;

    let signal = match value.get("signal") {
        Some(Value::String(s)) => s.parse::<Signal>().map_err(AgentError::Parse)?,
        Some(other) => {
            return Err(AgentError::Parse(format!(
                "Field 'signal' must be a string, got {other}"
            )))
        }
        None => return Err(AgentError::Parse("Missing field: signal".to_string())),
    };

    let confidence = match value.get("confidence") {
        Some(v) => coerce_confidence(v)?,
        None => return Err(AgentError::Parse("Missing field: confidence".to_string())),
    };

    let reasoning = match value.get("reasoning").and_then(Value::as_str).map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => {
            warn!("Analyst reply has no reasoning");
            DEFAULT_REASONING.to_string()
        }
    };

    Ok(ParsedOpinion {
        signal,
        confidence,
        reasoning,
    })
}

fn coerce_confidence(value: &Value) -> Result<Decimal, AgentError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().to_string(),
        other => {
            return Err(AgentError::Parse(format!(
                "Field 'confidence' must be numeric, got {other}"
            )))
        }
    };

    let parsed = match Decimal::from_str(&raw).or_else(|_| Decimal::from_scientific(&raw)) {
        Ok(d) => d,
        Err(_) => return saturate_confidence(&raw),
    };

    let clamped = parsed.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    if clamped != parsed {
        warn!(confidence = %parsed, "Clamping out-of-range confidence");
    }
    Ok(clamped.normalize())
}

/// Numbers too large for `Decimal` still clamp to the nearest bound.
fn saturate_confidence(raw: &str) -> Result<Decimal, AgentError> {
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => {
            let bound = if f.is_sign_negative() {
                Decimal::ZERO
            } else {
                Decimal::ONE_HUNDRED
            };
            warn!(confidence = %raw, "Clamping out-of-range confidence");
            Ok(bound)
        }
        _ => Err(AgentError::Parse(format!(
            "Field 'confidence' is not a number: {raw}"
        ))),
    }
}
