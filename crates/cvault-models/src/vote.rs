use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::guidance::UserGuidance;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Tally and tie-break order.
    pub const ALL: [Signal; 3] = [Signal::Buy, Signal::Sell, Signal::Hold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Signal::Buy),
            "sell" => Ok(Signal::Sell),
            "hold" => Ok(Signal::Hold),
            other => Err(format!("invalid signal '{other}' (expected buy, sell or hold)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteStatus {
    Success,
    Timeout,
    Error,
}

/// A validated analyst reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedOpinion {
    pub signal: Signal,
    /// 0 to 100.
    pub confidence: Decimal,
    pub reasoning: String,
}

/// One analyst's contribution to a round. Failed calls are votes too, with
/// no signal and zero confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    #[serde(rename = "model_name")]
    pub analyst_id: String,
    pub signal: Option<Signal>,
    pub response_time_ms: u64,
    #[serde(with = "rust_decimal::serde::float")]
    pub confidence: Decimal,
    #[serde(default)]
    pub reasoning: String,
    pub status: VoteStatus,
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Substitute analyst that answered after the original one failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<UserGuidance>,
}

impl Vote {
    pub fn success(analyst_id: impl Into<String>, opinion: ParsedOpinion, elapsed_ms: u64) -> Self {
        Self {
            analyst_id: analyst_id.into(),
            signal: Some(opinion.signal),
            response_time_ms: elapsed_ms,
            confidence: opinion.confidence,
            reasoning: opinion.reasoning,
            status: VoteStatus::Success,
            error_detail: None,
            served_by: None,
            guidance: None,
        }
    }

    pub fn failure(
        analyst_id: impl Into<String>,
        status: VoteStatus,
        detail: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            analyst_id: analyst_id.into(),
            signal: None,
            response_time_ms: elapsed_ms,
            confidence: Decimal::ZERO,
            reasoning: String::new(),
            status,
            error_detail: Some(detail.into()),
            served_by: None,
            guidance: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == VoteStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn signal_parsing_normalizes_case_and_whitespace() {
        assert_eq!(" BUY ".parse::<Signal>(), Ok(Signal::Buy));
        assert_eq!("Hold".parse::<Signal>(), Ok(Signal::Hold));
        assert!("strong buy".parse::<Signal>().is_err());
    }

    #[test]
    fn success_vote_wire_shape() {
        let vote = Vote::success(
            "deepseek",
            ParsedOpinion {
                signal: Signal::Buy,
                confidence: dec!(85),
                reasoning: "trend up".into(),
            },
            1200,
        );

        let value = serde_json::to_value(&vote).unwrap();
        assert_eq!(value["model_name"], "deepseek");
        assert_eq!(value["signal"], "buy");
        assert_eq!(value["confidence"], 85.0);
        assert_eq!(value["status"], "success");
        assert_eq!(value["response_time_ms"], 1200);
        assert!(value.get("error").is_none());
        assert!(value.get("served_by").is_none());
    }

    #[test]
    fn failure_vote_wire_shape() {
        let vote = Vote::failure("kimi", VoteStatus::Timeout, "timed out after 30000ms", 30_001);

        let value = serde_json::to_value(&vote).unwrap();
        assert_eq!(value["signal"], serde_json::Value::Null);
        assert_eq!(value["confidence"], 0.0);
        assert_eq!(value["status"], "timeout");
        assert_eq!(value["error"], "timed out after 30000ms");
        assert!(!vote.is_success());
    }

    #[test]
    fn vote_reads_back_from_wire() {
        let json = r#"{"model_name":"glm","signal":"sell","response_time_ms":900,
                       "confidence":72.5,"status":"success"}"#;
        let vote: Vote = serde_json::from_str(json).unwrap();
        assert_eq!(vote.signal, Some(Signal::Sell));
        assert_eq!(vote.confidence, dec!(72.5));
        assert!(vote.reasoning.is_empty());
    }
}
