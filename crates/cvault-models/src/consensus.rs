use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vote::{Signal, Vote};

/// Votes one signal needs to carry the round.
pub const CONSENSUS_THRESHOLD: u32 = 4;
/// Successful votes needed before any decision is attempted.
pub const MIN_VALID_VOTES: usize = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsensusStatus {
    ConsensusReached,
    NoConsensus,
    InsufficientResponses,
}

/// Per-signal tally over successful votes only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteCounts {
    #[serde(rename = "BUY")]
    pub buy: u32,
    #[serde(rename = "SELL")]
    pub sell: u32,
    #[serde(rename = "HOLD")]
    pub hold: u32,
}

impl VoteCounts {
    pub fn tally<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut counts = VoteCounts::default();
        for vote in votes.into_iter().filter(|v| v.is_success()) {
            match vote.signal {
                Some(Signal::Buy) => counts.buy += 1,
                Some(Signal::Sell) => counts.sell += 1,
                Some(Signal::Hold) => counts.hold += 1,
                None => {}
            }
        }
        counts
    }

    pub fn get(&self, signal: Signal) -> u32 {
        match signal {
            Signal::Buy => self.buy,
            Signal::Sell => self.sell,
            Signal::Hold => self.hold,
        }
    }

    pub fn total(&self) -> u32 {
        self.buy + self.sell + self.hold
    }
}

/// Outcome of one consensus round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusResult {
    #[serde(rename = "consensus_status")]
    pub status: ConsensusStatus,
    #[serde(rename = "consensus_signal")]
    pub signal: Option<Signal>,
    /// Every vote in invocation order, failures included.
    #[serde(rename = "individual_votes")]
    pub votes: Vec<Vote>,
    pub vote_counts: VoteCounts,
    #[serde(with = "millis_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Coarse majority view of a vote set, used for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsensusSummary {
    pub signal: Option<Signal>,
    /// 0 to 100.
    pub strength: u32,
    pub agreement_ratio: f64,
    pub recommendation: Option<String>,
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
mod millis_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::{ParsedOpinion, VoteStatus};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ok(id: &str, signal: Signal) -> Vote {
        Vote::success(
            id,
            ParsedOpinion {
                signal,
                confidence: dec!(70),
                reasoning: String::new(),
            },
            10,
        )
    }

    #[test]
    fn tally_ignores_failed_votes() {
        let votes = vec![
            ok("a", Signal::Buy),
            ok("b", Signal::Sell),
            Vote::failure("c", VoteStatus::Error, "boom", 5),
            ok("d", Signal::Buy),
        ];
        let counts = VoteCounts::tally(&votes);
        assert_eq!(counts, VoteCounts { buy: 2, sell: 1, hold: 0 });
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.get(Signal::Buy), 2);
    }

    #[test]
    fn result_wire_shape() {
        let result = ConsensusResult {
            status: ConsensusStatus::InsufficientResponses,
            signal: None,
            votes: vec![ok("a", Signal::Hold)],
            vote_counts: VoteCounts::default(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap(),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["consensus_status"], "INSUFFICIENT_RESPONSES");
        assert_eq!(value["consensus_signal"], serde_json::Value::Null);
        assert_eq!(value["individual_votes"].as_array().unwrap().len(), 1);
        assert_eq!(value["vote_counts"]["BUY"], 0);
        assert_eq!(value["timestamp"], "2025-01-02T03:04:05.000Z");

        let back: ConsensusResult = serde_json::from_value(value).unwrap();
        assert_eq!(back, result);
    }
}
