use chrono::Utc;
use cvault_models::{
    ConsensusResult, ConsensusStatus, ConsensusSummary, Signal, Vote, VoteCounts,
    CONSENSUS_THRESHOLD, MIN_VALID_VOTES,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Agreement ratio at which the coarse summary issues a recommendation.
pub const RECOMMENDATION_RATIO: f64 = 0.8;

/// Reduce a round's votes into a decision.
///
/// Only `success` votes count. Fewer than three of them is
/// `INSUFFICIENT_RESPONSES`; otherwise a signal needs four votes to carry
/// the round. Votes are kept in the order given.
pub fn calculate(votes: Vec<Vote>) -> ConsensusResult {
    let valid = votes.iter().filter(|v| v.is_success()).count();

    if valid < MIN_VALID_VOTES {
        return ConsensusResult {
            status: ConsensusStatus::InsufficientResponses,
            signal: None,
            votes,
            vote_counts: VoteCounts::default(),
            timestamp: Utc::now(),
        };
    }

    let vote_counts = VoteCounts::tally(&votes);
    let winner = Signal::ALL
        .into_iter()
        .find(|s| vote_counts.get(*s) >= CONSENSUS_THRESHOLD);

    ConsensusResult {
        status: if winner.is_some() {
            ConsensusStatus::ConsensusReached
        } else {
            ConsensusStatus::NoConsensus
        },
        signal: winner,
        votes,
        vote_counts,
        timestamp: Utc::now(),
    }
}

/// Majority view with a 0-100 strength score.
///
/// Ties go to the earlier signal in buy, sell, hold order. Strength is the
/// agreement ratio times the majority's mean confidence, rounded half up.
pub fn calculate_consensus(votes: &[Vote]) -> ConsensusSummary {
    let valid: Vec<&Vote> = votes.iter().filter(|v| v.is_success()).collect();

    if valid.len() < MIN_VALID_VOTES {
        return ConsensusSummary {
            signal: None,
            strength: 0,
            agreement_ratio: 0.0,
            recommendation: None,
        };
    }

    let counts = VoteCounts::tally(valid.iter().copied());
    let mut majority = Signal::Buy;
    for signal in Signal::ALL {
        if counts.get(signal) > counts.get(majority) {
            majority = signal;
        }
    }

    let backing: Vec<Decimal> = valid
        .iter()
        .filter(|v| v.signal == Some(majority))
        .map(|v| v.confidence)
        .collect();
    let ratio = Decimal::from(backing.len()) / Decimal::from(valid.len());
    let mean_confidence = backing.iter().sum::<Decimal>() / Decimal::from(backing.len());
    let strength = (ratio * mean_confidence)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(0);
    let agreement_ratio = ratio.to_f64().unwrap_or(0.0);

    ConsensusSummary {
        signal: Some(majority),
        strength,
        agreement_ratio,
        recommendation: (agreement_ratio >= RECOMMENDATION_RATIO)
            .then(|| majority.as_str().to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvault_models::{ParsedOpinion, VoteStatus};
    use rust_decimal_macros::dec;

    fn vote(id: &str, signal: Signal, confidence: Decimal) -> Vote {
        Vote::success(
            id,
            ParsedOpinion {
                signal,
                confidence,
                reasoning: format!("{id} says {signal}"),
            },
            100,
        )
    }

    fn failed(id: &str) -> Vote {
        Vote::failure(id, VoteStatus::Error, "HTTP 500", 100)
    }

    #[test]
    fn four_matching_votes_reach_consensus() {
        let votes = vec![
            vote("a", Signal::Buy, dec!(85)),
            vote("b", Signal::Buy, dec!(80)),
            vote("c", Signal::Buy, dec!(75)),
            vote("d", Signal::Buy, dec!(90)),
            vote("e", Signal::Hold, dec!(60)),
        ];

        let result = calculate(votes);
        assert_eq!(result.status, ConsensusStatus::ConsensusReached);
        assert_eq!(result.signal, Some(Signal::Buy));
        assert_eq!(result.vote_counts, VoteCounts { buy: 4, sell: 0, hold: 1 });
        assert_eq!(result.votes.len(), 5);
    }

    #[test]
    fn same_votes_give_same_outcome() {
        let votes = vec![
            vote("a", Signal::Sell, dec!(70)),
            failed("b"),
            vote("c", Signal::Sell, dec!(65)),
            vote("d", Signal::Hold, dec!(50)),
            vote("e", Signal::Sell, dec!(80)),
            vote("f", Signal::Sell, dec!(55)),
        ];

        let first = calculate(votes.clone());
        let second = calculate(votes.clone());
        assert_eq!(first.status, second.status);
        assert_eq!(first.signal, second.signal);
        assert_eq!(first.vote_counts, second.vote_counts);
        assert_eq!(first.votes, second.votes);
        assert_eq!(first.signal, Some(Signal::Sell));
        assert_eq!(calculate_consensus(&votes), calculate_consensus(&votes));
    }

    #[test]
    fn split_vote_has_no_consensus() {
        let votes = vec![
            vote("a", Signal::Buy, dec!(70)),
            vote("b", Signal::Buy, dec!(70)),
            vote("c", Signal::Sell, dec!(70)),
            vote("d", Signal::Sell, dec!(70)),
            vote("e", Signal::Hold, dec!(70)),
        ];

        let result = calculate(votes);
        assert_eq!(result.status, ConsensusStatus::NoConsensus);
        assert_eq!(result.signal, None);
        assert_eq!(result.vote_counts, VoteCounts { buy: 2, sell: 2, hold: 1 });
    }

    #[test]
    fn fewer_than_three_successes_is_insufficient() {
        let votes = vec![
            vote("a", Signal::Buy, dec!(90)),
            vote("b", Signal::Buy, dec!(90)),
            failed("c"),
            failed("d"),
            failed("e"),
        ];

        let result = calculate(votes);
        assert_eq!(result.status, ConsensusStatus::InsufficientResponses);
        assert_eq!(result.signal, None);
        assert_eq!(result.vote_counts, VoteCounts::default());
        assert_eq!(result.votes.len(), 5);
    }

    #[test]
    fn three_unanimous_votes_are_not_enough() {
        let votes = vec![
            vote("a", Signal::Sell, dec!(90)),
            vote("b", Signal::Sell, dec!(90)),
            vote("c", Signal::Sell, dec!(90)),
        ];
        let result = calculate(votes);
        assert_eq!(result.status, ConsensusStatus::NoConsensus);
        assert_eq!(result.vote_counts.sell, 3);
    }

    #[test]
    fn failures_never_count_toward_a_signal() {
        let mut votes = vec![
            vote("a", Signal::Hold, dec!(50)),
            vote("b", Signal::Hold, dec!(50)),
            vote("c", Signal::Hold, dec!(50)),
            vote("d", Signal::Buy, dec!(50)),
        ];
        // A failed vote that still carries a stale signal is ignored.
        let mut stale = failed("e");
        stale.signal = Some(Signal::Hold);
        votes.push(stale);

        let result = calculate(votes);
        assert_eq!(result.status, ConsensusStatus::NoConsensus);
        assert_eq!(result.vote_counts.total(), 4);
    }

    #[test]
    fn result_preserves_vote_order() {
        let votes = vec![
            failed("z"),
            vote("y", Signal::Buy, dec!(10)),
            vote("x", Signal::Buy, dec!(10)),
            vote("w", Signal::Buy, dec!(10)),
        ];
        let result = calculate(votes);
        let order: Vec<&str> = result.votes.iter().map(|v| v.analyst_id.as_str()).collect();
        assert_eq!(order, vec!["z", "y", "x", "w"]);
    }

    #[test]
    fn summary_strength_and_recommendation() {
        let votes = vec![
            vote("a", Signal::Buy, dec!(85)),
            vote("b", Signal::Buy, dec!(80)),
            vote("c", Signal::Buy, dec!(75)),
            vote("d", Signal::Buy, dec!(90)),
            vote("e", Signal::Hold, dec!(60)),
        ];

        let summary = calculate_consensus(&votes);
        assert_eq!(summary.signal, Some(Signal::Buy));
        // 0.8 * 82.5 = 66
        assert_eq!(summary.strength, 66);
        assert!((summary.agreement_ratio - 0.8).abs() < 1e-9);
        assert_eq!(summary.recommendation.as_deref(), Some("BUY"));
    }

    #[test]
    fn summary_without_strong_agreement_has_no_recommendation() {
        let votes = vec![
            vote("a", Signal::Sell, dec!(70)),
            vote("b", Signal::Sell, dec!(71)),
            vote("c", Signal::Hold, dec!(40)),
            failed("d"),
        ];

        let summary = calculate_consensus(&votes);
        assert_eq!(summary.signal, Some(Signal::Sell));
        // 2/3 * 70.5 = 47
        assert_eq!(summary.strength, 47);
        assert_eq!(summary.recommendation, None);
    }

    #[test]
    fn summary_ties_prefer_buy_then_sell() {
        let votes = vec![
            vote("a", Signal::Hold, dec!(50)),
            vote("b", Signal::Sell, dec!(50)),
            vote("c", Signal::Hold, dec!(50)),
            vote("d", Signal::Sell, dec!(50)),
        ];
        assert_eq!(calculate_consensus(&votes).signal, Some(Signal::Sell));
    }

    #[test]
    fn summary_needs_three_valid_votes() {
        let votes = vec![vote("a", Signal::Buy, dec!(99)), failed("b"), failed("c")];
        let summary = calculate_consensus(&votes);
        assert_eq!(summary.signal, None);
        assert_eq!(summary.strength, 0);
        assert_eq!(summary.recommendation, None);
    }
}
