use std::collections::BTreeMap;

use rust_decimal::Decimal;
use swarm_models::{ActionFamily, Debate, Decision, Vote, VoteAction};
use uuid::Uuid;

/// One counted vote: the voter's nominal weight, action and certainty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedVote {
    pub weight: Decimal,
    pub action: VoteAction,
    pub confidence: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub action: VoteAction,
    /// Participation, weight mass over total active weight.
    pub confidence: Decimal,
    /// Weighted mean of the vote scalars, in [-2, 2].
    pub score: Decimal,
    pub consensus_reached: bool,
    /// The family holding more than half the total active weight, if any.
    pub majority_family: Option<ActionFamily>,
    /// Sum of weight times confidence over the voters.
    pub weight_mass: Decimal,
    /// Nominal weight behind each action family.
    pub family_weights: BTreeMap<ActionFamily, Decimal>,
}

impl Aggregate {
    fn abstain() -> Self {
        Self {
            action: VoteAction::Hold,
            confidence: Decimal::ZERO,
            score: Decimal::ZERO,
            consensus_reached: false,
            majority_family: None,
            weight_mass: Decimal::ZERO,
            family_weights: BTreeMap::new(),
        }
    }
}

fn clamp(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    value.max(lo).min(hi)
}

/// Combine votes into a single directional call.
///
/// Total over its input: no voters, zero mass or a non-positive total weight
/// all produce HOLD with zero confidence. A directional action needs a BUY or
/// SELL family holding more than half the total active weight, and the score
/// must point the same way; anything else is HOLD.
pub fn aggregate(votes: &[WeightedVote], total_active_weight: Decimal) -> Aggregate {
    if votes.is_empty() || total_active_weight <= Decimal::ZERO {
        return Aggregate::abstain();
    }

    let two = Decimal::from(2);
    let mut weighted_sum = Decimal::ZERO;
    let mut weight_mass = Decimal::ZERO;
    let mut family_weights: BTreeMap<ActionFamily, Decimal> = BTreeMap::new();

    for vote in votes {
        let weight = vote.weight.max(Decimal::ZERO);
        let confidence = clamp(vote.confidence, Decimal::ZERO, Decimal::ONE);
        weighted_sum += vote.action.scalar() * weight * confidence;
        weight_mass += weight * confidence;
        *family_weights.entry(vote.action.family()).or_default() += weight;
    }

    let score = if weight_mass.is_zero() {
        Decimal::ZERO
    } else {
        clamp(weighted_sum / weight_mass, -two, two)
    };
    let confidence = clamp(weight_mass / total_active_weight, Decimal::ZERO, Decimal::ONE);
    let half = total_active_weight / two;
    let majority_family = family_weights
        .iter()
        .find(|(_, weight)| **weight > half)
        .map(|(family, _)| *family);

    let action = match majority_family {
        Some(family) if family != ActionFamily::Hold => {
            let scored = VoteAction::from_score(score);
            if scored.family() == family {
                scored
            } else {
                VoteAction::Hold
            }
        }
        _ => VoteAction::Hold,
    };

    Aggregate {
        action,
        confidence,
        score,
        consensus_reached: majority_family.is_some(),
        majority_family,
        weight_mass,
        family_weights,
    }
}

/// Aggregate a debate's recorded votes against its roster snapshot.
///
/// Votes from specialists missing from the snapshot carry no weight and are skipped.
pub fn decision_for(debate: &Debate, votes: &[Vote]) -> Decision {
    let weighted: Vec<WeightedVote> = votes
        .iter()
        .filter_map(|v| {
            debate.weight_of(&v.specialist_id).map(|weight| WeightedVote {
                weight,
                action: v.action,
                confidence: v.confidence,
            })
        })
        .collect();
    let result = aggregate(&weighted, debate.total_active_weight());

    Decision {
        id: Uuid::new_v4(),
        debate_id: debate.id,
        symbol: debate.symbol().to_string(),
        action: result.action,
        confidence: result.confidence,
        score: result.score,
        consensus_reached: result.consensus_reached,
        participating_weight: result.weight_mass,
        decided_at: swarm_models::utc_now(),
        executed: false,
        outcome: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn total() -> Decimal {
        dec!(6.8)
    }

    fn vote(weight: Decimal, action: VoteAction, confidence: Decimal) -> WeightedVote {
        WeightedVote {
            weight,
            action,
            confidence,
        }
    }

    #[test]
    fn no_voters_is_hold_without_consensus() {
        let result = aggregate(&[], total());
        assert_eq!(result.action, VoteAction::Hold);
        assert_eq!(result.confidence, Decimal::ZERO);
        assert!(!result.consensus_reached);
    }

    #[test]
    fn lone_risk_sell_has_low_confidence_and_no_consensus() {
        let result = aggregate(&[vote(dec!(1.5), VoteAction::Sell, dec!(1))], total());
        assert_eq!(result.score, dec!(-1));
        assert!(!result.consensus_reached);
        assert_eq!(result.action, VoteAction::Hold);
        assert_eq!(result.confidence.round_dp(2), dec!(0.22));
    }

    #[test]
    fn full_buy_consensus() {
        let votes = [
            vote(dec!(1.5), VoteAction::Buy, dec!(0.8)),
            vote(dec!(1.2), VoteAction::StrongBuy, dec!(0.9)),
            vote(dec!(1.0), VoteAction::Buy, dec!(0.7)),
            vote(dec!(1.0), VoteAction::Hold, dec!(0.6)),
            vote(dec!(1.1), VoteAction::Buy, dec!(0.75)),
            vote(dec!(1.0), VoteAction::Sell, dec!(0.5)),
        ];
        let result = aggregate(&votes, total());
        assert!(result.consensus_reached);
        assert_eq!(result.family_weights[&ActionFamily::Buy], dec!(4.8));
        assert_eq!(result.action, VoteAction::Buy);
        assert!(result.score > dec!(0.5) && result.score < dec!(1.5));
        assert!(result.confidence > Decimal::ZERO && result.confidence <= Decimal::ONE);
    }

    #[test]
    fn unanimous_strong_sell() {
        let votes = [
            vote(dec!(1.5), VoteAction::StrongSell, dec!(1)),
            vote(dec!(1.2), VoteAction::StrongSell, dec!(1)),
            vote(dec!(1.0), VoteAction::StrongSell, dec!(1)),
            vote(dec!(1.0), VoteAction::StrongSell, dec!(1)),
            vote(dec!(1.1), VoteAction::StrongSell, dec!(1)),
            vote(dec!(1.0), VoteAction::StrongSell, dec!(1)),
        ];
        let result = aggregate(&votes, total());
        assert_eq!(result.action, VoteAction::StrongSell);
        assert_eq!(result.score, dec!(-2));
        assert_eq!(result.confidence, Decimal::ONE);
    }

    #[test]
    fn split_vote_falls_back_to_hold() {
        let votes = [
            vote(dec!(1.5), VoteAction::Sell, dec!(0.9)),
            vote(dec!(1.2), VoteAction::Buy, dec!(0.9)),
            vote(dec!(1.0), VoteAction::Buy, dec!(0.9)),
            vote(dec!(1.0), VoteAction::Sell, dec!(0.9)),
        ];
        let result = aggregate(&votes, total());
        assert!(!result.consensus_reached);
        assert_eq!(result.action, VoteAction::Hold);
    }

    #[test]
    fn zero_confidence_votes_count_toward_consensus_but_not_score() {
        let votes = [
            vote(dec!(1.5), VoteAction::Hold, dec!(0)),
            vote(dec!(1.2), VoteAction::Hold, dec!(0)),
            vote(dec!(1.0), VoteAction::Hold, dec!(0)),
        ];
        let result = aggregate(&votes, total());
        assert_eq!(result.score, Decimal::ZERO);
        assert_eq!(result.confidence, Decimal::ZERO);
        assert!(result.consensus_reached);
        assert_eq!(result.action, VoteAction::Hold);
    }

    #[test]
    fn hold_majority_does_not_let_a_minority_trade() {
        let votes = [
            vote(dec!(1.5), VoteAction::Hold, dec!(0)),
            vote(dec!(1.0), VoteAction::Hold, dec!(0)),
            vote(dec!(1.0), VoteAction::Hold, dec!(0)),
            vote(dec!(1.0), VoteAction::Hold, dec!(0)),
            vote(dec!(1.2), VoteAction::StrongBuy, dec!(0.5)),
        ];
        let result = aggregate(&votes, total());
        assert_eq!(result.score, dec!(2));
        assert!(result.consensus_reached);
        assert_eq!(result.majority_family, Some(ActionFamily::Hold));
        assert_eq!(result.action, VoteAction::Hold);
    }

    #[test]
    fn score_against_the_majority_family_is_hold() {
        let votes = [
            vote(dec!(1.5), VoteAction::Buy, dec!(0.1)),
            vote(dec!(1.0), VoteAction::Buy, dec!(0.1)),
            vote(dec!(1.0), VoteAction::Buy, dec!(0.1)),
            vote(dec!(1.2), VoteAction::StrongSell, dec!(1)),
            vote(dec!(1.1), VoteAction::StrongSell, dec!(1)),
        ];
        let result = aggregate(&votes, total());
        assert!(result.score < dec!(-1.5));
        assert_eq!(result.majority_family, Some(ActionFamily::Buy));
        assert_eq!(result.action, VoteAction::Hold);
    }

    #[test]
    fn degenerate_totals_are_hold() {
        let votes = [vote(dec!(1), VoteAction::StrongBuy, dec!(1))];
        assert_eq!(aggregate(&votes, Decimal::ZERO).action, VoteAction::Hold);
        assert_eq!(aggregate(&votes, dec!(-3)).confidence, Decimal::ZERO);
    }

    #[test]
    fn out_of_range_inputs_stay_bounded() {
        let votes = [
            vote(dec!(5), VoteAction::StrongBuy, dec!(3)),
            vote(dec!(1), VoteAction::Buy, dec!(-1)),
        ];
        let result = aggregate(&votes, dec!(2));
        assert!(result.score <= dec!(2) && result.score >= dec!(-2));
        assert_eq!(result.confidence, Decimal::ONE);
    }

    #[test]
    fn decision_uses_roster_snapshot_weights() {
        let roster = swarm_models::SpecialistDefinition::default_roster()
            .into_iter()
            .map(|d| swarm_models::RosterEntry {
                specialist_id: d.id,
                role: d.role,
                voting_weight: d.voting_weight,
            })
            .collect();
        let debate = Debate::new(swarm_models::TriggerContext::new("SOL", dec!(100), "t"), roster);
        let cast = |id: &str, action, confidence| Vote {
            debate_id: debate.id,
            specialist_id: id.to_string(),
            action,
            confidence,
            cast_at: swarm_models::utc_now(),
        };
        let votes = vec![
            cast("risk-assessor", VoteAction::Sell, dec!(1)),
            cast("retired-bot", VoteAction::StrongBuy, dec!(1)),
        ];

        let decision = decision_for(&debate, &votes);
        assert_eq!(decision.debate_id, debate.id);
        assert_eq!(decision.symbol, "SOL");
        assert_eq!(decision.action, VoteAction::Hold);
        assert!(!decision.consensus_reached);
        assert_eq!(decision.participating_weight, dec!(1.5));
        assert_eq!(decision.confidence.round_dp(2), dec!(0.22));
    }
}
