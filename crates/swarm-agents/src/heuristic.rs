//! Deterministic, offline reasoning backend.
//!
//! Applies a compact version of each role's prompt rules directly to the
//! trigger snapshot. Used for dry runs and for exercising the full debate
//! pipeline without a model.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use swarm_models::{SpecialistRole, TriggerContext, VoteAction};

use crate::backend::{ReasoningBackend, RoleContext};
use crate::error::AgentError;

pub struct HeuristicBackend;

/// Look up a numeric field in market_data: either `{"rsi": 28}` or `{"rsi": {"value": 28}}`.
fn market_number(trigger: &TriggerContext, key: &str) -> Option<f64> {
    let value = trigger.market_data.get(key)?;
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("value").and_then(Value::as_f64),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn change_24h(trigger: &TriggerContext) -> Option<f64> {
    trigger.price_change_24h.and_then(|c| c.to_f64())
}

const BULLISH_WORDS: [&str; 5] = ["breakout", "moon", "ath", "partnership", "listing"];
const BEARISH_WORDS: [&str; 5] = ["exploit", "hack", "delist", "liquidation", "rug"];

fn keyword_sentiment(reason: &str) -> Option<f64> {
    let reason = reason.to_lowercase();
    let bullish = BULLISH_WORDS.iter().filter(|w| reason.contains(*w)).count() as f64;
    let bearish = BEARISH_WORDS.iter().filter(|w| reason.contains(*w)).count() as f64;
    if bullish == 0.0 && bearish == 0.0 {
        None
    } else {
        Some(((bullish - bearish) * 0.4).clamp(-1.0, 1.0))
    }
}

fn risk_assessor(trigger: &TriggerContext) -> (VoteAction, f64, String) {
    let Some(c) = change_24h(trigger) else {
        return (VoteAction::Hold, 0.3, "No 24h change available; staying flat.".to_string());
    };
    if c.abs() > 10.0 {
        let action = if c > 0.0 { VoteAction::Hold } else { VoteAction::Sell };
        (action, 0.7, format!("24h move {c:.1}% is a tail event. Tail move, size down."))
    } else if c <= -5.0 {
        (VoteAction::Sell, 0.7, format!("24h drop {c:.1}% shows downside momentum."))
    } else if (1.0..5.0).contains(&c) {
        (VoteAction::Buy, 0.55, format!("Modest {c:.1}% rally is an acceptable risk."))
    } else if c <= -1.0 {
        (VoteAction::Sell, 0.5, format!("Soft tape ({c:.1}%); trimming exposure."))
    } else {
        (VoteAction::Hold, 0.6, format!("Move of {c:.1}% does not justify new risk."))
    }
}

fn momentum_trader(trigger: &TriggerContext) -> (VoteAction, f64, String) {
    let c = change_24h(trigger).unwrap_or(0.0);
    let (action, confidence) = if c >= 5.0 {
        (VoteAction::StrongBuy, 0.8)
    } else if c >= 1.0 {
        (VoteAction::Buy, 0.65)
    } else if c > -1.0 {
        (VoteAction::Hold, 0.5)
    } else if c > -5.0 {
        (VoteAction::Sell, 0.65)
    } else {
        (VoteAction::StrongSell, 0.8)
    };
    (action, confidence, format!("24h change {c:.1}% sets the trend; following it."))
}

fn mean_reversion(trigger: &TriggerContext) -> (VoteAction, f64, String) {
    let c = change_24h(trigger).unwrap_or(0.0);
    let (action, confidence) = if c >= 15.0 {
        (VoteAction::StrongSell, 0.75)
    } else if c >= 8.0 {
        (VoteAction::Sell, 0.65)
    } else if c <= -15.0 {
        (VoteAction::StrongBuy, 0.7)
    } else if c <= -8.0 {
        (VoteAction::Buy, 0.6)
    } else if c.abs() <= 3.0 {
        (VoteAction::Hold, 0.55)
    } else if c > 0.0 {
        (VoteAction::Sell, 0.4)
    } else {
        (VoteAction::Buy, 0.4)
    };
    (action, confidence, format!("A {c:.1}% move measured against the recent range."))
}

fn sentiment_analyzer(trigger: &TriggerContext) -> (VoteAction, f64, String) {
    let score = market_number(trigger, "sentiment").or_else(|| keyword_sentiment(&trigger.reason));
    let Some(score) = score else {
        return (VoteAction::Hold, 0.35, "No sentiment signal in the trigger.".to_string());
    };
    let (action, confidence) = if score > 0.8 {
        (VoteAction::StrongBuy, 0.75)
    } else if score > 0.5 {
        (VoteAction::Buy, 0.6)
    } else if score < -0.8 {
        (VoteAction::StrongSell, 0.75)
    } else if score < -0.5 {
        (VoteAction::Sell, 0.6)
    } else {
        (VoteAction::Hold, 0.45)
    };
    (action, confidence, format!("Sentiment score {score:.2}."))
}

fn technical_analyst(trigger: &TriggerContext) -> (VoteAction, f64, String) {
    if let Some(rsi) = market_number(trigger, "rsi") {
        let (action, confidence) = if rsi < 20.0 {
            (VoteAction::StrongBuy, 0.8)
        } else if rsi < 30.0 {
            (VoteAction::Buy, 0.65)
        } else if rsi > 80.0 {
            (VoteAction::StrongSell, 0.8)
        } else if rsi > 70.0 {
            (VoteAction::Sell, 0.65)
        } else {
            (VoteAction::Hold, 0.5)
        };
        return (action, confidence, format!("RSI {rsi:.0}."));
    }

    let c = change_24h(trigger).unwrap_or(0.0);
    let action = if c > 2.0 {
        VoteAction::Buy
    } else if c < -2.0 {
        VoteAction::Sell
    } else {
        VoteAction::Hold
    };
    (action, 0.5, format!("No indicators; 24h trend {c:.1}%."))
}

fn volatility_specialist(trigger: &TriggerContext) -> (VoteAction, f64, String) {
    let c = change_24h(trigger).unwrap_or(0.0);
    if c.abs() > 8.0 {
        let action = if c > 0.0 { VoteAction::Sell } else { VoteAction::Hold };
        (action, 0.5, format!("Volatility expansion: {c:.1}% in 24h."))
    } else if c.abs() < 2.0 {
        let action = if c > 0.0 {
            VoteAction::Buy
        } else if c < 0.0 {
            VoteAction::Sell
        } else {
            VoteAction::Hold
        };
        (action, 0.35, format!("Compressed range ({c:.1}%); breakout lean."))
    } else {
        let action = if c > 0.0 { VoteAction::Buy } else { VoteAction::Sell };
        (action, 0.55, format!("Normal regime, following the {c:.1}% move."))
    }
}

/// The vote a role's rules produce for a trigger.
pub fn evaluate(role: SpecialistRole, trigger: &TriggerContext) -> (VoteAction, f64, String) {
    match role {
        SpecialistRole::RiskAssessor => risk_assessor(trigger),
        SpecialistRole::MomentumTrader => momentum_trader(trigger),
        SpecialistRole::MeanReversion => mean_reversion(trigger),
        SpecialistRole::SentimentAnalyzer => sentiment_analyzer(trigger),
        SpecialistRole::TechnicalAnalyst => technical_analyst(trigger),
        SpecialistRole::VolatilitySpecialist => volatility_specialist(trigger),
    }
}

#[async_trait]
impl ReasoningBackend for HeuristicBackend {
    fn label(&self) -> String {
        "heuristic".to_string()
    }

    async fn complete(&self, ctx: &RoleContext) -> Result<String, AgentError> {
        let (action, confidence, analysis) = evaluate(ctx.role, &ctx.trigger);
        let body = serde_json::json!({
            "action": action.as_str(),
            "confidence": confidence,
            "analysis": analysis,
        });
        Ok(serde_json::to_string(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_vote;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn trigger(change: Option<Decimal>) -> TriggerContext {
        let mut trigger = TriggerContext::new("SOL", dec!(142.5), "price alert");
        trigger.price_change_24h = change;
        trigger
    }

    #[test]
    fn momentum_follows_the_move() {
        assert_eq!(evaluate(SpecialistRole::MomentumTrader, &trigger(Some(dec!(6)))).0, VoteAction::StrongBuy);
        assert_eq!(evaluate(SpecialistRole::MomentumTrader, &trigger(Some(dec!(-2)))).0, VoteAction::Sell);
        assert_eq!(evaluate(SpecialistRole::MomentumTrader, &trigger(None)).0, VoteAction::Hold);
    }

    #[test]
    fn mean_reversion_fades_extremes() {
        assert_eq!(evaluate(SpecialistRole::MeanReversion, &trigger(Some(dec!(16)))).0, VoteAction::StrongSell);
        assert_eq!(evaluate(SpecialistRole::MeanReversion, &trigger(Some(dec!(-9)))).0, VoteAction::Buy);
        assert_eq!(evaluate(SpecialistRole::MeanReversion, &trigger(Some(dec!(1)))).0, VoteAction::Hold);
    }

    #[test]
    fn risk_assessor_flags_tail_moves() {
        let (action, _, analysis) = evaluate(SpecialistRole::RiskAssessor, &trigger(Some(dec!(-12))));
        assert_eq!(action, VoteAction::Sell);
        assert!(analysis.contains("Tail move"));
        let (action, confidence, _) = evaluate(SpecialistRole::RiskAssessor, &trigger(None));
        assert_eq!(action, VoteAction::Hold);
        assert!(confidence <= 0.4);
    }

    #[test]
    fn technical_prefers_rsi_when_present() {
        let mut t = trigger(Some(dec!(5)));
        t.market_data = serde_json::json!({"rsi": {"value": 85}});
        assert_eq!(evaluate(SpecialistRole::TechnicalAnalyst, &t).0, VoteAction::StrongSell);
        t.market_data = serde_json::json!({});
        assert_eq!(evaluate(SpecialistRole::TechnicalAnalyst, &t).0, VoteAction::Buy);
    }

    #[test]
    fn sentiment_reads_keywords() {
        let mut t = trigger(None);
        t.reason = "Bridge exploit reported, liquidation cascade".to_string();
        assert_eq!(evaluate(SpecialistRole::SentimentAnalyzer, &t).0, VoteAction::Sell);
        t.reason = "quiet".to_string();
        assert_eq!(evaluate(SpecialistRole::SentimentAnalyzer, &t).0, VoteAction::Hold);
    }

    #[tokio::test]
    async fn output_parses_as_vote() {
        let ctx = RoleContext {
            specialist_id: "volatility-specialist".to_string(),
            role: SpecialistRole::VolatilitySpecialist,
            system_prompt: String::new(),
            user_prompt: String::new(),
            trigger: trigger(Some(dec!(4))),
            learnings: vec![],
        };
        let raw = HeuristicBackend.complete(&ctx).await.unwrap();
        let vote = parse_vote(&raw).unwrap();
        assert_eq!(vote.action, VoteAction::Buy);
        assert_eq!(vote.confidence, dec!(0.55));
    }
}
