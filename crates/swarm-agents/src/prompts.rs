use swarm_models::{Learning, SpecialistDefinition, SpecialistRole, TriggerContext};

/// Schema description included in every specialist system prompt.
pub fn response_schema() -> String {
    let example = serde_json::json!({
        "action": "STRONG_SELL | SELL | HOLD | BUY | STRONG_BUY",
        "confidence": 0.65,
        "analysis": "<two to four sentences explaining the call>"
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

/// Role-specific interpretation rules.
pub fn role_rules(role: SpecialistRole) -> &'static str {
    match role {
        SpecialistRole::RiskAssessor => {
            "## INTERPRETATION RULES\n\n\
             You guard capital. Start from HOLD and require evidence to move off it.\n\
             - 24h move beyond 10% either way: treat as a tail event → prefer SELL or HOLD, \
             never STRONG_BUY\n\
             - 24h drop beyond 5%: downside momentum → SELL unless volume shows capitulation\n\
             - Thin 24h volume relative to the move: liquidity risk → lower confidence by 0.15\n\
             - Modest rally (1-5%) on healthy volume: acceptable risk → BUY at most\n\
             - Missing data: say so and keep confidence at or below 0.4\n\n\
             ## WARNING CONDITIONS\n\n\
             Call out explicitly: \"Tail move, size down\" when |24h change| > 10%."
        }
        SpecialistRole::MomentumTrader => {
            "## INTERPRETATION RULES\n\n\
             You ride strength and sell weakness.\n\
             - 24h change >= 5%: strong continuation → STRONG_BUY\n\
             - 24h change 1-5%: trend forming → BUY\n\
             - 24h change within ±1%: no trend → HOLD\n\
             - 24h change -1 to -5%: trend rolling over → SELL\n\
             - 24h change <= -5%: breakdown → STRONG_SELL\n\
             - Rising volume confirms the move → +0.10 confidence\n\n\
             ## WARNING CONDITIONS\n\n\
             Flag \"Momentum without volume\" when the move is large but volume is absent."
        }
        SpecialistRole::MeanReversion => {
            "## INTERPRETATION RULES\n\n\
             You fade overextension.\n\
             - 24h change >= 8%: stretched → SELL (STRONG_SELL beyond 15%)\n\
             - 24h change <= -8%: washed out → BUY (STRONG_BUY beyond -15%)\n\
             - 24h change within ±3%: inside the range → HOLD\n\
             - Between 3% and 8% either way: lean against the move with low confidence\n\n\
             ## WARNING CONDITIONS\n\n\
             Flag \"Catching a falling knife\" when buying into a drop steeper than 15%."
        }
        SpecialistRole::SentimentAnalyzer => {
            "## INTERPRETATION RULES\n\n\
             You read crowd psychology from the trigger reason and any sentiment fields in \
             market_data.\n\
             - Score > 0.5 or euphoric language (\"moon\", \"breakout\", \"ATH\"): bullish → BUY\n\
             - Score < -0.5 or fearful language (\"exploit\", \"hack\", \"delist\", \
             \"liquidation\"): bearish → SELL\n\
             - Extreme readings (|score| > 0.8) with a matching price move: strong variants\n\
             - No sentiment signal: HOLD with confidence <= 0.4\n\n\
             ## WARNING CONDITIONS\n\n\
             Flag \"Crowded trade\" when sentiment is extreme and price already moved 10%+."
        }
        SpecialistRole::TechnicalAnalyst => {
            "## INTERPRETATION RULES\n\n\
             You trust the chart. Use indicator fields in market_data when present \
             (rsi, sma, ema, macd).\n\
             - RSI < 30: oversold → BUY; RSI < 20 → STRONG_BUY\n\
             - RSI > 70: overbought → SELL; RSI > 80 → STRONG_SELL\n\
             - EMA > SMA (golden cross): +0.10 toward BUY\n\
             - EMA < SMA (death cross): +0.10 toward SELL\n\
             - Without indicators, read the 24h change as trend: > 2% BUY, < -2% SELL\n\n\
             ## WARNING CONDITIONS\n\n\
             Flag \"Death cross with active downtrend\" when EMA < SMA and price is falling."
        }
        SpecialistRole::VolatilitySpecialist => {
            "## INTERPRETATION RULES\n\n\
             You think in ranges. Large realized moves mean wide distributions, not conviction.\n\
             - |24h change| > 8%: volatility expansion → HOLD or trim (SELL), confidence <= 0.6\n\
             - |24h change| < 2% after a quiet period: compression, breakout likely → follow the \
             direction of the trigger with low confidence\n\
             - 2-8%: normal regime → follow the move with moderate confidence\n\n\
             ## WARNING CONDITIONS\n\n\
             Flag \"Volatility expansion\" when |24h change| > 8%."
        }
    }
}

/// Full system prompt: role, expertise, personality, rules and the response schema.
pub fn system_prompt(definition: &SpecialistDefinition) -> String {
    format!(
        "You are {name}, a {role} specialist on a trading deliberation panel. Several \
         independent specialists analyze the same trigger; their votes are combined under \
         fixed weights.\n\n\
         ## EXPERTISE\n\n{expertise}\n\n\
         ## PERSONALITY\n\n{personality}\n\n\
         {rules}\n\n\
         ## CONFIDENCE\n\n\
         Confidence is how sure you are of your action, between 0.0 and 1.0. Use 0.5 for a \
         coin-flip lean and stay below 0.4 when data is missing.\n\n\
         You MUST respond with ONLY a JSON object matching this schema:\n{schema}",
        name = definition.name,
        role = definition.role,
        expertise = definition.expertise,
        personality = definition.personality,
        rules = role_rules(definition.role),
        schema = response_schema(),
    )
}

/// User prompt: the trigger snapshot and whatever the swarm has learned.
pub fn user_prompt(trigger: &TriggerContext, learnings: &[Learning]) -> String {
    let snapshot = serde_json::to_string_pretty(trigger).unwrap_or_default();
    let mut prompt = format!("## TRIGGER\n\n{snapshot}\n");

    if !learnings.is_empty() {
        prompt.push_str("\n## LESSONS FROM PAST DECISIONS\n\n");
        for learning in learnings {
            prompt.push_str("- ");
            prompt.push_str(&learning.text);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nRespond with your vote as JSON.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use swarm_models::{MomentumBucket, PatternPolarity};
    use uuid::Uuid;

    #[test]
    fn every_role_has_rules_and_warnings() {
        for role in SpecialistRole::ALL {
            let rules = role_rules(role);
            assert!(rules.contains("INTERPRETATION RULES"), "{role}");
            assert!(rules.contains("WARNING CONDITIONS"), "{role}");
        }
    }

    #[test]
    fn system_prompt_folds_in_definition() {
        let roster = SpecialistDefinition::default_roster();
        let risk = &roster[0];
        let prompt = system_prompt(risk);
        assert!(prompt.contains("Risk Assessor"));
        assert!(prompt.contains(&risk.expertise));
        assert!(prompt.contains(&risk.personality));
        assert!(prompt.contains("\"action\""));
        assert!(prompt.contains("Tail move"));
    }

    #[test]
    fn user_prompt_lists_learnings() {
        let trigger = TriggerContext::new("SOL", dec!(142.5), "6% in an hour");
        let without = user_prompt(&trigger, &[]);
        assert!(without.contains("\"symbol\": \"SOL\""));
        assert!(!without.contains("LESSONS"));

        let learning = Learning {
            id: Uuid::new_v4(),
            symbol: "SOL".to_string(),
            pattern_key: "SOL|buy|strong_up|consensus".to_string(),
            momentum: MomentumBucket::StrongUp,
            polarity: PatternPolarity::Failure,
            support: 3,
            text: "Failed 3 times: buying SOL after a sharp rally".to_string(),
            derived_at: swarm_models::utc_now(),
        };
        let with = user_prompt(&trigger, &[learning]);
        assert!(with.contains("LESSONS FROM PAST DECISIONS"));
        assert!(with.contains("- Failed 3 times"));
    }
}
