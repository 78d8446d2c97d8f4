use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The fixed set of analytical roles a specialist can fill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistRole {
    RiskAssessor,
    MomentumTrader,
    MeanReversion,
    SentimentAnalyzer,
    TechnicalAnalyst,
    VolatilitySpecialist,
}

impl SpecialistRole {
    pub const ALL: [SpecialistRole; 6] = [
        SpecialistRole::RiskAssessor,
        SpecialistRole::MomentumTrader,
        SpecialistRole::MeanReversion,
        SpecialistRole::SentimentAnalyzer,
        SpecialistRole::TechnicalAnalyst,
        SpecialistRole::VolatilitySpecialist,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RiskAssessor => "risk_assessor",
            Self::MomentumTrader => "momentum_trader",
            Self::MeanReversion => "mean_reversion",
            Self::SentimentAnalyzer => "sentiment_analyzer",
            Self::TechnicalAnalyst => "technical_analyst",
            Self::VolatilitySpecialist => "volatility_specialist",
        }
    }
}

impl fmt::Display for SpecialistRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialistRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| format!("unknown specialist role: {s}"))
    }
}

/// Which reasoning backend a specialist is bound to.
///
/// Chosen once at registration; the adapter never branches on it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSpec {
    /// The `claude` command line client.
    ClaudeCli {
        #[serde(default = "default_claude_model")]
        model: String,
    },
    /// Any endpoint speaking the OpenAI chat-completions protocol.
    OpenAiCompatible {
        base_url: String,
        model: String,
        /// Environment variable holding the bearer token.
        #[serde(default = "default_api_key_env")]
        api_key_env: String,
    },
    /// Deterministic offline rules over the trigger snapshot.
    Heuristic,
}

impl Default for BackendSpec {
    fn default() -> Self {
        Self::ClaudeCli {
            model: default_claude_model(),
        }
    }
}

impl BackendSpec {
    pub fn label(&self) -> String {
        match self {
            Self::ClaudeCli { model } => format!("claude_cli:{model}"),
            Self::OpenAiCompatible { model, .. } => format!("open_ai_compatible:{model}"),
            Self::Heuristic => "heuristic".to_string(),
        }
    }
}

fn default_claude_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Static definition of one specialist on the roster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecialistDefinition {
    /// Stable slug, referenced by every message and vote the specialist ever cast.
    pub id: String,
    pub name: String,
    pub role: SpecialistRole,
    #[serde(default)]
    pub backend: BackendSpec,
    pub expertise: String,
    #[serde(default)]
    pub personality: String,
    /// Positive, static for the lifetime of the deployment.
    pub voting_weight: Decimal,
    /// Exponential moving average of directional hits, 0.0 to 1.0.
    #[serde(default = "default_accuracy")]
    pub accuracy: Decimal,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_accuracy() -> Decimal {
    Decimal::new(5, 1)
}

fn default_true() -> bool {
    true
}

impl SpecialistDefinition {
    pub fn new(
        id: &str,
        name: &str,
        role: SpecialistRole,
        voting_weight: Decimal,
        expertise: &str,
        personality: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role,
            backend: BackendSpec::default(),
            expertise: expertise.to_string(),
            personality: personality.to_string(),
            voting_weight,
            accuracy: default_accuracy(),
            active: true,
        }
    }

    pub fn with_backend(mut self, backend: BackendSpec) -> Self {
        self.backend = backend;
        self
    }

    /// The six-member roster seeded at deployment. Total weight 6.8.
    pub fn default_roster() -> Vec<SpecialistDefinition> {
        vec![
            SpecialistDefinition::new(
                "risk-assessor",
                "Risk Assessor",
                SpecialistRole::RiskAssessor,
                Decimal::new(15, 1),
                "Downside scenarios, drawdown limits, liquidity and tail risk. Sizes the \
                 worst case before the best case.",
                "Conservative and skeptical. Demands evidence before endorsing exposure.",
            ),
            SpecialistDefinition::new(
                "momentum-trader",
                "Momentum Trader",
                SpecialistRole::MomentumTrader,
                Decimal::new(12, 1),
                "Trend persistence, breakouts and volume-confirmed continuation moves.",
                "Decisive and fast. Prefers riding strength over predicting reversals.",
            ),
            SpecialistDefinition::new(
                "mean-reversion",
                "Mean Reversion Analyst",
                SpecialistRole::MeanReversion,
                Decimal::new(10, 1),
                "Overextension relative to recent ranges and the odds of snapping back.",
                "Contrarian. Fades crowded moves and distrusts euphoria.",
            ),
            SpecialistDefinition::new(
                "sentiment-analyzer",
                "Sentiment Analyzer",
                SpecialistRole::SentimentAnalyzer,
                Decimal::new(10, 1),
                "News flow, social chatter and positioning as drivers of short-term flows.",
                "Attentive to narrative shifts; weighs crowd psychology heavily.",
            ),
            SpecialistDefinition::new(
                "technical-analyst",
                "Technical Analyst",
                SpecialistRole::TechnicalAnalyst,
                Decimal::new(11, 1),
                "Price structure, support and resistance, oscillators and moving averages.",
                "Methodical. Trusts the chart over the story.",
            ),
            SpecialistDefinition::new(
                "volatility-specialist",
                "Volatility Specialist",
                SpecialistRole::VolatilitySpecialist,
                Decimal::new(10, 1),
                "Realized versus implied volatility regimes and what they imply for timing.",
                "Calm and probabilistic. Thinks in ranges rather than targets.",
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_roster_has_six_roles_and_total_weight() {
        let roster = SpecialistDefinition::default_roster();
        assert_eq!(roster.len(), 6);
        let total: Decimal = roster.iter().map(|s| s.voting_weight).sum();
        assert_eq!(total, dec!(6.8));
        for role in SpecialistRole::ALL {
            assert!(roster.iter().any(|s| s.role == role), "missing {role}");
        }
    }

    #[test]
    fn role_parses_hyphenated_and_snake() {
        assert_eq!(
            "risk-assessor".parse::<SpecialistRole>().unwrap(),
            SpecialistRole::RiskAssessor
        );
        assert_eq!(
            "Volatility_Specialist".parse::<SpecialistRole>().unwrap(),
            SpecialistRole::VolatilitySpecialist
        );
        assert!("astrologer".parse::<SpecialistRole>().is_err());
    }

    #[test]
    fn backend_spec_is_tagged() {
        let json = serde_json::to_value(BackendSpec::OpenAiCompatible {
            base_url: "http://localhost:8000/v1".to_string(),
            model: "qwen".to_string(),
            api_key_env: "KEY".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "open_ai_compatible");

        let heuristic: BackendSpec = serde_json::from_str(r#"{"kind": "heuristic"}"#).unwrap();
        assert_eq!(heuristic, BackendSpec::Heuristic);

        let claude: BackendSpec = serde_json::from_str(r#"{"kind": "claude_cli"}"#).unwrap();
        assert_eq!(claude, BackendSpec::default());
    }
}
