use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::debate::{ActionFamily, VoteAction};

/// Coarse bucket of the 24h move at trigger time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MomentumBucket {
    StrongDown,
    Down,
    Flat,
    Up,
    StrongUp,
}

impl MomentumBucket {
    /// Buckets: <= -5%, <= -1%, within 1%, < 5%, >= 5%. Unknown change is flat.
    pub fn from_change_pct(change: Option<Decimal>) -> Self {
        let Some(change) = change else {
            return Self::Flat;
        };
        let five = Decimal::from(5);
        if change <= -five {
            Self::StrongDown
        } else if change <= Decimal::NEGATIVE_ONE {
            Self::Down
        } else if change < Decimal::ONE {
            Self::Flat
        } else if change < five {
            Self::Up
        } else {
            Self::StrongUp
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongDown => "strong_down",
            Self::Down => "down",
            Self::Flat => "flat",
            Self::Up => "up",
            Self::StrongUp => "strong_up",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::StrongDown => "a sharp 24h sell-off (5% or more)",
            Self::Down => "a moderate 24h decline",
            Self::Flat => "a flat 24h tape",
            Self::Up => "a moderate 24h rally",
            Self::StrongUp => "a sharp 24h rally (5% or more)",
        }
    }
}

/// Compact feature summary of a resolved decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PatternFeatures {
    pub symbol: String,
    pub family: ActionFamily,
    pub momentum: MomentumBucket,
    pub consensus: bool,
}

impl PatternFeatures {
    /// Stable grouping key, e.g. `SOL|buy|strong_up|consensus`.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.symbol,
            self.family.as_str(),
            self.momentum.as_str(),
            if self.consensus { "consensus" } else { "split" }
        )
    }

    pub fn describe(&self) -> String {
        let stance = match self.family {
            ActionFamily::Buy => "buying",
            ActionFamily::Sell => "selling",
            ActionFamily::Hold => "holding",
        };
        let agreement = if self.consensus {
            "with a clear consensus"
        } else {
            "on a split vote"
        };
        format!(
            "{stance} {} after {} {agreement}",
            self.symbol,
            self.momentum.describe()
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternPolarity {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternRecord {
    pub decision_id: Uuid,
    pub features: PatternFeatures,
    pub polarity: PatternPolarity,
    pub realized_change_pct: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// A decision whose outcome is known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedDecision {
    pub decision_id: Uuid,
    pub debate_id: Uuid,
    pub symbol: String,
    pub action: VoteAction,
    pub confidence: Decimal,
    pub realized_change_pct: Decimal,
    pub success: bool,
    pub resolved_at: DateTime<Utc>,
}

/// Entry in the append-only decision log, written at completion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionLogEntry {
    pub decision_id: Uuid,
    pub debate_id: Uuid,
    pub symbol: String,
    pub action: VoteAction,
    pub confidence: Decimal,
    pub consensus_reached: bool,
    pub decided_at: DateTime<Utc>,
}

/// A distilled heuristic fed back to specialists as prompt context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Learning {
    pub id: Uuid,
    pub symbol: String,
    pub pattern_key: String,
    pub momentum: MomentumBucket,
    pub polarity: PatternPolarity,
    /// Number of matching resolved decisions when the learning was distilled.
    pub support: u32,
    pub text: String,
    pub derived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MemorySnapshot {
    pub recent_decisions: Vec<DecisionLogEntry>,
    pub resolved: Vec<ResolvedDecision>,
    pub successful_patterns: Vec<PatternRecord>,
    pub failed_patterns: Vec<PatternRecord>,
    pub learnings: Vec<Learning>,
}
