use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::Decision;
use crate::specialist::SpecialistRole;
use crate::trigger::TriggerContext;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebateStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl DebateStatus {
    pub const ALL: [DebateStatus; 4] = [
        DebateStatus::Pending,
        DebateStatus::InProgress,
        DebateStatus::Completed,
        DebateStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown debate status: {s}"))
    }
}

/// Discrete directional recommendation.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteAction {
    StrongSell,
    Sell,
    Hold,
    Buy,
    StrongBuy,
}

/// Directional family used for consensus: strong and plain variants agree.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ActionFamily {
    Sell,
    Hold,
    Buy,
}

impl ActionFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sell => "sell",
            Self::Hold => "hold",
            Self::Buy => "buy",
        }
    }
}

impl VoteAction {
    pub const ALL: [VoteAction; 5] = [
        VoteAction::StrongSell,
        VoteAction::Sell,
        VoteAction::Hold,
        VoteAction::Buy,
        VoteAction::StrongBuy,
    ];

    /// Signed scalar: STRONG_SELL=-2 .. STRONG_BUY=+2.
    pub fn scalar(self) -> Decimal {
        match self {
            Self::StrongSell => Decimal::from(-2),
            Self::Sell => Decimal::NEGATIVE_ONE,
            Self::Hold => Decimal::ZERO,
            Self::Buy => Decimal::ONE,
            Self::StrongBuy => Decimal::from(2),
        }
    }

    pub fn family(self) -> ActionFamily {
        match self {
            Self::StrongSell | Self::Sell => ActionFamily::Sell,
            Self::Hold => ActionFamily::Hold,
            Self::Buy | Self::StrongBuy => ActionFamily::Buy,
        }
    }

    /// Map a normalized score in [-2, 2] back onto an action.
    pub fn from_score(score: Decimal) -> Self {
        let magnitude = score.abs();
        if magnitude < Decimal::new(5, 1) {
            Self::Hold
        } else if magnitude < Decimal::new(15, 1) {
            if score.is_sign_positive() {
                Self::Buy
            } else {
                Self::Sell
            }
        } else if score.is_sign_positive() {
            Self::StrongBuy
        } else {
            Self::StrongSell
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongSell => "STRONG_SELL",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::Buy => "BUY",
            Self::StrongBuy => "STRONG_BUY",
        }
    }
}

impl fmt::Display for VoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteAction {
    type Err = String;

    /// Accepts `STRONG_BUY`, `strong-buy`, `Strong Buy` and friends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == normalized)
            .ok_or_else(|| format!("unknown vote action: {s}"))
    }
}

/// A specialist as it stood when the debate was convened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RosterEntry {
    pub specialist_id: String,
    pub role: SpecialistRole,
    pub voting_weight: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Debate {
    pub id: Uuid,
    pub trigger: TriggerContext,
    /// Every specialist active at creation. Aggregation weights come from here.
    pub roster: Vec<RosterEntry>,
    pub status: DebateStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub consensus_reached: bool,
    pub final_action: Option<VoteAction>,
    pub final_confidence: Option<Decimal>,
    pub failure_reason: Option<String>,
}

impl Debate {
    pub fn new(trigger: TriggerContext, roster: Vec<RosterEntry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            roster,
            status: DebateStatus::Pending,
            started_at: crate::utc_now(),
            completed_at: None,
            consensus_reached: false,
            final_action: None,
            final_confidence: None,
            failure_reason: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.trigger.symbol
    }

    pub fn total_active_weight(&self) -> Decimal {
        self.roster.iter().map(|entry| entry.voting_weight).sum()
    }

    pub fn weight_of(&self, specialist_id: &str) -> Option<Decimal> {
        self.roster
            .iter()
            .find(|entry| entry.specialist_id == specialist_id)
            .map(|entry| entry.voting_weight)
    }
}

/// A specialist's natural-language analysis, in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateMessage {
    pub debate_id: Uuid,
    pub specialist_id: String,
    pub role: SpecialistRole,
    pub analysis: String,
    /// True when the backend output could not be parsed and was coerced to HOLD.
    pub degraded: bool,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub debate_id: Uuid,
    pub specialist_id: String,
    pub action: VoteAction,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AbstentionReason {
    Timeout,
    BackendError,
    Deadline,
}

impl AbstentionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::BackendError => "backend_error",
            Self::Deadline => "deadline",
        }
    }
}

impl FromStr for AbstentionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(Self::Timeout),
            "backend_error" => Ok(Self::BackendError),
            "deadline" => Ok(Self::Deadline),
            other => Err(format!("unknown abstention reason: {other}")),
        }
    }
}

/// A specialist that produced no timely vote. Counted as non-participation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Abstention {
    pub debate_id: Uuid,
    pub specialist_id: String,
    pub reason: AbstentionReason,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

/// The full deliberation trace of one debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateRecord {
    pub debate: Debate,
    pub messages: Vec<DebateMessage>,
    pub votes: Vec<Vote>,
    pub abstentions: Vec<Abstention>,
    pub decision: Option<Decision>,
}
