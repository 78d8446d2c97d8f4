use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::debate::VoteAction;

/// The aggregated outcome of a COMPLETED debate. One per debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    pub debate_id: Uuid,
    pub symbol: String,
    pub action: VoteAction,
    /// 0.0 to 1.0, participation times individual certainty.
    pub confidence: Decimal,
    /// Normalized weighted score in [-2, 2].
    pub score: Decimal,
    pub consensus_reached: bool,
    /// Sum of weight times confidence over the specialists that voted.
    pub participating_weight: Decimal,
    pub decided_at: DateTime<Utc>,
    /// Set later by the execution collaborator.
    pub executed: bool,
    /// Set once the realized move is known.
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    /// Realized price change in percent over the evaluation horizon.
    pub realized_change_pct: Decimal,
    pub resolved_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Sent to the execution collaborator for every actionable decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRequest {
    pub decision_id: Uuid,
    pub debate_id: Uuid,
    pub symbol: String,
    pub action: VoteAction,
    pub confidence: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExecutionAck {
    pub executed: bool,
    pub note: Option<String>,
}

/// Aggregate counters over every recorded debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DebateStats {
    pub total_debates: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub decisions_by_action: BTreeMap<VoteAction, u64>,
    pub completed_with_consensus: u64,
    /// completed_with_consensus / completed, zero when nothing completed.
    pub consensus_rate: Decimal,
    pub executed_decisions: u64,
    pub resolved_decisions: u64,
    pub roster_size: usize,
    pub active_specialists: usize,
}

impl DebateStats {
    pub fn compute_consensus_rate(&mut self) {
        self.consensus_rate = if self.completed == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.completed_with_consensus) / Decimal::from(self.completed)
        };
    }
}
