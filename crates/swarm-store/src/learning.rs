use std::collections::HashSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rust_decimal::Decimal;
use serde::Serialize;
use swarm_models::schema::memory_kinds;
use swarm_models::{
    ActionFamily, Decision, DecisionLogEntry, Learning, MemoryConfig, MemorySnapshot,
    MomentumBucket, Outcome, PatternFeatures, PatternPolarity, PatternRecord, ResolvedDecision,
    TriggerContext, VoteAction,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::recorder::DecisionRecorder;

/// True when the realized move agrees with the predicted direction.
///
/// A HOLD is a hit when the absolute move stays inside `hold_band_pct`.
pub fn directional_hit(action: VoteAction, realized_change_pct: Decimal, hold_band_pct: Decimal) -> bool {
    match action.family() {
        ActionFamily::Buy => realized_change_pct > Decimal::ZERO,
        ActionFamily::Sell => realized_change_pct < Decimal::ZERO,
        ActionFamily::Hold => realized_change_pct.abs() < hold_band_pct,
    }
}

/// What `resolve` appended.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub resolved: ResolvedDecision,
    pub pattern: PatternRecord,
    /// Set when this resolution pushed its pattern over the support threshold.
    pub learning: Option<Learning>,
}

#[derive(Default)]
struct MemoryState {
    decisions: Vec<DecisionLogEntry>,
    resolved: Vec<ResolvedDecision>,
    successes: Vec<PatternRecord>,
    failures: Vec<PatternRecord>,
    learnings: Vec<Learning>,
    resolved_ids: HashSet<Uuid>,
    /// `(kind, json)` appends not yet written to the recorder.
    unflushed: Vec<(String, String)>,
}

impl MemoryState {
    fn push<T: Serialize>(&mut self, kind: &str, entry: &T) -> Result<(), StoreError> {
        self.unflushed
            .push((kind.to_string(), serde_json::to_string(entry)?));
        Ok(())
    }

    fn patterns(&self, polarity: PatternPolarity) -> &[PatternRecord] {
        match polarity {
            PatternPolarity::Success => &self.successes,
            PatternPolarity::Failure => &self.failures,
        }
    }

    fn replay(&mut self, kind: &str, json: &str) -> Result<(), StoreError> {
        match kind {
            memory_kinds::DECISION => self.decisions.push(serde_json::from_str(json)?),
            memory_kinds::RESOLVED => {
                let resolved: ResolvedDecision = serde_json::from_str(json)?;
                self.resolved_ids.insert(resolved.decision_id);
                self.resolved.push(resolved);
            }
            memory_kinds::SUCCESS_PATTERN => self.successes.push(serde_json::from_str(json)?),
            memory_kinds::FAILURE_PATTERN => self.failures.push(serde_json::from_str(json)?),
            memory_kinds::LEARNING => self.learnings.push(serde_json::from_str(json)?),
            other => warn!(kind = other, "skipping unknown memory entry"),
        }
        Ok(())
    }
}

/// Append-only memory of decisions, outcomes, patterns and distilled learnings.
///
/// Writers serialize under the write lock; readers run concurrently. Nothing
/// is ever removed or rewritten, so the learning set only grows.
pub struct MemoryStore {
    config: MemoryConfig,
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config,
            state: RwLock::new(MemoryState::default()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::Unavailable(format!("memory lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::Unavailable(format!("memory lock poisoned: {e}")))
    }

    /// Load every persisted entry. Entries appended before `init` are kept
    /// after the persisted ones.
    pub fn init(&self, recorder: &DecisionRecorder) -> Result<(), StoreError> {
        let entries = recorder.load_memory()?;
        let mut loaded = MemoryState::default();
        for (kind, json) in &entries {
            loaded.replay(kind, json)?;
        }

        let mut state = self.write()?;
        let pending = std::mem::take(&mut state.unflushed);
        for (kind, json) in &pending {
            loaded.replay(kind, json)?;
        }
        loaded.unflushed = pending;
        *state = loaded;

        info!(
            decisions = state.decisions.len(),
            resolved = state.resolved.len(),
            learnings = state.learnings.len(),
            "memory store loaded"
        );
        Ok(())
    }

    /// Persist appends made since the last flush.
    pub fn flush(&self, recorder: &DecisionRecorder) -> Result<usize, StoreError> {
        let batch = std::mem::take(&mut self.write()?.unflushed);
        if batch.is_empty() {
            return Ok(0);
        }

        if let Err(e) = recorder.append_memory(&batch) {
            let mut state = self.write()?;
            let newer = std::mem::replace(&mut state.unflushed, batch);
            state.unflushed.extend(newer);
            return Err(e);
        }
        debug!(entries = batch.len(), "memory flushed");
        Ok(batch.len())
    }

    /// Append a completed decision to the decision log.
    pub fn observe(&self, decision: &Decision) -> Result<(), StoreError> {
        let entry = DecisionLogEntry {
            decision_id: decision.id,
            debate_id: decision.debate_id,
            symbol: decision.symbol.clone(),
            action: decision.action,
            confidence: decision.confidence,
            consensus_reached: decision.consensus_reached,
            decided_at: decision.decided_at,
        };
        let mut state = self.write()?;
        state.push(memory_kinds::DECISION, &entry)?;
        state.decisions.push(entry);
        Ok(())
    }

    /// Classify a decision against its realized outcome, record the pattern
    /// and distill a learning if the pattern has enough support.
    ///
    /// Returns `None` if the decision was already resolved.
    pub fn resolve(
        &self,
        decision: &Decision,
        trigger: &TriggerContext,
        outcome: &Outcome,
    ) -> Result<Option<Resolution>, StoreError> {
        let success = directional_hit(
            decision.action,
            outcome.realized_change_pct,
            self.config.hold_band_pct,
        );
        let polarity = if success {
            PatternPolarity::Success
        } else {
            PatternPolarity::Failure
        };

        let resolved = ResolvedDecision {
            decision_id: decision.id,
            debate_id: decision.debate_id,
            symbol: decision.symbol.clone(),
            action: decision.action,
            confidence: decision.confidence,
            realized_change_pct: outcome.realized_change_pct,
            success,
            resolved_at: outcome.resolved_at,
        };
        let pattern = PatternRecord {
            decision_id: decision.id,
            features: PatternFeatures {
                symbol: decision.symbol.clone(),
                family: decision.action.family(),
                momentum: MomentumBucket::from_change_pct(trigger.price_change_24h),
                consensus: decision.consensus_reached,
            },
            polarity,
            realized_change_pct: outcome.realized_change_pct,
            recorded_at: outcome.resolved_at,
        };

        let mut state = self.write()?;
        if !state.resolved_ids.insert(decision.id) {
            return Ok(None);
        }

        state.push(memory_kinds::RESOLVED, &resolved)?;
        state.resolved.push(resolved.clone());
        match polarity {
            PatternPolarity::Success => {
                state.push(memory_kinds::SUCCESS_PATTERN, &pattern)?;
                state.successes.push(pattern.clone());
            }
            PatternPolarity::Failure => {
                state.push(memory_kinds::FAILURE_PATTERN, &pattern)?;
                state.failures.push(pattern.clone());
            }
        }

        let learning = self.distill(&mut state, &pattern)?;
        Ok(Some(Resolution {
            resolved,
            pattern,
            learning,
        }))
    }

    fn distill(
        &self,
        state: &mut MemoryState,
        pattern: &PatternRecord,
    ) -> Result<Option<Learning>, StoreError> {
        let key = pattern.features.key();
        let support = state
            .patterns(pattern.polarity)
            .iter()
            .filter(|p| p.features.key() == key)
            .count();
        let support = u32::try_from(support).unwrap_or(u32::MAX);
        if support < self.config.min_pattern_support {
            return Ok(None);
        }
        if state
            .learnings
            .iter()
            .any(|l| l.pattern_key == key && l.polarity == pattern.polarity)
        {
            return Ok(None);
        }

        let description = pattern.features.describe();
        let text = match pattern.polarity {
            PatternPolarity::Success => {
                format!("Worked {support} times: {description} was followed by a move in the called direction.")
            }
            PatternPolarity::Failure => {
                format!("Failed {support} times: {description} was followed by a move against the call. Demand stronger evidence before repeating it.")
            }
        };
        let learning = Learning {
            id: Uuid::new_v4(),
            symbol: pattern.features.symbol.clone(),
            pattern_key: key,
            momentum: pattern.features.momentum,
            polarity: pattern.polarity,
            support,
            text,
            derived_at: swarm_models::utc_now(),
        };
        info!(pattern = %learning.pattern_key, support, "learning distilled");
        state.push(memory_kinds::LEARNING, &learning)?;
        state.learnings.push(learning.clone());
        Ok(Some(learning))
    }

    /// Learnings for a prompt: same symbol first, then the same momentum
    /// regime on other symbols. Newest first within each group.
    pub fn relevant_learnings(
        &self,
        symbol: &str,
        momentum: MomentumBucket,
        limit: usize,
    ) -> Result<Vec<Learning>, StoreError> {
        let state = self.read()?;
        let same_symbol = state.learnings.iter().rev().filter(|l| l.symbol == symbol);
        let same_regime = state
            .learnings
            .iter()
            .rev()
            .filter(|l| l.symbol != symbol && l.momentum == momentum);
        Ok(same_symbol.chain(same_regime).take(limit).cloned().collect())
    }

    /// The most recent `limit` entries of every log, plus all learnings.
    pub fn snapshot(&self, limit: usize) -> Result<MemorySnapshot, StoreError> {
        fn tail<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
            items[items.len().saturating_sub(limit)..].to_vec()
        }

        let state = self.read()?;
        Ok(MemorySnapshot {
            recent_decisions: tail(&state.decisions, limit),
            resolved: tail(&state.resolved, limit),
            successful_patterns: tail(&state.successes, limit),
            failed_patterns: tail(&state.failures, limit),
            learnings: state.learnings.clone(),
        })
    }

    /// Whether an outcome for this decision has been folded in.
    pub fn is_resolved(&self, decision_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.read()?.resolved_ids.contains(&decision_id))
    }

    pub fn learning_count(&self) -> usize {
        self.read().map(|s| s.learnings.len()).unwrap_or_default()
    }

    pub fn unflushed_count(&self) -> usize {
        self.read().map(|s| s.unflushed.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn decision(symbol: &str, action: VoteAction, consensus: bool) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            debate_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            action,
            confidence: dec!(0.6),
            score: action.scalar(),
            consensus_reached: consensus,
            participating_weight: dec!(4),
            decided_at: swarm_models::utc_now(),
            executed: false,
            outcome: None,
        }
    }

    fn trigger(symbol: &str, change: Decimal) -> TriggerContext {
        let mut trigger = TriggerContext::new(symbol, dec!(100), "test");
        trigger.price_change_24h = Some(change);
        trigger
    }

    fn outcome(change: Decimal) -> Outcome {
        Outcome {
            realized_change_pct: change,
            resolved_at: swarm_models::utc_now(),
            note: None,
        }
    }

    fn store(min_support: u32) -> MemoryStore {
        MemoryStore::new(MemoryConfig {
            min_pattern_support: min_support,
            ..Default::default()
        })
    }

    #[test]
    fn hits_follow_direction_and_hold_band() {
        let band = dec!(1);
        assert!(directional_hit(VoteAction::Buy, dec!(0.3), band));
        assert!(!directional_hit(VoteAction::StrongBuy, dec!(-2), band));
        assert!(directional_hit(VoteAction::StrongSell, dec!(-4), band));
        assert!(!directional_hit(VoteAction::Sell, dec!(0), band));
        assert!(directional_hit(VoteAction::Hold, dec!(-0.9), band));
        assert!(!directional_hit(VoteAction::Hold, dec!(1), band));
    }

    #[test]
    fn resolution_is_recorded_once() {
        let memory = store(3);
        let d = decision("SOL", VoteAction::Buy, true);
        assert!(!memory.is_resolved(d.id).unwrap());
        let first = memory
            .resolve(&d, &trigger("SOL", dec!(6)), &outcome(dec!(2)))
            .unwrap()
            .unwrap();
        assert!(first.resolved.success);
        assert_eq!(first.pattern.polarity, PatternPolarity::Success);
        assert_eq!(first.pattern.features.key(), "SOL|buy|strong_up|consensus");

        assert!(memory
            .resolve(&d, &trigger("SOL", dec!(6)), &outcome(dec!(-9)))
            .unwrap()
            .is_none());
        assert_eq!(memory.snapshot(10).unwrap().resolved.len(), 1);
        assert!(memory.is_resolved(d.id).unwrap());
    }

    #[test]
    fn learning_distilled_once_at_support_threshold() {
        let memory = store(3);
        let mut distilled = Vec::new();
        for _ in 0..5 {
            let d = decision("SOL", VoteAction::Buy, true);
            let resolution = memory
                .resolve(&d, &trigger("SOL", dec!(7)), &outcome(dec!(-3)))
                .unwrap()
                .unwrap();
            distilled.push(resolution.learning.is_some());
        }
        assert_eq!(distilled, vec![false, false, true, false, false]);

        let snapshot = memory.snapshot(10).unwrap();
        assert_eq!(snapshot.failed_patterns.len(), 5);
        assert_eq!(snapshot.learnings.len(), 1);
        let learning = &snapshot.learnings[0];
        assert_eq!(learning.polarity, PatternPolarity::Failure);
        assert_eq!(learning.support, 3);
        assert!(learning.text.contains("buying SOL"));
    }

    #[test]
    fn learnings_never_shrink() {
        let memory = store(1);
        let mut previous = 0;
        for (i, change) in [dec!(2), dec!(-2), dec!(6), dec!(-6), dec!(0)].iter().enumerate() {
            let action = if i % 2 == 0 { VoteAction::Buy } else { VoteAction::Sell };
            let d = decision("ETH", action, i % 3 == 0);
            memory
                .resolve(&d, &trigger("ETH", *change), &outcome(*change))
                .unwrap();
            let count = memory.learning_count();
            assert!(count >= previous);
            previous = count;
        }
        assert!(previous > 0);
    }

    #[test]
    fn relevant_learnings_prefer_symbol_then_regime() {
        let memory = store(1);
        for (symbol, change) in [("BTC", dec!(6)), ("SOL", dec!(6)), ("ETH", dec!(-6))] {
            let d = decision(symbol, VoteAction::Buy, true);
            memory
                .resolve(&d, &trigger(symbol, change), &outcome(dec!(1)))
                .unwrap();
        }

        let learnings = memory
            .relevant_learnings("SOL", MomentumBucket::StrongUp, 5)
            .unwrap();
        let symbols: Vec<&str> = learnings.iter().map(|l| l.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["SOL", "BTC"]);

        let limited = memory
            .relevant_learnings("SOL", MomentumBucket::StrongUp, 1)
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn snapshot_returns_recent_tail() {
        let memory = store(3);
        let decisions: Vec<Decision> = (0..4)
            .map(|_| decision("ADA", VoteAction::Hold, false))
            .collect();
        for d in &decisions {
            memory.observe(d).unwrap();
        }
        let snapshot = memory.snapshot(2).unwrap();
        assert_eq!(snapshot.recent_decisions.len(), 2);
        assert_eq!(snapshot.recent_decisions[1].decision_id, decisions[3].id);
    }

    #[test]
    fn flush_and_init_restore_state() {
        let recorder = DecisionRecorder::in_memory().unwrap();
        let memory = store(1);
        let d = decision("SOL", VoteAction::Sell, true);
        memory.observe(&d).unwrap();
        memory
            .resolve(&d, &trigger("SOL", dec!(-2)), &outcome(dec!(-4)))
            .unwrap();
        assert_eq!(memory.flush(&recorder).unwrap(), 4);
        assert_eq!(memory.unflushed_count(), 0);
        assert_eq!(memory.flush(&recorder).unwrap(), 0);

        let restored = store(1);
        restored.init(&recorder).unwrap();
        assert_eq!(restored.snapshot(10).unwrap(), memory.snapshot(10).unwrap());

        // Already resolved before the restart.
        assert!(restored
            .resolve(&d, &trigger("SOL", dec!(-2)), &outcome(dec!(-4)))
            .unwrap()
            .is_none());
    }
}
