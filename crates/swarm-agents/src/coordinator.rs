use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use swarm_models::{
    Abstention, AbstentionReason, Debate, DebateConfig, DebateMessage, DebateRecord, DebateStats,
    DebateStatus, Decision, DecisionRequest, ExecutionRequest, Learning, MemorySnapshot,
    MomentumBucket, Outcome, ResolvedDecision, SpecialistRole, TriggerContext, TriggerSource, Vote,
    VoteAction,
};
use swarm_store::{directional_hit, DecisionRecorder, MemoryStore, StoreError};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::adapter::{ReasonedVote, ReasoningAdapter, ReasoningFailure};
use crate::aggregator::decision_for;
use crate::error::CoordinatorError;
use crate::execution::ExecutionSink;
use crate::market::MarketIntel;
use crate::roster::{RosterMember, SpecialistRoster};
use crate::state::DebateState;

type Contribution = (String, SpecialistRole, Result<ReasonedVote, ReasoningFailure>);

/// What `record_outcome` changed.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub decision: Decision,
    pub resolved: ResolvedDecision,
    /// Set when this outcome pushed a pattern over the support threshold.
    pub learning: Option<Learning>,
    /// Updated accuracy of every specialist that voted.
    pub accuracy: BTreeMap<String, Decimal>,
}

/// Runs debates end to end: fan-out to the active roster, collect votes
/// until every specialist answered or the deadline passed, aggregate,
/// record, learn.
///
/// Cheap to clone; every debate runs on its own spawned task holding a
/// clone, so a caller that stops waiting never cancels a debate.
#[derive(Clone)]
pub struct DebateCoordinator {
    roster: Arc<SpecialistRoster>,
    recorder: Arc<DecisionRecorder>,
    memory: Arc<MemoryStore>,
    adapter: ReasoningAdapter,
    config: DebateConfig,
    market: Option<Arc<dyn MarketIntel>>,
    execution: Option<Arc<dyn ExecutionSink>>,
    live: Arc<Mutex<HashMap<Uuid, Arc<DebateState>>>>,
}

impl DebateCoordinator {
    pub fn new(
        roster: Arc<SpecialistRoster>,
        recorder: Arc<DecisionRecorder>,
        memory: Arc<MemoryStore>,
        config: DebateConfig,
    ) -> Self {
        Self {
            roster,
            recorder,
            memory,
            adapter: ReasoningAdapter::new(config.call_timeout()),
            config,
            market: None,
            execution: None,
            live: Arc::default(),
        }
    }

    pub fn with_market_intel(mut self, market: Arc<dyn MarketIntel>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_execution_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.execution = Some(sink);
        self
    }

    pub fn roster(&self) -> &SpecialistRoster {
        &self.roster
    }

    pub fn recorder(&self) -> &DecisionRecorder {
        &self.recorder
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Convene a debate and return its id immediately. The debate runs in the background.
    pub fn start_debate(&self, trigger: TriggerContext) -> Result<Uuid, CoordinatorError> {
        let (debate, members, state) = self.convene(trigger)?;
        let debate_id = debate.id;
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.deliberate(debate, members, state).await {
                error!(debate_id = %debate_id, error = %e, "Debate did not complete");
            }
        });
        Ok(debate_id)
    }

    /// Convene a debate and wait for its full trace.
    pub async fn run_debate(&self, trigger: TriggerContext) -> Result<DebateRecord, CoordinatorError> {
        let decision = self.run(trigger).await?;
        self.get_debate(decision.debate_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("debate {}", decision.debate_id)))
    }

    /// Synchronous decision: snapshot the market, debate, return the decision.
    pub async fn decide(&self, request: DecisionRequest) -> Result<Decision, CoordinatorError> {
        let market = self.market.as_ref().ok_or_else(|| {
            CoordinatorError::MarketIntel("no market intelligence provider configured".to_string())
        })?;
        let snapshot = market.snapshot(&request.symbol).await?;
        let mut trigger = TriggerContext::from_snapshot(
            &request.symbol,
            &snapshot,
            TriggerSource::Manual,
            "decision request",
        );
        annotate_request(&mut trigger.market_data, &request);
        self.run(trigger).await
    }

    async fn run(&self, trigger: TriggerContext) -> Result<Decision, CoordinatorError> {
        let (debate, members, state) = self.convene(trigger)?;
        let this = self.clone();
        tokio::spawn(async move { this.deliberate(debate, members, state).await })
            .await
            .map_err(|e| CoordinatorError::Task(e.to_string()))?
    }

    /// Record the debate, validate the trigger and move to IN_PROGRESS.
    ///
    /// An invalid trigger still leaves a FAILED debate behind.
    fn convene(
        &self,
        trigger: TriggerContext,
    ) -> Result<(Debate, Vec<RosterMember>, Arc<DebateState>), CoordinatorError> {
        let members = self.roster.active();
        let roster = members.iter().map(RosterMember::entry).collect();
        let debate = Debate::new(trigger, roster);
        self.recorder.create_debate(&debate)?;
        let state = Arc::new(DebateState::new(DebateStatus::Pending));

        if let Err(source) = debate.trigger.validate() {
            state.fail()?;
            self.recorder.mark_failed(debate.id, &source.to_string())?;
            warn!(debate_id = %debate.id, error = %source, "Rejected trigger");
            return Err(CoordinatorError::InvalidTrigger {
                debate_id: debate.id,
                source,
            });
        }

        state.start()?;
        if !self.recorder.mark_in_progress(debate.id)? {
            warn!(debate_id = %debate.id, "Debate row was not PENDING when starting");
        }
        self.track(debate.id, Arc::clone(&state));
        info!(
            debate_id = %debate.id,
            symbol = %debate.symbol(),
            specialists = members.len(),
            total_weight = %debate.total_active_weight(),
            "Debate started"
        );
        Ok((debate, members, state))
    }

    async fn deliberate(
        self,
        debate: Debate,
        members: Vec<RosterMember>,
        state: Arc<DebateState>,
    ) -> Result<Decision, CoordinatorError> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.deadline();
        let learnings = Arc::new(self.learnings_for(&debate.trigger));
        let trigger = Arc::new(debate.trigger.clone());

        let mut tasks: JoinSet<Contribution> = JoinSet::new();
        let mut outstanding: HashSet<String> = HashSet::new();
        for member in members {
            outstanding.insert(member.id().to_string());
            let adapter = self.adapter;
            let trigger = Arc::clone(&trigger);
            let learnings = Arc::clone(&learnings);
            tasks.spawn(async move {
                let result = adapter.reason(&member, &trigger, &learnings).await;
                (member.definition.id, member.definition.role, result)
            });
        }

        let mut deadline_hit = false;
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((specialist_id, role, result))) => {
                        outstanding.remove(&specialist_id);
                        self.record_contribution(debate.id, &specialist_id, role, result);
                    }
                    Some(Err(e)) => {
                        error!(debate_id = %debate.id, error = %e, "Specialist task failed");
                    }
                },
                _ = &mut sleep => {
                    tasks.abort_all();
                    deadline_hit = true;
                    warn!(
                        debate_id = %debate.id,
                        outstanding = outstanding.len(),
                        deadline_ms = self.config.deadline_ms,
                        "Debate deadline reached"
                    );
                    break;
                }
            }
        }

        // Stragglers, in roster order.
        for entry in &debate.roster {
            if !outstanding.contains(&entry.specialist_id) {
                continue;
            }
            let (reason, detail) = if deadline_hit {
                (
                    AbstentionReason::Deadline,
                    format!("no answer within the {}ms debate deadline", self.config.deadline_ms),
                )
            } else {
                (AbstentionReason::BackendError, "reasoning task failed".to_string())
            };
            if let Err(e) = self.abstain(debate.id, &entry.specialist_id, reason, detail) {
                self.log_rejected(debate.id, &entry.specialist_id, &e);
            }
        }

        let completed = self.complete(debate.id, &state).await;
        self.untrack(debate.id);
        let (decision, fresh) = completed?;
        info!(
            debate_id = %debate.id,
            action = %decision.action,
            confidence = %decision.confidence,
            consensus = decision.consensus_reached,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Debate completed"
        );
        if !fresh {
            return Ok(decision);
        }
        Ok(self.after_completion(decision).await)
    }

    fn learnings_for(&self, trigger: &TriggerContext) -> Vec<Learning> {
        let momentum = MomentumBucket::from_change_pct(trigger.price_change_24h);
        let limit = self.memory.config().learnings_per_prompt;
        self.memory
            .relevant_learnings(&trigger.symbol, momentum, limit)
            .unwrap_or_else(|e| {
                warn!(symbol = %trigger.symbol, error = %e, "Learnings unavailable");
                Vec::new()
            })
    }

    /// Persist one specialist's answer as soon as it arrives.
    fn record_contribution(
        &self,
        debate_id: Uuid,
        specialist_id: &str,
        role: SpecialistRole,
        result: Result<ReasonedVote, ReasoningFailure>,
    ) {
        let recorded = match result {
            Ok(vote) => {
                if vote.degraded {
                    warn!(debate_id = %debate_id, specialist = %specialist_id, "Degraded answer recorded as HOLD");
                }
                let now = swarm_models::utc_now();
                let cast = Vote {
                    debate_id,
                    specialist_id: specialist_id.to_string(),
                    action: vote.action,
                    confidence: vote.confidence,
                    cast_at: now,
                };
                let message = DebateMessage {
                    debate_id,
                    specialist_id: specialist_id.to_string(),
                    role,
                    analysis: vote.analysis,
                    degraded: vote.degraded,
                    elapsed_ms: vote.elapsed_ms,
                    created_at: now,
                };
                self.recorder
                    .cast_vote(&cast)
                    .and_then(|()| self.recorder.append_message(&message))
            }
            Err(failure) => {
                warn!(debate_id = %debate_id, specialist = %specialist_id, error = %failure, "Specialist abstained");
                self.abstain(
                    debate_id,
                    specialist_id,
                    failure.abstention_reason(),
                    failure.to_string(),
                )
            }
        };
        if let Err(e) = recorded {
            self.log_rejected(debate_id, specialist_id, &e);
        }
    }

    fn abstain(
        &self,
        debate_id: Uuid,
        specialist_id: &str,
        reason: AbstentionReason,
        detail: String,
    ) -> Result<(), StoreError> {
        self.recorder.record_abstention(&Abstention {
            debate_id,
            specialist_id: specialist_id.to_string(),
            reason,
            detail,
            recorded_at: swarm_models::utc_now(),
        })
    }

    fn log_rejected(&self, debate_id: Uuid, specialist_id: &str, e: &StoreError) {
        match e {
            StoreError::DuplicateVote { .. }
            | StoreError::DuplicateAbstention { .. }
            | StoreError::DebateClosed { .. } => {
                warn!(debate_id = %debate_id, specialist = %specialist_id, error = %e, "Contribution rejected");
            }
            _ => {
                error!(debate_id = %debate_id, specialist = %specialist_id, error = %e, "Failed to record contribution");
            }
        }
    }

    /// Aggregate the recorded votes and persist the decision.
    ///
    /// Returns the stored decision and whether this call created it. A debate
    /// that already completed yields its existing decision.
    async fn complete(
        &self,
        debate_id: Uuid,
        state: &DebateState,
    ) -> Result<(Decision, bool), CoordinatorError> {
        if let Err(e) = state.complete() {
            // Another caller holds the guard; the store still picks the one decision.
            if e.from != DebateStatus::Completed {
                return Err(e.into());
            }
        }
        self.persist(debate_id).await
    }

    async fn stored_decision(&self, debate_id: Uuid) -> Result<Option<Decision>, CoordinatorError> {
        Ok(self
            .recorder
            .get_debate(debate_id)
            .await?
            .and_then(|record| record.decision))
    }

    /// Aggregate and record in one store transaction, retrying with linear backoff.
    async fn persist(&self, debate_id: Uuid) -> Result<(Decision, bool), CoordinatorError> {
        let attempts = self.config.persist_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.recorder.complete_from_votes(debate_id, decision_for) {
                Ok(stored) => return Ok(stored),
                Err(e @ (StoreError::DebateClosed { .. } | StoreError::NotFound(_))) => {
                    return Err(e.into())
                }
                Err(e) if attempt < attempts => {
                    error!(debate_id = %debate_id, attempt, error = %e, "Failed to persist decision, retrying");
                    tokio::time::sleep(self.config.persist_backoff() * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(debate_id = %debate_id, attempts, error = %e, "Giving up on persisting decision");
                    return Err(e.into());
                }
            }
        }
    }

    /// Log the decision to memory and hand it to the execution sink.
    async fn after_completion(&self, decision: Decision) -> Decision {
        let logged = self
            .memory
            .observe(&decision)
            .and_then(|()| self.memory.flush(&self.recorder));
        if let Err(e) = logged {
            warn!(decision_id = %decision.id, error = %e, "Failed to log decision to memory");
        }

        match self.forward(&decision).await {
            Ok(Some(updated)) => updated,
            Ok(None) => decision,
            Err(e) => {
                warn!(decision_id = %decision.id, error = %e, "Execution forwarding failed");
                decision
            }
        }
    }

    async fn forward(&self, decision: &Decision) -> Result<Option<Decision>, CoordinatorError> {
        let Some(sink) = &self.execution else {
            return Ok(None);
        };
        if !self.config.forward_to_execution || decision.action == VoteAction::Hold {
            return Ok(None);
        }

        let ack = sink
            .submit(ExecutionRequest {
                decision_id: decision.id,
                debate_id: decision.debate_id,
                symbol: decision.symbol.clone(),
                action: decision.action,
                confidence: decision.confidence,
            })
            .await?;
        info!(decision_id = %decision.id, executed = ack.executed, note = ?ack.note, "Execution acknowledged");
        if !ack.executed {
            return Ok(None);
        }
        Ok(Some(self.recorder.set_executed(decision.id, true).await?))
    }

    /// Complete an IN_PROGRESS debate from whatever votes were recorded.
    ///
    /// Idempotent: a COMPLETED debate returns its stored decision, PENDING
    /// and FAILED debates return `None`.
    pub async fn finalize(&self, debate_id: Uuid) -> Result<Option<Decision>, CoordinatorError> {
        let status = self
            .recorder
            .debate_status(debate_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("debate {debate_id}")))?;

        match status {
            DebateStatus::Completed => self.stored_decision(debate_id).await,
            DebateStatus::Pending | DebateStatus::Failed => Ok(None),
            DebateStatus::InProgress => {
                let state = self.live_state(debate_id);
                let completed = self.complete(debate_id, &state).await;
                self.untrack(debate_id);
                let (decision, fresh) = completed?;
                info!(debate_id = %debate_id, action = %decision.action, fresh, "Debate finalized");
                if fresh {
                    Ok(Some(self.after_completion(decision).await))
                } else {
                    Ok(Some(decision))
                }
            }
        }
    }

    /// Finalize every debate a previous process left IN_PROGRESS.
    pub async fn recover(&self) -> Result<Vec<Decision>, CoordinatorError> {
        let mut recovered = Vec::new();
        for debate_id in self.recorder.unfinished_debates()? {
            if self.is_live(debate_id) {
                continue;
            }
            if let Some(decision) = self.finalize(debate_id).await? {
                recovered.push(decision);
            }
        }
        if !recovered.is_empty() {
            info!(count = recovered.len(), "Recovered unfinished debates");
        }
        Ok(recovered)
    }

    fn track(&self, debate_id: Uuid, state: Arc<DebateState>) {
        if let Ok(mut live) = self.live.lock() {
            live.insert(debate_id, state);
        }
    }

    fn untrack(&self, debate_id: Uuid) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&debate_id);
        }
    }

    fn is_live(&self, debate_id: Uuid) -> bool {
        self.live
            .lock()
            .map(|live| live.contains_key(&debate_id))
            .unwrap_or(false)
    }

    /// The running debate's guard, or a fresh one for a debate recovered from storage.
    fn live_state(&self, debate_id: Uuid) -> Arc<DebateState> {
        let fresh = || Arc::new(DebateState::new(DebateStatus::InProgress));
        match self.live.lock() {
            Ok(mut live) => Arc::clone(live.entry(debate_id).or_insert_with(fresh)),
            Err(_) => fresh(),
        }
    }

    pub async fn report_execution(
        &self,
        decision_id: Uuid,
        executed: bool,
    ) -> Result<Decision, CoordinatorError> {
        let decision = self.recorder.set_executed(decision_id, executed).await?;
        info!(decision_id = %decision_id, executed, "Execution reported");
        Ok(decision)
    }

    /// Attach the realized move to a decision, feed it to memory and update
    /// the accuracy of every specialist that voted.
    ///
    /// Returns `None` once the outcome has been fully applied. A call that
    /// failed after the outcome was stored can be repeated: it finishes the
    /// memory and accuracy updates from the stored outcome.
    pub async fn record_outcome(
        &self,
        decision_id: Uuid,
        realized_change_pct: Decimal,
        note: Option<String>,
    ) -> Result<Option<OutcomeReport>, CoordinatorError> {
        let decision = self
            .recorder
            .get_decision(decision_id)?
            .ok_or_else(|| CoordinatorError::NotFound(format!("decision {decision_id}")))?;

        let outcome = match &decision.outcome {
            Some(stored) => {
                if self.memory.is_resolved(decision_id)? {
                    self.memory.flush(&self.recorder)?;
                    info!(decision_id = %decision_id, "Outcome already recorded");
                    return Ok(None);
                }
                warn!(decision_id = %decision_id, "Finishing an interrupted outcome from the stored value");
                stored.clone()
            }
            None => {
                let outcome = Outcome {
                    realized_change_pct,
                    resolved_at: swarm_models::utc_now(),
                    note,
                };
                if !self.recorder.set_outcome(decision_id, &outcome).await? {
                    info!(decision_id = %decision_id, "Outcome already recorded");
                    return Ok(None);
                }
                outcome
            }
        };

        let record = self
            .recorder
            .get_debate(decision.debate_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("debate {}", decision.debate_id)))?;

        // Projected from the live roster, so a repeated call saves the same values.
        let memory = self.memory.config();
        let mut accuracy = BTreeMap::new();
        for vote in &record.votes {
            let correct = directional_hit(vote.action, outcome.realized_change_pct, memory.hold_band_pct);
            if let Some(updated) =
                self.roster
                    .projected_accuracy(&vote.specialist_id, correct, memory.accuracy_alpha)
            {
                self.recorder.save_accuracy(&vote.specialist_id, updated)?;
                accuracy.insert(vote.specialist_id.clone(), updated);
            }
        }

        let resolution = self
            .memory
            .resolve(&decision, &record.debate.trigger, &outcome)?;
        let Some(resolution) = resolution else {
            info!(decision_id = %decision_id, "Outcome already recorded");
            return Ok(None);
        };
        let applied: HashMap<String, Decimal> =
            accuracy.iter().map(|(id, value)| (id.clone(), *value)).collect();
        self.roster.overlay_accuracy(&applied);
        self.memory.flush(&self.recorder)?;

        info!(
            decision_id = %decision_id,
            change_pct = %outcome.realized_change_pct,
            learned = resolution.learning.is_some(),
            "Outcome recorded"
        );
        let decision = self.recorder.get_decision(decision_id)?.unwrap_or(decision);
        Ok(Some(OutcomeReport {
            decision,
            resolved: resolution.resolved,
            learning: resolution.learning,
            accuracy,
        }))
    }

    pub async fn get_debate(&self, debate_id: Uuid) -> Result<Option<DebateRecord>, CoordinatorError> {
        Ok(self.recorder.get_debate(debate_id).await?)
    }

    pub fn list_debates(
        &self,
        status: Option<DebateStatus>,
        limit: usize,
    ) -> Result<Vec<Debate>, CoordinatorError> {
        Ok(self.recorder.list_debates(status, limit)?)
    }

    pub fn stats(&self) -> Result<DebateStats, CoordinatorError> {
        Ok(self
            .recorder
            .get_stats(self.roster.len(), self.roster.active().len())?)
    }

    /// Defaults to the configured recent-decision limit.
    pub fn memory_snapshot(&self, limit: Option<usize>) -> Result<MemorySnapshot, CoordinatorError> {
        let limit = limit.unwrap_or(self.memory.config().recent_limit);
        Ok(self.memory.snapshot(limit)?)
    }
}

/// Keep who asked, and with what balance, in the trigger's market data.
fn annotate_request(market_data: &mut Value, request: &DecisionRequest) {
    if !market_data.is_object() {
        let provider = std::mem::take(market_data);
        *market_data = if provider.is_null() {
            serde_json::json!({})
        } else {
            serde_json::json!({ "provider": provider })
        };
    }
    if let Some(map) = market_data.as_object_mut() {
        if let Some(requester) = &request.requester_id {
            map.insert("requester_id".to_string(), Value::String(requester.clone()));
        }
        if let Some(balance) = request.account_balance {
            map.insert("account_balance".to_string(), Value::String(balance.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> DecisionRequest {
        DecisionRequest {
            symbol: "SOL".to_string(),
            requester_id: Some("desk-7".to_string()),
            account_balance: Some(dec!(2500)),
        }
    }

    #[test]
    fn request_annotates_object_metadata() {
        let mut data = serde_json::json!({"rsi": 71});
        annotate_request(&mut data, &request());
        assert_eq!(data["rsi"], 71);
        assert_eq!(data["requester_id"], "desk-7");
        assert_eq!(data["account_balance"], "2500");
    }

    #[test]
    fn request_wraps_non_object_metadata() {
        let mut data = Value::Null;
        annotate_request(&mut data, &request());
        assert_eq!(data["requester_id"], "desk-7");
        assert!(data.get("provider").is_none());

        let mut data = serde_json::json!([1, 2]);
        annotate_request(&mut data, &request());
        assert_eq!(data["provider"][1], 2);
    }
}
