use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rust_decimal::Decimal;
use swarm_models::{
    Abstention, Debate, DebateMessage, DebateRecord, DebateStats, DebateStatus, Decision,
    Outcome, StoreConfig, Vote, VoteAction,
};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::hot::DebateCache;
use crate::sqlite::SqliteStore;

/// Durable record of every debate, message, vote and decision.
///
/// Reads of finished debates go moka (hot) → SQLite and promote on a SQLite hit.
/// Running debates are always read from SQLite so a partial trace is never cached.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct DecisionRecorder {
    hot: DebateCache,
    sqlite: Mutex<SqliteStore>,
}

impl DecisionRecorder {
    pub fn new(sqlite: SqliteStore, hot_capacity: u64, hot_ttl: Duration) -> Self {
        Self {
            hot: DebateCache::new(hot_capacity, hot_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    /// Open the SQLite file named in the config.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let sqlite = SqliteStore::open(&config.sqlite_path)?;
        Ok(Self::new(
            sqlite,
            config.hot_cache_capacity,
            Duration::from_secs(config.hot_cache_ttl_seconds),
        ))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self::new(
            SqliteStore::open_in_memory()?,
            1_000,
            Duration::from_secs(300),
        ))
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteStore>, StoreError> {
        self.sqlite
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub fn create_debate(&self, debate: &Debate) -> Result<(), StoreError> {
        self.lock()?.insert_debate(debate)
    }

    pub fn mark_in_progress(&self, debate_id: Uuid) -> Result<bool, StoreError> {
        self.lock()?.mark_in_progress(debate_id)
    }

    pub fn mark_failed(&self, debate_id: Uuid, reason: &str) -> Result<bool, StoreError> {
        self.lock()?
            .mark_failed(debate_id, reason, &swarm_models::utc_now())
    }

    pub fn append_message(&self, message: &DebateMessage) -> Result<(), StoreError> {
        self.lock()?.insert_message(message)
    }

    /// Rejects a second vote from the same specialist with `DuplicateVote`
    /// and any vote on a debate that is not running with `DebateClosed`.
    pub fn cast_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        self.lock()?.insert_vote(vote)
    }

    pub fn record_abstention(&self, abstention: &Abstention) -> Result<(), StoreError> {
        self.lock()?.insert_abstention(abstention)
    }

    /// Aggregate the debate's recorded votes and complete it under one lock.
    ///
    /// Votes go through the same lock, so none can land between reading the
    /// votes and closing the debate: the stored decision is always a function
    /// of exactly the votes recorded. Returns the stored decision and whether
    /// this call created it.
    pub fn complete_from_votes<F>(
        &self,
        debate_id: Uuid,
        decide: F,
    ) -> Result<(Decision, bool), StoreError>
    where
        F: FnOnce(&Debate, &[Vote]) -> Decision,
    {
        let mut sqlite = self.lock()?;
        if let Some(existing) = sqlite.decision_for_debate(debate_id)? {
            return Ok((existing, false));
        }
        let debate = sqlite
            .get_debate(debate_id)?
            .ok_or_else(|| StoreError::NotFound(format!("debate {debate_id}")))?;
        let votes = sqlite.votes(debate_id)?;
        let decision = decide(&debate, &votes);
        if sqlite.complete_debate(&decision, &decision.decided_at)? {
            debug!(debate_id = %debate_id, votes = votes.len(), "debate completed");
            return Ok((decision, true));
        }
        Err(StoreError::DebateClosed {
            debate_id,
            status: debate.status,
        })
    }

    /// Move the debate to COMPLETED and store its decision in one transaction.
    ///
    /// Idempotent: if the debate already completed, the decision stored the
    /// first time is returned and `decision` is discarded.
    pub fn record_completion(&self, decision: &Decision) -> Result<Decision, StoreError> {
        let mut sqlite = self.lock()?;
        if sqlite.complete_debate(decision, &decision.decided_at)? {
            return Ok(decision.clone());
        }

        if let Some(existing) = sqlite.decision_for_debate(decision.debate_id)? {
            debug!(debate_id = %decision.debate_id, "completion replayed, keeping stored decision");
            return Ok(existing);
        }
        match sqlite.debate_status(decision.debate_id)? {
            Some(status) => Err(StoreError::DebateClosed {
                debate_id: decision.debate_id,
                status,
            }),
            None => Err(StoreError::NotFound(format!(
                "debate {}",
                decision.debate_id
            ))),
        }
    }

    /// Full ordered trace of a debate. Checks moka first, then SQLite.
    pub async fn get_debate(&self, debate_id: Uuid) -> Result<Option<DebateRecord>, StoreError> {
        if let Some(record) = self.hot.get(&debate_id).await {
            return Ok(Some(record.as_ref().clone()));
        }

        let record = self.load_record(debate_id)?;
        if let Some(record) = &record {
            if record.debate.status.is_terminal() {
                self.hot.insert(record.clone()).await;
            }
        }
        Ok(record)
    }

    fn load_record(&self, debate_id: Uuid) -> Result<Option<DebateRecord>, StoreError> {
        let sqlite = self.lock()?;
        let Some(debate) = sqlite.get_debate(debate_id)? else {
            return Ok(None);
        };
        Ok(Some(DebateRecord {
            messages: sqlite.messages(debate_id)?,
            votes: sqlite.votes(debate_id)?,
            abstentions: sqlite.abstentions(debate_id)?,
            decision: sqlite.decision_for_debate(debate_id)?,
            debate,
        }))
    }

    pub fn debate_status(&self, debate_id: Uuid) -> Result<Option<DebateStatus>, StoreError> {
        self.lock()?.debate_status(debate_id)
    }

    pub fn list_debates(
        &self,
        status: Option<DebateStatus>,
        limit: usize,
    ) -> Result<Vec<Debate>, StoreError> {
        self.lock()?.list_debates(status, limit)
    }

    /// Ids of debates left IN_PROGRESS, oldest first.
    pub fn unfinished_debates(&self) -> Result<Vec<Uuid>, StoreError> {
        self.lock()?
            .debate_ids_with_status(DebateStatus::InProgress)
    }

    /// Counters over every recorded debate. Roster figures come from the caller.
    pub fn get_stats(
        &self,
        roster_size: usize,
        active_specialists: usize,
    ) -> Result<DebateStats, StoreError> {
        let sqlite = self.lock()?;
        let mut stats = DebateStats {
            roster_size,
            active_specialists,
            ..Default::default()
        };

        for (status, count) in sqlite.status_counts()? {
            stats.total_debates += count;
            match status {
                DebateStatus::Pending => stats.pending = count,
                DebateStatus::InProgress => stats.in_progress = count,
                DebateStatus::Completed => stats.completed = count,
                DebateStatus::Failed => stats.failed = count,
            }
        }
        for (action, count) in sqlite.action_counts()? {
            let action: VoteAction = action.parse().map_err(StoreError::Corrupt)?;
            stats.decisions_by_action.insert(action, count);
        }

        let (with_consensus, executed, resolved) = sqlite.decision_flag_counts()?;
        stats.completed_with_consensus = with_consensus;
        stats.executed_decisions = executed;
        stats.resolved_decisions = resolved;
        stats.compute_consensus_rate();
        Ok(stats)
    }

    pub fn get_decision(&self, decision_id: Uuid) -> Result<Option<Decision>, StoreError> {
        self.lock()?.decision(decision_id)
    }

    /// Flag a decision as executed (or not) and return the updated row.
    pub async fn set_executed(
        &self,
        decision_id: Uuid,
        executed: bool,
    ) -> Result<Decision, StoreError> {
        let decision = {
            let sqlite = self.lock()?;
            if !sqlite.set_executed(decision_id, executed)? {
                return Err(StoreError::NotFound(format!("decision {decision_id}")));
            }
            sqlite
                .decision(decision_id)?
                .ok_or_else(|| StoreError::NotFound(format!("decision {decision_id}")))?
        };
        self.hot.invalidate(&decision.debate_id).await;
        Ok(decision)
    }

    /// Attach the realized outcome. Returns false if one was already recorded.
    pub async fn set_outcome(
        &self,
        decision_id: Uuid,
        outcome: &Outcome,
    ) -> Result<bool, StoreError> {
        let (written, debate_id) = {
            let sqlite = self.lock()?;
            let decision = sqlite
                .decision(decision_id)?
                .ok_or_else(|| StoreError::NotFound(format!("decision {decision_id}")))?;
            (sqlite.set_outcome(decision_id, outcome)?, decision.debate_id)
        };
        if written {
            self.hot.invalidate(&debate_id).await;
        }
        Ok(written)
    }

    pub fn load_accuracy(&self) -> Result<HashMap<String, Decimal>, StoreError> {
        self.lock()?.load_accuracy()
    }

    pub fn save_accuracy(&self, specialist_id: &str, accuracy: Decimal) -> Result<(), StoreError> {
        self.lock()?.save_accuracy(specialist_id, accuracy)
    }

    pub fn append_memory(&self, entries: &[(String, String)]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.lock()?.append_memory(entries)
    }

    pub fn load_memory(&self) -> Result<Vec<(String, String)>, StoreError> {
        self.lock()?.load_memory()
    }

    /// Number of finished debates currently held in the hot cache.
    pub fn hot_cache_size(&self) -> u64 {
        self.hot.entry_count()
    }
}
