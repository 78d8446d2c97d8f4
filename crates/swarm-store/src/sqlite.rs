use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use rust_decimal::Decimal;
use swarm_models::schema::SWARM_DDL;
use swarm_models::{
    Abstention, Debate, DebateMessage, DebateStatus, Decision, Outcome, RosterEntry,
    TriggerContext, Vote,
};
use uuid::Uuid;

use crate::error::StoreError;

/// SQLite accessor for debates, decisions and the memory log.
///
/// File databases run in WAL mode so queries can proceed while a debate
/// is still appending messages and votes.
pub struct SqliteStore {
    conn: Connection,
}

/// Raw `debates` row as read from SQLite.
struct DebateRow {
    id: String,
    trigger_json: String,
    roster_json: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    consensus_reached: bool,
    final_action: Option<String>,
    final_confidence: Option<String>,
    failure_reason: Option<String>,
}

/// Raw `decisions` row as read from SQLite.
struct DecisionRow {
    id: String,
    debate_id: String,
    symbol: String,
    action: String,
    confidence: String,
    score: String,
    consensus_reached: bool,
    participating_weight: String,
    decided_at: String,
    executed: bool,
    outcome_json: Option<String>,
}

const DEBATE_COLUMNS: &str = "id, trigger_json, roster_json, status, started_at, completed_at, \
     consensus_reached, final_action, final_confidence, failure_reason";

const DECISION_COLUMNS: &str = "id, debate_id, symbol, action, confidence, score, \
     consensus_reached, participating_weight, decided_at, executed, outcome_json";

pub(crate) fn format_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("uuid {raw}: {e}")))
}

fn parse_decimal(raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| StoreError::Corrupt(format!("decimal {raw}: {e}")))
}

fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse::<T>().map_err(StoreError::Corrupt)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl DebateRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            trigger_json: row.get(1)?,
            roster_json: row.get(2)?,
            status: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            consensus_reached: row.get(6)?,
            final_action: row.get(7)?,
            final_confidence: row.get(8)?,
            failure_reason: row.get(9)?,
        })
    }

    fn into_debate(self) -> Result<Debate, StoreError> {
        let trigger: TriggerContext = serde_json::from_str(&self.trigger_json)?;
        let roster: Vec<RosterEntry> = serde_json::from_str(&self.roster_json)?;
        Ok(Debate {
            id: parse_uuid(&self.id)?,
            trigger,
            roster,
            status: parse_enum(&self.status)?,
            started_at: parse_time(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_time).transpose()?,
            consensus_reached: self.consensus_reached,
            final_action: self.final_action.as_deref().map(parse_enum).transpose()?,
            final_confidence: self
                .final_confidence
                .as_deref()
                .map(parse_decimal)
                .transpose()?,
            failure_reason: self.failure_reason,
        })
    }
}

impl DecisionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            debate_id: row.get(1)?,
            symbol: row.get(2)?,
            action: row.get(3)?,
            confidence: row.get(4)?,
            score: row.get(5)?,
            consensus_reached: row.get(6)?,
            participating_weight: row.get(7)?,
            decided_at: row.get(8)?,
            executed: row.get(9)?,
            outcome_json: row.get(10)?,
        })
    }

    fn into_decision(self) -> Result<Decision, StoreError> {
        let outcome: Option<Outcome> = self
            .outcome_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Decision {
            id: parse_uuid(&self.id)?,
            debate_id: parse_uuid(&self.debate_id)?,
            symbol: self.symbol,
            action: parse_enum(&self.action)?,
            confidence: parse_decimal(&self.confidence)?,
            score: parse_decimal(&self.score)?,
            consensus_reached: self.consensus_reached,
            participating_weight: parse_decimal(&self.participating_weight)?,
            decided_at: parse_time(&self.decided_at)?,
            executed: self.executed,
            outcome,
        })
    }
}

impl SqliteStore {
    /// Open (or create) the database file. Creates the schema and enables WAL.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SWARM_DDL)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SWARM_DDL)?;
        Ok(Self { conn })
    }

    pub fn insert_debate(&self, debate: &Debate) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO debates \
             (id, symbol, trigger_json, roster_json, status, started_at, completed_at, \
              consensus_reached, final_action, final_confidence, failure_reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                debate.id.to_string(),
                debate.trigger.symbol,
                serde_json::to_string(&debate.trigger)?,
                serde_json::to_string(&debate.roster)?,
                debate.status.as_str(),
                format_time(&debate.started_at),
                debate.completed_at.as_ref().map(format_time),
                debate.consensus_reached,
                debate.final_action.map(|a| a.as_str()),
                debate.final_confidence.map(|c| c.to_string()),
                debate.failure_reason,
            ],
        )?;
        Ok(())
    }

    /// PENDING -> IN_PROGRESS. Returns false if the debate was not PENDING.
    pub fn mark_in_progress(&self, id: Uuid) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "UPDATE debates SET status = 'IN_PROGRESS' WHERE id = ?1 AND status = 'PENDING'",
            params![id.to_string()],
        )?;
        Ok(updated == 1)
    }

    /// PENDING -> FAILED. Returns false if the debate was not PENDING.
    pub fn mark_failed(
        &self,
        id: Uuid,
        reason: &str,
        at: &DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "UPDATE debates SET status = 'FAILED', failure_reason = ?2, completed_at = ?3 \
             WHERE id = ?1 AND status = 'PENDING'",
            params![id.to_string(), reason, format_time(at)],
        )?;
        Ok(updated == 1)
    }

    pub fn debate_status(&self, id: Uuid) -> Result<Option<DebateStatus>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM debates WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        raw.as_deref().map(parse_enum).transpose()
    }

    pub fn get_debate(&self, id: Uuid) -> Result<Option<Debate>, StoreError> {
        let sql = format!("SELECT {DEBATE_COLUMNS} FROM debates WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id.to_string()], DebateRow::from_row)
            .optional()?;
        row.map(DebateRow::into_debate).transpose()
    }

    /// Most recent first.
    pub fn list_debates(
        &self,
        status: Option<DebateStatus>,
        limit: usize,
    ) -> Result<Vec<Debate>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {DEBATE_COLUMNS} FROM debates WHERE status = ?1 \
                     ORDER BY started_at DESC, rowid DESC LIMIT ?2"
                );
                let mut stmt = self.conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(params![status.as_str(), limit], DebateRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let sql = format!(
                    "SELECT {DEBATE_COLUMNS} FROM debates \
                     ORDER BY started_at DESC, rowid DESC LIMIT ?1"
                );
                let mut stmt = self.conn.prepare_cached(&sql)?;
                let rows = stmt
                    .query_map(params![limit], DebateRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        rows.into_iter().map(DebateRow::into_debate).collect()
    }

    pub fn debate_ids_with_status(&self, status: DebateStatus) -> Result<Vec<Uuid>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM debates WHERE status = ?1 ORDER BY started_at")?;
        let ids = stmt
            .query_map(params![status.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.iter().map(|raw| parse_uuid(raw)).collect()
    }

    fn closed_error(&self, debate_id: Uuid) -> StoreError {
        match self.debate_status(debate_id) {
            Ok(Some(status)) => StoreError::DebateClosed { debate_id, status },
            Ok(None) => StoreError::NotFound(format!("debate {debate_id}")),
            Err(e) => e,
        }
    }

    /// Append a message. Rejected unless the debate is IN_PROGRESS.
    pub fn insert_message(&self, message: &DebateMessage) -> Result<(), StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO debate_messages \
             (debate_id, specialist_id, role, analysis, degraded, elapsed_ms, created_at) \
             SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7 \
             WHERE EXISTS (SELECT 1 FROM debates WHERE id = ?1 AND status = 'IN_PROGRESS')",
            params![
                message.debate_id.to_string(),
                message.specialist_id,
                message.role.as_str(),
                message.analysis,
                message.degraded,
                i64::try_from(message.elapsed_ms).unwrap_or(i64::MAX),
                format_time(&message.created_at),
            ],
        )?;
        if inserted == 0 {
            return Err(self.closed_error(message.debate_id));
        }
        Ok(())
    }

    /// Cast a vote. A second vote for the same (debate, specialist) is rejected
    /// and the first one is kept.
    pub fn insert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO debate_votes (debate_id, specialist_id, action, confidence, cast_at) \
             SELECT ?1, ?2, ?3, ?4, ?5 \
             WHERE EXISTS (SELECT 1 FROM debates WHERE id = ?1 AND status = 'IN_PROGRESS')",
            params![
                vote.debate_id.to_string(),
                vote.specialist_id,
                vote.action.as_str(),
                vote.confidence.to_string(),
                format_time(&vote.cast_at),
            ],
        );
        match result {
            Ok(0) => Err(self.closed_error(vote.debate_id)),
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StoreError::DuplicateVote {
                debate_id: vote.debate_id,
                specialist_id: vote.specialist_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn insert_abstention(&self, abstention: &Abstention) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO debate_abstentions \
             (debate_id, specialist_id, reason, detail, recorded_at) \
             SELECT ?1, ?2, ?3, ?4, ?5 \
             WHERE EXISTS (SELECT 1 FROM debates WHERE id = ?1 AND status = 'IN_PROGRESS')",
            params![
                abstention.debate_id.to_string(),
                abstention.specialist_id,
                abstention.reason.as_str(),
                abstention.detail,
                format_time(&abstention.recorded_at),
            ],
        );
        match result {
            Ok(0) => Err(self.closed_error(abstention.debate_id)),
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StoreError::DuplicateAbstention {
                debate_id: abstention.debate_id,
                specialist_id: abstention.specialist_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn messages(&self, debate_id: Uuid) -> Result<Vec<DebateMessage>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT specialist_id, role, analysis, degraded, elapsed_ms, created_at \
             FROM debate_messages WHERE debate_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt
            .query_map(params![debate_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(specialist_id, role, analysis, degraded, elapsed_ms, created_at)| {
                    Ok::<_, StoreError>(DebateMessage {
                        debate_id,
                        specialist_id,
                        role: parse_enum(&role)?,
                        analysis,
                        degraded,
                        elapsed_ms: u64::try_from(elapsed_ms).unwrap_or_default(),
                        created_at: parse_time(&created_at)?,
                    })
                },
            )
            .collect()
    }

    /// Votes in the order they were cast.
    pub fn votes(&self, debate_id: Uuid) -> Result<Vec<Vote>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT specialist_id, action, confidence, cast_at \
             FROM debate_votes WHERE debate_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![debate_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(specialist_id, action, confidence, cast_at)| {
                Ok::<_, StoreError>(Vote {
                    debate_id,
                    specialist_id,
                    action: parse_enum(&action)?,
                    confidence: parse_decimal(&confidence)?,
                    cast_at: parse_time(&cast_at)?,
                })
            })
            .collect()
    }

    pub fn abstentions(&self, debate_id: Uuid) -> Result<Vec<Abstention>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT specialist_id, reason, detail, recorded_at \
             FROM debate_abstentions WHERE debate_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![debate_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(specialist_id, reason, detail, recorded_at)| {
                Ok::<_, StoreError>(Abstention {
                    debate_id,
                    specialist_id,
                    reason: parse_enum(&reason)?,
                    detail,
                    recorded_at: parse_time(&recorded_at)?,
                })
            })
            .collect()
    }

    /// Atomically move the debate to COMPLETED and insert its decision.
    ///
    /// Returns false without writing anything if the debate is not
    /// IN_PROGRESS, so replaying a completion never creates a second decision.
    pub fn complete_debate(
        &mut self,
        decision: &Decision,
        completed_at: &DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE debates SET status = 'COMPLETED', completed_at = ?2, consensus_reached = ?3, \
             final_action = ?4, final_confidence = ?5 \
             WHERE id = ?1 AND status = 'IN_PROGRESS'",
            params![
                decision.debate_id.to_string(),
                format_time(completed_at),
                decision.consensus_reached,
                decision.action.as_str(),
                decision.confidence.to_string(),
            ],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        tx.execute(
            &format!(
                "INSERT INTO decisions ({DECISION_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                decision.id.to_string(),
                decision.debate_id.to_string(),
                decision.symbol,
                decision.action.as_str(),
                decision.confidence.to_string(),
                decision.score.to_string(),
                decision.consensus_reached,
                decision.participating_weight.to_string(),
                format_time(&decision.decided_at),
                decision.executed,
                decision
                    .outcome
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn decision_for_debate(&self, debate_id: Uuid) -> Result<Option<Decision>, StoreError> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE debate_id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![debate_id.to_string()], DecisionRow::from_row)
            .optional()?;
        row.map(DecisionRow::into_decision).transpose()
    }

    pub fn decision(&self, id: Uuid) -> Result<Option<Decision>, StoreError> {
        let sql = format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id.to_string()], DecisionRow::from_row)
            .optional()?;
        row.map(DecisionRow::into_decision).transpose()
    }

    pub fn set_executed(&self, decision_id: Uuid, executed: bool) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "UPDATE decisions SET executed = ?2 WHERE id = ?1",
            params![decision_id.to_string(), executed],
        )?;
        Ok(updated == 1)
    }

    /// Record the realized outcome. Outcomes are written once; returns false
    /// if the decision already has one.
    pub fn set_outcome(&self, decision_id: Uuid, outcome: &Outcome) -> Result<bool, StoreError> {
        let updated = self.conn.execute(
            "UPDATE decisions SET outcome_json = ?2 WHERE id = ?1 AND outcome_json IS NULL",
            params![decision_id.to_string(), serde_json::to_string(outcome)?],
        )?;
        Ok(updated == 1)
    }

    pub fn status_counts(&self) -> Result<HashMap<DebateStatus, u64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT status, COUNT(*) FROM debates GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(status, count)| -> Result<(DebateStatus, u64), StoreError> {
                Ok((parse_enum(&status)?, count.max(0) as u64))
            })
            .collect()
    }

    pub fn action_counts(&self) -> Result<Vec<(String, u64)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT action, COUNT(*) FROM decisions GROUP BY action")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .map(|(action, count)| (action, count.max(0) as u64))
            .collect())
    }

    /// (completed with consensus, executed, resolved) decision counts.
    pub fn decision_flag_counts(&self) -> Result<(u64, u64, u64), StoreError> {
        let counts = self.conn.query_row(
            "SELECT \
                COALESCE(SUM(consensus_reached), 0), \
                COALESCE(SUM(executed), 0), \
                COALESCE(SUM(CASE WHEN outcome_json IS NOT NULL THEN 1 ELSE 0 END), 0) \
             FROM decisions",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;
        Ok((
            counts.0.max(0) as u64,
            counts.1.max(0) as u64,
            counts.2.max(0) as u64,
        ))
    }

    pub fn load_accuracy(&self) -> Result<HashMap<String, Decimal>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT specialist_id, accuracy FROM specialist_accuracy")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, accuracy)| -> Result<(String, Decimal), StoreError> {
                Ok((id, parse_decimal(&accuracy)?))
            })
            .collect()
    }

    pub fn save_accuracy(&self, specialist_id: &str, accuracy: Decimal) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO specialist_accuracy (specialist_id, accuracy, updated_at) \
             VALUES (?1, ?2, ?3)",
            params![
                specialist_id,
                accuracy.to_string(),
                format_time(&swarm_models::utc_now())
            ],
        )?;
        Ok(())
    }

    /// Append memory entries `(kind, json)` in one transaction.
    pub fn append_memory(&mut self, entries: &[(String, String)]) -> Result<(), StoreError> {
        let now = format_time(&swarm_models::utc_now());
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO memory_entries (kind, entry_json, recorded_at) VALUES (?1, ?2, ?3)",
            )?;
            for (kind, json) in entries {
                stmt.execute(params![kind, json, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Every memory entry `(kind, json)` in append order.
    pub fn load_memory(&self) -> Result<Vec<(String, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT kind, entry_json FROM memory_entries ORDER BY seq")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use swarm_models::{
        AbstentionReason, SpecialistRole, TriggerContext, VoteAction,
    };

    fn make_debate() -> Debate {
        Debate::new(
            TriggerContext::new("SOL", dec!(142.5), "6% move in an hour"),
            vec![
                RosterEntry {
                    specialist_id: "risk-assessor".to_string(),
                    role: SpecialistRole::RiskAssessor,
                    voting_weight: dec!(1.5),
                },
                RosterEntry {
                    specialist_id: "momentum-trader".to_string(),
                    role: SpecialistRole::MomentumTrader,
                    voting_weight: dec!(1.2),
                },
            ],
        )
    }

    fn make_vote(debate_id: Uuid, specialist: &str, action: VoteAction) -> Vote {
        Vote {
            debate_id,
            specialist_id: specialist.to_string(),
            action,
            confidence: dec!(0.8),
            cast_at: swarm_models::utc_now(),
        }
    }

    fn make_decision(debate: &Debate) -> Decision {
        Decision {
            id: Uuid::new_v4(),
            debate_id: debate.id,
            symbol: debate.trigger.symbol.clone(),
            action: VoteAction::Buy,
            confidence: dec!(0.64),
            score: dec!(1),
            consensus_reached: true,
            participating_weight: dec!(1.728),
            decided_at: swarm_models::utc_now(),
            executed: false,
            outcome: None,
        }
    }

    fn running_debate(store: &SqliteStore) -> Debate {
        let debate = make_debate();
        store.insert_debate(&debate).unwrap();
        assert!(store.mark_in_progress(debate.id).unwrap());
        debate
    }

    #[test]
    fn insert_and_read_back_debate() {
        let store = SqliteStore::open_in_memory().unwrap();
        let debate = make_debate();
        store.insert_debate(&debate).unwrap();

        let loaded = store.get_debate(debate.id).unwrap().unwrap();
        assert_eq!(loaded, debate);
        assert!(store.get_debate(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn in_progress_only_from_pending() {
        let store = SqliteStore::open_in_memory().unwrap();
        let debate = make_debate();
        store.insert_debate(&debate).unwrap();
        assert!(store.mark_in_progress(debate.id).unwrap());
        assert!(!store.mark_in_progress(debate.id).unwrap());
        assert!(!store
            .mark_failed(debate.id, "too late", &swarm_models::utc_now())
            .unwrap());
    }

    #[test]
    fn duplicate_vote_is_rejected_and_first_kept() {
        let store = SqliteStore::open_in_memory().unwrap();
        let debate = running_debate(&store);

        store
            .insert_vote(&make_vote(debate.id, "risk-assessor", VoteAction::Sell))
            .unwrap();
        let err = store
            .insert_vote(&make_vote(debate.id, "risk-assessor", VoteAction::Buy))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateVote { .. }));

        let votes = store.votes(debate.id).unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].action, VoteAction::Sell);
    }

    #[test]
    fn votes_rejected_unless_in_progress() {
        let store = SqliteStore::open_in_memory().unwrap();
        let debate = make_debate();
        store.insert_debate(&debate).unwrap();

        let err = store
            .insert_vote(&make_vote(debate.id, "risk-assessor", VoteAction::Buy))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DebateClosed {
                status: DebateStatus::Pending,
                ..
            }
        ));

        let err = store
            .insert_vote(&make_vote(Uuid::new_v4(), "risk-assessor", VoteAction::Buy))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn completion_is_atomic_and_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let debate = running_debate(&store);
        store
            .insert_vote(&make_vote(debate.id, "momentum-trader", VoteAction::Buy))
            .unwrap();

        let decision = make_decision(&debate);
        let now = swarm_models::utc_now();
        assert!(store.complete_debate(&decision, &now).unwrap());

        let mut replay = make_decision(&debate);
        replay.action = VoteAction::Sell;
        assert!(!store.complete_debate(&replay, &now).unwrap());

        let stored = store.decision_for_debate(debate.id).unwrap().unwrap();
        assert_eq!(stored, decision);

        let loaded = store.get_debate(debate.id).unwrap().unwrap();
        assert_eq!(loaded.status, DebateStatus::Completed);
        assert_eq!(loaded.final_action, Some(VoteAction::Buy));
        assert_eq!(loaded.final_confidence, Some(dec!(0.64)));
        assert_eq!(loaded.completed_at, Some(now));

        let err = store
            .insert_vote(&make_vote(debate.id, "risk-assessor", VoteAction::Sell))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DebateClosed {
                status: DebateStatus::Completed,
                ..
            }
        ));
    }

    #[test]
    fn messages_and_abstentions_keep_arrival_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        let debate = running_debate(&store);

        for (i, id) in ["momentum-trader", "risk-assessor"].iter().enumerate() {
            store
                .insert_message(&DebateMessage {
                    debate_id: debate.id,
                    specialist_id: id.to_string(),
                    role: SpecialistRole::MomentumTrader,
                    analysis: format!("analysis {i}"),
                    degraded: i == 1,
                    elapsed_ms: 100 * i as u64,
                    created_at: swarm_models::utc_now(),
                })
                .unwrap();
        }
        store
            .insert_abstention(&Abstention {
                debate_id: debate.id,
                specialist_id: "volatility-specialist".to_string(),
                reason: AbstentionReason::Deadline,
                detail: "no response before deadline".to_string(),
                recorded_at: swarm_models::utc_now(),
            })
            .unwrap();

        let messages = store.messages(debate.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].specialist_id, "momentum-trader");
        assert!(messages[1].degraded);

        let abstentions = store.abstentions(debate.id).unwrap();
        assert_eq!(abstentions[0].reason, AbstentionReason::Deadline);
    }

    #[test]
    fn outcome_written_once() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let debate = running_debate(&store);
        let decision = make_decision(&debate);
        store
            .complete_debate(&decision, &swarm_models::utc_now())
            .unwrap();

        let outcome = Outcome {
            realized_change_pct: dec!(3.2),
            resolved_at: swarm_models::utc_now(),
            note: None,
        };
        assert!(store.set_outcome(decision.id, &outcome).unwrap());
        assert!(!store.set_outcome(decision.id, &outcome).unwrap());
        assert!(store.set_executed(decision.id, true).unwrap());

        let stored = store.decision(decision.id).unwrap().unwrap();
        assert!(stored.executed);
        assert_eq!(stored.outcome, Some(outcome));
        assert_eq!(store.decision_flag_counts().unwrap(), (1, 1, 1));
    }

    #[test]
    fn list_filters_by_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        let _running = running_debate(&store);
        let pending = make_debate();
        store.insert_debate(&pending).unwrap();

        assert_eq!(store.list_debates(None, 10).unwrap().len(), 2);
        let only_pending = store
            .list_debates(Some(DebateStatus::Pending), 10)
            .unwrap();
        assert_eq!(only_pending.len(), 1);
        assert_eq!(only_pending[0].id, pending.id);
        assert_eq!(store.list_debates(None, 1).unwrap().len(), 1);

        let counts = store.status_counts().unwrap();
        assert_eq!(counts.get(&DebateStatus::InProgress), Some(&1));
        assert_eq!(
            store
                .debate_ids_with_status(DebateStatus::InProgress)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn accuracy_and_memory_persist() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save_accuracy("risk-assessor", dec!(0.55)).unwrap();
        store.save_accuracy("risk-assessor", dec!(0.595)).unwrap();
        let accuracy = store.load_accuracy().unwrap();
        assert_eq!(accuracy.get("risk-assessor"), Some(&dec!(0.595)));

        store
            .append_memory(&[
                ("decision".to_string(), "{\"a\":1}".to_string()),
                ("learning".to_string(), "{\"b\":2}".to_string()),
            ])
            .unwrap();
        let entries = store.load_memory().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].0, "learning");
    }

    #[test]
    fn file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("swarm.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
