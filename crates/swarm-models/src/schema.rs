/// SQLite schema for the decision recorder and the memory store.
///
/// Votes carry a composite primary key so a second vote from the same
/// specialist in the same debate is rejected by the database itself.
/// Decisions are unique per debate. The `memory_*` tables are append-only.
pub const SWARM_DDL: &str = "\
CREATE TABLE IF NOT EXISTS debates (
    id                TEXT PRIMARY KEY,
    symbol            TEXT NOT NULL,
    trigger_json      TEXT NOT NULL,
    roster_json       TEXT NOT NULL,
    status            TEXT NOT NULL,
    started_at        TEXT NOT NULL,
    completed_at      TEXT,
    consensus_reached INTEGER NOT NULL DEFAULT 0,
    final_action      TEXT,
    final_confidence  TEXT,
    failure_reason    TEXT
);
CREATE INDEX IF NOT EXISTS idx_debates_status ON debates(status);
CREATE INDEX IF NOT EXISTS idx_debates_started ON debates(started_at);

CREATE TABLE IF NOT EXISTS debate_messages (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    debate_id     TEXT NOT NULL REFERENCES debates(id),
    specialist_id TEXT NOT NULL,
    role          TEXT NOT NULL,
    analysis      TEXT NOT NULL,
    degraded      INTEGER NOT NULL DEFAULT 0,
    elapsed_ms    INTEGER NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_debate ON debate_messages(debate_id);

CREATE TABLE IF NOT EXISTS debate_votes (
    debate_id     TEXT NOT NULL REFERENCES debates(id),
    specialist_id TEXT NOT NULL,
    action        TEXT NOT NULL,
    confidence    TEXT NOT NULL,
    cast_at       TEXT NOT NULL,
    PRIMARY KEY (debate_id, specialist_id)
);

CREATE TABLE IF NOT EXISTS debate_abstentions (
    debate_id     TEXT NOT NULL REFERENCES debates(id),
    specialist_id TEXT NOT NULL,
    reason        TEXT NOT NULL,
    detail        TEXT NOT NULL,
    recorded_at   TEXT NOT NULL,
    PRIMARY KEY (debate_id, specialist_id)
);

CREATE TABLE IF NOT EXISTS decisions (
    id                   TEXT PRIMARY KEY,
    debate_id            TEXT NOT NULL UNIQUE REFERENCES debates(id),
    symbol               TEXT NOT NULL,
    action               TEXT NOT NULL,
    confidence           TEXT NOT NULL,
    score                TEXT NOT NULL,
    consensus_reached    INTEGER NOT NULL,
    participating_weight TEXT NOT NULL,
    decided_at           TEXT NOT NULL,
    executed             INTEGER NOT NULL DEFAULT 0,
    outcome_json         TEXT
);

CREATE TABLE IF NOT EXISTS specialist_accuracy (
    specialist_id TEXT PRIMARY KEY,
    accuracy      TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_entries (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    kind        TEXT NOT NULL,
    entry_json  TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memory_kind ON memory_entries(kind);
";

/// `memory_entries.kind` values.
pub mod memory_kinds {
    pub const DECISION: &str = "decision";
    pub const RESOLVED: &str = "resolved";
    pub const SUCCESS_PATTERN: &str = "success_pattern";
    pub const FAILURE_PATTERN: &str = "failure_pattern";
    pub const LEARNING: &str = "learning";

    pub const ALL: [&str; 5] = [DECISION, RESOLVED, SUCCESS_PATTERN, FAILURE_PATTERN, LEARNING];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_declares_every_table() {
        for table in [
            "debates",
            "debate_messages",
            "debate_votes",
            "debate_abstentions",
            "decisions",
            "specialist_accuracy",
            "memory_entries",
        ] {
            assert!(
                SWARM_DDL.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing {table}"
            );
        }
    }

    #[test]
    fn votes_are_unique_per_specialist() {
        assert!(SWARM_DDL.contains("PRIMARY KEY (debate_id, specialist_id)"));
    }
}
