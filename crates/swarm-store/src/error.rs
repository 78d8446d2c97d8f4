use swarm_models::DebateStatus;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Duplicate vote from {specialist_id} in debate {debate_id}")]
    DuplicateVote {
        debate_id: Uuid,
        specialist_id: String,
    },

    #[error("Duplicate abstention for {specialist_id} in debate {debate_id}")]
    DuplicateAbstention {
        debate_id: Uuid,
        specialist_id: String,
    },

    #[error("Debate {debate_id} is {status:?}, not accepting contributions")]
    DebateClosed {
        debate_id: Uuid,
        status: DebateStatus,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store not available: {0}")]
    Unavailable(String),
}
