use swarm_models::TriggerError;
use swarm_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::state::TransitionError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("HTTP backend error: {0}")]
    Http(String),

    #[error("Backend response parse error: {0}")]
    Parse(String),

    #[error("Backend timed out after {0}ms")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        AgentError::Http(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Invalid trigger for debate {debate_id}: {source}")]
    InvalidTrigger {
        debate_id: Uuid,
        #[source]
        source: TriggerError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Illegal debate transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Market intelligence error: {0}")]
    MarketIntel(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Debate task failed: {0}")]
    Task(String),
}
