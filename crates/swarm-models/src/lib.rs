pub mod config;
pub mod debate;
pub mod decision;
pub mod memory;
pub mod schema;
pub mod specialist;
pub mod trigger;

pub use config::{ConfigError, DebateConfig, MemoryConfig, StoreConfig, SwarmConfig};
pub use debate::{
    Abstention, AbstentionReason, ActionFamily, Debate, DebateMessage, DebateRecord, DebateStatus,
    RosterEntry, Vote, VoteAction,
};
pub use decision::{DebateStats, Decision, ExecutionAck, ExecutionRequest, Outcome};
pub use memory::{
    DecisionLogEntry, Learning, MemorySnapshot, MomentumBucket, PatternFeatures, PatternPolarity,
    PatternRecord, ResolvedDecision,
};
pub use specialist::{BackendSpec, SpecialistDefinition, SpecialistRole};
pub use trigger::{DecisionRequest, MarketSnapshot, TriggerContext, TriggerError, TriggerSource};

use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to microseconds, the precision timestamps are stored at.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
