use std::collections::HashSet;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::specialist::SpecialistDefinition;

/// Top-level configuration for the swarm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwarmConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub debate: DebateConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default = "SpecialistDefinition::default_roster")]
    pub specialists: Vec<SpecialistDefinition>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            debate: DebateConfig::default(),
            memory: MemoryConfig::default(),
            specialists: SpecialistDefinition::default_roster(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("debate deadline ({deadline_ms}ms) must exceed the per-call timeout ({call_timeout_ms}ms)")]
    DeadlineTooShort {
        deadline_ms: u64,
        call_timeout_ms: u64,
    },

    #[error("specialist roster is empty")]
    EmptyRoster,

    #[error("duplicate specialist id: {0}")]
    DuplicateSpecialist(String),

    #[error("specialist {id} has non-positive voting weight {weight}")]
    NonPositiveWeight { id: String, weight: Decimal },

    #[error("specialist {id} has accuracy {accuracy} outside [0, 1]")]
    AccuracyOutOfRange { id: String, accuracy: Decimal },

    #[error("memory.accuracy_alpha must be in (0, 1], got {0}")]
    InvalidAlpha(Decimal),
}

impl SwarmConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debate.deadline_ms <= self.debate.call_timeout_ms {
            return Err(ConfigError::DeadlineTooShort {
                deadline_ms: self.debate.deadline_ms,
                call_timeout_ms: self.debate.call_timeout_ms,
            });
        }
        if self.specialists.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }

        let mut seen = HashSet::new();
        for specialist in &self.specialists {
            if !seen.insert(specialist.id.as_str()) {
                return Err(ConfigError::DuplicateSpecialist(specialist.id.clone()));
            }
            if specialist.voting_weight <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveWeight {
                    id: specialist.id.clone(),
                    weight: specialist.voting_weight,
                });
            }
            if specialist.accuracy < Decimal::ZERO || specialist.accuracy > Decimal::ONE {
                return Err(ConfigError::AccuracyOutOfRange {
                    id: specialist.id.clone(),
                    accuracy: specialist.accuracy,
                });
            }
        }

        let alpha = self.memory.accuracy_alpha;
        if alpha <= Decimal::ZERO || alpha > Decimal::ONE {
            return Err(ConfigError::InvalidAlpha(alpha));
        }
        Ok(())
    }
}

/// Configuration for the decision recorder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the SQLite database holding debates, decisions and memory.
    pub sqlite_path: String,
    /// Maximum number of terminal debates kept in the in-memory moka cache.
    #[serde(default = "default_hot_capacity")]
    pub hot_cache_capacity: u64,
    /// How long a terminal debate stays in the hot cache.
    #[serde(default = "default_hot_ttl")]
    pub hot_cache_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/swarm.db".to_string(),
            hot_cache_capacity: default_hot_capacity(),
            hot_cache_ttl_seconds: default_hot_ttl(),
        }
    }
}

/// Configuration for the debate lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateConfig {
    /// Hard ceiling on a whole debate, independent of per-call timeouts.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    /// Per-specialist reasoning call timeout.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Attempts at persisting a computed decision before giving up.
    #[serde(default = "default_persist_attempts")]
    pub persist_attempts: u32,
    /// Linear backoff between persistence attempts.
    #[serde(default = "default_persist_backoff_ms")]
    pub persist_backoff_ms: u64,
    /// Forward actionable decisions to the execution collaborator, if one is wired.
    #[serde(default = "default_true")]
    pub forward_to_execution: bool,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            persist_attempts: default_persist_attempts(),
            persist_backoff_ms: default_persist_backoff_ms(),
            forward_to_execution: true,
        }
    }
}

impl DebateConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn persist_backoff(&self) -> Duration {
        Duration::from_millis(self.persist_backoff_ms)
    }
}

/// Configuration for the memory / learning store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// How many recent decisions `snapshot` returns by default.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    /// Matching resolved decisions needed before a learning is distilled.
    #[serde(default = "default_min_support")]
    pub min_pattern_support: u32,
    /// Learnings folded into each specialist prompt.
    #[serde(default = "default_learnings_per_prompt")]
    pub learnings_per_prompt: usize,
    /// A HOLD is judged correct when the realized move stays within this band (percent).
    #[serde(default = "default_hold_band")]
    pub hold_band_pct: Decimal,
    /// Smoothing factor for the specialist accuracy EMA.
    #[serde(default = "default_alpha")]
    pub accuracy_alpha: Decimal,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            min_pattern_support: default_min_support(),
            learnings_per_prompt: default_learnings_per_prompt(),
            hold_band_pct: default_hold_band(),
            accuracy_alpha: default_alpha(),
        }
    }
}

fn default_hot_capacity() -> u64 {
    1_000
}
fn default_hot_ttl() -> u64 {
    300
}
fn default_deadline_ms() -> u64 {
    120_000
}
fn default_call_timeout_ms() -> u64 {
    45_000
}
fn default_persist_attempts() -> u32 {
    3
}
fn default_persist_backoff_ms() -> u64 {
    200
}
fn default_true() -> bool {
    true
}
fn default_recent_limit() -> usize {
    50
}
fn default_min_support() -> u32 {
    3
}
fn default_learnings_per_prompt() -> usize {
    5
}
fn default_hold_band() -> Decimal {
    Decimal::ONE
}
fn default_alpha() -> Decimal {
    Decimal::new(1, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialist::{BackendSpec, SpecialistRole};
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        let config = SwarmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.specialists.len(), 6);
        assert_eq!(config.debate.deadline(), Duration::from_secs(120));
    }

    #[test]
    fn roundtrip_swarm_config() {
        let config = SwarmConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SwarmConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn deadline_must_exceed_call_timeout() {
        let mut config = SwarmConfig::default();
        config.debate.deadline_ms = 1_000;
        config.debate.call_timeout_ms = 1_000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DeadlineTooShort { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_ids_and_bad_weights() {
        let mut config = SwarmConfig::default();
        config.specialists[1].id = config.specialists[0].id.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateSpecialist(_))
        ));

        let mut config = SwarmConfig::default();
        config.specialists[2].voting_weight = dec!(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositiveWeight { .. })
        ));

        let mut config = SwarmConfig::default();
        config.specialists.clear();
        assert_eq!(config.validate(), Err(ConfigError::EmptyRoster));
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[store]
sqlite_path = "/tmp/swarm_test.db"

[debate]
deadline_ms = 60000
call_timeout_ms = 20000

[memory]
min_pattern_support = 2
hold_band_pct = "0.5"

[[specialists]]
id = "risk-assessor"
name = "Risk Assessor"
role = "risk_assessor"
expertise = "Tail risk"
voting_weight = "1.5"
backend = { kind = "heuristic" }

[[specialists]]
id = "momentum-trader"
name = "Momentum Trader"
role = "momentum_trader"
expertise = "Trends"
voting_weight = "1.2"
active = false
backend = { kind = "open_ai_compatible", base_url = "http://localhost:8000/v1", model = "qwen2.5" }
"#;

        let config: SwarmConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.sqlite_path, "/tmp/swarm_test.db");
        assert_eq!(config.store.hot_cache_capacity, 1_000);
        assert_eq!(config.debate.persist_attempts, 3);
        assert_eq!(config.memory.min_pattern_support, 2);
        assert_eq!(config.memory.hold_band_pct, dec!(0.5));
        assert_eq!(config.specialists.len(), 2);
        assert_eq!(config.specialists[0].backend, BackendSpec::Heuristic);
        assert_eq!(config.specialists[0].accuracy, dec!(0.5));
        assert!(config.specialists[0].active);
        assert!(!config.specialists[1].active);
        assert_eq!(config.specialists[1].role, SpecialistRole::MomentumTrader);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn omitted_specialists_fall_back_to_default_roster() {
        let config: SwarmConfig = toml::from_str("[store]\nsqlite_path = \"x.db\"\n").unwrap();
        assert_eq!(config.specialists.len(), 6);
    }
}
