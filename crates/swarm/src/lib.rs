//! SWARM - multi-agent deliberation and weighted-consensus decision engine.
//!
//! A roster of specialist agents debates every trigger in parallel; their
//! votes are weighted into one directional decision, recorded in SQLite and
//! fed back as learnings once the outcome is known.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! # async fn run() -> anyhow::Result<()> {
//! use swarm::models::TriggerContext;
//! use rust_decimal::Decimal;
//!
//! let config = swarm::load_config("config/swarm.toml")?;
//! let coordinator = swarm::build_coordinator(&config)?;
//! let record = coordinator
//!     .run_debate(TriggerContext::new("SOL", Decimal::new(14250, 2), "price moved 6% in 1h"))
//!     .await?;
//! println!("{:?}", record.decision);
//! # Ok(())
//! # }
//! ```

pub use swarm_agents as agents;
pub use swarm_models as models;
pub use swarm_store as store;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use swarm_agents::{DebateCoordinator, SpecialistRoster};
use swarm_models::SwarmConfig;
use swarm_store::{DecisionRecorder, MemoryStore};
use tracing::info;

/// Read, parse and validate a TOML config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<SwarmConfig, anyhow::Error> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: SwarmConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse config")?;
    config.validate().context("Invalid config")?;
    Ok(config)
}

/// Build a coordinator from configuration.
///
/// Opens the recorder, replays the memory log, binds every specialist to its
/// backend and restores persisted accuracy.
pub fn build_coordinator(config: &SwarmConfig) -> Result<DebateCoordinator, anyhow::Error> {
    let recorder = Arc::new(
        DecisionRecorder::open(&config.store)
            .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?,
    );

    let memory = Arc::new(MemoryStore::new(config.memory.clone()));
    memory
        .init(&recorder)
        .context("Failed to load memory log")?;

    let roster = SpecialistRoster::from_definitions(&config.specialists, config.debate.call_timeout())
        .context("Failed to register specialists")?;
    let accuracy = recorder
        .load_accuracy()
        .context("Failed to load specialist accuracy")?;
    roster.overlay_accuracy(&accuracy);

    info!(
        specialists = roster.len(),
        active = roster.active().len(),
        learnings = memory.learning_count(),
        "Coordinator ready"
    );
    Ok(DebateCoordinator::new(
        Arc::new(roster),
        recorder,
        memory,
        config.debate.clone(),
    ))
}
