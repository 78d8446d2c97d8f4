use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use swarm_models::MarketSnapshot;
use tracing::debug;

use crate::error::CoordinatorError;

/// Source of the market snapshot a synchronous decision request deliberates over.
#[async_trait]
pub trait MarketIntel: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, CoordinatorError>;
}

/// Fixed snapshots keyed by symbol, typically loaded from a JSON file:
///
/// ```json
/// {"SOL": {"price": "142.5", "change_24h_pct": "6.2", "metadata": {"rsi": 71}}}
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticMarketIntel {
    snapshots: HashMap<String, MarketSnapshot>,
}

impl StaticMarketIntel {
    pub fn from_map(snapshots: HashMap<String, MarketSnapshot>) -> Self {
        let snapshots = snapshots
            .into_iter()
            .map(|(symbol, snapshot)| (symbol.to_ascii_uppercase(), snapshot))
            .collect();
        Self { snapshots }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoordinatorError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoordinatorError::MarketIntel(format!("reading {}: {e}", path.display()))
        })?;
        let snapshots: HashMap<String, MarketSnapshot> = serde_json::from_str(&raw)
            .map_err(|e| CoordinatorError::MarketIntel(format!("parsing {}: {e}", path.display())))?;
        debug!(path = %path.display(), symbols = snapshots.len(), "Loaded market snapshots");
        Ok(Self::from_map(snapshots))
    }
}

#[async_trait]
impl MarketIntel for StaticMarketIntel {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot, CoordinatorError> {
        self.snapshots
            .get(&symbol.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| CoordinatorError::MarketIntel(format!("no snapshot for {symbol}")))
    }
}
