use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What caused a debate to be convened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    PriceMove,
    Webhook,
    #[default]
    Manual,
    Scheduled,
}

/// Immutable market snapshot a debate deliberates over.
///
/// Symbol and price are optional at the wire level so that a malformed
/// trigger can still be recorded as a FAILED debate instead of being lost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TriggerContext {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub current_price: Option<Decimal>,
    /// 24h change in percent (e.g. -3.5 = down 3.5%).
    #[serde(default)]
    pub price_change_24h: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub source: TriggerSource,
    #[serde(default)]
    pub reason: String,
    /// Arbitrary provider data (indicators, sentiment, order book summaries).
    #[serde(default)]
    pub market_data: serde_json::Value,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger is missing a symbol")]
    MissingSymbol,

    #[error("trigger for {0} is missing a current price")]
    MissingPrice(String),

    #[error("trigger for {symbol} has non-positive price {price}")]
    NonPositivePrice { symbol: String, price: Decimal },
}

impl TriggerContext {
    pub fn new(symbol: &str, current_price: Decimal, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            current_price: Some(current_price),
            reason: reason.to_string(),
            market_data: serde_json::Value::Null,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), TriggerError> {
        if self.symbol.trim().is_empty() {
            return Err(TriggerError::MissingSymbol);
        }
        match self.current_price {
            None => Err(TriggerError::MissingPrice(self.symbol.clone())),
            Some(price) if price <= Decimal::ZERO => Err(TriggerError::NonPositivePrice {
                symbol: self.symbol.clone(),
                price,
            }),
            Some(_) => Ok(()),
        }
    }

    /// Build a trigger from a market-intelligence snapshot.
    pub fn from_snapshot(
        symbol: &str,
        snapshot: &MarketSnapshot,
        source: TriggerSource,
        reason: &str,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            current_price: snapshot.price,
            price_change_24h: snapshot.change_24h_pct,
            volume_24h: snapshot.volume_24h,
            source,
            reason: reason.to_string(),
            market_data: snapshot.metadata.clone(),
        }
    }
}

/// Synchronous decision request: the caller waits for a completed Decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRequest {
    pub symbol: String,
    /// Opaque id of whoever asked, kept in the trigger metadata for the trace.
    #[serde(default)]
    pub requester_id: Option<String>,
    #[serde(default)]
    pub account_balance: Option<Decimal>,
}

/// What the market-intelligence provider knows about a symbol right now.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MarketSnapshot {
    pub price: Option<Decimal>,
    #[serde(default)]
    pub change_24h_pct: Option<Decimal>,
    #[serde(default)]
    pub volume_24h: Option<Decimal>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
