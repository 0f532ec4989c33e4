// In crates/execution/src/types.rs

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    /// Commission charged on the slippage-adjusted notional (e.g., 0.0005 for 0.05%).
    pub commission_percent: f64,

    /// The simulated slippage for market orders (e.g., 0.0005 for 0.05%).
    pub slippage_percent: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            commission_percent: 0.0005,
            slippage_percent: 0.0005,
        }
    }
}

impl SimulationSettings {
    /// Fills exactly at the reference price with no fees.
    pub fn frictionless() -> Self {
        Self {
            commission_percent: 0.0,
            slippage_percent: 0.0,
        }
    }
}

/// A request to buy or sell a whole number of units.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument_id: String,
    pub quantity: u64,
    /// The reference price the order is based on.
    pub price: f64,
    pub time: DateTime<Utc>,
}

/// The fill reported by an exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub quantity: u64,
    /// Price × quantity adjusted by slippage, excluding commission.
    pub notional: f64,
    pub commission: f64,
    pub time: DateTime<Utc>,
}

/// What a trading simulator does when the affordable quantity rounds down to zero.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZeroQuantityPolicy {
    /// Submit the zero-quantity order anyway and record the resulting deal.
    #[default]
    Submit,
    /// Skip the order and leave the ledger untouched.
    Skip,
}
