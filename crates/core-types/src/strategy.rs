// In crates/core-types/src/strategy.rs

use crate::error::{Error, Result};
use crate::types::Instrument;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one simple moving average: which series and how long a window.
///
/// This is also the lookup key for shared live computations, so it carries
/// only plain comparable values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SmaConfig {
    pub instrument: Instrument,
    pub length: usize,
}

impl SmaConfig {
    pub fn new(instrument: Instrument, length: usize) -> Result<Self> {
        if length == 0 {
            return Err(Error::Configuration("SMA length must be positive".to_string()));
        }
        Ok(Self { instrument, length })
    }
}

/// Parameters of the short/long moving-average ("golden cross") strategy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GoldenCrossConfig {
    pub instrument: Instrument,
    pub short_length: usize,
    pub long_length: usize,
}

impl GoldenCrossConfig {
    pub fn new(instrument: Instrument, short_length: usize, long_length: usize) -> Result<Self> {
        if short_length == 0 || long_length == 0 {
            return Err(Error::Configuration("SMA lengths must be positive".to_string()));
        }
        if short_length >= long_length {
            return Err(Error::Configuration(format!(
                "short length ({}) must be below long length ({})",
                short_length, long_length
            )));
        }
        Ok(Self {
            instrument,
            short_length,
            long_length,
        })
    }

    pub fn short_sma(&self) -> SmaConfig {
        SmaConfig {
            instrument: self.instrument.clone(),
            length: self.short_length,
        }
    }

    pub fn long_sma(&self) -> SmaConfig {
        SmaConfig {
            instrument: self.instrument.clone(),
            length: self.long_length,
        }
    }
}

/// Outcome of comparing a price series against its moving average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossKind {
    /// The price moved from at-or-below the average to strictly above it.
    CrossUp,
    /// The price moved from above the average to strictly below it.
    CrossDown,
    NoCross,
}

/// Outcome of comparing a short moving average against a long one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoldenCrossKind {
    GoldenCross,
    DeathCross,
    NoCross,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossoverSignal {
    pub config: SmaConfig,
    pub kind: CrossKind,
    /// The source price at the moment of the decision.
    pub price: f64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenCrossSignal {
    pub instrument: Instrument,
    pub kind: GoldenCrossKind,
    pub price: f64,
    pub time: DateTime<Utc>,
}

/// What a trading bot should do with a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    Enter,
    Exit,
    Hold,
}

/// The view of a strategy signal that the trading simulator needs.
pub trait TradeSignal: Clone + Send + Sync + 'static {
    fn instrument(&self) -> &Instrument;
    fn price(&self) -> f64;
    fn time(&self) -> DateTime<Utc>;
    fn action(&self) -> TradeAction;
}

impl TradeSignal for CrossoverSignal {
    fn instrument(&self) -> &Instrument {
        &self.config.instrument
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn action(&self) -> TradeAction {
        match self.kind {
            CrossKind::CrossUp => TradeAction::Enter,
            CrossKind::CrossDown => TradeAction::Exit,
            CrossKind::NoCross => TradeAction::Hold,
        }
    }
}

impl TradeSignal for GoldenCrossSignal {
    fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    fn price(&self) -> f64 {
        self.price
    }

    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn action(&self) -> TradeAction {
        match self.kind {
            GoldenCrossKind::GoldenCross => TradeAction::Enter,
            GoldenCrossKind::DeathCross => TradeAction::Exit,
            GoldenCrossKind::NoCross => TradeAction::Hold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DealDirection {
    Buy,
    Sell,
}

/// One executed order as recorded in a bot's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub direction: DealDirection,
    pub time: DateTime<Utc>,
    /// The reference price the order was submitted at.
    pub price: f64,
    pub quantity: u64,
    /// The filled value after slippage, excluding commission.
    pub notional: f64,
    pub commission: f64,
}

/// A ledger entry: the deal and the signal that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealRecord<S> {
    pub deal: Deal,
    pub signal: S,
}
