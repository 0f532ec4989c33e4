// In crates/core-types/src/lib.rs

pub mod error;
pub mod strategy;
pub mod types;

// Re-export the most important types for easy access from other crates.
pub use error::{Error, Result};
pub use strategy::{
    CrossKind, CrossoverSignal, Deal, DealDirection, DealRecord, GoldenCrossConfig,
    GoldenCrossKind, GoldenCrossSignal, SmaConfig, TradeAction, TradeSignal,
};
pub use types::{Candle, IndicatorValue, Instrument, Interval, PriceSample};
