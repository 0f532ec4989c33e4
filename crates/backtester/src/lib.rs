// In crates/backtester/src/lib.rs

pub mod dca;
pub mod report;
pub mod sweep;

pub use dca::{DcaOutcome, backtest_dca};
pub use report::BacktestReport;
pub use sweep::{SweepEntry, sweep_lengths};

use chrono::{DateTime, Utc};
use core_types::{CrossoverSignal, DealRecord, GoldenCrossConfig, GoldenCrossSignal, Result, SmaConfig, TradeSignal};
use engine::{StrategyService, TradingSimulator};
use execution::{Exchange, ZeroQuantityPolicy};

/// Parameters of a simulated backtest run, built from the loaded configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestSettings {
    pub start_balance: f64,
    pub zero_quantity: ZeroQuantityPolicy,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            start_balance: 10_000.0,
            zero_quantity: ZeroQuantityPolicy::default(),
        }
    }
}

/// The ledger and balance trace of one simulated backtest.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestOutcome<S> {
    pub start_balance: f64,
    pub deals: Vec<DealRecord<S>>,
    pub balance_history: Vec<f64>,
}

impl<S> BacktestOutcome<S> {
    pub fn report(&self) -> BacktestReport {
        BacktestReport::new(self.start_balance, &self.deals, &self.balance_history)
    }
}

/// Backtests the price-versus-SMA crossover over `[from, to)` and replays
/// its signals through a trading simulator.
pub async fn run_crossover_backtest<E: Exchange>(
    strategies: &StrategyService,
    exchange: E,
    config: &SmaConfig,
    settings: &BacktestSettings,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<BacktestOutcome<CrossoverSignal>> {
    tracing::info!(config = ?config, %from, %to, start_balance = settings.start_balance, "Starting crossover backtest...");
    let signals = strategies.backtest_crossover(config, from, to).await?;
    Ok(simulate(signals, exchange, settings).await)
}

/// Backtests the golden cross strategy over `[from, to)` and replays its
/// signals through a trading simulator.
pub async fn run_golden_cross_backtest<E: Exchange>(
    strategies: &StrategyService,
    exchange: E,
    config: &GoldenCrossConfig,
    settings: &BacktestSettings,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<BacktestOutcome<GoldenCrossSignal>> {
    tracing::info!(config = ?config, %from, %to, start_balance = settings.start_balance, "Starting golden cross backtest...");
    let signals = strategies.backtest_golden_cross(config, from, to).await?;
    Ok(simulate(signals, exchange, settings).await)
}

async fn simulate<S: TradeSignal, E: Exchange>(
    signals: Vec<S>,
    exchange: E,
    settings: &BacktestSettings,
) -> BacktestOutcome<S> {
    let mut simulator =
        TradingSimulator::new(exchange, settings.start_balance).with_zero_quantity_policy(settings.zero_quantity);
    simulator.replay(signals).await;

    let (deals, balance_history) = simulator.into_parts();
    let outcome = BacktestOutcome {
        start_balance: settings.start_balance,
        deals,
        balance_history,
    };
    tracing::info!(report = %outcome.report(), "Backtest finished.");
    outcome
}
