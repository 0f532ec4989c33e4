// In crates/strategies/src/lib.rs

use core_types::{TradeAction, TradeSignal};

mod cross;
pub mod crossover;
pub mod golden_cross;
pub mod sma;
pub mod sync;

pub use crossover::CrossoverStrategy;
pub use golden_cross::GoldenCrossStrategy;
pub use sma::WindowedAverage;
pub use sync::{PriceSeriesSync, Timestamped};

/// The universal interface for a crossover strategy.
///
/// A strategy is a stateful decision engine: it is seeded with the first
/// aligned observation and then assesses each following one, producing a
/// signal for every input. Only signals whose action is not `Hold` are ever
/// published or collected.
pub trait Strategy {
    /// One aligned observation, e.g. a price and its moving average.
    type Input;
    type Signal: TradeSignal;

    /// The name of the strategy.
    fn name(&self) -> &'static str;

    fn assess(&mut self, input: &Self::Input) -> Self::Signal;
}

/// Runs `strategy` over `inputs` and keeps the actionable signals.
pub fn collect_signals<S, I>(strategy: &mut S, inputs: I) -> Vec<S::Signal>
where
    S: Strategy,
    I: IntoIterator<Item = S::Input>,
{
    inputs
        .into_iter()
        .map(|input| strategy.assess(&input))
        .filter(|signal| signal.action() != TradeAction::Hold)
        .collect()
}
