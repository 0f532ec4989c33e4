// In crates/backtester/src/sweep.rs

use crate::{BacktestReport, BacktestSettings, run_crossover_backtest};
use chrono::{DateTime, Utc};
use core_types::{Instrument, Result, SmaConfig};
use engine::StrategyService;
use execution::Exchange;
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use std::cmp::Ordering;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Default number of backtests run at once.
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 5;

/// The report of one SMA window length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepEntry {
    pub length: usize,
    pub report: BacktestReport,
}

/// Runs the crossover backtest for every SMA length in `lengths`, at most
/// `concurrency` at a time, and ranks the results by profit ratio. Lengths
/// whose ledger is too short to judge sort last.
///
/// The first failing backtest aborts the sweep.
#[allow(clippy::too_many_arguments)]
pub async fn sweep_lengths(
    strategies: &StrategyService,
    exchange: Arc<dyn Exchange>,
    instrument: &Instrument,
    lengths: RangeInclusive<usize>,
    settings: &BacktestSettings,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    concurrency: usize,
) -> Result<Vec<SweepEntry>> {
    tracing::info!(%instrument, ?lengths, concurrency, "Starting SMA length sweep...");

    let mut entries: Vec<SweepEntry> = stream::iter(lengths)
        .map(|length| {
            let exchange = Arc::clone(&exchange);
            async move {
                let config = SmaConfig::new(instrument.clone(), length)?;
                let outcome = run_crossover_backtest(strategies, exchange, &config, settings, from, to).await?;
                let report = outcome.report();
                tracing::info!(length, %report, "Sweep step finished.");
                Ok::<_, core_types::Error>(SweepEntry { length, report })
            }
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    entries.sort_by(|a, b| rank(&b.report, &a.report).then(a.length.cmp(&b.length)));
    Ok(entries)
}

fn rank(a: &BacktestReport, b: &BacktestReport) -> Ordering {
    match (a.profit_ratio, b.profit_ratio) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
