// In app/src/main.rs

use anyhow::{Context, Result};
use app_config::Settings;
use backtester::{
    BacktestReport, BacktestSettings, SweepEntry, backtest_dca, run_crossover_backtest, run_golden_cross_backtest,
    sweep_lengths,
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use core_types::{Candle, GoldenCrossConfig, Instrument, Interval, SmaConfig};
use engine::{Engine, EngineSettings};
use execution::{Exchange, SimulatedExchange};
use market_data::{InMemoryMarketData, MarketDataSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

mod candles;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "SMA crossover signals and backtests over candle files.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Backtests the price / SMA crossover strategy.
    BacktestSmac {
        #[command(flatten)]
        data: DataArgs,

        /// The SMA window length.
        #[arg(short, long)]
        length: usize,
    },

    /// Backtests the short / long SMA golden cross strategy.
    BacktestGoldenCross {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long)]
        short: usize,

        #[arg(long)]
        long: usize,
    },

    /// Backtests the crossover strategy for every SMA length in a range.
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, default_value_t = 2)]
        min_length: usize,

        #[arg(long, default_value_t = 50)]
        max_length: usize,
    },

    /// Backtests a fixed contribution invested on every candle.
    Dca {
        #[command(flatten)]
        data: DataArgs,

        /// Cash added before each candle's buy.
        #[arg(short, long)]
        contribution: f64,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// A JSON array of candles.
    #[arg(long)]
    candles: PathBuf,

    /// The instrument identifier (e.g., "SBER").
    #[arg(short, long)]
    instrument: String,

    /// The candle interval (e.g., "5m", "1h").
    #[arg(long, default_value = "1h")]
    interval: Interval,

    /// Range start (RFC 3339). Defaults to the first candle a window of history allows.
    #[arg(long)]
    from: Option<DateTime<Utc>>,

    /// Range end (RFC 3339). Defaults to the end of the last candle.
    #[arg(long)]
    to: Option<DateTime<Utc>>,
}

/// The loaded candle store plus the range to run over.
struct Market {
    instrument: Instrument,
    store: Arc<InMemoryMarketData>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl DataArgs {
    /// Loads the candle file. Without an explicit `from`, the range starts
    /// after the first `warmup` candles.
    async fn load(&self, warmup: usize) -> Result<Market> {
        let instrument = Instrument::new(self.instrument.clone(), self.interval);
        let candles = candles::load_candles(&self.candles, &instrument)?;
        let (from, to) = self.range(&candles, warmup)?;
        tracing::info!(%instrument, candles = candles.len(), %from, %to, "Loaded candle file.");

        let store = InMemoryMarketData::new();
        store.insert_history(candles).await;
        Ok(Market {
            instrument,
            store: Arc::new(store),
            from,
            to,
        })
    }

    fn range(&self, candles: &[Candle], warmup: usize) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let from = match self.from {
            Some(from) => from,
            None => candles
                .get(warmup)
                .map(|candle| candle.start_time)
                .context("Not enough candles to start after the warmup window")?,
        };
        let to = match self.to {
            Some(to) => to,
            None => candles.last().map(|candle| candle.end_time).context("The candle file is empty")?,
        };
        Ok((from, to))
    }
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let settings = app_config::load_settings()?;
    let level: tracing::Level = settings
        .app
        .log_level
        .parse()
        .with_context(|| format!("Invalid log level '{}'", settings.app.log_level))?;
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_filter(tracing_subscriber::filter::Targets::new().with_default(level));
    tracing_subscriber::registry().with(fmt_layer).init();

    let cli = Cli::parse();
    tracing::info!(environment = %settings.app.environment, "Starting smac");

    match cli.command {
        Commands::BacktestSmac { data, length } => handle_backtest_smac(&settings, data, length).await?,
        Commands::BacktestGoldenCross { data, short, long } => {
            handle_backtest_golden_cross(&settings, data, short, long).await?
        }
        Commands::Sweep {
            data,
            min_length,
            max_length,
        } => handle_sweep(&settings, data, min_length, max_length).await?,
        Commands::Dca { data, contribution } => handle_dca(&settings, data, contribution).await?,
    }

    tracing::info!("smac has finished successfully.");
    Ok(())
}

fn build_engine(settings: &Settings, market: &Market) -> Engine {
    let market_data: Arc<dyn MarketDataSource> = market.store.clone();
    Engine::new(
        market_data,
        Arc::new(SimulatedExchange::new(settings.simulation)),
        EngineSettings {
            subscriber_capacity: settings.bus.subscriber_capacity,
            zero_quantity: settings.backtest.zero_quantity_policy,
        },
    )
}

fn backtest_settings(settings: &Settings) -> BacktestSettings {
    BacktestSettings {
        start_balance: settings.backtest.start_balance,
        zero_quantity: settings.backtest.zero_quantity_policy,
    }
}

async fn handle_backtest_smac(settings: &Settings, data: DataArgs, length: usize) -> Result<()> {
    let market = data.load(length).await?;
    let engine = build_engine(settings, &market);
    let config = SmaConfig::new(market.instrument.clone(), length)?;

    let outcome = run_crossover_backtest(
        &engine.strategies,
        SimulatedExchange::new(settings.simulation),
        &config,
        &backtest_settings(settings),
        market.from,
        market.to,
    )
    .await?;

    print_report(&format!("SMAC {} {}", market.instrument, length), &outcome.report());
    Ok(())
}

async fn handle_backtest_golden_cross(settings: &Settings, data: DataArgs, short: usize, long: usize) -> Result<()> {
    let market = data.load(long).await?;
    let engine = build_engine(settings, &market);
    let config = GoldenCrossConfig::new(market.instrument.clone(), short, long)?;

    let outcome = run_golden_cross_backtest(
        &engine.strategies,
        SimulatedExchange::new(settings.simulation),
        &config,
        &backtest_settings(settings),
        market.from,
        market.to,
    )
    .await?;

    print_report(
        &format!("GOLDEN CROSS {} {}/{}", market.instrument, short, long),
        &outcome.report(),
    );
    Ok(())
}

async fn handle_sweep(settings: &Settings, data: DataArgs, min_length: usize, max_length: usize) -> Result<()> {
    if min_length > max_length {
        anyhow::bail!("--min-length {} is above --max-length {}", min_length, max_length);
    }
    let market = data.load(max_length).await?;
    let engine = build_engine(settings, &market);
    let exchange: Arc<dyn Exchange> = Arc::new(SimulatedExchange::new(settings.simulation));

    let entries = sweep_lengths(
        &engine.strategies,
        exchange,
        &market.instrument,
        min_length..=max_length,
        &backtest_settings(settings),
        market.from,
        market.to,
        settings.backtest.sweep_concurrency,
    )
    .await?;

    print_sweep_report(&market.instrument, &entries);
    Ok(())
}

async fn handle_dca(settings: &Settings, data: DataArgs, contribution: f64) -> Result<()> {
    let market = data.load(0).await?;
    let exchange = SimulatedExchange::new(settings.simulation);

    let outcome = backtest_dca(
        market.store.as_ref(),
        &exchange,
        &market.instrument,
        contribution,
        market.from,
        market.to,
    )
    .await?;

    println!("\n--- DCA {} ---", market.instrument);
    println!("DEALS: {}", outcome.deals.len());
    println!("INVESTED: {:.2}", outcome.invested);
    println!("BALANCE: {:.2}", outcome.final_balance);
    match outcome.profit_ratio() {
        Some(profit) => println!("PROFIT: {:.2}%", profit * 100.0),
        None => println!("PROFIT: n/a"),
    }
    Ok(())
}

fn print_report(title: &str, report: &BacktestReport) {
    println!("\n--- {} ---", title);
    println!("{}", report);
}

fn print_sweep_report(instrument: &Instrument, entries: &[SweepEntry]) {
    println!("\n--- Sweep Complete: {} ---", instrument);
    println!("Top 5 SMA lengths by profit:");
    for (rank, entry) in entries.iter().take(5).enumerate() {
        println!("[Rank {} | Length {}] {}", rank + 1, entry.length, entry.report);
    }
    match entries.first() {
        Some(best) if !best.report.is_too_short() => {
            println!("Recommendation: SMA length {}", best.length);
        }
        _ => println!("Recommendation: no length produced enough deals to judge."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use execution::ZeroQuantityPolicy;

    #[test]
    fn backtest_settings_follow_the_configuration() {
        let mut settings = Settings::default();
        settings.backtest.start_balance = 500.0;
        settings.backtest.zero_quantity_policy = ZeroQuantityPolicy::Skip;

        let backtest = backtest_settings(&settings);
        assert_eq!(backtest.start_balance, 500.0);
        assert_eq!(backtest.zero_quantity, ZeroQuantityPolicy::Skip);
    }
}
