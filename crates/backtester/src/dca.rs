// In crates/backtester/src/dca.rs

use chrono::{DateTime, Utc};
use core_types::{Deal, DealDirection, Error, Instrument, Result};
use execution::{Exchange, OrderRequest};
use market_data::MarketDataSource;
use serde::Serialize;

/// Result of a dollar-cost-averaging backtest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DcaOutcome {
    pub deals: Vec<Deal>,
    /// Sum of all contributions.
    pub invested: f64,
    /// Cash after selling the whole holding at the last close.
    pub final_balance: f64,
}

impl DcaOutcome {
    pub fn profit_ratio(&self) -> Option<f64> {
        (self.invested > 0.0).then(|| (self.final_balance - self.invested) / self.invested)
    }
}

/// Adds `contribution` to cash at every candle in `[from, to)` and buys as
/// many whole units as the cash covers at the candle's open. The leftover
/// cash, negative if fees exceeded it, carries to the next candle. The whole
/// holding is sold at the last close.
pub async fn backtest_dca<E: Exchange>(
    market_data: &dyn MarketDataSource,
    exchange: &E,
    instrument: &Instrument,
    contribution: f64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<DcaOutcome> {
    if !contribution.is_finite() || contribution <= 0.0 {
        return Err(Error::Configuration(format!(
            "contribution must be positive, got {}",
            contribution
        )));
    }

    let candles = market_data.history_by_time(instrument, from, to).await?;
    if candles.len() < 2 {
        return Err(Error::InsufficientData {
            required: 2,
            available: candles.len(),
        });
    }

    let last = &candles[candles.len() - 1];

    let mut deals = Vec::with_capacity(candles.len() + 1);
    let mut cash = 0.0;
    let mut invested = 0.0;
    let mut held: u64 = 0;

    for candle in &candles {
        invested += contribution;
        cash += contribution;
        if cash <= 0.0 || candle.open <= 0.0 {
            continue;
        }

        let quantity = (cash / candle.open).floor() as u64;
        if quantity == 0 {
            continue;
        }

        let order = OrderRequest {
            instrument_id: instrument.id.clone(),
            quantity,
            price: candle.open,
            time: candle.start_time,
        };
        let fill = exchange.buy(&order).await?;
        cash -= fill.notional + fill.commission;
        held += fill.quantity;
        deals.push(Deal {
            direction: DealDirection::Buy,
            time: fill.time,
            price: candle.open,
            quantity: fill.quantity,
            notional: fill.notional,
            commission: fill.commission,
        });
    }

    if held > 0 {
        let order = OrderRequest {
            instrument_id: instrument.id.clone(),
            quantity: held,
            price: last.close,
            time: last.end_time,
        };
        let fill = exchange.sell(&order).await?;
        cash += fill.notional - fill.commission;
        deals.push(Deal {
            direction: DealDirection::Sell,
            time: fill.time,
            price: last.close,
            quantity: fill.quantity,
            notional: fill.notional,
            commission: fill.commission,
        });
    }

    tracing::info!(%instrument, deals = deals.len(), invested, final_balance = cash, "DCA backtest finished.");
    Ok(DcaOutcome {
        deals,
        invested,
        final_balance: cash,
    })
}
