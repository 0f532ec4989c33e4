// In crates/engine/src/simulator.rs

use core_types::{Deal, DealDirection, DealRecord, Instrument, TradeAction, TradeSignal};
use execution::{Exchange, OrderRequest, OrderResult, ZeroQuantityPolicy};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};

/// A single-strategy trading bot.
///
/// Buys with the whole balance on an enter signal and sells the whole
/// position on an exit signal, recording every fill in a deal ledger and a
/// balance history seeded with the starting balance.
#[derive(Debug)]
pub struct TradingSimulator<S, E> {
    exchange: E,
    zero_quantity: ZeroQuantityPolicy,
    balance: f64,
    positions: HashMap<Instrument, u64>,
    deals: Vec<DealRecord<S>>,
    balance_history: Vec<f64>,
}

impl<S: TradeSignal, E: Exchange> TradingSimulator<S, E> {
    pub fn new(exchange: E, start_balance: f64) -> Self {
        Self {
            exchange,
            zero_quantity: ZeroQuantityPolicy::default(),
            balance: start_balance,
            positions: HashMap::new(),
            deals: Vec::new(),
            balance_history: vec![start_balance],
        }
    }

    pub fn with_zero_quantity_policy(mut self, policy: ZeroQuantityPolicy) -> Self {
        self.zero_quantity = policy;
        self
    }

    /// Consumes signals until `stop` turns `true`, its sender is dropped, or
    /// the signal channel closes. A signal already received is always
    /// processed to completion.
    pub async fn run(&mut self, mut signals: mpsc::Receiver<S>, mut stop: watch::Receiver<bool>) {
        tracing::info!(exchange = self.exchange.name(), balance = self.balance, "Trading simulator started.");
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                signal = signals.recv() => match signal {
                    Some(signal) => self.on_signal(signal).await,
                    None => break,
                },
            }
        }
        tracing::info!(deals = self.deals.len(), balance = self.balance, "Trading simulator stopped.");
    }

    /// Processes a pre-computed signal sequence in order.
    pub async fn replay(&mut self, signals: impl IntoIterator<Item = S>) {
        for signal in signals {
            self.on_signal(signal).await;
        }
    }

    pub async fn on_signal(&mut self, signal: S) {
        match signal.action() {
            TradeAction::Enter => self.buy(signal).await,
            TradeAction::Exit => self.sell(signal).await,
            TradeAction::Hold => {}
        }
    }

    async fn buy(&mut self, signal: S) {
        let price = signal.price();
        let quantity = if price.is_finite() && price > 0.0 && self.balance > 0.0 {
            (self.balance / price).floor() as u64
        } else {
            0
        };

        if quantity == 0 && self.zero_quantity == ZeroQuantityPolicy::Skip {
            tracing::debug!(instrument = %signal.instrument(), price, balance = self.balance, "Balance buys nothing; skipping.");
            return;
        }

        let order = OrderRequest {
            instrument_id: signal.instrument().id.clone(),
            quantity,
            price,
            time: signal.time(),
        };
        let fill = match self.exchange.buy(&order).await {
            Ok(fill) => fill,
            Err(e) => {
                tracing::warn!(instrument = %signal.instrument(), error = %e, "Buy failed; signal skipped.");
                return;
            }
        };

        self.balance -= fill.notional + fill.commission;
        if fill.quantity > 0 {
            *self.positions.entry(signal.instrument().clone()).or_default() += fill.quantity;
        }
        self.record(DealDirection::Buy, &fill, signal);
    }

    async fn sell(&mut self, signal: S) {
        let Some(&held) = self.positions.get(signal.instrument()) else {
            tracing::debug!(instrument = %signal.instrument(), "No position to exit; signal ignored.");
            return;
        };

        let order = OrderRequest {
            instrument_id: signal.instrument().id.clone(),
            quantity: held,
            price: signal.price(),
            time: signal.time(),
        };
        let fill = match self.exchange.sell(&order).await {
            Ok(fill) => fill,
            Err(e) => {
                tracing::warn!(instrument = %signal.instrument(), error = %e, "Sell failed; signal skipped.");
                return;
            }
        };

        self.balance += fill.notional - fill.commission;
        let remaining = held.saturating_sub(fill.quantity);
        if remaining == 0 {
            self.positions.remove(signal.instrument());
        } else {
            self.positions.insert(signal.instrument().clone(), remaining);
        }
        self.record(DealDirection::Sell, &fill, signal);
    }

    fn record(&mut self, direction: DealDirection, fill: &OrderResult, signal: S) {
        let deal = Deal {
            direction,
            time: fill.time,
            price: signal.price(),
            quantity: fill.quantity,
            notional: fill.notional,
            commission: fill.commission,
        };
        tracing::info!(
            instrument = %signal.instrument(),
            ?direction,
            quantity = deal.quantity,
            notional = deal.notional,
            balance = self.balance,
            "Deal recorded."
        );
        self.balance_history.push(self.balance);
        self.deals.push(DealRecord { deal, signal });
    }

    pub fn deals(&self) -> &[DealRecord<S>] {
        &self.deals
    }

    pub fn balance_history(&self) -> &[f64] {
        &self.balance_history
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Units currently held of `instrument`.
    pub fn position(&self, instrument: &Instrument) -> u64 {
        self.positions.get(instrument).copied().unwrap_or(0)
    }

    pub fn into_parts(self) -> (Vec<DealRecord<S>>, Vec<f64>) {
        (self.deals, self.balance_history)
    }
}
