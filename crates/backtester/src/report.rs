// In crates/backtester/src/report.rs

use core_types::{DealDirection, DealRecord};
use serde::Serialize;
use std::fmt;

/// Summary of a backtest ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub start_balance: f64,
    pub deal_count: usize,
    /// The last balance-history entry.
    pub final_balance: f64,
    /// Cash after the last closed position. Differs from `final_balance`
    /// when the ledger ends with an unmatched buy.
    pub realized_balance: f64,
    /// `(realized - start) / start`, or `None` when fewer than two deals
    /// leave nothing to judge.
    pub profit_ratio: Option<f64>,
}

impl BacktestReport {
    pub fn new<S>(start_balance: f64, deals: &[DealRecord<S>], balance_history: &[f64]) -> Self {
        let final_balance = balance_history.last().copied().unwrap_or(start_balance);
        let ends_open = deals
            .last()
            .is_some_and(|record| record.deal.direction == DealDirection::Buy);
        let realized_balance = match balance_history {
            [.., before_last_buy, _] if ends_open => *before_last_buy,
            _ => final_balance,
        };

        let profit_ratio = (deals.len() >= 2 && start_balance > 0.0)
            .then(|| (realized_balance - start_balance) / start_balance);

        Self {
            start_balance,
            deal_count: deals.len(),
            final_balance,
            realized_balance,
            profit_ratio,
        }
    }

    pub fn is_too_short(&self) -> bool {
        self.profit_ratio.is_none()
    }
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.profit_ratio {
            Some(profit) => write!(
                f,
                "DEALS: {:<5} BALANCE: {:<10.2} PROFIT: {:<6.2}",
                self.deal_count, self.realized_balance, profit
            ),
            None => write!(f, "DEALS: {:<5} too short history", self.deal_count),
        }
    }
}
