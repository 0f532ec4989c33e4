// In crates/app-config/src/types.rs

use execution::{SimulationSettings, ZeroQuantityPolicy};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Settings {
    /// The application's general settings.
    #[serde(default)]
    pub app: AppSettings,
    /// Commission and slippage of the simulated exchange.
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub bus: BusSettings,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// The environment the application is running in (e.g., "development", "production").
    pub environment: String,
    /// The log level for the application.
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BacktestSettings {
    pub start_balance: f64,
    pub zero_quantity_policy: ZeroQuantityPolicy,
    /// Backtests run at once by a window-length sweep.
    pub sweep_concurrency: usize,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        Self {
            start_balance: 10_000.0,
            zero_quantity_policy: ZeroQuantityPolicy::Submit,
            sweep_concurrency: 5,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BusSettings {
    /// Capacity of each subscriber queue.
    pub subscriber_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self { subscriber_capacity: 100 }
    }
}
