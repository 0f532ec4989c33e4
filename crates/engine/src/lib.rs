// In crates/engine/src/lib.rs

pub mod bots;
pub mod bus;
pub mod indicator;
pub mod simulator;
pub mod strategy;

#[cfg(test)]
mod test_support;

pub use bots::{BotId, BotReport, BotService, BotStatus, BotStrategy};
pub use bus::{DEFAULT_SUBSCRIBER_CAPACITY, SignalBus, Subscription, SubscriptionId};
pub use indicator::IndicatorService;
pub use simulator::TradingSimulator;
pub use strategy::StrategyService;

use execution::{Exchange, ZeroQuantityPolicy};
use market_data::MarketDataSource;
use std::sync::Arc;

/// Knobs shared by the engine services.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub subscriber_capacity: usize,
    pub zero_quantity: ZeroQuantityPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            zero_quantity: ZeroQuantityPolicy::default(),
        }
    }
}

/// The indicator, strategy and bot services wired over one market-data
/// source and one exchange.
pub struct Engine {
    pub indicators: Arc<IndicatorService>,
    pub strategies: Arc<StrategyService>,
    pub bots: BotService,
}

impl Engine {
    pub fn new(market_data: Arc<dyn MarketDataSource>, exchange: Arc<dyn Exchange>, settings: EngineSettings) -> Self {
        tracing::info!(
            market_data = market_data.name(),
            exchange = exchange.name(),
            subscriber_capacity = settings.subscriber_capacity,
            "Initializing engine services..."
        );
        let indicators = Arc::new(IndicatorService::new(
            Arc::clone(&market_data),
            settings.subscriber_capacity,
        ));
        let strategies = Arc::new(StrategyService::new(
            market_data,
            Arc::clone(&indicators),
            settings.subscriber_capacity,
        ));
        let bots = BotService::new(Arc::clone(&strategies), exchange, settings.zero_quantity);
        Self {
            indicators,
            strategies,
            bots,
        }
    }
}
