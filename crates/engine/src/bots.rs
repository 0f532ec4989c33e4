// In crates/engine/src/bots.rs

use crate::bus::SubscriptionId;
use crate::simulator::TradingSimulator;
use crate::strategy::StrategyService;
use core_types::{Deal, Error, GoldenCrossConfig, Result, SmaConfig, TradeSignal};
use execution::{Exchange, ZeroQuantityPolicy};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

/// Unique identifier of a bot created by a [`BotService`].
pub type BotId = u64;

/// The live strategy a bot trades on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BotStrategy {
    Crossover(SmaConfig),
    GoldenCross(GoldenCrossConfig),
}

/// What a bot did between being started and stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotReport {
    pub id: BotId,
    pub strategy: BotStrategy,
    pub start_balance: f64,
    pub final_balance: f64,
    pub deals: Vec<Deal>,
    pub balance_history: Vec<f64>,
}

/// Lifecycle stage of a bot as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BotStatus {
    Idle,
    Running,
    /// Still registered as running, but its signal stream has ended.
    Finished,
    Stopping,
    Stopped,
}

/// Final balance, deals and balance history of one run.
type Outcome = (f64, Vec<Deal>, Vec<f64>);

enum BotState {
    Idle,
    Running {
        subscription: SubscriptionId,
        stop: watch::Sender<bool>,
        handle: JoinHandle<Outcome>,
    },
    /// A `stop_bot` call owns the task and is waiting for it to end.
    Stopping,
    Stopped(BotReport),
}

struct Bot {
    strategy: BotStrategy,
    start_balance: f64,
    state: BotState,
}

/// Registry of live trading bots, each a [`TradingSimulator`] fed by a
/// shared strategy subscription.
pub struct BotService {
    strategies: Arc<StrategyService>,
    exchange: Arc<dyn Exchange>,
    zero_quantity: ZeroQuantityPolicy,
    bots: Mutex<HashMap<BotId, Bot>>,
    next_id: AtomicU64,
}

impl BotService {
    pub fn new(strategies: Arc<StrategyService>, exchange: Arc<dyn Exchange>, zero_quantity: ZeroQuantityPolicy) -> Self {
        Self {
            strategies,
            exchange,
            zero_quantity,
            bots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a bot without starting it.
    pub async fn create_bot(&self, strategy: BotStrategy, start_balance: f64) -> BotId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::info!(bot = id, ?strategy, start_balance, "Creating new bot instance.");
        self.bots.lock().await.insert(
            id,
            Bot {
                strategy,
                start_balance,
                state: BotState::Idle,
            },
        );
        id
    }

    /// Subscribes the bot to its strategy and starts trading.
    pub async fn run_bot(&self, id: BotId) -> Result<()> {
        let mut bots = self.bots.lock().await;
        let bot = bots.get_mut(&id).ok_or_else(|| not_found(id))?;
        match bot.state {
            BotState::Running { .. } => {
                return Err(Error::Configuration(format!("bot {} is already running", id)));
            }
            BotState::Stopping => return Err(Error::Configuration(format!("bot {} is stopping", id))),
            BotState::Idle | BotState::Stopped(_) => {}
        }

        let (stop, stop_rx) = watch::channel(false);
        let (subscription, handle) = match &bot.strategy {
            BotStrategy::Crossover(config) => {
                let sub = self.strategies.subscribe_crossover(config).await?;
                (sub.id, self.spawn(bot.start_balance, sub.receiver, stop_rx))
            }
            BotStrategy::GoldenCross(config) => {
                let sub = self.strategies.subscribe_golden_cross(config).await?;
                (sub.id, self.spawn(bot.start_balance, sub.receiver, stop_rx))
            }
        };

        bot.state = BotState::Running {
            subscription,
            stop,
            handle,
        };
        tracing::info!(bot = id, "Bot started.");
        Ok(())
    }

    /// Stops the bot once it has drained the signal it is processing and
    /// returns its report.
    ///
    /// The registry stays unlocked while the bot winds down, so other bots
    /// can be managed meanwhile.
    pub async fn stop_bot(&self, id: BotId) -> Result<BotReport> {
        let (strategy, start_balance, subscription, stop, handle) = {
            let mut bots = self.bots.lock().await;
            let bot = bots.get_mut(&id).ok_or_else(|| not_found(id))?;
            match std::mem::replace(&mut bot.state, BotState::Stopping) {
                BotState::Running {
                    subscription,
                    stop,
                    handle,
                } => (bot.strategy.clone(), bot.start_balance, subscription, stop, handle),
                BotState::Stopped(report) => {
                    bot.state = BotState::Stopped(report.clone());
                    return Ok(report);
                }
                BotState::Stopping => return Err(Error::Configuration(format!("bot {} is already stopping", id))),
                BotState::Idle => {
                    bot.state = BotState::Idle;
                    return Err(Error::Configuration(format!("bot {} is not running", id)));
                }
            }
        };

        // Fails only if the task already ended.
        let _ = stop.send(true);
        let joined = handle.await;
        self.unsubscribe(&strategy, subscription).await;

        let mut bots = self.bots.lock().await;
        let (final_balance, deals, balance_history) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(bot) = bots.get_mut(&id) {
                    bot.state = BotState::Idle;
                }
                return Err(Error::Execution(format!("bot {} task failed: {}", id, e)));
            }
        };

        let report = BotReport {
            id,
            strategy,
            start_balance,
            final_balance,
            deals,
            balance_history,
        };
        tracing::info!(bot = id, deals = report.deals.len(), final_balance, "Bot stopped.");
        // A bot deleted while stopping stays deleted.
        if let Some(bot) = bots.get_mut(&id) {
            bot.state = BotState::Stopped(report.clone());
        }
        Ok(report)
    }

    /// Stops the bot if needed and forgets it.
    pub async fn delete_bot(&self, id: BotId) -> Result<()> {
        let running = {
            let bots = self.bots.lock().await;
            let bot = bots.get(&id).ok_or_else(|| not_found(id))?;
            matches!(bot.state, BotState::Running { .. })
        };
        if running {
            self.stop_bot(id).await?;
        }
        self.bots.lock().await.remove(&id);
        tracing::info!(bot = id, "Bot deleted.");
        Ok(())
    }

    pub async fn status(&self, id: BotId) -> Result<BotStatus> {
        let bots = self.bots.lock().await;
        let bot = bots.get(&id).ok_or_else(|| not_found(id))?;
        Ok(match &bot.state {
            BotState::Idle => BotStatus::Idle,
            BotState::Running { handle, .. } if handle.is_finished() => BotStatus::Finished,
            BotState::Running { .. } => BotStatus::Running,
            BotState::Stopping => BotStatus::Stopping,
            BotState::Stopped(_) => BotStatus::Stopped,
        })
    }

    pub async fn bot_ids(&self) -> Vec<BotId> {
        let mut ids: Vec<BotId> = self.bots.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn spawn<S: TradeSignal>(
        &self,
        start_balance: f64,
        signals: mpsc::Receiver<S>,
        stop: watch::Receiver<bool>,
    ) -> JoinHandle<Outcome> {
        let simulator = TradingSimulator::new(Arc::clone(&self.exchange), start_balance)
            .with_zero_quantity_policy(self.zero_quantity);
        tokio::spawn(async move {
            let mut simulator = simulator;
            simulator.run(signals, stop).await;
            let balance = simulator.balance();
            let (deals, history) = simulator.into_parts();
            (balance, deals.into_iter().map(|record| record.deal).collect(), history)
        })
    }

    async fn unsubscribe(&self, strategy: &BotStrategy, subscription: SubscriptionId) {
        let result = match strategy {
            BotStrategy::Crossover(config) => self.strategies.unsubscribe_crossover(config, subscription).await,
            BotStrategy::GoldenCross(config) => self.strategies.unsubscribe_golden_cross(config, subscription).await,
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to release bot subscription.");
        }
    }
}

fn not_found(id: BotId) -> Error {
    Error::NotFound(format!("bot {} does not exist", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::IndicatorService;
    use crate::test_support::{candle, instrument, store_with_closes};
    use async_trait::async_trait;
    use core_types::CrossKind;
    use execution::{OrderRequest, OrderResult, SimulatedExchange, SimulationSettings};
    use market_data::{InMemoryMarketData, MarketDataSource};
    use tokio::sync::Notify;
    use tokio::time::{Duration, timeout};

    fn service_with(store: &Arc<InMemoryMarketData>, exchange: Arc<dyn Exchange>) -> BotService {
        let market_data: Arc<dyn MarketDataSource> = store.clone();
        let indicators = Arc::new(IndicatorService::new(Arc::clone(&market_data), 16));
        let strategies = Arc::new(StrategyService::new(market_data, indicators, 16));
        BotService::new(strategies, exchange, ZeroQuantityPolicy::Submit)
    }

    fn service(store: &Arc<InMemoryMarketData>) -> BotService {
        service_with(store, Arc::new(SimulatedExchange::new(SimulationSettings::frictionless())))
    }

    /// Fills at the reference price, holding every buy until the gate opens.
    #[derive(Default)]
    struct GatedExchange {
        entered: Notify,
        gate: Notify,
    }

    impl GatedExchange {
        fn fill(order: &OrderRequest) -> OrderResult {
            OrderResult {
                quantity: order.quantity,
                notional: order.quantity as f64 * order.price,
                commission: 0.0,
                time: order.time,
            }
        }
    }

    #[async_trait]
    impl Exchange for GatedExchange {
        fn name(&self) -> &'static str {
            "GatedExchange"
        }

        async fn buy(&self, order: &OrderRequest) -> execution::Result<OrderResult> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(Self::fill(order))
        }

        async fn sell(&self, order: &OrderRequest) -> execution::Result<OrderResult> {
            Ok(Self::fill(order))
        }
    }

    async fn wait_for_status(bots: &BotService, id: BotId, expected: BotStatus) {
        timeout(Duration::from_secs(1), async {
            while bots.status(id).await.unwrap() != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn bots_get_distinct_ids_and_unknown_ids_are_not_found() {
        let store = store_with_closes(&[10.0, 10.0]).await;
        let bots = service(&store);
        let config = SmaConfig::new(instrument(), 2).unwrap();

        let first = bots.create_bot(BotStrategy::Crossover(config.clone()), 100.0).await;
        let second = bots.create_bot(BotStrategy::Crossover(config), 100.0).await;
        assert_ne!(first, second);
        assert_eq!(bots.bot_ids().await, vec![first, second]);

        assert!(matches!(bots.run_bot(999).await, Err(Error::NotFound(_))));
        assert!(matches!(bots.stop_bot(999).await, Err(Error::NotFound(_))));
        assert!(matches!(bots.delete_bot(999).await, Err(Error::NotFound(_))));
        assert!(matches!(bots.stop_bot(first).await, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn live_bot_trades_on_published_candles() {
        let store = store_with_closes(&[10.0, 10.0]).await;
        let bots = service(&store);
        let config = SmaConfig::new(instrument(), 2).unwrap();
        let id = bots.create_bot(BotStrategy::Crossover(config.clone()), 100.0).await;
        bots.run_bot(id).await.unwrap();
        assert_eq!(bots.status(id).await.unwrap(), BotStatus::Running);
        // Delivered after the bot, so seeing a signal means the bot has it queued.
        let mut observer = bots.strategies.subscribe_crossover(&config).await.unwrap();

        // Seeds below the average, crosses up at 20 and back down at 5.
        for (h, close) in [(2, 9.0), (3, 20.0), (4, 5.0)] {
            store.publish(candle(h, close)).await;
        }
        for expected in [CrossKind::CrossUp, CrossKind::CrossDown] {
            let signal = timeout(Duration::from_secs(1), observer.receiver.recv()).await.unwrap().unwrap();
            assert_eq!(signal.kind, expected);
        }

        // Ending the feed closes the bot's queue once it has traded both signals.
        store.close_live(&instrument()).await;
        wait_for_status(&bots, id, BotStatus::Finished).await;
        let report = timeout(Duration::from_secs(1), bots.stop_bot(id)).await.unwrap().unwrap();

        assert_eq!(report.deals.len(), 2);
        assert_eq!(report.deals[0].quantity, 5);
        assert_eq!(report.final_balance, 100.0 - 5.0 * 20.0 + 5.0 * 5.0);
        assert_eq!(report.balance_history.len(), 3);
        assert_eq!(bots.status(id).await.unwrap(), BotStatus::Stopped);

        // A stopped bot keeps its report until deleted.
        assert_eq!(bots.stop_bot(id).await.unwrap(), report);
        bots.strategies.unsubscribe_crossover(&config, observer.id).await.unwrap();
        bots.delete_bot(id).await.unwrap();
        assert!(bots.bot_ids().await.is_empty());
    }

    #[tokio::test]
    async fn stopping_a_busy_bot_leaves_the_registry_usable() {
        let store = store_with_closes(&[10.0, 10.0]).await;
        let exchange = Arc::new(GatedExchange::default());
        let bots = Arc::new(service_with(&store, exchange.clone()));
        let config = SmaConfig::new(instrument(), 2).unwrap();
        let id = bots.create_bot(BotStrategy::Crossover(config), 100.0).await;
        bots.run_bot(id).await.unwrap();

        // The cross up at 20 parks the bot inside its buy.
        for (h, close) in [(2, 9.0), (3, 20.0)] {
            store.publish(candle(h, close)).await;
        }
        timeout(Duration::from_secs(1), exchange.entered.notified()).await.unwrap();

        let stopper = tokio::spawn({
            let bots = Arc::clone(&bots);
            async move { bots.stop_bot(id).await }
        });
        wait_for_status(&bots, id, BotStatus::Stopping).await;
        assert!(matches!(bots.run_bot(id).await, Err(Error::Configuration(_))));
        assert!(matches!(bots.stop_bot(id).await, Err(Error::Configuration(_))));

        let other = timeout(
            Duration::from_secs(1),
            bots.create_bot(BotStrategy::Crossover(SmaConfig::new(instrument(), 3).unwrap()), 50.0),
        )
        .await
        .unwrap();
        assert_eq!(bots.status(other).await.unwrap(), BotStatus::Idle);

        // The in-flight buy completes before the bot reports.
        exchange.gate.notify_one();
        let report = timeout(Duration::from_secs(1), stopper).await.unwrap().unwrap().unwrap();
        assert_eq!(report.deals.len(), 1);
        assert_eq!(report.deals[0].quantity, 5);
        assert_eq!(bots.status(id).await.unwrap(), BotStatus::Stopped);
    }
}
