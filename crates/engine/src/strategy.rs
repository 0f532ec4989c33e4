// In crates/engine/src/strategy.rs

use crate::bus::{Cancellation, Publisher, SignalBus, Subscription, SubscriptionId};
use crate::indicator::IndicatorService;
use chrono::{DateTime, Utc};
use core_types::{
    Candle, CrossoverSignal, GoldenCrossConfig, GoldenCrossSignal, IndicatorValue, Instrument, PriceSample, Result,
    SmaConfig, TradeAction, TradeSignal,
};
use market_data::{FeedId, LiveFeed, MarketDataSource};
use std::sync::Arc;
use strategies::{CrossoverStrategy, GoldenCrossStrategy, PriceSeriesSync, Strategy};

/// Runs crossover strategies over history and shares live ones.
pub struct StrategyService {
    market_data: Arc<dyn MarketDataSource>,
    indicators: Arc<IndicatorService>,
    crossovers: SignalBus<SmaConfig, CrossoverSignal>,
    golden_crosses: SignalBus<GoldenCrossConfig, GoldenCrossSignal>,
}

impl StrategyService {
    pub fn new(
        market_data: Arc<dyn MarketDataSource>,
        indicators: Arc<IndicatorService>,
        subscriber_capacity: usize,
    ) -> Self {
        Self {
            market_data,
            indicators,
            crossovers: SignalBus::new(subscriber_capacity),
            golden_crosses: SignalBus::new(subscriber_capacity),
        }
    }

    /// The crossover signals of closes against their SMA over `[from, to)`.
    pub async fn backtest_crossover(
        &self,
        config: &SmaConfig,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CrossoverSignal>> {
        let (candles, sma) = self.indicators.compute_history_with_source(config, from, to).await?;
        let source = close_samples(&candles);
        let signals = CrossoverStrategy::backtest(config, &source, &sma)?;
        tracing::info!(config = ?config, candles = candles.len(), signals = signals.len(), "Crossover backtest complete.");
        Ok(signals)
    }

    /// The golden/death cross signals of the short SMA against the long SMA over `[from, to)`.
    pub async fn backtest_golden_cross(
        &self,
        config: &GoldenCrossConfig,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<GoldenCrossSignal>> {
        let short = self.indicators.compute_history(&config.short_sma(), from, to).await?;
        let (candles, long) = self
            .indicators
            .compute_history_with_source(&config.long_sma(), from, to)
            .await?;
        let source = close_samples(&candles);
        let signals = GoldenCrossStrategy::backtest(config, &source, &short, &long)?;
        tracing::info!(config = ?config, candles = candles.len(), signals = signals.len(), "Golden cross backtest complete.");
        Ok(signals)
    }

    pub async fn subscribe_crossover(&self, config: &SmaConfig) -> Result<Subscription<CrossoverSignal>> {
        let market_data = Arc::clone(&self.market_data);
        let indicators = Arc::clone(&self.indicators);
        let key = config.clone();
        self.crossovers
            .subscribe(config.clone(), move |publisher, cancel| async move {
                LiveCrossover::start(market_data, indicators, key, publisher, cancel)
                    .await
                    .map(LiveCrossover::run)
            })
            .await
    }

    pub async fn unsubscribe_crossover(&self, config: &SmaConfig, id: SubscriptionId) -> Result<()> {
        self.crossovers.unsubscribe(config, id).await
    }

    pub async fn subscribe_golden_cross(
        &self,
        config: &GoldenCrossConfig,
    ) -> Result<Subscription<GoldenCrossSignal>> {
        let market_data = Arc::clone(&self.market_data);
        let indicators = Arc::clone(&self.indicators);
        let key = config.clone();
        self.golden_crosses
            .subscribe(config.clone(), move |publisher, cancel| async move {
                LiveGoldenCross::start(market_data, indicators, key, publisher, cancel)
                    .await
                    .map(LiveGoldenCross::run)
            })
            .await
    }

    pub async fn unsubscribe_golden_cross(&self, config: &GoldenCrossConfig, id: SubscriptionId) -> Result<()> {
        self.golden_crosses.unsubscribe(config, id).await
    }
}

fn close_samples(candles: &[Candle]) -> Vec<PriceSample> {
    candles.iter().map(Candle::close_sample).collect()
}

/// Upstream subscriptions held by a live strategy, released when it stops.
struct Upstreams {
    market_data: Arc<dyn MarketDataSource>,
    indicators: Arc<IndicatorService>,
    prices: Option<(Instrument, FeedId)>,
    smas: Vec<(SmaConfig, SubscriptionId)>,
}

impl Upstreams {
    fn new(market_data: Arc<dyn MarketDataSource>, indicators: Arc<IndicatorService>) -> Self {
        Self {
            market_data,
            indicators,
            prices: None,
            smas: Vec::new(),
        }
    }

    async fn sma(&mut self, config: SmaConfig) -> Result<Subscription<IndicatorValue>> {
        let subscription = self.indicators.subscribe(&config).await?;
        self.smas.push((config, subscription.id));
        Ok(subscription)
    }

    async fn prices(&mut self, instrument: &Instrument) -> Result<LiveFeed> {
        let feed = self.market_data.subscribe_live(instrument).await?;
        self.prices = Some((instrument.clone(), feed.id));
        Ok(feed)
    }

    async fn release(self) {
        for (config, id) in &self.smas {
            if let Err(e) = self.indicators.unsubscribe(config, *id).await {
                tracing::debug!(error = %e, "SMA subscription already released.");
            }
        }
        if let Some((instrument, feed)) = &self.prices {
            if let Err(e) = self.market_data.unsubscribe_live(instrument, *feed).await {
                tracing::debug!(error = %e, "Live feed already closed.");
            }
        }
    }
}

struct LiveCrossover {
    config: SmaConfig,
    upstreams: Upstreams,
    prices: LiveFeed,
    sma: Subscription<IndicatorValue>,
    publisher: Publisher<SmaConfig, CrossoverSignal>,
    cancel: Cancellation,
}

impl LiveCrossover {
    async fn start(
        market_data: Arc<dyn MarketDataSource>,
        indicators: Arc<IndicatorService>,
        config: SmaConfig,
        publisher: Publisher<SmaConfig, CrossoverSignal>,
        cancel: Cancellation,
    ) -> Result<Self> {
        let mut upstreams = Upstreams::new(market_data, indicators);
        let acquired = async {
            let sma = upstreams.sma(config.clone()).await?;
            let prices = upstreams.prices(&config.instrument).await?;
            Ok::<_, core_types::Error>((sma, prices))
        }
        .await;

        match acquired {
            Ok((sma, prices)) => Ok(Self {
                config,
                upstreams,
                prices,
                sma,
                publisher,
                cancel,
            }),
            Err(e) => {
                upstreams.release().await;
                Err(e)
            }
        }
    }

    async fn run(mut self) {
        tracing::info!(config = ?self.config, "Live crossover strategy started.");
        let mut sync = PriceSeriesSync::<Candle, IndicatorValue>::new();
        let mut strategy: Option<CrossoverStrategy> = None;

        loop {
            let pair = tokio::select! {
                _ = self.cancel.cancelled() => break,
                pair = sync.next_pair(&mut self.prices.receiver, &mut self.sma.receiver) => pair,
            };
            let Some((candle, sma)) = pair else {
                tracing::warn!(config = ?self.config, "Crossover input closed.");
                break;
            };

            let sample = candle.close_sample();
            let signal = match &mut strategy {
                Some(active) => active.assess(&(sample, sma)),
                // The first aligned pair only seeds the state.
                None => {
                    let seeded = CrossoverStrategy::new(self.config.clone(), sample, sma);
                    tracing::debug!(
                        strategy = seeded.name(),
                        above = seeded.is_above_indicator(),
                        time = %seeded.last_sample().time,
                        "Strategy seeded."
                    );
                    strategy = Some(seeded);
                    continue;
                }
            };
            if signal.action() != TradeAction::Hold && !self.publisher.publish(signal).await {
                break;
            }
        }

        self.upstreams.release().await;
        tracing::info!(config = ?self.config, "Live crossover strategy stopped.");
    }
}

struct LiveGoldenCross {
    config: GoldenCrossConfig,
    upstreams: Upstreams,
    prices: LiveFeed,
    short: Subscription<IndicatorValue>,
    long: Subscription<IndicatorValue>,
    publisher: Publisher<GoldenCrossConfig, GoldenCrossSignal>,
    cancel: Cancellation,
}

impl LiveGoldenCross {
    async fn start(
        market_data: Arc<dyn MarketDataSource>,
        indicators: Arc<IndicatorService>,
        config: GoldenCrossConfig,
        publisher: Publisher<GoldenCrossConfig, GoldenCrossSignal>,
        cancel: Cancellation,
    ) -> Result<Self> {
        let mut upstreams = Upstreams::new(market_data, indicators);
        let acquired = async {
            let short = upstreams.sma(config.short_sma()).await?;
            let long = upstreams.sma(config.long_sma()).await?;
            let prices = upstreams.prices(&config.instrument).await?;
            Ok::<_, core_types::Error>((short, long, prices))
        }
        .await;

        match acquired {
            Ok((short, long, prices)) => Ok(Self {
                config,
                upstreams,
                prices,
                short,
                long,
                publisher,
                cancel,
            }),
            Err(e) => {
                upstreams.release().await;
                Err(e)
            }
        }
    }

    async fn run(mut self) {
        tracing::info!(config = ?self.config, "Live golden cross strategy started.");
        // Short and long SMAs pair first; the pair then meets its price.
        let mut smas = PriceSeriesSync::<IndicatorValue, IndicatorValue>::new();
        let mut with_price = PriceSeriesSync::<(IndicatorValue, IndicatorValue), Candle>::new();
        let mut strategy: Option<GoldenCrossStrategy> = None;

        loop {
            let observation = tokio::select! {
                _ = self.cancel.cancelled() => break,
                short = self.short.receiver.recv() => match short {
                    Some(short) => smas.push_left(short).and_then(|pair| with_price.push_left(pair)),
                    None => break,
                },
                long = self.long.receiver.recv() => match long {
                    Some(long) => smas.push_right(long).and_then(|pair| with_price.push_left(pair)),
                    None => break,
                },
                candle = self.prices.receiver.recv() => match candle {
                    Some(candle) => with_price.push_right(candle),
                    None => break,
                },
            };
            let Some(((short, long), candle)) = observation else {
                continue;
            };

            let signal = match &mut strategy {
                Some(active) => active.assess(&(candle.close_sample(), short, long)),
                None => {
                    let seeded = GoldenCrossStrategy::new(self.config.clone(), short, long);
                    tracing::debug!(
                        strategy = seeded.name(),
                        above = seeded.is_short_above_long(),
                        time = %seeded.last_long().time,
                        "Strategy seeded."
                    );
                    strategy = Some(seeded);
                    continue;
                }
            };
            if signal.action() != TradeAction::Hold && !self.publisher.publish(signal).await {
                break;
            }
        }

        self.upstreams.release().await;
        tracing::info!(config = ?self.config, "Live golden cross strategy stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{candle, hour, instrument, store_with_closes};
    use core_types::{CrossKind, Error, GoldenCrossKind};
    use market_data::InMemoryMarketData;
    use tokio::time::{Duration, timeout};

    fn services(store: &Arc<InMemoryMarketData>) -> StrategyService {
        let market_data: Arc<dyn MarketDataSource> = store.clone();
        let indicators = Arc::new(IndicatorService::new(Arc::clone(&market_data), 16));
        StrategyService::new(market_data, indicators, 16)
    }

    #[tokio::test]
    async fn crossover_backtest_over_history() {
        // A flat SMA of 10 primed by the first three candles.
        let store = store_with_closes(&[10.0, 10.0, 10.0, 10.0, 9.0, 14.0, 4.0]).await;
        let config = SmaConfig::new(instrument(), 3).unwrap();

        let signals = services(&store).backtest_crossover(&config, hour(3), hour(7)).await.unwrap();
        let kinds: Vec<_> = signals.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![CrossKind::CrossUp, CrossKind::CrossDown]);
        assert_eq!(signals[0].price, 14.0);
        assert_eq!(signals[0].time, hour(6));
    }

    #[tokio::test]
    async fn backtest_without_enough_history_fails() {
        let store = store_with_closes(&[1.0, 2.0]).await;
        let config = SmaConfig::new(instrument(), 3).unwrap();

        assert!(matches!(
            services(&store).backtest_crossover(&config, hour(1), hour(2)).await,
            Err(Error::InsufficientData { .. })
        ));
    }

    #[tokio::test]
    async fn golden_cross_backtest_over_history() {
        let mut closes = vec![10.0; 4];
        closes.extend([10.0, 20.0, 20.0, 20.0, 20.0, 1.0, 1.0, 1.0]);
        let store = store_with_closes(&closes).await;
        let config = GoldenCrossConfig::new(instrument(), 2, 4).unwrap();

        let signals = services(&store)
            .backtest_golden_cross(&config, hour(4), hour(closes.len() as i64))
            .await
            .unwrap();
        let kinds: Vec<_> = signals.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![GoldenCrossKind::GoldenCross, GoldenCrossKind::DeathCross]);
    }

    #[tokio::test]
    async fn live_crossover_emits_on_cross_only() {
        let store = store_with_closes(&[10.0, 10.0]).await;
        let config = SmaConfig::new(instrument(), 2).unwrap();
        let service = services(&store);

        let mut sub = service.subscribe_crossover(&config).await.unwrap();
        // Seeds below the average, stays below, then crosses up.
        for (h, close) in [(2, 9.0), (3, 8.0), (4, 20.0), (5, 30.0)] {
            store.publish(candle(h, close)).await;
        }

        let signal = timeout(Duration::from_secs(1), sub.receiver.recv()).await.unwrap().unwrap();
        assert_eq!(signal.kind, CrossKind::CrossUp);
        assert_eq!(signal.price, 20.0);
        assert_eq!(signal.time, hour(5));

        service.unsubscribe_crossover(&config, sub.id).await.unwrap();
        assert!(matches!(
            service.unsubscribe_crossover(&config, sub.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn live_golden_cross_emits_on_each_crossing() {
        let store = store_with_closes(&[10.0; 4]).await;
        let config = GoldenCrossConfig::new(instrument(), 2, 4).unwrap();
        let service = services(&store);

        let mut sub = service.subscribe_golden_cross(&config).await.unwrap();
        // Seeds with the short average below the long one.
        for (h, close) in [(4, 9.0), (5, 20.0), (6, 20.0), (7, 1.0), (8, 1.0)] {
            store.publish(candle(h, close)).await;
        }

        let golden = timeout(Duration::from_secs(1), sub.receiver.recv()).await.unwrap().unwrap();
        assert_eq!(golden.kind, GoldenCrossKind::GoldenCross);
        assert_eq!(golden.price, 20.0);
        assert_eq!(golden.time, hour(6));
        assert_eq!(golden.instrument, instrument());

        let death = timeout(Duration::from_secs(1), sub.receiver.recv()).await.unwrap().unwrap();
        assert_eq!(death.kind, GoldenCrossKind::DeathCross);
        assert_eq!(death.price, 1.0);
        assert_eq!(death.time, hour(8));

        service.unsubscribe_golden_cross(&config, sub.id).await.unwrap();
    }

    #[tokio::test]
    async fn closed_feed_ends_signals_until_resubscribed() {
        let store = store_with_closes(&[10.0, 10.0]).await;
        let config = SmaConfig::new(instrument(), 2).unwrap();
        let service = services(&store);

        let mut stale = service.subscribe_crossover(&config).await.unwrap();
        store.close_live(&instrument()).await;
        let closed = timeout(Duration::from_secs(1), stale.receiver.recv()).await.unwrap();
        assert!(closed.is_none());

        // The next subscriber restarts the whole pipeline on fresh feeds.
        let mut fresh = service.subscribe_crossover(&config).await.unwrap();
        assert_eq!(store.live_subscriber_count(&instrument()).await, 2);
        for (h, close) in [(2, 9.0), (3, 8.0), (4, 20.0)] {
            store.publish(candle(h, close)).await;
        }

        let signal = timeout(Duration::from_secs(1), fresh.receiver.recv()).await.unwrap().unwrap();
        assert_eq!(signal.kind, CrossKind::CrossUp);
        assert_eq!(signal.price, 20.0);
        assert_eq!(signal.time, hour(5));

        // Ended subscriptions stay registered until released.
        service.unsubscribe_crossover(&config, stale.id).await.unwrap();
        service.unsubscribe_crossover(&config, fresh.id).await.unwrap();
        timeout(Duration::from_secs(1), async {
            while store.live_subscriber_count(&instrument()).await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn live_strategy_releases_upstreams_on_unsubscribe() {
        let store = store_with_closes(&[10.0, 10.0, 10.0, 10.0]).await;
        let config = GoldenCrossConfig::new(instrument(), 2, 4).unwrap();
        let service = services(&store);

        let sub = service.subscribe_golden_cross(&config).await.unwrap();
        // Two SMA feeds plus the price feed.
        assert_eq!(store.live_subscriber_count(&instrument()).await, 3);

        service.unsubscribe_golden_cross(&config, sub.id).await.unwrap();
        timeout(Duration::from_secs(1), async {
            while store.live_subscriber_count(&instrument()).await > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
