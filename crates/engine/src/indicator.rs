// In crates/engine/src/indicator.rs

use crate::bus::{Cancellation, Publisher, SignalBus, Subscription, SubscriptionId};
use chrono::{DateTime, Utc};
use core_types::{Candle, Error, IndicatorValue, Result, SmaConfig};
use market_data::{LiveFeed, MarketDataSource};
use std::sync::Arc;
use strategies::WindowedAverage;

/// Computes simple moving averages over history and shares live ones.
pub struct IndicatorService {
    market_data: Arc<dyn MarketDataSource>,
    bus: SignalBus<SmaConfig, IndicatorValue>,
}

impl IndicatorService {
    pub fn new(market_data: Arc<dyn MarketDataSource>, subscriber_capacity: usize) -> Self {
        Self {
            market_data,
            bus: SignalBus::new(subscriber_capacity),
        }
    }

    /// One SMA value per candle in `[from, to)`.
    pub async fn compute_history(
        &self,
        config: &SmaConfig,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IndicatorValue>> {
        let (_, values) = self.compute_history_with_source(config, from, to).await?;
        Ok(values)
    }

    /// Like [`Self::compute_history`], also returning the candles the values
    /// were computed from.
    pub async fn compute_history_with_source(
        &self,
        config: &SmaConfig,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(Vec<Candle>, Vec<IndicatorValue>)> {
        validate_range(config, from, to)?;

        // The window is primed with the `length` candles closing at or before `from`.
        let seed = self
            .market_data
            .history_by_count(&config.instrument, from, config.length)
            .await?;
        let candles = self
            .market_data
            .history_by_time(&config.instrument, from, to)
            .await?;

        let values = Self::calc_from_source(config, &seed, &candles)?;
        tracing::debug!(config = ?config, candles = candles.len(), "Computed SMA history.");
        Ok((candles, values))
    }

    /// Computes SMA values for `candles` from a window primed with `seed`.
    pub fn calc_from_source(config: &SmaConfig, seed: &[Candle], candles: &[Candle]) -> Result<Vec<IndicatorValue>> {
        let mut window = prime_window(config, seed)?;
        Ok(candles
            .iter()
            .map(|candle| IndicatorValue {
                config: config.clone(),
                value: window.update(candle.close),
                time: candle.end_time,
            })
            .collect())
    }

    /// Subscribes to the live SMA for `config`, starting it if needed.
    pub async fn subscribe(&self, config: &SmaConfig) -> Result<Subscription<IndicatorValue>> {
        let market_data = Arc::clone(&self.market_data);
        let key = config.clone();
        self.bus
            .subscribe(config.clone(), move |publisher, cancel| async move {
                LiveSma::start(market_data, key, publisher, cancel)
                    .await
                    .map(LiveSma::run)
            })
            .await
    }

    pub async fn unsubscribe(&self, config: &SmaConfig, id: SubscriptionId) -> Result<()> {
        self.bus.unsubscribe(config, id).await
    }

    pub async fn subscriber_count(&self, config: &SmaConfig) -> usize {
        self.bus.subscriber_count(config).await
    }
}

fn validate_range(config: &SmaConfig, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
    if to < from {
        return Err(Error::Configuration(format!("range end {} is before start {}", to, from)));
    }
    let interval = config.instrument.interval;
    if !interval.is_aligned(from) || !interval.is_aligned(to) {
        return Err(Error::Configuration(format!(
            "range {}..{} is not aligned to the {} interval",
            from, to, interval
        )));
    }
    Ok(())
}

fn prime_window(config: &SmaConfig, seed: &[Candle]) -> Result<WindowedAverage> {
    if seed.len() < config.length {
        return Err(Error::InsufficientData {
            required: config.length,
            available: seed.len(),
        });
    }
    let closes: Vec<f64> = seed[seed.len() - config.length..].iter().map(|candle| candle.close).collect();
    WindowedAverage::new(config.length, &closes)
}

/// The shared live computation behind one SMA configuration.
struct LiveSma {
    config: SmaConfig,
    window: WindowedAverage,
    /// End time of the newest candle folded into the window.
    last_seen: Option<DateTime<Utc>>,
    feed: LiveFeed,
    market_data: Arc<dyn MarketDataSource>,
    publisher: Publisher<SmaConfig, IndicatorValue>,
    cancel: Cancellation,
}

impl LiveSma {
    async fn start(
        market_data: Arc<dyn MarketDataSource>,
        config: SmaConfig,
        publisher: Publisher<SmaConfig, IndicatorValue>,
        cancel: Cancellation,
    ) -> Result<Self> {
        // Subscribe first so no candle closing between the seed fetch and the
        // live feed is missed; the overlap is dropped in `run`.
        let feed = market_data.subscribe_live(&config.instrument).await?;

        let primed = match market_data
            .history_by_count(&config.instrument, Utc::now(), config.length)
            .await
        {
            Ok(seed) => prime_window(&config, &seed).map(|window| (window, seed.last().map(|c| c.end_time))),
            Err(e) => Err(e.into()),
        };
        let (window, last_seen) = match primed {
            Ok(primed) => primed,
            Err(e) => {
                if let Err(unsub) = market_data.unsubscribe_live(&config.instrument, feed.id).await {
                    tracing::debug!(error = %unsub, "Live feed already closed.");
                }
                return Err(e);
            }
        };

        Ok(Self {
            config,
            window,
            last_seen,
            feed,
            market_data,
            publisher,
            cancel,
        })
    }

    async fn run(mut self) {
        tracing::info!(config = ?self.config, "Live SMA started.");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(config = ?self.config, "Live SMA cancelled.");
                    break;
                }
                candle = self.feed.receiver.recv() => {
                    let Some(candle) = candle else {
                        tracing::warn!(config = ?self.config, "Live candle feed closed.");
                        break;
                    };
                    if self.last_seen.is_some_and(|seen| candle.end_time <= seen) {
                        tracing::debug!(time = %candle.end_time, "Dropping candle already in the window.");
                        continue;
                    }
                    self.last_seen = Some(candle.end_time);

                    let value = IndicatorValue {
                        config: self.config.clone(),
                        value: self.window.update(candle.close),
                        time: candle.end_time,
                    };
                    if !self.publisher.publish(value).await {
                        break;
                    }
                }
            }
        }

        if let Err(e) = self
            .market_data
            .unsubscribe_live(&self.config.instrument, self.feed.id)
            .await
        {
            tracing::debug!(error = %e, "Live feed already closed.");
        }
    }
}
