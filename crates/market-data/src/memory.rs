// In crates/market-data/src/memory.rs

use crate::{Error, FeedId, LIVE_FEED_CAPACITY, LiveFeed, MarketDataSource, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Candle, Instrument};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};

/// A market-data source backed by an in-memory candle store.
///
/// History queries read the store; live subscribers receive candles pushed
/// with [`InMemoryMarketData::publish`]. Delivery to a full live queue waits
/// for space.
#[derive(Debug, Default)]
pub struct InMemoryMarketData {
    history: RwLock<HashMap<Instrument, BTreeMap<DateTime<Utc>, Candle>>>,
    feeds: RwLock<HashMap<Instrument, Vec<(FeedId, mpsc::Sender<Candle>)>>>,
    next_feed: AtomicU64,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads history, replacing candles that share a start time.
    pub async fn insert_history(&self, candles: impl IntoIterator<Item = Candle>) {
        let mut history = self.history.write().await;
        for candle in candles {
            history
                .entry(candle.instrument.clone())
                .or_default()
                .insert(candle.start_time, candle);
        }
    }

    /// Delivers a candle to every live subscriber of its instrument and
    /// records it in history. Returns the number of feeds reached.
    pub async fn publish(&self, candle: Candle) -> usize {
        self.insert_history([candle.clone()]).await;

        let senders: Vec<_> = {
            let feeds = self.feeds.read().await;
            feeds
                .get(&candle.instrument)
                .map(|subscribers| subscribers.iter().map(|(_, tx)| tx.clone()).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for tx in senders {
            if tx.send(candle.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Closes every live feed of `instrument`, as an upstream disconnect would.
    pub async fn close_live(&self, instrument: &Instrument) {
        if let Some(subscribers) = self.feeds.write().await.remove(instrument) {
            tracing::warn!(%instrument, feeds = subscribers.len(), "Closing live candle feeds.");
        }
    }

    pub async fn live_subscriber_count(&self, instrument: &Instrument) -> usize {
        self.feeds.read().await.get(instrument).map_or(0, Vec::len)
    }
}

fn ensure_aligned(instrument: &Instrument, time: DateTime<Utc>) -> Result<()> {
    if instrument.interval.is_aligned(time) {
        Ok(())
    } else {
        Err(Error::Misaligned {
            time,
            interval: instrument.interval,
        })
    }
}

#[async_trait]
impl MarketDataSource for InMemoryMarketData {
    fn name(&self) -> &'static str {
        "InMemoryMarketData"
    }

    async fn history_by_time(
        &self,
        instrument: &Instrument,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if to < from {
            return Err(Error::InvalidRange { from, to });
        }
        ensure_aligned(instrument, from)?;
        ensure_aligned(instrument, to)?;

        let history = self.history.read().await;
        Ok(history
            .get(instrument)
            .map(|candles| candles.range(from..to).map(|(_, candle)| candle.clone()).collect())
            .unwrap_or_default())
    }

    async fn history_by_count(
        &self,
        instrument: &Instrument,
        anchor: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let history = self.history.read().await;
        let eligible: Vec<&Candle> = history
            .get(instrument)
            .map(|candles| candles.values().filter(|candle| candle.end_time <= anchor).collect())
            .unwrap_or_default();

        if eligible.len() < count {
            return Err(Error::InsufficientData {
                instrument: instrument.clone(),
                required: count,
                available: eligible.len(),
            });
        }

        Ok(eligible[eligible.len() - count..].iter().map(|candle| (*candle).clone()).collect())
    }

    async fn subscribe_live(&self, instrument: &Instrument) -> Result<LiveFeed> {
        let (tx, receiver) = mpsc::channel(LIVE_FEED_CAPACITY);
        let id = self.next_feed.fetch_add(1, Ordering::Relaxed);

        self.feeds
            .write()
            .await
            .entry(instrument.clone())
            .or_default()
            .push((id, tx));
        tracing::debug!(%instrument, feed = id, "Live candle feed opened.");

        Ok(LiveFeed { id, receiver })
    }

    async fn unsubscribe_live(&self, instrument: &Instrument, feed: FeedId) -> Result<()> {
        let mut feeds = self.feeds.write().await;
        let unknown = || Error::UnknownFeed {
            instrument: instrument.clone(),
            feed,
        };

        let subscribers = feeds.get_mut(instrument).ok_or_else(unknown)?;
        let position = subscribers
            .iter()
            .position(|(id, _)| *id == feed)
            .ok_or_else(unknown)?;
        subscribers.remove(position);

        if subscribers.is_empty() {
            feeds.remove(instrument);
        }
        tracing::debug!(%instrument, feed, "Live candle feed closed.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use core_types::Interval;

    fn instrument() -> Instrument {
        Instrument::new("SBER", Interval::OneHour)
    }

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::hours(h)
    }

    fn candle(h: i64, close: f64) -> Candle {
        Candle {
            instrument: instrument(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            start_time: hour(h),
            end_time: hour(h + 1),
        }
    }

    async fn store() -> InMemoryMarketData {
        let store = InMemoryMarketData::new();
        store.insert_history((0..10).map(|h| candle(h, h as f64))).await;
        store
    }

    #[tokio::test]
    async fn history_by_time_is_half_open() {
        let store = store().await;
        let candles = store.history_by_time(&instrument(), hour(2), hour(5)).await.unwrap();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn history_by_time_validates_bounds() {
        let store = store().await;
        assert!(matches!(
            store.history_by_time(&instrument(), hour(5), hour(2)).await,
            Err(Error::InvalidRange { .. })
        ));
        let misaligned = hour(2) + TimeDelta::minutes(30);
        assert!(matches!(
            store.history_by_time(&instrument(), misaligned, hour(5)).await,
            Err(Error::Misaligned { .. })
        ));
    }

    #[tokio::test]
    async fn history_by_count_ends_at_anchor() {
        let store = store().await;
        let candles = store.history_by_count(&instrument(), hour(5), 3).await.unwrap();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![2.0, 3.0, 4.0]);

        assert!(matches!(
            store.history_by_count(&instrument(), hour(2), 3).await,
            Err(Error::InsufficientData { available: 2, .. })
        ));
    }

    #[tokio::test]
    async fn live_feed_lifecycle() {
        let store = store().await;
        let mut feed = store.subscribe_live(&instrument()).await.unwrap();

        assert_eq!(store.publish(candle(10, 10.0)).await, 1);
        assert_eq!(feed.receiver.recv().await.unwrap().close, 10.0);

        store.unsubscribe_live(&instrument(), feed.id).await.unwrap();
        assert!(feed.receiver.recv().await.is_none());
        assert!(matches!(
            store.unsubscribe_live(&instrument(), feed.id).await,
            Err(Error::UnknownFeed { .. })
        ));

        // Published candles also land in history.
        let latest = store.history_by_count(&instrument(), hour(11), 1).await.unwrap();
        assert_eq!(latest[0].close, 10.0);
    }
}
