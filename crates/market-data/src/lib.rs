// In crates/market-data/src/lib.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{Candle, Instrument};
use tokio::sync::mpsc;

pub mod error;
pub mod memory;

// Re-export public types
pub use error::{Error, Result};
pub use memory::InMemoryMarketData;

/// Identifies one live subscription handed out by a [`MarketDataSource`].
pub type FeedId = u64;

/// Capacity of each live candle queue.
pub const LIVE_FEED_CAPACITY: usize = 100;

/// A live candle subscription.
#[derive(Debug)]
pub struct LiveFeed {
    pub id: FeedId,
    pub receiver: mpsc::Receiver<Candle>,
}

/// The market-data collaborator consumed by the indicator and strategy services.
///
/// Implementations wrap a broker API or, for tests and backtests, an
/// in-memory candle store.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The name of the provider (e.g., "InMemoryMarketData").
    fn name(&self) -> &'static str;

    /// Candles with `from <= start_time < to`, ordered by time.
    ///
    /// Fails if `to < from` or either bound is not aligned to the
    /// instrument's interval.
    async fn history_by_time(
        &self,
        instrument: &Instrument,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// Exactly `count` candles ending at or before `anchor`, ordered by time.
    async fn history_by_count(
        &self,
        instrument: &Instrument,
        anchor: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<Candle>>;

    async fn subscribe_live(&self, instrument: &Instrument) -> Result<LiveFeed>;

    async fn unsubscribe_live(&self, instrument: &Instrument, feed: FeedId) -> Result<()>;
}
