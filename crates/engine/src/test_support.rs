// In crates/engine/src/test_support.rs

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use core_types::{Candle, Instrument, Interval};
use market_data::InMemoryMarketData;
use std::sync::Arc;

pub(crate) fn instrument() -> Instrument {
    Instrument::new("SBER", Interval::OneHour)
}

pub(crate) fn hour(h: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::hours(h)
}

/// The candle starting at hour `h`.
pub(crate) fn candle(h: i64, close: f64) -> Candle {
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

/// A store holding one hourly candle per close, starting at hour 0.
pub(crate) async fn store_with_closes(closes: &[f64]) -> Arc<InMemoryMarketData> {
    let store = InMemoryMarketData::new();
    store
        .insert_history(closes.iter().enumerate().map(|(h, close)| candle(h as i64, *close)))
        .await;
    Arc::new(store)
}
