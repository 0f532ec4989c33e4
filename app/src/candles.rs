// In app/src/candles.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use core_types::{Candle, Instrument};
use serde::Deserialize;
use std::path::Path;

/// One row of a candle file. `end_time` defaults to one interval after `start_time`.
#[derive(Deserialize, Debug)]
struct CandleRow {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    start_time: DateTime<Utc>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
}

/// Reads a JSON array of candles for `instrument`, sorted by start time.
pub fn load_candles(path: &Path, instrument: &Instrument) -> Result<Vec<Candle>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read candle file {}", path.display()))?;
    let rows: Vec<CandleRow> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse candle file {}", path.display()))?;
    Ok(into_candles(rows, instrument))
}

fn into_candles(rows: Vec<CandleRow>, instrument: &Instrument) -> Vec<Candle> {
    let step = instrument.interval.duration();
    let mut candles: Vec<Candle> = rows
        .into_iter()
        .map(|row| Candle {
            instrument: instrument.clone(),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            start_time: row.start_time,
            end_time: row.end_time.unwrap_or(row.start_time + step),
        })
        .collect();
    candles.sort_by_key(|candle| candle.start_time);
    candles
}
