// In crates/core-types/src/types.rs

use crate::error::{Error, Result};
use crate::strategy::SmaConfig;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The sampling interval of a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1mo")]
    Month,
}

impl Interval {
    /// The fixed length of one candle. A month is treated as 30 days.
    pub fn duration(&self) -> TimeDelta {
        match self {
            Interval::OneMinute => TimeDelta::minutes(1),
            Interval::TwoMinutes => TimeDelta::minutes(2),
            Interval::ThreeMinutes => TimeDelta::minutes(3),
            Interval::FiveMinutes => TimeDelta::minutes(5),
            Interval::TenMinutes => TimeDelta::minutes(10),
            Interval::FifteenMinutes => TimeDelta::minutes(15),
            Interval::ThirtyMinutes => TimeDelta::minutes(30),
            Interval::OneHour => TimeDelta::hours(1),
            Interval::TwoHours => TimeDelta::hours(2),
            Interval::FourHours => TimeDelta::hours(4),
            Interval::OneDay => TimeDelta::days(1),
            Interval::OneWeek => TimeDelta::weeks(1),
            Interval::Month => TimeDelta::days(30),
        }
    }

    /// Returns `true` if `time` falls exactly on an interval boundary,
    /// counted from the Unix epoch.
    pub fn is_aligned(&self, time: DateTime<Utc>) -> bool {
        let step = self.duration().num_seconds();
        time.timestamp_subsec_nanos() == 0 && time.timestamp().rem_euclid(step) == 0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::TwoMinutes => "2m",
            Interval::ThreeMinutes => "3m",
            Interval::FiveMinutes => "5m",
            Interval::TenMinutes => "10m",
            Interval::FifteenMinutes => "15m",
            Interval::ThirtyMinutes => "30m",
            Interval::OneHour => "1h",
            Interval::TwoHours => "2h",
            Interval::FourHours => "4h",
            Interval::OneDay => "1d",
            Interval::OneWeek => "1w",
            Interval::Month => "1mo",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let interval = match s {
            "1m" => Interval::OneMinute,
            "2m" => Interval::TwoMinutes,
            "3m" => Interval::ThreeMinutes,
            "5m" => Interval::FiveMinutes,
            "10m" => Interval::TenMinutes,
            "15m" => Interval::FifteenMinutes,
            "30m" => Interval::ThirtyMinutes,
            "1h" => Interval::OneHour,
            "2h" => Interval::TwoHours,
            "4h" => Interval::FourHours,
            "1d" => Interval::OneDay,
            "1w" => Interval::OneWeek,
            "1mo" => Interval::Month,
            other => return Err(Error::Configuration(format!("unknown interval '{}'", other))),
        };
        Ok(interval)
    }
}

/// A tradable instrument sampled at a fixed interval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instrument {
    /// The broker-side instrument identifier.
    pub id: String,
    pub interval: Interval,
}

impl Instrument {
    pub fn new(id: impl Into<String>, interval: Interval) -> Self {
        Self { id: id.into(), interval }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.interval)
    }
}

/// An OHLCV aggregate over one sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub instrument: Instrument,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl Candle {
    /// The close-price sample of this candle, stamped with its end time.
    pub fn close_sample(&self) -> PriceSample {
        PriceSample {
            value: self.close,
            time: self.end_time,
        }
    }
}

/// A single time-stamped price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub value: f64,
    pub time: DateTime<Utc>,
}

/// One simple-moving-average value for a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub config: SmaConfig,
    pub value: f64,
    pub time: DateTime<Utc>,
}
