// In crates/market-data/src/error.rs

use chrono::{DateTime, Utc};
use core_types::{Instrument, Interval};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid range: to ({to}) is before from ({from})")]
    InvalidRange { from: DateTime<Utc>, to: DateTime<Utc> },

    #[error("{time} is not aligned to the {interval} interval")]
    Misaligned { time: DateTime<Utc>, interval: Interval },

    #[error("Not enough history for {instrument}: required {required}, available {available}")]
    InsufficientData {
        instrument: Instrument,
        required: usize,
        available: usize,
    },

    #[error("Unknown live feed {feed} for {instrument}")]
    UnknownFeed { instrument: Instrument, feed: u64 },

    #[error("Market data provider error: {0}")]
    Provider(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for core_types::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::InvalidRange { .. } | Error::Misaligned { .. } => {
                core_types::Error::Configuration(error.to_string())
            }
            Error::InsufficientData { required, available, .. } => {
                core_types::Error::InsufficientData { required, available }
            }
            Error::UnknownFeed { .. } => core_types::Error::NotFound(error.to_string()),
            Error::Provider(reason) => core_types::Error::Upstream(reason),
        }
    }
}
