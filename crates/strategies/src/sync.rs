// In crates/strategies/src/sync.rs

use chrono::{DateTime, Utc};
use core_types::{Candle, Error, IndicatorValue, PriceSample, Result};
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Samples left pending on one side before the oldest is discarded.
const MAX_PENDING: usize = 1024;

/// Anything carrying the timestamp used to pair two series.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for PriceSample {
    fn timestamp(&self) -> DateTime<Utc> {
        self.time
    }
}

impl Timestamped for IndicatorValue {
    fn timestamp(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Candles pair on their end time, the stamp of every sample derived from them.
impl Timestamped for Candle {
    fn timestamp(&self) -> DateTime<Utc> {
        self.end_time
    }
}

impl<A: Timestamped, B> Timestamped for (A, B) {
    fn timestamp(&self) -> DateTime<Utc> {
        self.0.timestamp()
    }
}

/// Aligns two ordered, asynchronously arriving series by exact timestamp.
///
/// A pair is released only once both sides have produced a sample with the
/// identical timestamp. Each input series is assumed to be ordered by time,
/// so a sample older than the other side's oldest pending sample can never
/// be matched and is discarded.
#[derive(Debug)]
pub struct PriceSeriesSync<L, R> {
    left: VecDeque<L>,
    right: VecDeque<R>,
}

impl<L: Timestamped, R: Timestamped> Default for PriceSeriesSync<L, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Timestamped, R: Timestamped> PriceSeriesSync<L, R> {
    pub fn new() -> Self {
        Self {
            left: VecDeque::new(),
            right: VecDeque::new(),
        }
    }

    pub fn push_left(&mut self, sample: L) -> Option<(L, R)> {
        match_or_hold(sample, &mut self.right, &mut self.left)
    }

    pub fn push_right(&mut self, sample: R) -> Option<(L, R)> {
        match_or_hold(sample, &mut self.left, &mut self.right).map(|(r, l)| (l, r))
    }

    /// Number of samples waiting for a partner.
    pub fn pending(&self) -> usize {
        self.left.len() + self.right.len()
    }

    /// Waits until both receivers have produced a sample with the same
    /// timestamp and returns the pair.
    ///
    /// Returns `None` as soon as either receiver is closed. Pending samples
    /// live in `self`, so dropping the future between samples loses nothing.
    pub async fn next_pair(
        &mut self,
        left: &mut mpsc::Receiver<L>,
        right: &mut mpsc::Receiver<R>,
    ) -> Option<(L, R)> {
        loop {
            tokio::select! {
                sample = left.recv() => {
                    let pair = self.push_left(sample?);
                    if pair.is_some() {
                        return pair;
                    }
                }
                sample = right.recv() => {
                    let pair = self.push_right(sample?);
                    if pair.is_some() {
                        return pair;
                    }
                }
            }
        }
    }
}

/// Pairs `incoming` with the matching sample of `other`, or parks it in
/// `own` when the other side has nothing newer yet.
fn match_or_hold<A: Timestamped, B: Timestamped>(
    incoming: A,
    other: &mut VecDeque<B>,
    own: &mut VecDeque<A>,
) -> Option<(A, B)> {
    let time = incoming.timestamp();
    while other.front().is_some_and(|sample| sample.timestamp() < time) {
        other.pop_front();
    }

    match other.front() {
        Some(sample) if sample.timestamp() == time => other.pop_front().map(|matched| (incoming, matched)),
        // The other side is already past this timestamp.
        Some(_) => None,
        None => {
            if own.len() >= MAX_PENDING {
                if let Some(dropped) = own.pop_front() {
                    tracing::warn!(
                        time = %dropped.timestamp(),
                        pending = MAX_PENDING,
                        "No partner arrived in time; oldest pending sample discarded."
                    );
                }
            }
            own.push_back(incoming);
            None
        }
    }
}

/// Pairs two pre-materialized series by position, failing fast when their
/// lengths differ.
pub fn zip_positional<'a, L, R>(left: &'a [L], right: &'a [R]) -> Result<impl Iterator<Item = (&'a L, &'a R)>> {
    if left.len() != right.len() {
        return Err(Error::LengthMismatch(format!(
            "series have different lengths: {} and {}",
            left.len(),
            right.len()
        )));
    }
    Ok(left.iter().zip(right.iter()))
}
