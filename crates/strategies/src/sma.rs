// In crates/strategies/src/sma.rs

use core_types::{Error, Result};

/// An incremental simple moving average over a fixed-size window.
///
/// The window is a circular buffer with a running sum, so every update is
/// O(1). Repeated subtract/add cycles accumulate floating-point drift in the
/// running sum; [`WindowedAverage::with_resummation`] bounds it by
/// recomputing the sum from the buffer every `k` updates.
#[derive(Debug, Clone)]
pub struct WindowedAverage {
    values: Vec<f64>,
    /// Index of the oldest retained value.
    head: usize,
    sum: f64,
    resum_every: Option<usize>,
    since_resum: usize,
}

impl WindowedAverage {
    /// Creates a window of `window_size` primed with exactly that many values.
    pub fn new(window_size: usize, seed: &[f64]) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::Configuration("window size must be positive".to_string()));
        }
        if seed.len() != window_size {
            return Err(Error::Configuration(format!(
                "initial data length ({}) must match window size ({})",
                seed.len(),
                window_size
            )));
        }

        Ok(Self {
            values: seed.to_vec(),
            head: 0,
            sum: seed.iter().sum(),
            resum_every: None,
            since_resum: 0,
        })
    }

    /// Recompute the running sum from scratch every `every` updates.
    pub fn with_resummation(mut self, every: usize) -> Self {
        self.resum_every = (every > 0).then_some(every);
        self
    }

    /// Evicts the oldest value, folds in `value` and returns the new mean.
    pub fn update(&mut self, value: f64) -> f64 {
        self.sum -= self.values[self.head];
        self.values[self.head] = value;
        self.sum += value;
        self.head = (self.head + 1) % self.values.len();

        if let Some(every) = self.resum_every {
            self.since_resum += 1;
            if self.since_resum >= every {
                self.sum = self.values.iter().sum();
                self.since_resum = 0;
            }
        }

        self.mean()
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.values.len() as f64
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn window_size(&self) -> usize {
        self.values.len()
    }
}
