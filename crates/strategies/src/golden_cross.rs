// In crates/strategies/src/golden_cross.rs

use crate::Strategy;
use crate::cross::{CrossState, Crossing};
use core_types::{
    Error, GoldenCrossConfig, GoldenCrossKind, GoldenCrossSignal, IndicatorValue, PriceSample, Result,
};

/// One aligned observation: source price, short SMA and long SMA at the same time.
pub type GoldenCrossInput = (PriceSample, IndicatorValue, IndicatorValue);

/// Short-SMA-versus-long-SMA ("golden cross" / "death cross") strategy.
#[derive(Debug, Clone)]
pub struct GoldenCrossStrategy {
    config: GoldenCrossConfig,
    state: CrossState,
    last_short: IndicatorValue,
    last_long: IndicatorValue,
}

impl GoldenCrossStrategy {
    pub fn new(config: GoldenCrossConfig, first_short: IndicatorValue, first_long: IndicatorValue) -> Self {
        Self {
            state: CrossState::seed(first_short.value, first_long.value),
            config,
            last_short: first_short,
            last_long: first_long,
        }
    }

    pub fn is_short_above_long(&self) -> bool {
        self.state.is_above()
    }

    pub fn last_short(&self) -> &IndicatorValue {
        &self.last_short
    }

    pub fn last_long(&self) -> &IndicatorValue {
        &self.last_long
    }

    /// Derives golden/death cross signals from three equal-length series.
    pub fn backtest(
        config: &GoldenCrossConfig,
        source: &[PriceSample],
        short_sma: &[IndicatorValue],
        long_sma: &[IndicatorValue],
    ) -> Result<Vec<GoldenCrossSignal>> {
        if source.len() != short_sma.len() || source.len() != long_sma.len() {
            return Err(Error::LengthMismatch(format!(
                "source ({}), short SMA ({}) and long SMA ({}) must have the same length",
                source.len(),
                short_sma.len(),
                long_sma.len()
            )));
        }
        if source.len() < 2 {
            return Err(Error::InsufficientData {
                required: 2,
                available: source.len(),
            });
        }

        let mut strategy = Self::new(config.clone(), short_sma[0].clone(), long_sma[0].clone());
        let inputs = (1..source.len()).map(|i| (source[i], short_sma[i].clone(), long_sma[i].clone()));
        Ok(crate::collect_signals(&mut strategy, inputs))
    }
}

impl Strategy for GoldenCrossStrategy {
    type Input = GoldenCrossInput;
    type Signal = GoldenCrossSignal;

    fn name(&self) -> &'static str {
        "GoldenCross"
    }

    fn assess(&mut self, (sample, short, long): &GoldenCrossInput) -> GoldenCrossSignal {
        self.last_short = short.clone();
        self.last_long = long.clone();

        let kind = match self.state.decide(short.value, long.value) {
            Crossing::Up => GoldenCrossKind::GoldenCross,
            Crossing::Down => GoldenCrossKind::DeathCross,
            Crossing::None => GoldenCrossKind::NoCross,
        };

        if kind != GoldenCrossKind::NoCross {
            tracing::debug!(
                instrument = %self.config.instrument,
                ?kind,
                short = short.value,
                long = long.value,
                "Moving averages crossed."
            );
        }

        GoldenCrossSignal {
            instrument: self.config.instrument.clone(),
            kind,
            price: sample.value,
            time: sample.time,
        }
    }
}
