// In crates/strategies/src/crossover.rs

use crate::Strategy;
use crate::cross::{CrossState, Crossing};
use crate::sync::zip_positional;
use core_types::{CrossKind, CrossoverSignal, Error, IndicatorValue, PriceSample, Result, SmaConfig};

/// Price-versus-SMA crossover strategy for a single configuration.
#[derive(Debug, Clone)]
pub struct CrossoverStrategy {
    config: SmaConfig,
    state: CrossState,
    last_sample: PriceSample,
    last_indicator: IndicatorValue,
}

impl CrossoverStrategy {
    /// Seeds the strategy from the first aligned observation. The seed itself
    /// never produces a signal.
    pub fn new(config: SmaConfig, first_sample: PriceSample, first_indicator: IndicatorValue) -> Self {
        Self {
            state: CrossState::seed(first_sample.value, first_indicator.value),
            config,
            last_sample: first_sample,
            last_indicator: first_indicator,
        }
    }

    pub fn is_above_indicator(&self) -> bool {
        self.state.is_above()
    }

    pub fn last_sample(&self) -> &PriceSample {
        &self.last_sample
    }

    pub fn last_indicator(&self) -> &IndicatorValue {
        &self.last_indicator
    }

    /// Derives the signal sequence from two equal-length series.
    ///
    /// Index 0 only seeds the state; `NoCross` decisions are dropped.
    pub fn backtest(
        config: &SmaConfig,
        source: &[PriceSample],
        sma: &[IndicatorValue],
    ) -> Result<Vec<CrossoverSignal>> {
        let mut pairs = zip_positional(source, sma)?;

        let Some((first_sample, first_indicator)) = pairs.next() else {
            return Err(Error::InsufficientData {
                required: 1,
                available: 0,
            });
        };

        let mut strategy = Self::new(config.clone(), *first_sample, first_indicator.clone());
        let inputs = pairs.map(|(sample, indicator)| (*sample, indicator.clone()));
        Ok(crate::collect_signals(&mut strategy, inputs))
    }
}

impl Strategy for CrossoverStrategy {
    type Input = (PriceSample, IndicatorValue);
    type Signal = CrossoverSignal;

    fn name(&self) -> &'static str {
        "SMACrossover"
    }

    fn assess(&mut self, (sample, indicator): &Self::Input) -> CrossoverSignal {
        self.last_sample = *sample;
        self.last_indicator = indicator.clone();

        let kind = match self.state.decide(sample.value, indicator.value) {
            Crossing::Up => CrossKind::CrossUp,
            Crossing::Down => CrossKind::CrossDown,
            Crossing::None => CrossKind::NoCross,
        };

        if kind != CrossKind::NoCross {
            tracing::debug!(
                config = ?self.config,
                ?kind,
                price = sample.value,
                sma = indicator.value,
                "Crossover detected."
            );
        }

        CrossoverSignal {
            config: self.config.clone(),
            kind,
            price: sample.value,
            time: sample.time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use core_types::{Instrument, Interval};
    use proptest::prelude::*;

    fn config() -> SmaConfig {
        SmaConfig::new(Instrument::new("SBER", Interval::OneHour), 3).unwrap()
    }

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::hours(hour)
    }

    fn series(prices: &[f64], smas: &[f64]) -> (Vec<PriceSample>, Vec<IndicatorValue>) {
        let source = prices
            .iter()
            .enumerate()
            .map(|(i, value)| PriceSample { value: *value, time: at(i as i64) })
            .collect();
        let sma = smas
            .iter()
            .enumerate()
            .map(|(i, value)| IndicatorValue {
                config: config(),
                value: *value,
                time: at(i as i64),
            })
            .collect();
        (source, sma)
    }

    #[test]
    fn signals_follow_price_crossing_constant_sma() {
        let (source, sma) = series(&[10.0, 9.0, 11.0, 8.0, 12.0], &[10.0; 5]);
        let signals = CrossoverStrategy::backtest(&config(), &source, &sma).unwrap();

        let kinds: Vec<_> = signals.iter().map(|s| (s.kind, s.price)).collect();
        assert_eq!(
            kinds,
            vec![
                (CrossKind::CrossUp, 11.0),
                (CrossKind::CrossDown, 8.0),
                (CrossKind::CrossUp, 12.0),
            ]
        );
        assert_eq!(signals[0].time, at(2));
        assert_eq!(signals[0].config, config());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let (source, sma) = series(&[10.0, 11.0, 12.0], &[10.0, 10.0]);
        assert!(matches!(
            CrossoverStrategy::backtest(&config(), &source, &sma),
            Err(Error::LengthMismatch(_))
        ));
    }

    #[test]
    fn empty_history_is_insufficient() {
        assert!(matches!(
            CrossoverStrategy::backtest(&config(), &[], &[]),
            Err(Error::InsufficientData { .. })
        ));
    }

    #[test]
    fn assess_tracks_the_latest_observation() {
        let (source, sma) = series(&[9.0, 11.0, 10.0], &[10.0; 3]);
        let mut strategy = CrossoverStrategy::new(config(), source[0], sma[0].clone());
        assert_eq!(strategy.name(), "SMACrossover");
        assert!(!strategy.is_above_indicator());

        let signal = strategy.assess(&(source[1], sma[1].clone()));
        assert_eq!(signal.kind, CrossKind::CrossUp);
        assert!(strategy.is_above_indicator());

        // Equality keeps the state but still moves the last observation.
        let signal = strategy.assess(&(source[2], sma[2].clone()));
        assert_eq!(signal.kind, CrossKind::NoCross);
        assert!(strategy.is_above_indicator());
        assert_eq!(strategy.last_sample(), &source[2]);
        assert_eq!(strategy.last_indicator(), &sma[2]);
    }

    #[test]
    fn seed_above_suppresses_initial_cross_up() {
        let (source, sma) = series(&[11.0, 12.0, 13.0], &[10.0; 3]);
        assert!(CrossoverStrategy::backtest(&config(), &source, &sma).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn sustained_rise_emits_a_single_cross_up(
            start in 1.0f64..50.0,
            steps in prop::collection::vec(0.01f64..5.0, 1..60),
        ) {
            // Begin below the flat SMA, then rise strictly above it.
            let mut prices = vec![start, start];
            let mut price = 100.0;
            for step in steps {
                price += step;
                prices.push(price);
            }
            let (source, sma) = series(&prices, &vec![99.0; prices.len()]);

            let signals = CrossoverStrategy::backtest(&config(), &source, &sma).unwrap();
            prop_assert_eq!(signals.len(), 1);
            prop_assert_eq!(signals[0].kind, CrossKind::CrossUp);
        }

        #[test]
        fn signals_alternate_direction(prices in prop::collection::vec(0.0f64..20.0, 1..100)) {
            let (source, sma) = series(&prices, &vec![10.0; prices.len()]);
            let signals = CrossoverStrategy::backtest(&config(), &source, &sma).unwrap();
            for pair in signals.windows(2) {
                prop_assert_ne!(pair[0].kind, pair[1].kind);
            }
        }
    }
}
