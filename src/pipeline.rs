//! End-to-end pair selection and signal run over one price panel.

use rayon::prelude::*;
use serde::Serialize;

use crate::cointegration::{select_cointegrated, test_pairs, CointegrationRecord};
use crate::config::PipelineConfig;
use crate::correlation::{rank_pairs, select_high_correlation, PairRecord};
use crate::error::{PairFailure, Result};
use crate::panel::{PricePanel, SeriesPanel};
use crate::signal::{derive_orders, generate_covered_signals, LegOrder, Position};
use crate::spread::{spreads_for_pairs, HedgeFit};
use crate::window::lookback_window;
use crate::zscore::z_scores_for_spreads;

/// Positions and orders for one pair on the z-score panel's dates. Dates
/// where the pair has no spread are Flat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSignals {
    pub pair: String,
    pub signals: Vec<Position>,
    pub orders: Vec<LegOrder>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub instruments: usize,
    pub observations: usize,
    pub ranked_pairs: Vec<PairRecord>,
    pub correlated_pairs: Vec<PairRecord>,
    pub cointegration: Vec<CointegrationRecord>,
    pub accepted_pairs: Vec<CointegrationRecord>,
    pub hedge_fits: Vec<HedgeFit>,
    pub spreads: SeriesPanel,
    pub z_scores: SeriesPanel,
    pub signals: Vec<PairSignals>,
    /// Every pair excluded along the way, in stage order.
    pub failures: Vec<PairFailure>,
}

/// Applies the configured forward fill, then keeps the look-back window
/// ending at `end_date` (or the last panel date).
pub fn prepare_panel(prices: &PricePanel, config: &PipelineConfig) -> Result<PricePanel> {
    let filled = if config.forward_fill {
        prices.forward_fill()
    } else {
        prices.clone()
    };
    let end = match config.end_date.or_else(|| filled.dates().last().copied()) {
        Some(end) => end,
        None => return Ok(filled),
    };
    let (start, end) = lookback_window(end, config.lookback_duration, config.lookback_unit)?;
    Ok(filled.slice(start, end))
}

/// Runs correlation screening, cointegration testing, spread construction,
/// normalization and signal generation on `prices` as given. Panel
/// preparation (forward fill, lookback slicing) is the caller's job.
///
/// Only invalid configuration or a malformed intermediate panel abort the
/// run; pairs that fail a stage are listed in `failures`.
pub fn run(prices: &PricePanel, config: &PipelineConfig) -> Result<PipelineReport> {
    config.validate()?;
    let thresholds = config.thresholds()?;
    log::info!(
        "Running pair scan on {} instruments over {} dates",
        prices.columns().len(),
        prices.len()
    );

    let returns = prices.returns();
    let screening = rank_pairs(&returns);
    let correlated = select_high_correlation(&screening.pairs, config.correlation_threshold);

    let testing = test_pairs(prices, &correlated, config.min_cointegration_observations);
    let accepted = select_cointegrated(&testing.records, config.cointegration_threshold);

    let spreads = spreads_for_pairs(prices, &accepted)?;
    let normalized = z_scores_for_spreads(&spreads.panel, config.zscore_window)?;

    let z_panel = &normalized.panel;
    let signals = (0..z_panel.columns().len())
        .into_par_iter()
        .map(|idx| {
            let pair = &z_panel.columns()[idx];
            let covered: Vec<bool> = match spreads.panel.column(pair) {
                Some(spread) => spread.iter().map(|v| v.is_finite()).collect(),
                None => vec![false; z_panel.len()],
            };
            let signals = generate_covered_signals(z_panel.series(idx), &covered, &thresholds);
            let orders = derive_orders(z_panel.dates(), &signals)?;
            Ok(PairSignals {
                pair: pair.clone(),
                signals,
                orders,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    log::info!(
        "Generated signals for {} pairs ({} accepted, {} excluded overall)",
        signals.len(),
        accepted.len(),
        screening.failures.len()
            + testing.failures.len()
            + spreads.failures.len()
            + normalized.failures.len()
    );

    let mut failures = screening.failures;
    failures.extend(testing.failures);
    failures.extend(spreads.failures);
    failures.extend(normalized.failures);

    Ok(PipelineReport {
        instruments: prices.columns().len(),
        observations: prices.len(),
        ranked_pairs: screening.pairs,
        correlated_pairs: correlated,
        cointegration: testing.records,
        accepted_pairs: accepted,
        hedge_fits: spreads.fits,
        spreads: spreads.panel,
        z_scores: normalized.panel,
        signals,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PairsError, Stage};
    use chrono::{Days, NaiveDate};

    fn noise(i: usize, seed: f64) -> f64 {
        ((i as f64 * 12.9898 + seed).sin() * 43758.5453).rem_euclid(1.0) - 0.5
    }

    fn panel(columns: &[&str], values: Vec<Vec<f64>>) -> PricePanel {
        let n = values[0].len();
        let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
        let dates = (0..n).map(|i| start + Days::new(i as u64)).collect();
        PricePanel::new(dates, columns.iter().map(|s| s.to_string()).collect(), values).unwrap()
    }

    #[test]
    fn preparation_fills_then_slices() {
        let prices = panel(&["A"], vec![vec![1.0, f64::NAN, 3.0, f64::NAN, 5.0, 6.0]]);
        let cfg = PipelineConfig {
            end_date: NaiveDate::from_ymd_opt(2019, 1, 4),
            lookback_duration: 2,
            lookback_unit: crate::window::LookbackUnit::Days,
            ..PipelineConfig::default()
        };
        let prepared = prepare_panel(&prices, &cfg).unwrap();
        assert_eq!(prepared.len(), 3);
        assert_eq!(prepared.dates()[0], NaiveDate::from_ymd_opt(2019, 1, 2).unwrap());
        assert_eq!(prepared.column("A").unwrap(), &[1.0, 3.0, 3.0]);
    }

    #[test]
    fn invalid_config_aborts() {
        let prices = panel(&["A", "B"], vec![vec![1.0, 2.0], vec![2.0, 3.0]]);
        let cfg = PipelineConfig {
            entry_threshold: 0.5,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            run(&prices, &cfg),
            Err(PairsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn single_instrument_yields_empty_report() {
        let prices = panel(&["A"], vec![vec![1.0, 1.1, 1.2]]);
        let report = run(&prices, &PipelineConfig::default()).unwrap();
        assert!(report.ranked_pairs.is_empty());
        assert!(report.signals.is_empty());
        assert!(report.failures.is_empty());
        assert!(report.z_scores.columns().is_empty());
    }

    #[test]
    fn runs_every_stage_on_a_cointegrated_pair() {
        let mut level = 50.0;
        let b: Vec<f64> = (0..200)
            .map(|i| {
                level += noise(i, 1.0);
                level
            })
            .collect();
        let a: Vec<f64> = b
            .iter()
            .enumerate()
            .map(|(i, v)| 2.0 * v + 10.0 + 0.8 * noise(i, 3.0))
            .collect();
        let flat = vec![5.0; 200];
        let prices = panel(&["A", "B", "F"], vec![a, b, flat]);
        let cfg = PipelineConfig {
            correlation_threshold: 0.0,
            ..PipelineConfig::default()
        };
        let report = run(&prices, &cfg).unwrap();
        assert_eq!(report.accepted_pairs.len(), 1);
        assert_eq!(report.hedge_fits[0].label(), "A_vs_B");
        assert!((report.hedge_fits[0].beta - 2.0).abs() < 0.1);
        assert_eq!(report.signals.len(), 1);
        assert_eq!(report.signals[0].orders.len(), 200);
        assert!(report
            .failures
            .iter()
            .all(|f| f.stage == Stage::Correlation && f.pair.contains('F')));
        for (position, order) in report.signals[0].signals.iter().zip(&report.signals[0].orders) {
            assert_eq!(position.leg_orders(), (order.leg_a, order.leg_b));
        }
    }

    #[test]
    fn pair_is_flat_where_a_leg_has_no_price() {
        let mut level = 50.0;
        let b: Vec<f64> = (0..200)
            .map(|i| {
                level += noise(i, 1.0);
                level
            })
            .collect();
        let a: Vec<f64> = b
            .iter()
            .enumerate()
            .map(|(i, v)| 2.0 * v + 10.0 + 0.8 * noise(i, 3.0))
            .collect();
        let mut c: Vec<f64> = b
            .iter()
            .enumerate()
            .map(|(i, v)| v + 0.8 * noise(i, 5.0))
            .collect();
        c[50] = f64::NAN;
        let prices = panel(&["A", "B", "C"], vec![a, b, c]);
        let cfg = PipelineConfig {
            correlation_threshold: 0.0,
            ..PipelineConfig::default()
        };
        let report = run(&prices, &cfg).unwrap();
        assert_eq!(report.z_scores.len(), 200);

        let gapped: Vec<&PairSignals> = report
            .signals
            .iter()
            .filter(|s| report.spreads.column(&s.pair).map_or(false, |v| v[50].is_nan()))
            .collect();
        assert!(!gapped.is_empty());
        for pair in gapped {
            assert_eq!(pair.signals[50], Position::Flat);
            assert_eq!((pair.orders[50].leg_a, pair.orders[50].leg_b), (0, 0));
        }
    }
}
