//! Hedge-ratio regression and residual spreads.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::cointegration::CointegrationRecord;
use crate::correlation::pair_label;
use crate::error::{PairFailure, PairsError, Result, Stage};
use crate::panel::{PricePanel, SeriesPanel};
use crate::stats::fit_line;

/// `A ~ intercept + beta * B` fitted on the pair's clean sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HedgeFit {
    pub asset_a: String,
    pub asset_b: String,
    pub intercept: f64,
    pub beta: f64,
    pub observations: usize,
}

impl HedgeFit {
    pub fn label(&self) -> String {
        pair_label(&self.asset_a, &self.asset_b)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairSpread {
    pub fit: HedgeFit,
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

/// Intercept and slope of `a ~ 1 + b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HedgeRatio {
    pub intercept: f64,
    pub beta: f64,
    pub observations: usize,
}

/// OLS hedge ratio over the rows where both values are finite.
pub fn hedge_ratio(a: &[f64], b: &[f64]) -> Result<HedgeRatio> {
    if a.len() != b.len() {
        return Err(PairsError::InputShape(format!(
            "legs have {} and {} values",
            a.len(),
            b.len()
        )));
    }
    let (clean_a, clean_b): (Vec<f64>, Vec<f64>) = a
        .iter()
        .zip(b)
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|(x, y)| (*x, *y))
        .unzip();
    let fit = fit_line(&clean_a, &clean_b)?;
    Ok(HedgeRatio {
        intercept: fit.intercept,
        beta: fit.slope,
        observations: clean_a.len(),
    })
}

/// Residual spread of `asset_a` regressed on `asset_b`, over the dates where
/// both prices are finite. Dropped dates are not re-inserted.
pub fn pair_spread(prices: &PricePanel, asset_a: &str, asset_b: &str) -> Result<PairSpread> {
    let aligned = prices.align_pair(asset_a, asset_b)?;
    let ratio = hedge_ratio(&aligned.a, &aligned.b)?;
    log::debug!(
        "{}: beta {:.6} intercept {:.6} over {} rows",
        pair_label(asset_a, asset_b),
        ratio.beta,
        ratio.intercept,
        ratio.observations
    );
    let values = aligned
        .a
        .iter()
        .zip(&aligned.b)
        .map(|(a, b)| a - ratio.intercept - ratio.beta * b)
        .collect();
    Ok(PairSpread {
        fit: HedgeFit {
            asset_a: asset_a.to_string(),
            asset_b: asset_b.to_string(),
            intercept: ratio.intercept,
            beta: ratio.beta,
            observations: ratio.observations,
        },
        dates: aligned.dates,
        values,
    })
}

#[derive(Debug, Clone)]
pub struct SpreadSet {
    pub fits: Vec<HedgeFit>,
    /// One `"{A}_vs_{B}"` column per fitted pair on the union of their dates.
    pub panel: SeriesPanel,
    pub failures: Vec<PairFailure>,
}

pub fn spreads_for_pairs(prices: &PricePanel, pairs: &[CointegrationRecord]) -> Result<SpreadSet> {
    let outcomes: Vec<_> = pairs
        .par_iter()
        .map(|pair| (pair, pair_spread(prices, &pair.asset_a, &pair.asset_b)))
        .collect();
    let mut fits = Vec::with_capacity(outcomes.len());
    let mut series = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (pair, outcome) in outcomes {
        match outcome {
            Ok(spread) => {
                series.push((spread.fit.label(), spread.dates, spread.values));
                fits.push(spread.fit);
            }
            Err(err) => failures.push(PairFailure::new(pair.label(), Stage::Spread, &err)),
        }
    }
    let panel = SeriesPanel::from_series(series)?;
    log::info!(
        "Computed {} spreads over {} dates ({} failed)",
        fits.len(),
        panel.len(),
        failures.len()
    );
    Ok(SpreadSet {
        fits,
        panel,
        failures,
    })
}
