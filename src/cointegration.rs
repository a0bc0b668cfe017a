//! Engle-Granger cointegration testing of correlated pairs.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

use crate::correlation::PairRecord;
use crate::error::{PairFailure, Result, Stage};
use crate::panel::PricePanel;
use crate::stats::{
    adf_no_trend, engle_granger_critical_values, engle_granger_p_value, fit_line, is_collinear,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CointegrationRecord {
    pub asset_a: String,
    pub asset_b: String,
    pub correlation: f64,
    pub p_value: f64,
    pub statistic: f64,
    /// 1%, 5% and 10% critical values for `observations`.
    pub critical_values: [f64; 3],
    pub observations: usize,
    pub lags: usize,
    /// Set when the sample is short or the levels are collinear; the
    /// p-value is reported but should not be trusted.
    pub low_confidence: bool,
}

impl CointegrationRecord {
    pub fn label(&self) -> String {
        crate::correlation::pair_label(&self.asset_a, &self.asset_b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngleGranger {
    pub statistic: f64,
    pub p_value: f64,
    pub critical_values: [f64; 3],
    pub lags: usize,
    pub observations: usize,
    pub collinear: bool,
}

/// Two-step test on aligned levels: regress `a` on `b` with a constant,
/// then run an ADF test on the residuals.
pub fn engle_granger(a: &[f64], b: &[f64]) -> Result<EngleGranger> {
    let observations = a.len().min(b.len());
    let fit = fit_line(a, b)?;
    let critical_values = engle_granger_critical_values(observations.saturating_sub(1));
    if is_collinear(&fit) {
        return Ok(EngleGranger {
            statistic: f64::NEG_INFINITY,
            p_value: 0.0,
            critical_values,
            lags: 0,
            observations,
            collinear: true,
        });
    }
    let adf = adf_no_trend(&fit.residuals)?;
    Ok(EngleGranger {
        statistic: adf.statistic,
        p_value: engle_granger_p_value(adf.statistic),
        critical_values,
        lags: adf.lags,
        observations,
        collinear: false,
    })
}

#[derive(Debug, Clone, Default)]
pub struct Testing {
    pub records: Vec<CointegrationRecord>,
    pub failures: Vec<PairFailure>,
}

fn test_pair(
    prices: &PricePanel,
    pair: &PairRecord,
    min_observations: usize,
) -> Result<CointegrationRecord> {
    let aligned = prices.align_pair(&pair.asset_a, &pair.asset_b)?;
    let eg = engle_granger(&aligned.a, &aligned.b)?;
    let short = eg.observations < min_observations;
    if short {
        log::warn!(
            "{}: only {} aligned prices (want {}), cointegration p-value {:.4} is low confidence",
            pair.label(),
            eg.observations,
            min_observations,
            eg.p_value
        );
    }
    if eg.collinear {
        log::warn!(
            "{}: price levels are (almost) perfectly collinear, cointegration test is not reliable",
            pair.label()
        );
    }
    Ok(CointegrationRecord {
        asset_a: pair.asset_a.clone(),
        asset_b: pair.asset_b.clone(),
        correlation: pair.correlation,
        p_value: eg.p_value,
        statistic: eg.statistic,
        critical_values: eg.critical_values,
        observations: eg.observations,
        lags: eg.lags,
        low_confidence: short || eg.collinear,
    })
}

/// Tests every pair on its own aligned sample and sorts by ascending
/// p-value. Pairs that cannot be tested are reported, not fatal.
pub fn test_pairs(prices: &PricePanel, pairs: &[PairRecord], min_observations: usize) -> Testing {
    let outcomes: Vec<_> = pairs
        .par_iter()
        .map(|pair| (pair, test_pair(prices, pair, min_observations)))
        .collect();
    let mut testing = Testing::default();
    for (pair, outcome) in outcomes {
        match outcome {
            Ok(record) => testing.records.push(record),
            Err(err) => testing
                .failures
                .push(PairFailure::new(pair.label(), Stage::Cointegration, &err)),
        }
    }
    testing
        .records
        .sort_by(|a, b| a.p_value.partial_cmp(&b.p_value).unwrap_or(Ordering::Equal));
    log::info!(
        "Tested {} pairs for cointegration ({} failed)",
        testing.records.len(),
        testing.failures.len()
    );
    testing
}

/// Records with `p_value <= threshold`, order preserved.
pub fn select_cointegrated(
    records: &[CointegrationRecord],
    threshold: f64,
) -> Vec<CointegrationRecord> {
    let selected: Vec<CointegrationRecord> = records
        .iter()
        .filter(|r| r.p_value <= threshold)
        .cloned()
        .collect();
    log::info!(
        "{} of {} pairs cointegrated at p <= {}",
        selected.len(),
        records.len(),
        threshold
    );
    selected
}
