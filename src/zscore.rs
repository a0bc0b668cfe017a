//! Spread standardization.
//!
//! The default is a whole-series z-score: every value is scaled by the mean
//! and standard deviation of the full history, so early values see moments
//! that include later data. `rolling_z_score` is the trailing-window
//! alternative and is only used when a window is configured.

use rayon::prelude::*;

use crate::error::{PairFailure, PairsError, Result, Stage};
use crate::panel::SeriesPanel;
use crate::stats::sample_moments;

const ZERO_VARIANCE_EPS: f64 = 1e-12;

fn is_degenerate(std: f64, values: &[f64]) -> bool {
    let scale = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(0.0f64, |acc, v| acc.max(v.abs()))
        .max(1.0);
    !(std > ZERO_VARIANCE_EPS * scale)
}

/// `(v - mean) / std` with the unbiased sample std over the finite values.
/// Missing cells stay missing.
pub fn z_score(values: &[f64]) -> Result<Vec<f64>> {
    let finite = values.iter().filter(|v| v.is_finite()).count();
    let (_, mean, std) = sample_moments(values).ok_or(PairsError::InsufficientData {
        required: 2,
        actual: finite,
    })?;
    if is_degenerate(std, values) {
        return Err(PairsError::NumericalUndefined(format!(
            "spread has no variance (std {:.3e})",
            std
        )));
    }
    Ok(values
        .iter()
        .map(|v| if v.is_finite() { (v - mean) / std } else { f64::NAN })
        .collect())
}

/// Z-score of each value against the trailing `window` values ending at it.
/// Cells without a full window of finite values, or whose window has no
/// variance, are missing.
pub fn rolling_z_score(values: &[f64], window: usize) -> Result<Vec<f64>> {
    if window < 2 {
        return Err(PairsError::InvalidConfig(format!(
            "z-score window must be at least 2, got {}",
            window
        )));
    }
    let mut out = vec![f64::NAN; values.len()];
    let mut flat_windows = 0usize;
    let mut full_windows = 0usize;
    for end in (window - 1)..values.len() {
        let slice = &values[end + 1 - window..=end];
        if slice.iter().any(|v| !v.is_finite()) {
            continue;
        }
        full_windows += 1;
        if let Some((_, mean, std)) = sample_moments(slice) {
            if is_degenerate(std, slice) {
                flat_windows += 1;
            } else {
                out[end] = (values[end] - mean) / std;
            }
        }
    }
    if flat_windows > 0 {
        log::warn!(
            "rolling z-score: {} of {} windows have no variance, left missing",
            flat_windows,
            full_windows
        );
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub panel: SeriesPanel,
    pub failures: Vec<PairFailure>,
}

/// Normalizes every spread column independently. Columns that cannot be
/// normalized are dropped from the panel and reported.
pub fn z_scores_for_spreads(spreads: &SeriesPanel, window: Option<usize>) -> Result<Normalized> {
    if let Some(w) = window {
        if w < 2 {
            return Err(PairsError::InvalidConfig(format!(
                "z-score window must be at least 2, got {}",
                w
            )));
        }
    }
    let outcomes: Vec<_> = (0..spreads.columns().len())
        .into_par_iter()
        .map(|idx| {
            let values = spreads.series(idx);
            let z = match window {
                Some(w) => rolling_z_score(values, w),
                None => z_score(values),
            };
            (idx, z)
        })
        .collect();
    let mut columns = Vec::with_capacity(outcomes.len());
    let mut values = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (idx, outcome) in outcomes {
        let name = &spreads.columns()[idx];
        match outcome {
            Ok(z) => {
                columns.push(name.clone());
                values.push(z);
            }
            Err(err) => failures.push(PairFailure::new(name.clone(), Stage::ZScore, &err)),
        }
    }
    log::info!(
        "Normalized {} spreads ({}, {} failed)",
        columns.len(),
        window.map_or_else(|| "whole series".to_string(), |w| format!("window {}", w)),
        failures.len()
    );
    Ok(Normalized {
        panel: spreads.with_columns(columns, values),
        failures,
    })
}
