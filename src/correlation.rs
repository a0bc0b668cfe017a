//! Correlation screening over a return panel.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::{PairFailure, PairsError, Stage};
use crate::panel::ReturnPanel;
use crate::stats::pearson_pairwise;

/// Two instruments and the correlation of their returns. `asset_a` is the
/// earlier column of the source panel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairRecord {
    pub asset_a: String,
    pub asset_b: String,
    pub correlation: f64,
}

impl PairRecord {
    pub fn label(&self) -> String {
        pair_label(&self.asset_a, &self.asset_b)
    }
}

pub fn pair_label(asset_a: &str, asset_b: &str) -> String {
    format!("{}_vs_{}", asset_a, asset_b)
}

/// Symmetric matrix of pairwise-complete Pearson coefficients. Undefined
/// entries are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn size(&self) -> usize {
        self.columns.len()
    }
}

pub fn correlation_matrix(returns: &ReturnPanel) -> CorrelationMatrix {
    let m = returns.columns().len();
    let upper: Vec<Vec<f64>> = (0..m)
        .into_par_iter()
        .map(|i| {
            (i..m)
                .map(|j| {
                    pearson_pairwise(returns.series(i), returns.series(j))
                        .map(|r| if i == j { 1.0 } else { r })
                        .unwrap_or(f64::NAN)
                })
                .collect()
        })
        .collect();
    let mut values = vec![vec![f64::NAN; m]; m];
    for (i, row) in upper.iter().enumerate() {
        for (offset, &r) in row.iter().enumerate() {
            let j = i + offset;
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    CorrelationMatrix {
        columns: returns.columns().to_vec(),
        values,
    }
}

/// Every distinct pair ranked by correlation, plus the pairs whose
/// coefficient could not be computed.
#[derive(Debug, Clone, Default)]
pub struct Screening {
    pub pairs: Vec<PairRecord>,
    pub failures: Vec<PairFailure>,
}

pub fn rank_pairs(returns: &ReturnPanel) -> Screening {
    let matrix = correlation_matrix(returns);
    let columns = matrix.columns();
    let mut screening = Screening::default();
    for i in 0..matrix.size() {
        for j in (i + 1)..matrix.size() {
            let correlation = matrix.get(i, j);
            if correlation.is_nan() {
                let err = PairsError::NumericalUndefined(format!(
                    "correlation of {} and {} needs two overlapping returns with variance",
                    columns[i], columns[j]
                ));
                screening.failures.push(PairFailure::new(
                    pair_label(&columns[i], &columns[j]),
                    Stage::Correlation,
                    &err,
                ));
                continue;
            }
            screening.pairs.push(PairRecord {
                asset_a: columns[i].clone(),
                asset_b: columns[j].clone(),
                correlation,
            });
        }
    }
    screening.pairs.sort_by(|a, b| {
        b.correlation
            .partial_cmp(&a.correlation)
            .unwrap_or(Ordering::Equal)
    });
    log::info!(
        "Ranked {} pairs across {} instruments ({} undefined)",
        screening.pairs.len(),
        columns.len(),
        screening.failures.len()
    );
    screening
}

/// Pairs with correlation strictly above `threshold`, rank preserved.
pub fn select_high_correlation(pairs: &[PairRecord], threshold: f64) -> Vec<PairRecord> {
    let selected: Vec<PairRecord> = pairs
        .iter()
        .filter(|p| p.correlation > threshold)
        .cloned()
        .collect();
    log::info!(
        "{} of {} pairs above correlation {}",
        selected.len(),
        pairs.len(),
        threshold
    );
    selected
}
