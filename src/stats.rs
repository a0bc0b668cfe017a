//! Numerical building blocks shared by the pipeline stages.
//!
//! Everything here works on plain `f64` slices. Missing observations are
//! `NaN`; callers decide whether to align or skip them before fitting.

use crate::error::{PairsError, Result};

/// Relative variance floor below which a regressor is treated as constant.
const DEGENERATE_VARIANCE_REL: f64 = 1e-12;

/// R² at or above this makes the two-step cointegration test meaningless.
const COLLINEAR_R_SQUARED: f64 = 1.0 - 100.0 * 1.490_116_119_384_765_6e-8;

/// Count, mean and unbiased (n - 1) standard deviation of the finite values.
pub fn sample_moments(values: &[f64]) -> Option<(usize, f64, f64)> {
    let (mut n, mut sum) = (0usize, 0.0);
    for v in values.iter().filter(|v| v.is_finite()) {
        n += 1;
        sum += v;
    }
    if n < 2 {
        return None;
    }
    let mean = sum / n as f64;
    let ss = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| {
            let d = v - mean;
            d * d
        })
        .sum::<f64>();
    Some((n, mean, (ss / (n - 1) as f64).sqrt()))
}

/// Pearson correlation over the rows where both inputs are finite.
///
/// `None` when fewer than two complete rows remain or either side has no
/// variance on those rows.
pub fn pearson_pairwise(a: &[f64], b: &[f64]) -> Option<f64> {
    let rows = || {
        a.iter()
            .zip(b)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    };
    let (mut n, mut sum_a, mut sum_b) = (0usize, 0.0, 0.0);
    for (x, y) in rows() {
        n += 1;
        sum_a += x;
        sum_b += y;
    }
    if n < 2 {
        return None;
    }
    let mean_a = sum_a / n as f64;
    let mean_b = sum_b / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (x, y) in rows() {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    let r = cov / (var_a.sqrt() * var_b.sqrt());
    if r.is_finite() {
        Some(r.clamp(-1.0, 1.0))
    } else {
        None
    }
}

/// Simple regression `y ~ intercept + slope * x`.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFit {
    pub intercept: f64,
    pub slope: f64,
    pub residuals: Vec<f64>,
    pub r_squared: f64,
}

/// Ordinary least squares with intercept on equal-length finite inputs.
pub fn fit_line(y: &[f64], x: &[f64]) -> Result<LineFit> {
    let n = y.len().min(x.len());
    if n < 2 {
        return Err(PairsError::InsufficientData {
            required: 2,
            actual: n,
        });
    }
    let mean_x = x[..n].iter().sum::<f64>() / n as f64;
    let mean_y = y[..n].iter().sum::<f64>() / n as f64;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let var_x = sxx / n as f64;
    if !(var_x > DEGENERATE_VARIANCE_REL * mean_x.powi(2).max(1.0)) {
        return Err(PairsError::NumericalInstability(format!(
            "regressor variance {:.3e} is too small to fit a slope",
            var_x
        )));
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let residuals: Vec<f64> = (0..n).map(|i| y[i] - (intercept + slope * x[i])).collect();
    let ssr = residuals.iter().map(|r| r * r).sum::<f64>();
    let r_squared = if syy > 0.0 { 1.0 - ssr / syy } else { 1.0 };
    Ok(LineFit {
        intercept,
        slope,
        residuals,
        r_squared,
    })
}

pub fn is_collinear(fit: &LineFit) -> bool {
    fit.r_squared >= COLLINEAR_R_SQUARED
}

/// Multiple regression without intercept, `columns[k][row]`.
#[derive(Debug, Clone)]
struct LeastSquares {
    coef: Vec<f64>,
    std_err: Vec<f64>,
    ssr: f64,
    nobs: usize,
}

impl LeastSquares {
    fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        let ssr = self.ssr.max(f64::MIN_POSITIVE);
        let k = self.coef.len() as f64;
        n * ((2.0 * std::f64::consts::PI).ln() + (ssr / n).ln() + 1.0) + 2.0 * k
    }

    /// An exact fit has no standard error; the statistic is then infinite in
    /// the direction of the coefficient.
    fn t_value(&self, idx: usize) -> f64 {
        let coef = self.coef[idx];
        if self.std_err[idx] > 0.0 {
            coef / self.std_err[idx]
        } else if coef < 0.0 {
            f64::NEG_INFINITY
        } else if coef > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}

/// Normal equations solved by Gauss-Jordan elimination with partial
/// pivoting. `None` when the design is singular or leaves no residual
/// degrees of freedom.
fn least_squares(columns: &[Vec<f64>], y: &[f64]) -> Option<LeastSquares> {
    let k = columns.len();
    let n = y.len();
    if k == 0 || n <= k {
        return None;
    }
    // [X'X | I] augmented so the inverse falls out for the standard errors.
    let width = 2 * k + 1;
    let mut m = vec![vec![0.0; width]; k];
    for i in 0..k {
        for j in 0..k {
            m[i][j] = columns[i].iter().zip(&columns[j]).map(|(a, b)| a * b).sum();
        }
        m[i][k + i] = 1.0;
        m[i][2 * k] = columns[i].iter().zip(y).map(|(a, b)| a * b).sum();
    }
    let scale = (0..k).map(|i| m[i][i].abs()).fold(0.0, f64::max);
    for col in 0..k {
        let pivot = (col..k).max_by(|&a, &b| {
            m[a][col]
                .abs()
                .partial_cmp(&m[b][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot][col].abs() <= 1e-12 * scale.max(f64::MIN_POSITIVE) {
            return None;
        }
        m.swap(col, pivot);
        let p = m[col][col];
        for v in m[col].iter_mut() {
            *v /= p;
        }
        for row in 0..k {
            if row != col {
                let factor = m[row][col];
                if factor != 0.0 {
                    for c in 0..width {
                        m[row][c] -= factor * m[col][c];
                    }
                }
            }
        }
    }
    let coef: Vec<f64> = (0..k).map(|i| m[i][2 * k]).collect();
    let ssr = (0..n)
        .map(|row| {
            let fit: f64 = (0..k).map(|i| coef[i] * columns[i][row]).sum();
            let e = y[row] - fit;
            e * e
        })
        .sum::<f64>();
    let sigma2 = ssr / (n - k) as f64;
    let std_err = (0..k)
        .map(|i| (sigma2 * m[i][k + i]).max(0.0).sqrt())
        .collect();
    Some(LeastSquares {
        coef,
        std_err,
        ssr,
        nobs: n,
    })
}

/// Outcome of an augmented Dickey-Fuller regression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfResult {
    pub statistic: f64,
    pub lags: usize,
    pub nobs: usize,
}

/// Design for `dY_t = g * Y_{t-1} + sum_j c_j * dY_{t-j}` with `lags`
/// augmentation terms, restricted to the last `nobs` rows.
fn adf_design(
    series: &[f64],
    diffs: &[f64],
    lags: usize,
    nobs: usize,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let start = diffs.len() - nobs;
    let mut columns = Vec::with_capacity(lags + 1);
    columns.push((start..diffs.len()).map(|t| series[t]).collect());
    for j in 1..=lags {
        columns.push((start..diffs.len()).map(|t| diffs[t - j]).collect());
    }
    (columns, diffs[start..].to_vec())
}

/// ADF test without deterministic terms, lag order picked by AIC.
///
/// Candidate lags `0..=maxlag` are compared on a common sample; the chosen
/// order is then refitted on every usable row.
pub fn adf_no_trend(series: &[f64]) -> Result<AdfResult> {
    const MIN_OBSERVATIONS: usize = 4;
    let n = series.len();
    if n < MIN_OBSERVATIONS {
        return Err(PairsError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: n,
        });
    }
    let maxlag = ((12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize).min(n / 2 - 1);
    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let common = diffs.len() - maxlag;
    let mut best: Option<(f64, usize)> = None;
    for lags in 0..=maxlag {
        if common <= lags + 1 {
            break;
        }
        let (columns, y) = adf_design(series, &diffs, lags, common);
        if let Some(fit) = least_squares(&columns, &y) {
            let aic = fit.aic();
            if best.map_or(true, |(b, _)| aic < b) {
                best = Some((aic, lags));
            }
        }
    }
    let (_, lags) = best.ok_or_else(|| {
        PairsError::NumericalInstability(
            "no augmented Dickey-Fuller lag order could be fitted".to_string(),
        )
    })?;

    let nobs = diffs.len() - lags;
    let (columns, y) = adf_design(series, &diffs, lags, nobs);
    let fit = least_squares(&columns, &y).ok_or_else(|| {
        PairsError::NumericalInstability(format!(
            "augmented Dickey-Fuller regression with {} lags is singular",
            lags
        ))
    })?;
    Ok(AdfResult {
        statistic: fit.t_value(0),
        lags,
        nobs,
    })
}

/// Asymptotic p-value of the Engle-Granger statistic for two series with a
/// constant (MacKinnon 1994 response surface).
pub fn engle_granger_p_value(statistic: f64) -> f64 {
    const TAU_MAX: f64 = 0.92;
    const TAU_MIN: f64 = -18.86;
    const TAU_STAR: f64 = -2.62;
    const SMALL_P: [f64; 3] = [2.92, 1.5012, 0.039796];
    const LARGE_P: [f64; 4] = [2.1945, 0.64695, -0.29198, -0.042377];

    if statistic.is_nan() {
        return f64::NAN;
    }
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if statistic <= TAU_STAR {
        &SMALL_P
    } else {
        &LARGE_P
    };
    let poly = coefs.iter().rev().fold(0.0, |acc, c| acc * statistic + c);
    normal_cdf(poly)
}

/// Finite-sample 1%, 5% and 10% critical values of the Engle-Granger
/// statistic for two series with a constant (MacKinnon 2010).
pub fn engle_granger_critical_values(nobs: usize) -> [f64; 3] {
    const SURFACE: [[f64; 3]; 3] = [
        [-3.89644, -10.9519, -22.527],
        [-3.33613, -6.1101, -6.823],
        [-3.04445, -4.2412, -2.720],
    ];
    let inv = 1.0 / nobs.max(1) as f64;
    SURFACE.map(|[b0, b1, b2]| b0 + b1 * inv + b2 * inv * inv)
}

pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Complementary error function, fractional error below 1.2e-7.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let r = t
        * (-z * z - 1.265_512_23
            + t * (1.000_023_68
                + t * (0.374_091_96
                    + t * (0.096_784_18
                        + t * (-0.186_288_06
                            + t * (0.278_868_07
                                + t * (-1.135_203_98
                                    + t * (1.488_515_87
                                        + t * (-0.822_152_23 + t * 0.170_872_77)))))))))
            .exp();
    if x >= 0.0 {
        r
    } else {
        2.0 - r
    }
}
