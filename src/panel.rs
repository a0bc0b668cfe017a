use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use crate::error::{PairsError, Result};

/// Dense dates × instruments price table. Missing cells are `NaN`.
///
/// Values are stored column-major so that every per-instrument series is a
/// contiguous slice.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePanel {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

/// Period-over-period percentage changes of a [`PricePanel`]; row 0 is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPanel {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

/// Two price series restricted to the dates where both are finite.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub dates: Vec<NaiveDate>,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl AlignedPair {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

fn validate_shape(dates: &[NaiveDate], columns: &[String], values: &[Vec<f64>]) -> Result<()> {
    for w in dates.windows(2) {
        if w[1] == w[0] {
            return Err(PairsError::InputShape(format!("duplicate date {}", w[0])));
        }
        if w[1] < w[0] {
            return Err(PairsError::InputShape(format!(
                "dates not increasing: {} follows {}",
                w[1], w[0]
            )));
        }
    }
    let mut seen = HashSet::with_capacity(columns.len());
    for name in columns {
        if !seen.insert(name.as_str()) {
            return Err(PairsError::InputShape(format!("duplicate column {}", name)));
        }
    }
    if values.len() != columns.len() {
        return Err(PairsError::InputShape(format!(
            "{} columns named but {} series supplied",
            columns.len(),
            values.len()
        )));
    }
    for (name, series) in columns.iter().zip(values) {
        if series.len() != dates.len() {
            return Err(PairsError::InputShape(format!(
                "column {} has {} rows, index has {}",
                name,
                series.len(),
                dates.len()
            )));
        }
    }
    Ok(())
}

impl PricePanel {
    /// Builds a panel from column-major series (`values[column][row]`).
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self> {
        validate_shape(&dates, &columns, &values)?;
        Ok(Self {
            dates,
            columns,
            values,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|idx| self.values[idx].as_slice())
    }

    pub fn series(&self, idx: usize) -> &[f64] {
        &self.values[idx]
    }

    /// Percentage change per column. A return is missing when either price
    /// is missing or the ratio is not finite.
    pub fn returns(&self) -> ReturnPanel {
        let values = self
            .values
            .iter()
            .map(|series| {
                let mut out = Vec::with_capacity(series.len());
                if !series.is_empty() {
                    out.push(0.0);
                }
                for w in series.windows(2) {
                    let ret = w[1] / w[0] - 1.0;
                    out.push(if ret.is_finite() { ret } else { f64::NAN });
                }
                out
            })
            .collect();
        ReturnPanel {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            values,
        }
    }

    /// Carries the last valid price forward over missing cells. Leading
    /// gaps stay missing.
    pub fn forward_fill(&self) -> PricePanel {
        let values = self
            .values
            .iter()
            .map(|series| {
                let mut last = f64::NAN;
                series
                    .iter()
                    .map(|&v| {
                        if v.is_nan() {
                            last
                        } else {
                            last = v;
                            v
                        }
                    })
                    .collect()
            })
            .collect();
        PricePanel {
            dates: self.dates.clone(),
            columns: self.columns.clone(),
            values,
        }
    }

    /// Rows with `start <= date <= end`.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> PricePanel {
        let from = self.dates.partition_point(|d| *d < start);
        let to = self.dates.partition_point(|d| *d <= end).max(from);
        PricePanel {
            dates: self.dates[from..to].to_vec(),
            columns: self.columns.clone(),
            values: self.values.iter().map(|s| s[from..to].to_vec()).collect(),
        }
    }

    /// Pairs the two named series on the dates where both are finite.
    pub fn align_pair(&self, asset_a: &str, asset_b: &str) -> Result<AlignedPair> {
        let a = self
            .column(asset_a)
            .ok_or_else(|| PairsError::InputShape(format!("unknown column {}", asset_a)))?;
        let b = self
            .column(asset_b)
            .ok_or_else(|| PairsError::InputShape(format!("unknown column {}", asset_b)))?;
        let mut aligned = AlignedPair {
            dates: Vec::new(),
            a: Vec::new(),
            b: Vec::new(),
        };
        for ((date, &va), &vb) in self.dates.iter().zip(a).zip(b) {
            if va.is_finite() && vb.is_finite() {
                aligned.dates.push(*date);
                aligned.a.push(va);
                aligned.b.push(vb);
            }
        }
        Ok(aligned)
    }
}

impl ReturnPanel {
    pub fn new(dates: Vec<NaiveDate>, columns: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self> {
        validate_shape(&dates, &columns, &values)?;
        Ok(Self {
            dates,
            columns,
            values,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn series(&self, idx: usize) -> &[f64] {
        &self.values[idx]
    }
}

/// Named real-valued series over a shared date index, used for the spread
/// and z-score outputs. Missing cells are `NaN` (serialized as `null`).
#[derive(Debug, Clone, Serialize)]
pub struct SeriesPanel {
    dates: Vec<NaiveDate>,
    columns: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl SeriesPanel {
    /// Combines independently indexed series on the union of their dates.
    /// Each input's dates must be strictly increasing.
    pub fn from_series(series: Vec<(String, Vec<NaiveDate>, Vec<f64>)>) -> Result<Self> {
        let index: Vec<NaiveDate> = series
            .iter()
            .flat_map(|(_, dates, _)| dates.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let mut columns = Vec::with_capacity(series.len());
        let mut values = Vec::with_capacity(series.len());
        for (name, dates, vals) in series {
            if dates.len() != vals.len() {
                return Err(PairsError::InputShape(format!(
                    "series {} has {} dates but {} values",
                    name,
                    dates.len(),
                    vals.len()
                )));
            }
            let mut column = vec![f64::NAN; index.len()];
            let mut cursor = 0;
            for (date, v) in dates.iter().zip(vals) {
                while cursor < index.len() && index[cursor] < *date {
                    cursor += 1;
                }
                if cursor == index.len() || index[cursor] != *date {
                    return Err(PairsError::InputShape(format!(
                        "series {} dates not increasing at {}",
                        name, date
                    )));
                }
                column[cursor] = v;
                cursor += 1;
            }
            columns.push(name);
            values.push(column);
        }
        validate_shape(&index, &columns, &values)?;
        Ok(Self {
            dates: index,
            columns,
            values,
        })
    }

    /// Same index and column names, new cells.
    pub(crate) fn with_columns(&self, columns: Vec<String>, values: Vec<Vec<f64>>) -> Self {
        Self {
            dates: self.dates.clone(),
            columns,
            values,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|idx| self.values[idx].as_slice())
    }

    pub fn series(&self, idx: usize) -> &[f64] {
        &self.values[idx]
    }
}

/// Cell-wise bit equality, so two panels with missing cells in the same
/// places compare equal.
impl PartialEq for SeriesPanel {
    fn eq(&self, other: &Self) -> bool {
        self.dates == other.dates
            && self.columns == other.columns
            && self.values.len() == other.values.len()
            && self.values.iter().zip(&other.values).all(|(a, b)| {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            })
    }
}
