//! Mean-reversion position state machine and per-leg orders.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{PairsError, Result};
use crate::zscore::z_score;

/// Serialized as its signed value: `1`, `-1` or `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "i8")]
pub enum Position {
    /// Long the spread: buy leg A, sell leg B.
    Long,
    /// Short the spread: sell leg A, buy leg B.
    Short,
    Flat,
}

impl From<Position> for i8 {
    fn from(position: Position) -> i8 {
        position.value()
    }
}

/// State assumed before the first observation.
pub const INITIAL_POSITION: Position = Position::Flat;

impl Position {
    pub fn value(self) -> i8 {
        match self {
            Position::Long => 1,
            Position::Short => -1,
            Position::Flat => 0,
        }
    }

    /// `(leg A, leg B)` order directions for holding this position.
    pub fn leg_orders(self) -> (i8, i8) {
        match self {
            Position::Long => (1, -1),
            Position::Short => (-1, 1),
            Position::Flat => (0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub entry: f64,
    pub exit: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            entry: 2.0,
            exit: 1.0,
        }
    }
}

impl Thresholds {
    /// Requires `entry > exit > 0`.
    pub fn new(entry: f64, exit: f64) -> Result<Self> {
        if !(exit > 0.0 && entry > exit && entry.is_finite()) {
            return Err(PairsError::InvalidConfig(format!(
                "thresholds need entry > exit > 0, got entry {} exit {}",
                entry, exit
            )));
        }
        Ok(Self { entry, exit })
    }
}

/// One step of the state machine. Entry bands win over the exit band; the
/// dead zone between `exit` and `entry` holds `prev`, as does a missing z.
pub fn next_position(prev: Position, z: f64, thresholds: &Thresholds) -> Position {
    if z > thresholds.entry {
        Position::Short
    } else if z < -thresholds.entry {
        Position::Long
    } else if z.abs() < thresholds.exit {
        Position::Flat
    } else {
        prev
    }
}

/// Runs the state machine over the series, starting from
/// [`INITIAL_POSITION`]. The transition applies at index 0 as well.
pub fn generate_signals(z_scores: &[f64], thresholds: &Thresholds) -> Vec<Position> {
    z_scores
        .iter()
        .scan(INITIAL_POSITION, |state, &z| {
            *state = next_position(*state, z, thresholds);
            Some(*state)
        })
        .collect()
}

/// [`generate_signals`] for a pair that cannot trade on every date: where
/// `covered` is false the position is closed and the machine restarts from
/// Flat on the next covered date.
pub fn generate_covered_signals(
    z_scores: &[f64],
    covered: &[bool],
    thresholds: &Thresholds,
) -> Vec<Position> {
    z_scores
        .iter()
        .enumerate()
        .scan(INITIAL_POSITION, |state, (i, &z)| {
            *state = if covered.get(i).copied().unwrap_or(false) {
                next_position(*state, z, thresholds)
            } else {
                Position::Flat
            };
            Some(*state)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegOrder {
    pub date: NaiveDate,
    pub leg_a: i8,
    pub leg_b: i8,
}

/// Orders reflect the position held on each date, not the change from the
/// previous date: a Long held for three days emits buy A / sell B three
/// times.
pub fn derive_orders(dates: &[NaiveDate], signals: &[Position]) -> Result<Vec<LegOrder>> {
    if dates.len() != signals.len() {
        return Err(PairsError::InputShape(format!(
            "{} dates for {} signals",
            dates.len(),
            signals.len()
        )));
    }
    Ok(dates
        .iter()
        .zip(signals)
        .map(|(date, position)| {
            let (leg_a, leg_b) = position.leg_orders();
            LegOrder {
                date: *date,
                leg_a,
                leg_b,
            }
        })
        .collect())
}

/// Orders for two aligned price series using the raw difference `A - B`
/// as the spread.
pub fn simulate_orders(
    dates: &[NaiveDate],
    prices_a: &[f64],
    prices_b: &[f64],
    thresholds: &Thresholds,
) -> Result<Vec<LegOrder>> {
    if prices_a.len() != dates.len() || prices_b.len() != dates.len() {
        return Err(PairsError::InputShape(format!(
            "{} dates for {} and {} prices",
            dates.len(),
            prices_a.len(),
            prices_b.len()
        )));
    }
    let spread: Vec<f64> = prices_a.iter().zip(prices_b).map(|(a, b)| a - b).collect();
    let z = z_score(&spread)?;
    let signals = generate_signals(&z, thresholds);
    derive_orders(dates, &signals)
}
