use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PairsError>;

/// Failures raised by the screening pipeline.
///
/// `InputShape` and `InvalidConfig` are fatal for a run. The numerical
/// variants are raised per pair and recorded as exclusions by the stage
/// that hit them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PairsError {
    #[error("malformed price panel: {0}")]
    InputShape(String),

    #[error("numerically undefined: {0}")]
    NumericalUndefined(String),

    #[error("numerically unstable: {0}")]
    NumericalInstability(String),

    #[error("insufficient data: expected at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PairsError {
    /// Stable short label used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PairsError::InputShape(_) => "input_shape",
            PairsError::NumericalUndefined(_) => "numerical_undefined",
            PairsError::NumericalInstability(_) => "numerical_instability",
            PairsError::InsufficientData { .. } => "insufficient_data",
            PairsError::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Pipeline stage that excluded a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Correlation,
    Cointegration,
    Spread,
    ZScore,
}

/// A pair dropped from a stage's output, kept for the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairFailure {
    pub pair: String,
    pub stage: Stage,
    pub kind: &'static str,
    pub message: String,
}

impl PairFailure {
    pub fn new(pair: impl Into<String>, stage: Stage, err: &PairsError) -> Self {
        let pair = pair.into();
        log::warn!("[{:?}] excluding {}: {}", stage, pair, err);
        Self {
            pair,
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
