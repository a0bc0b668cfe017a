use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::env;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use crate::error::PairsError;
use crate::signal::Thresholds;
use crate::window::LookbackUnit;

const DEFAULT_CORRELATION_THRESHOLD: f64 = 0.8;
const DEFAULT_COINTEGRATION_THRESHOLD: f64 = 0.05;
const DEFAULT_ENTRY_THRESHOLD: f64 = 2.0;
const DEFAULT_EXIT_THRESHOLD: f64 = 1.0;
const DEFAULT_MIN_COINTEGRATION_OBSERVATIONS: usize = 20;
const DEFAULT_FORWARD_FILL: bool = true;
const DEFAULT_LOOKBACK_DURATION: u32 = 10;
const DEFAULT_LOOKBACK_UNIT: LookbackUnit = LookbackUnit::Years;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Pairs need return correlation strictly above this.
    pub correlation_threshold: f64,
    /// Pairs need a cointegration p-value at or below this.
    pub cointegration_threshold: f64,
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub min_cointegration_observations: usize,
    /// Trailing z-score window; `None` normalizes over the whole series.
    pub zscore_window: Option<usize>,
    pub forward_fill: bool,
    /// Last date of the analysis window; defaults to the last panel date.
    pub end_date: Option<NaiveDate>,
    pub lookback_duration: u32,
    pub lookback_unit: LookbackUnit,
    pub price_panel_file: Option<String>,
    /// Report destination; stdout when unset.
    pub report_file: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            correlation_threshold: DEFAULT_CORRELATION_THRESHOLD,
            cointegration_threshold: DEFAULT_COINTEGRATION_THRESHOLD,
            entry_threshold: DEFAULT_ENTRY_THRESHOLD,
            exit_threshold: DEFAULT_EXIT_THRESHOLD,
            min_cointegration_observations: DEFAULT_MIN_COINTEGRATION_OBSERVATIONS,
            zscore_window: None,
            forward_fill: DEFAULT_FORWARD_FILL,
            end_date: None,
            lookback_duration: DEFAULT_LOOKBACK_DURATION,
            lookback_unit: DEFAULT_LOOKBACK_UNIT,
            price_panel_file: None,
            report_file: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
struct PipelineYaml {
    correlation_threshold: Option<f64>,
    cointegration_threshold: Option<f64>,
    entry_threshold: Option<f64>,
    exit_threshold: Option<f64>,
    min_cointegration_observations: Option<usize>,
    zscore_window: Option<usize>,
    forward_fill: Option<bool>,
    end_date: Option<NaiveDate>,
    lookback_duration: Option<u32>,
    lookback_unit: Option<String>,
    price_panel_file: Option<String>,
    report_file: Option<String>,
}

fn parse_lookback_unit(value: &str) -> Result<LookbackUnit> {
    LookbackUnit::from_str(value).map_err(|_| {
        anyhow::Error::new(PairsError::InvalidConfig(format!(
            "unknown lookback unit '{}' (expected years, months or days)",
            value
        )))
    })
}

fn parse_override<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        anyhow::Error::new(PairsError::InvalidConfig(format!(
            "{}: cannot parse '{}'",
            key, raw
        )))
    })
}

fn parse_bool(raw: &str) -> bool {
    let v = raw.trim().to_ascii_lowercase();
    !(v == "0" || v == "false" || v == "no")
}

impl PipelineConfig {
    /// Reads YAML from `PAIRSCAN_CONFIG_PATH` when set, otherwise starts from
    /// the defaults. Environment variables override either source.
    pub fn from_env_or_yaml() -> Result<Self> {
        let config_path = env::var("PAIRSCAN_CONFIG_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty());
        match config_path {
            Some(path) => {
                let mut cfg = Self::from_yaml_path(path)?;
                cfg.apply_env_overrides()?;
                cfg.validate()?;
                Ok(cfg)
            }
            None => Self::from_env(),
        }
    }

    pub fn from_yaml_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)
            .with_context(|| format!("failed to open pairscan config {}", path_ref.display()))?;
        let yaml: PipelineYaml = serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse pairscan config {}", path_ref.display()))?;

        let lookback_unit = match yaml.lookback_unit.as_deref() {
            Some(unit) => parse_lookback_unit(unit)?,
            None => DEFAULT_LOOKBACK_UNIT,
        };
        let cfg = PipelineConfig {
            correlation_threshold: yaml
                .correlation_threshold
                .unwrap_or(DEFAULT_CORRELATION_THRESHOLD),
            cointegration_threshold: yaml
                .cointegration_threshold
                .unwrap_or(DEFAULT_COINTEGRATION_THRESHOLD),
            entry_threshold: yaml.entry_threshold.unwrap_or(DEFAULT_ENTRY_THRESHOLD),
            exit_threshold: yaml.exit_threshold.unwrap_or(DEFAULT_EXIT_THRESHOLD),
            min_cointegration_observations: yaml
                .min_cointegration_observations
                .unwrap_or(DEFAULT_MIN_COINTEGRATION_OBSERVATIONS),
            zscore_window: yaml.zscore_window,
            forward_fill: yaml.forward_fill.unwrap_or(DEFAULT_FORWARD_FILL),
            end_date: yaml.end_date,
            lookback_duration: yaml.lookback_duration.unwrap_or(DEFAULT_LOOKBACK_DURATION),
            lookback_unit,
            price_panel_file: yaml.price_panel_file,
            report_file: yaml.report_file,
        };
        log::info!("Loaded pairscan config from {}", path_ref.display());
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Applies every key `lookup` returns a non-empty value for.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CORRELATION_THRESHOLD") {
            self.correlation_threshold = parse_override("CORRELATION_THRESHOLD", &v)?;
        }
        if let Some(v) = get("COINTEGRATION_THRESHOLD") {
            self.cointegration_threshold = parse_override("COINTEGRATION_THRESHOLD", &v)?;
        }
        if let Some(v) = get("ENTRY_THRESHOLD") {
            self.entry_threshold = parse_override("ENTRY_THRESHOLD", &v)?;
        }
        if let Some(v) = get("EXIT_THRESHOLD") {
            self.exit_threshold = parse_override("EXIT_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MIN_COINTEGRATION_OBSERVATIONS") {
            self.min_cointegration_observations =
                parse_override("MIN_COINTEGRATION_OBSERVATIONS", &v)?;
        }
        if let Some(v) = get("ZSCORE_WINDOW") {
            self.zscore_window = match v.trim().to_ascii_lowercase().as_str() {
                "none" | "off" => None,
                _ => Some(parse_override("ZSCORE_WINDOW", &v)?),
            };
        }
        if let Some(v) = get("FORWARD_FILL") {
            self.forward_fill = parse_bool(&v);
        }
        if let Some(v) = get("END_DATE") {
            self.end_date = Some(parse_override("END_DATE", &v)?);
        }
        if let Some(v) = get("LOOKBACK_DURATION") {
            self.lookback_duration = parse_override("LOOKBACK_DURATION", &v)?;
        }
        if let Some(v) = get("LOOKBACK_UNIT") {
            self.lookback_unit = parse_lookback_unit(&v)?;
        }
        if let Some(v) = get("PRICE_PANEL_FILE") {
            self.price_panel_file = Some(v);
        }
        if let Some(v) = get("REPORT_FILE") {
            self.report_file = Some(v);
        }
        Ok(())
    }

    pub fn thresholds(&self) -> std::result::Result<Thresholds, PairsError> {
        Thresholds::new(self.entry_threshold, self.exit_threshold)
    }

    pub fn validate(&self) -> std::result::Result<(), PairsError> {
        if !(-1.0..=1.0).contains(&self.correlation_threshold) {
            return Err(PairsError::InvalidConfig(format!(
                "correlation_threshold must be within [-1, 1], got {}",
                self.correlation_threshold
            )));
        }
        if !(self.cointegration_threshold > 0.0 && self.cointegration_threshold <= 1.0) {
            return Err(PairsError::InvalidConfig(format!(
                "cointegration_threshold must be within (0, 1], got {}",
                self.cointegration_threshold
            )));
        }
        self.thresholds()?;
        if let Some(window) = self.zscore_window {
            if window < 2 {
                return Err(PairsError::InvalidConfig(format!(
                    "zscore_window must be at least 2, got {}",
                    window
                )));
            }
        }
        if self.lookback_duration == 0 {
            return Err(PairsError::InvalidConfig(
                "lookback_duration must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.zscore_window, None);
        assert_eq!(cfg.lookback_unit, LookbackUnit::Years);
        assert_eq!(cfg.thresholds().unwrap(), Thresholds::default());
    }

    #[test]
    fn yaml_fills_missing_keys_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "correlation_threshold: 0.9\nzscore_window: 60\nlookback_unit: months\n\
             end_date: 2023-06-30\nprice_panel_file: prices.jsonl"
        )
        .unwrap();
        let cfg = PipelineConfig::from_yaml_path(file.path()).unwrap();
        assert_eq!(cfg.correlation_threshold, 0.9);
        assert_eq!(cfg.zscore_window, Some(60));
        assert_eq!(cfg.lookback_unit, LookbackUnit::Months);
        assert_eq!(cfg.end_date, NaiveDate::from_ymd_opt(2023, 6, 30));
        assert_eq!(cfg.price_panel_file.as_deref(), Some("prices.jsonl"));
        assert_eq!(cfg.cointegration_threshold, DEFAULT_COINTEGRATION_THRESHOLD);
        assert_eq!(cfg.entry_threshold, DEFAULT_ENTRY_THRESHOLD);
    }

    #[test]
    fn yaml_rejects_unknown_unit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lookback_unit: fortnights").unwrap();
        assert!(PipelineConfig::from_yaml_path(file.path()).is_err());
    }

    #[test]
    fn overrides_replace_values() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_overrides(lookup(&[
            ("ENTRY_THRESHOLD", "2.5"),
            ("EXIT_THRESHOLD", " 0.5 "),
            ("ZSCORE_WINDOW", "30"),
            ("FORWARD_FILL", "false"),
            ("LOOKBACK_UNIT", "Days"),
            ("REPORT_FILE", "out.json"),
            ("CORRELATION_THRESHOLD", ""),
        ]))
        .unwrap();
        assert_eq!(cfg.entry_threshold, 2.5);
        assert_eq!(cfg.exit_threshold, 0.5);
        assert_eq!(cfg.zscore_window, Some(30));
        assert!(!cfg.forward_fill);
        assert_eq!(cfg.lookback_unit, LookbackUnit::Days);
        assert_eq!(cfg.report_file.as_deref(), Some("out.json"));
        assert_eq!(cfg.correlation_threshold, DEFAULT_CORRELATION_THRESHOLD);
    }

    #[test]
    fn unparsable_override_is_an_error() {
        let mut cfg = PipelineConfig::default();
        let err = cfg
            .apply_overrides(lookup(&[("MIN_COINTEGRATION_OBSERVATIONS", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("MIN_COINTEGRATION_OBSERVATIONS"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let crossed = PipelineConfig {
            entry_threshold: 1.0,
            exit_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            crossed.validate(),
            Err(PairsError::InvalidConfig(_))
        ));
        let window = PipelineConfig {
            zscore_window: Some(1),
            ..PipelineConfig::default()
        };
        assert!(window.validate().is_err());
        let correlation = PipelineConfig {
            correlation_threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(correlation.validate().is_err());
        let p = PipelineConfig {
            cointegration_threshold: 0.0,
            ..PipelineConfig::default()
        };
        assert!(p.validate().is_err());
    }
}
