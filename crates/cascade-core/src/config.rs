//! Configuration for cascade training
//!
//! Defaults are usable as-is. `CascadeConfig::load` applies `CASCADES_*`
//! environment overrides; documents can be parsed from YAML or JSON.

use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// How feature block importance is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceMethod {
    /// Score of a model trained on the block alone
    #[default]
    SingleBlock,
    /// Drop in score when the block is left out of the full set
    LeaveOneOut,
}

impl FromStr for ImportanceMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single_block" | "single-block" => Ok(ImportanceMethod::SingleBlock),
            "leave_one_out" | "leave-one-out" => Ok(ImportanceMethod::LeaveOneOut),
            other => Err(CoreError::ConfigurationError(format!(
                "Unknown importance method: {}",
                other
            ))),
        }
    }
}

/// Cascade training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Allowed drop of the blended score below the full-model score
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Confidence thresholds searched
    #[serde(default = "default_threshold_grid")]
    pub threshold_grid: Vec<f64>,

    /// Fractions of the total block cost used to form budgeted candidate sets
    #[serde(default = "default_cost_budget_fractions")]
    pub cost_budget_fractions: Vec<f64>,

    /// Profiler passes, the first of which is discarded
    #[serde(default = "default_profiling_repetitions")]
    pub profiling_repetitions: usize,

    /// Rows whose index is a multiple of this are held out for validation
    #[serde(default = "default_holdout_stride")]
    pub holdout_stride: usize,

    /// Importance estimation method
    #[serde(default)]
    pub importance_method: ImportanceMethod,

    /// Evaluate candidates and blocks on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_tolerance() -> f64 {
    0.001
}

fn default_threshold_grid() -> Vec<f64> {
    vec![0.6, 0.7, 0.8, 0.9, 1.0]
}

fn default_cost_budget_fractions() -> Vec<f64> {
    vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]
}

fn default_profiling_repetitions() -> usize {
    2
}

fn default_holdout_stride() -> usize {
    4
}

fn default_parallel() -> bool {
    true
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            threshold_grid: default_threshold_grid(),
            cost_budget_fractions: default_cost_budget_fractions(),
            profiling_repetitions: default_profiling_repetitions(),
            holdout_stride: default_holdout_stride(),
            importance_method: ImportanceMethod::default(),
            parallel: default_parallel(),
        }
    }
}

impl CascadeConfig {
    /// Load configuration from defaults and `CASCADES_*` environment variables
    pub fn load() -> Result<Self, CoreError> {
        let config = Self::default().with_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup; unparsable values are logged and ignored
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("CASCADES_TOLERANCE") {
            match value.parse::<f64>() {
                Ok(tolerance) => self.tolerance = tolerance,
                Err(_) => warn!("Invalid CASCADES_TOLERANCE value: {}", value),
            }
        }

        if let Some(value) = lookup("CASCADES_THRESHOLD_GRID") {
            match parse_list(&value) {
                Some(grid) => self.threshold_grid = grid,
                None => warn!("Invalid CASCADES_THRESHOLD_GRID value: {}", value),
            }
        }

        if let Some(value) = lookup("CASCADES_BUDGET_FRACTIONS") {
            match parse_list(&value) {
                Some(fractions) => self.cost_budget_fractions = fractions,
                None => warn!("Invalid CASCADES_BUDGET_FRACTIONS value: {}", value),
            }
        }

        if let Some(value) = lookup("CASCADES_PROFILING_REPETITIONS") {
            match value.parse::<usize>() {
                Ok(reps) => self.profiling_repetitions = reps,
                Err(_) => warn!("Invalid CASCADES_PROFILING_REPETITIONS value: {}", value),
            }
        }

        if let Some(value) = lookup("CASCADES_HOLDOUT_STRIDE") {
            match value.parse::<usize>() {
                Ok(stride) => self.holdout_stride = stride,
                Err(_) => warn!("Invalid CASCADES_HOLDOUT_STRIDE value: {}", value),
            }
        }

        if let Some(value) = lookup("CASCADES_IMPORTANCE_METHOD") {
            match value.parse::<ImportanceMethod>() {
                Ok(method) => self.importance_method = method,
                Err(_) => warn!("Invalid CASCADES_IMPORTANCE_METHOD value: {}", value),
            }
        }

        if let Some(value) = lookup("CASCADES_PARALLEL") {
            self.parallel = value.to_lowercase() == "true" || value == "1";
        }

        self
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CoreError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a `.yaml`, `.yml` or `.json` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(CoreError::ConfigurationError(format!(
                "Unsupported config file extension: {}",
                path.display()
            ))),
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(CoreError::ConfigurationError(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.threshold_grid.is_empty() {
            return Err(CoreError::ConfigurationError(
                "threshold_grid must not be empty".to_string(),
            ));
        }
        if let Some(t) = self.threshold_grid.iter().find(|t| !(0.0..=1.0).contains(*t)) {
            return Err(CoreError::ConfigurationError(format!(
                "threshold {} is outside [0, 1]",
                t
            )));
        }
        if let Some(f) = self
            .cost_budget_fractions
            .iter()
            .find(|f| !(0.0..=1.0).contains(*f))
        {
            return Err(CoreError::ConfigurationError(format!(
                "cost budget fraction {} is outside [0, 1]",
                f
            )));
        }
        if self.profiling_repetitions < 2 {
            return Err(CoreError::ConfigurationError(format!(
                "profiling_repetitions must be at least 2 (one warm-up pass), got {}",
                self.profiling_repetitions
            )));
        }
        if self.holdout_stride < 2 {
            return Err(CoreError::ConfigurationError(format!(
                "holdout_stride must be at least 2, got {}",
                self.holdout_stride
            )));
        }
        Ok(())
    }
}

fn parse_list(value: &str) -> Option<Vec<f64>> {
    value
        .split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = CascadeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_grid, vec![0.6, 0.7, 0.8, 0.9, 1.0]);
        assert_eq!(config.importance_method, ImportanceMethod::SingleBlock);
        assert_eq!(config.holdout_stride, 4);
    }

    #[test]
    fn test_overrides_skip_bad_values() {
        let vars = HashMap::from([
            ("CASCADES_TOLERANCE", "0.01"),
            ("CASCADES_THRESHOLD_GRID", "0.8, 0.95"),
            ("CASCADES_BUDGET_FRACTIONS", "0.5,abc"),
            ("CASCADES_PROFILING_REPETITIONS", "three"),
            ("CASCADES_IMPORTANCE_METHOD", "leave-one-out"),
            ("CASCADES_PARALLEL", "0"),
        ]);
        let config =
            CascadeConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.tolerance, 0.01);
        assert_eq!(config.threshold_grid, vec![0.8, 0.95]);
        assert_eq!(config.cost_budget_fractions, default_cost_budget_fractions());
        assert_eq!(config.profiling_repetitions, 2);
        assert_eq!(config.importance_method, ImportanceMethod::LeaveOneOut);
        assert!(!config.parallel);
    }

    #[test]
    fn test_yaml_fills_missing_fields() {
        let config = CascadeConfig::from_yaml_str(
            "tolerance: 0.0\nthreshold_grid: [0.9]\nimportance_method: leave_one_out\n",
        )
        .unwrap();
        assert_eq!(config.tolerance, 0.0);
        assert_eq!(config.threshold_grid, vec![0.9]);
        assert_eq!(config.profiling_repetitions, 2);
        assert_eq!(config.importance_method, ImportanceMethod::LeaveOneOut);
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            r#"{"tolerance": -0.1}"#,
            r#"{"threshold_grid": []}"#,
            r#"{"threshold_grid": [1.5]}"#,
            r#"{"cost_budget_fractions": [-0.2]}"#,
            r#"{"profiling_repetitions": 1}"#,
            r#"{"holdout_stride": 1}"#,
        ];
        for case in cases {
            let err = CascadeConfig::from_json_str(case).unwrap_err();
            assert_eq!(err.error_code(), "ERR_CONFIGURATION", "case {}", case);
        }
    }

    #[test]
    fn test_from_file_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("cascades.yml");
        std::fs::write(&yaml, "holdout_stride: 5\n").unwrap();
        assert_eq!(CascadeConfig::from_file(&yaml).unwrap().holdout_stride, 5);

        let toml = dir.path().join("cascades.toml");
        std::fs::write(&toml, "holdout_stride = 5\n").unwrap();
        assert!(CascadeConfig::from_file(&toml).is_err());
    }
}
