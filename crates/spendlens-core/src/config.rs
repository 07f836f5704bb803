//! Analysis thresholds
//!
//! Every numeric cutoff used by the gates and tools lives here so it can be
//! tuned without a rebuild.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a three-layer resolution:
//! 1. An explicit path (CLI `--config`)
//! 2. An override in the data dir (~/.local/share/spendlens/config/analysis.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! Missing keys in a file fall back to the defaults, so partial overrides work.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/analysis.toml");

/// Minimum-data requirements evaluated by the gate table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Days of history needed before payday cycles mean anything
    pub payday_min_days: i64,
    pub payday_min_income_deposits: usize,
    pub seasonal_min_months: usize,
    pub correlation_min_months: usize,
    pub correlation_min_categories: usize,
    pub impact_min_months: usize,
    /// Charges from one merchant needed before recurrence is worth checking
    pub subscription_min_pair_occurrences: usize,
    /// Relative amount drift tolerated inside a merchant+amount pair
    pub subscription_amount_tolerance: f64,
    /// Category total below which a category is not counted as active
    pub min_category_spend: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            payday_min_days: 90,
            payday_min_income_deposits: 3,
            seasonal_min_months: 3,
            correlation_min_months: 3,
            correlation_min_categories: 3,
            impact_min_months: 6,
            subscription_min_pair_occurrences: 2,
            subscription_amount_tolerance: 0.15,
            min_category_spend: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub payday_cycle_days: i64,
    pub payday_window_days: i64,
    pub payday_min_cycles: usize,
    /// A cycle is front-loaded when this share of its spend lands in the window
    pub payday_front_load_share: f64,
    /// Fraction of cycles that must be front-loaded to report a payday pattern
    pub payday_min_consistency: f64,
    /// Monthly coefficient of variation below which spending is not seasonal
    pub seasonal_cv_threshold: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            payday_cycle_days: 30,
            payday_window_days: 7,
            payday_min_cycles: 3,
            payday_front_load_share: 0.30,
            payday_min_consistency: 0.6,
            seasonal_cv_threshold: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub outlier_min_transactions: usize,
    /// Upper fence = Q3 + multiplier * IQR
    pub outlier_iqr_multiplier: f64,
    pub outlier_high_score: f64,
    pub spike_min_span_days: i64,
    /// Percent increase over the trailing average that counts as a spike
    pub spike_threshold_pct: f64,
    /// Prior months averaged for the spike baseline (0 = all prior months)
    pub spike_trailing_months: usize,
    pub new_merchant_window_days: i64,
    pub new_merchant_min_avg: f64,
    pub high_value_median_multiple: f64,
    pub high_value_floor: f64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            outlier_min_transactions: 5,
            outlier_iqr_multiplier: 2.0,
            outlier_high_score: 3.0,
            spike_min_span_days: 45,
            spike_threshold_pct: 50.0,
            spike_trailing_months: 3,
            new_merchant_window_days: 30,
            new_merchant_min_avg: 5.0,
            high_value_median_multiple: 3.0,
            high_value_floor: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    pub min_occurrences: usize,
    pub min_amount: f64,
    /// Amount coefficient of variation allowed for a recurring charge
    pub max_amount_cv: f64,
    /// Stricter limit for categories where repeat visits are normal (dining, groceries, ...)
    pub habit_max_amount_cv: f64,
    pub price_creep_threshold_pct: f64,
    pub price_creep_min_charges: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 2,
            min_amount: 3.0,
            max_amount_cv: 0.35,
            habit_max_amount_cv: 0.10,
            price_creep_threshold_pct: 0.0,
            price_creep_min_charges: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub min_abs_r: f64,
    pub high_abs_r: f64,
    pub high_min_months: usize,
    /// Months with non-zero spend a category needs to enter the matrix
    pub min_nonzero_months: usize,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            min_abs_r: 0.5,
            high_abs_r: 0.7,
            high_min_months: 6,
            min_nonzero_months: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    pub min_r_squared: f64,
    pub top_drivers: usize,
    pub high_confidence_months: usize,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            min_r_squared: 0.5,
            top_drivers: 3,
            high_confidence_months: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub simulations: usize,
    pub horizon_months: usize,
    /// Floor for a category's monthly standard deviation when sampling
    pub min_std: f64,
    pub categories_to_cut: usize,
    pub projection_months: usize,
    pub runway_epsilon: f64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            simulations: 1000,
            horizon_months: 36,
            min_std: 1.0,
            categories_to_cut: 3,
            projection_months: 12,
            runway_epsilon: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Insights shown in the primary list
    pub top_n: usize,
    pub discretionary_cut_pct: f64,
    pub weekend_multiple_threshold: f64,
    pub min_creep_savings: f64,
    pub max_correlation_insights: usize,
    pub max_outlier_insights: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            top_n: 5,
            discretionary_cut_pct: 20.0,
            weekend_multiple_threshold: 1.3,
            min_creep_savings: 10.0,
            max_correlation_insights: 2,
            max_outlier_insights: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tool_timeout_ms: u64,
    pub run_budget_ms: u64,
    /// Capacity of the progress channel handed to streaming callers
    pub progress_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: 10_000,
            run_budget_ms: 30_000,
            progress_buffer: 64,
        }
    }
}

impl EngineConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn run_budget(&self) -> Duration {
        Duration::from_millis(self.run_budget_ms)
    }
}

/// Complete analysis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub gates: GateConfig,
    pub temporal: TemporalConfig,
    pub anomaly: AnomalyConfig,
    pub subscriptions: SubscriptionConfig,
    pub correlation: CorrelationConfig,
    pub impact: ImpactConfig,
    pub resilience: ResilienceConfig,
    pub synthesis: SynthesisConfig,
    pub engine: EngineConfig,
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path given explicitly by the caller
    File(PathBuf),
    /// Override file in the data directory
    Override(PathBuf),
    /// Compiled-in defaults
    Embedded,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(p) => write!(f, "{}", p.display()),
            ConfigSource::Override(p) => write!(f, "{} (override)", p.display()),
            ConfigSource::Embedded => write!(f, "embedded defaults"),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration, returning the source it was read from
    pub fn load(path: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let (content, source) = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", p.display(), e))
                })?;
                (content, ConfigSource::File(p.to_path_buf()))
            }
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => {
                    let content = fs::read_to_string(&p).map_err(|e| {
                        Error::Config(format!("Failed to read {}: {}", p.display(), e))
                    })?;
                    (content, ConfigSource::Override(p))
                }
                None => (DEFAULT_CONFIG.to_string(), ConfigSource::Embedded),
            },
        };

        let config = Self::from_toml(&content)?;
        tracing::debug!(source = %source, "Loaded analysis config");
        Ok((config, source))
    }

    /// The compiled-in defaults
    pub fn embedded() -> Result<Self> {
        Self::from_toml(DEFAULT_CONFIG)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no analysis can run with
    pub fn validate(&self) -> Result<()> {
        let checks: [(bool, &str); 10] = [
            (self.synthesis.top_n > 0, "synthesis.top_n must be at least 1"),
            (
                self.resilience.simulations > 0,
                "resilience.simulations must be at least 1",
            ),
            (
                self.resilience.horizon_months > 0,
                "resilience.horizon_months must be at least 1",
            ),
            (
                self.resilience.runway_epsilon > 0.0,
                "resilience.runway_epsilon must be positive",
            ),
            (
                (0.0..=1.0).contains(&self.correlation.min_abs_r)
                    && (0.0..=1.0).contains(&self.correlation.high_abs_r),
                "correlation thresholds must lie in [0, 1]",
            ),
            (
                self.anomaly.outlier_iqr_multiplier > 0.0,
                "anomaly.outlier_iqr_multiplier must be positive",
            ),
            (
                self.gates.subscription_amount_tolerance >= 0.0,
                "gates.subscription_amount_tolerance must not be negative",
            ),
            (
                (0.0..=100.0).contains(&self.synthesis.discretionary_cut_pct),
                "synthesis.discretionary_cut_pct must lie in [0, 100]",
            ),
            (
                self.engine.tool_timeout_ms > 0 && self.engine.run_budget_ms > 0,
                "engine timeouts must be positive",
            ),
            (
                self.engine.progress_buffer > 0,
                "engine.progress_buffer must be at least 1",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(Error::Config(msg.to_string())),
            None => Ok(()),
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendlens").join("config").join("analysis.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_embedded_matches_defaults() {
        let embedded = AnalysisConfig::embedded().unwrap();
        let defaults = AnalysisConfig::default();

        assert_eq!(embedded.gates.impact_min_months, defaults.gates.impact_min_months);
        assert_eq!(embedded.correlation.min_abs_r, defaults.correlation.min_abs_r);
        assert_eq!(embedded.synthesis.top_n, defaults.synthesis.top_n);
        assert_eq!(embedded.resilience.simulations, defaults.resilience.simulations);
        assert_eq!(embedded.engine.run_budget_ms, defaults.engine.run_budget_ms);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = AnalysisConfig::from_toml(
            r#"
[correlation]
min_abs_r = 0.6

[synthesis]
top_n = 3
"#,
        )
        .unwrap();

        assert_eq!(config.correlation.min_abs_r, 0.6);
        assert_eq!(config.correlation.high_abs_r, 0.7);
        assert_eq!(config.synthesis.top_n, 3);
        assert_eq!(config.gates.payday_min_days, 90);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AnalysisConfig::from_toml("[synthesis]\ntop_n = 0\n").unwrap_err();
        assert!(err.to_string().contains("top_n"));

        assert!(AnalysisConfig::from_toml("[correlation]\nmin_abs_r = 1.5\n").is_err());
        assert!(AnalysisConfig::from_toml("not = [valid").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[anomaly]\nspike_threshold_pct = 75.0").unwrap();

        let (config, source) = AnalysisConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.anomaly.spike_threshold_pct, 75.0);
        assert_eq!(source, ConfigSource::File(file.path().to_path_buf()));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = AnalysisConfig::load(Some(Path::new("/nonexistent/analysis.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
