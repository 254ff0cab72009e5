//! Pipeline configuration
//!
//! Every tunable threshold lives here so tests and the CLI can override them.
//! Defaults reproduce the standard advisory behavior.

use crate::boosting::BoostingConfig;
use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default smoothing span and interpolation gap limit in days
pub const DEFAULT_TREND_SPAN: usize = 14;

/// Default forecast base window in days
pub const DEFAULT_FORECAST_WINDOW: usize = 21;

/// Default forecast offsets reported by the pipeline
pub const DEFAULT_FORECAST_OFFSETS: [u32; 5] = [7, 14, 30, 60, 90];

/// Cleaning and smoothing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// EWM span; also the longest gap (in days) that is interpolated
    pub span: usize,
    /// Centered rolling window for TrendWeight
    pub weight_window: usize,
    /// Minimum observations inside the weight window
    pub weight_min_periods: usize,
    /// Trailing window used to smooth day-over-day mass changes
    pub balance_window: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            span: DEFAULT_TREND_SPAN,
            weight_window: 21,
            weight_min_periods: 7,
            balance_window: 7,
        }
    }
}

/// Metric forecaster parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Base window W in days
    pub window: usize,
    /// Number of predictors kept after correlation ranking
    pub top_features: usize,
    /// Minimum training rows as a multiple of the window
    pub min_rows_factor: usize,
    /// Floor applied to TrendCaloriesIn in the working copy (kcal/day)
    pub calorie_floor: f64,
    /// Bounds for forecast body-fat fraction
    pub body_fat_min: f64,
    pub body_fat_max: f64,
    pub boosting: BoostingConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_FORECAST_WINDOW,
            top_features: 5,
            min_rows_factor: 2,
            calorie_floor: 1200.0,
            body_fat_min: 0.03,
            body_fat_max: 0.60,
            boosting: BoostingConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Minimum number of complete training rows
    pub fn min_rows(&self) -> usize {
        self.window * self.min_rows_factor
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.window == 0 {
            return Err(ComputeError::InvalidConfig(
                "forecast.window must be positive".to_string(),
            ));
        }
        if self.top_features == 0 {
            return Err(ComputeError::InvalidConfig(
                "forecast.top_features must be positive".to_string(),
            ));
        }
        if self.body_fat_min >= self.body_fat_max {
            return Err(ComputeError::InvalidConfig(
                "forecast.body_fat_min must be below body_fat_max".to_string(),
            ));
        }
        Ok(())
    }
}

/// Safety watchdog thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Minimum safe mean intake (kcal/day)
    pub safe_min_calories: f64,
    /// Maximum safe weekly loss (kg/week)
    pub max_loss_kg_per_week: f64,
    /// Maximum safe weekly gain (kg/week)
    pub max_gain_kg_per_week: f64,
    /// Minimum plausible RMR (kcal/day)
    pub rmr_floor: f64,
    /// Deficit that should be producing loss (kcal/day, negative)
    pub mismatch_deficit_kcal: f64,
    /// Adaptation fraction that triggers MetabolicAdapt
    pub adaptation_threshold: f64,
    /// Days since the last data point before StaleData fires
    pub stale_after_days: i64,
    /// Goal forecast horizon in days
    pub goal_horizon_days: u32,
    /// Tolerated gap between predicted and target goal date (days)
    pub goal_drift_days: i64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            safe_min_calories: 1200.0,
            max_loss_kg_per_week: 2.0,
            max_gain_kg_per_week: 2.0,
            rmr_floor: 1000.0,
            mismatch_deficit_kcal: -500.0,
            adaptation_threshold: 0.08,
            stale_after_days: 5,
            goal_horizon_days: 730,
            goal_drift_days: 14,
        }
    }
}

/// Compliance classifier parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Fewer complete weeks than this yields an unknown state
    pub min_weeks: usize,
    /// Only the most recent weeks are considered
    pub max_weeks: usize,
    /// Weekly weight change that counts as movement (kg)
    pub label_weight_change_kg: f64,
    /// Mean net calories that count as a deliberate surplus/deficit
    pub label_net_calories: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_weeks: 4,
            max_weeks: 12,
            label_weight_change_kg: 0.3,
            label_net_calories: 250.0,
        }
    }
}

/// Top-level configuration for the advisory pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub trend: TrendConfig,
    pub forecast: ForecastConfig,
    pub watchdog: WatchdogConfig,
    pub classifier: ClassifierConfig,
    /// Offsets reported in the weight forecast section
    pub forecast_offsets: Vec<u32>,
}

impl AdvisoryConfig {
    /// Parse configuration from JSON; omitted fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let mut config: AdvisoryConfig = serde_json::from_str(json)?;
        if config.forecast_offsets.is_empty() {
            config.forecast_offsets = DEFAULT_FORECAST_OFFSETS.to_vec();
        }
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize configuration to pretty JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Offsets to report, falling back to the defaults
    pub fn offsets(&self) -> Vec<u32> {
        if self.forecast_offsets.is_empty() {
            DEFAULT_FORECAST_OFFSETS.to_vec()
        } else {
            self.forecast_offsets.clone()
        }
    }

    fn validate(&self) -> Result<(), ComputeError> {
        if self.trend.span == 0 {
            return Err(ComputeError::InvalidConfig(
                "trend.span must be positive".to_string(),
            ));
        }
        self.forecast.validate()
    }
}
