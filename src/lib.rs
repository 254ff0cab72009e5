//! fitassist - Deterministic health advisory engine for body-weight tracking
//!
//! fitassist turns a daily history of weight, body composition, intake and
//! expenditure into trend-smoothed series, multi-horizon metric forecasts, a
//! weekly compliance state and safety alerts:
//! ingestion → trend engine → forecast → weekly classification → watchdog
//! → advisory combine.
//!
//! ## Modules
//!
//! - **Trend Engine**: Gap interpolation, EWM smoothing, fat/lean mass, RMR,
//!   energy balance, TDEE and physical activity
//! - **Forecaster**: Gradient-boosted tree forecasts with adaptation damping
//! - **Classifier**: Gaussian naive Bayes weekly compliance state
//! - **Watchdog**: Rule-based safety, consistency and goal alerts
//! - **Analysis**: Caloric efficiency, composition changes and correlations

pub mod advisory;
pub mod analysis;
pub mod boosting;
pub mod classifier;
pub mod config;
pub mod energy;
pub mod error;
pub mod forecast;
pub mod frame;
pub mod pipeline;
pub mod stats;
pub mod trend;
pub mod types;
pub mod watchdog;
pub mod weekly;

pub use advisory::combine;
pub use classifier::{
    predict_weekly_state, train_compliance_model, ComplianceClassifier, GaussianNaiveBayes,
    ModelStore, TrainingReport,
};
pub use config::AdvisoryConfig;
pub use error::ComputeError;
pub use forecast::{derive_forecast_composition, forecast, MetricForecaster};
pub use frame::{DailyFrame, DailyRecords};
pub use pipeline::{advise, AdvisoryPipeline};
pub use trend::{compute_trends, TrendEngine};
pub use types::{
    AdvisoryReport, Alert, AlertCode, Column, ComplianceState, ForecastResult, GoalInfo, Metric,
    Sex, UserProfile, WeeklyAggregate, WeeklyPrediction,
};
pub use watchdog::{run_watchdog, Watchdog, WatchdogRule};
pub use weekly::build_weekly_aggregates;

/// Crate version embedded in every advisory report
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for advisory reports
pub const PRODUCER_NAME: &str = "fitassist";
