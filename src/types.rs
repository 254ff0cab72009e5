//! Core types for the FitAssist pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: metric and column names, user profile, weekly aggregates, forecast
//! results, alerts and the final advisory report.

use crate::error::ComputeError;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Named daily quantity, raw or derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    Weight,
    BodyFatPercentage,
    LeanBodyMass,
    FatMass,
    CaloriesIn,
    #[serde(alias = "BasalCaloriesOut")]
    BasalCaloriesBurned,
    #[serde(alias = "ActiveCaloriesOut")]
    ActiveCaloriesBurned,
    StepCount,
    DistanceWalkingRunning,
    NetCalories,
    #[serde(rename = "TDEE")]
    Tdee,
    #[serde(rename = "RMR")]
    Rmr,
    EnergyBalance,
    #[serde(rename = "PA")]
    PhysicalActivity,
    Age,
    Adaptation,
}

impl Metric {
    /// Metrics supplied by the upstream parser
    pub const RAW: [Metric; 8] = [
        Metric::Weight,
        Metric::BodyFatPercentage,
        Metric::LeanBodyMass,
        Metric::CaloriesIn,
        Metric::BasalCaloriesBurned,
        Metric::ActiveCaloriesBurned,
        Metric::StepCount,
        Metric::DistanceWalkingRunning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Weight => "Weight",
            Metric::BodyFatPercentage => "BodyFatPercentage",
            Metric::LeanBodyMass => "LeanBodyMass",
            Metric::FatMass => "FatMass",
            Metric::CaloriesIn => "CaloriesIn",
            Metric::BasalCaloriesBurned => "BasalCaloriesBurned",
            Metric::ActiveCaloriesBurned => "ActiveCaloriesBurned",
            Metric::StepCount => "StepCount",
            Metric::DistanceWalkingRunning => "DistanceWalkingRunning",
            Metric::NetCalories => "NetCalories",
            Metric::Tdee => "TDEE",
            Metric::Rmr => "RMR",
            Metric::EnergyBalance => "EnergyBalance",
            Metric::PhysicalActivity => "PA",
            Metric::Age => "Age",
            Metric::Adaptation => "Adaptation",
        }
    }

    /// Whether the metric is part of the upstream vocabulary
    pub fn is_raw(&self) -> bool {
        Self::RAW.contains(self)
    }

    /// Body-mass quantities whose forecasts are damped by metabolic adaptation
    pub fn is_mass(&self) -> bool {
        matches!(self, Metric::Weight | Metric::FatMass | Metric::LeanBodyMass)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let metric = match s {
            "Weight" | "BodyMass" => Metric::Weight,
            "BodyFatPercentage" => Metric::BodyFatPercentage,
            "LeanBodyMass" => Metric::LeanBodyMass,
            "FatMass" => Metric::FatMass,
            "CaloriesIn" | "DietaryEnergyConsumed" => Metric::CaloriesIn,
            "BasalCaloriesBurned" | "BasalCaloriesOut" => Metric::BasalCaloriesBurned,
            "ActiveCaloriesBurned" | "ActiveCaloriesOut" => Metric::ActiveCaloriesBurned,
            "StepCount" => Metric::StepCount,
            "DistanceWalkingRunning" => Metric::DistanceWalkingRunning,
            "NetCalories" => Metric::NetCalories,
            "TDEE" | "Tdee" => Metric::Tdee,
            "RMR" | "Rmr" => Metric::Rmr,
            "EnergyBalance" => Metric::EnergyBalance,
            "PA" | "PhysicalActivity" => Metric::PhysicalActivity,
            "Age" => Metric::Age,
            "Adaptation" => Metric::Adaptation,
            other => return Err(ComputeError::UnknownMetric(other.to_string())),
        };
        Ok(metric)
    }
}

/// Column of a daily frame: a raw/derived value or its smoothed trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Raw(Metric),
    Trend(Metric),
}

impl Column {
    pub fn metric(&self) -> Metric {
        match self {
            Column::Raw(m) | Column::Trend(m) => *m,
        }
    }

    pub fn is_trend(&self) -> bool {
        matches!(self, Column::Trend(_))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Raw(m) => write!(f, "{m}"),
            Column::Trend(m) => write!(f, "Trend{m}"),
        }
    }
}

impl FromStr for Column {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix("Trend") {
            Some(rest) if !rest.is_empty() => Ok(Column::Trend(rest.parse()?)),
            _ => Ok(Column::Raw(s.parse()?)),
        }
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Column {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Biological sex, selects the RMR coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl FromStr for Sex {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Sex::Male),
            "female" | "f" => Ok(Sex::Female),
            other => Err(ComputeError::InvalidProfile(format!(
                "sex must be 'male' or 'female', got '{other}'"
            ))),
        }
    }
}

/// User characteristics supplied by the profile collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Date of birth
    pub dob: NaiveDate,
    /// Biological sex
    pub sex: Sex,
    /// Height in centimetres
    #[serde(default)]
    pub height_cm: f64,
}

impl UserProfile {
    pub fn new(dob: NaiveDate, sex: Sex, height_cm: f64) -> Self {
        Self { dob, sex, height_cm }
    }

    /// Load a profile from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let profile: UserProfile = serde_json::from_str(json)?;
        if profile.height_cm < 0.0 || !profile.height_cm.is_finite() {
            return Err(ComputeError::InvalidProfile(format!(
                "height_cm must be a non-negative number, got {}",
                profile.height_cm
            )));
        }
        Ok(profile)
    }
}

/// Target weight and date supplied by the goal collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalInfo {
    pub weight_kg: f64,
    pub date: NaiveDate,
}

/// Weekly compliance state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceState {
    OnTrack,
    AtRisk,
    OffTrack,
    Unknown,
}

impl ComplianceState {
    /// Canonical probability order used everywhere downstream
    pub const CLASSES: [ComplianceState; 3] = [
        ComplianceState::OnTrack,
        ComplianceState::AtRisk,
        ComplianceState::OffTrack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceState::OnTrack => "on_track",
            ComplianceState::AtRisk => "at_risk",
            ComplianceState::OffTrack => "off_track",
            ComplianceState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ComplianceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceState {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_track" => Ok(ComplianceState::OnTrack),
            "at_risk" => Ok(ComplianceState::AtRisk),
            "off_track" => Ok(ComplianceState::OffTrack),
            "unknown" => Ok(ComplianceState::Unknown),
            other => Err(ComputeError::ParseError(format!(
                "unknown compliance state '{other}'"
            ))),
        }
    }
}

/// Watchdog alert code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCode {
    UnsafeIntake,
    RapidWeightLoss,
    RapidWeightGain,
    #[serde(rename = "LowRMR")]
    LowRmr,
    MismatchDeficit,
    MetabolicAdapt,
    StaleData,
    GoalNotReached,
    GoalTimingDrift,
    NoData,
}

impl AlertCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCode::UnsafeIntake => "UnsafeIntake",
            AlertCode::RapidWeightLoss => "RapidWeightLoss",
            AlertCode::RapidWeightGain => "RapidWeightGain",
            AlertCode::LowRmr => "LowRMR",
            AlertCode::MismatchDeficit => "MismatchDeficit",
            AlertCode::MetabolicAdapt => "MetabolicAdapt",
            AlertCode::StaleData => "StaleData",
            AlertCode::GoalNotReached => "GoalNotReached",
            AlertCode::GoalTimingDrift => "GoalTimingDrift",
            AlertCode::NoData => "NoData",
        }
    }

    /// Safety alerts that force the final state to off_track
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            AlertCode::UnsafeIntake
                | AlertCode::RapidWeightLoss
                | AlertCode::RapidWeightGain
                | AlertCode::LowRmr
        )
    }
}

impl fmt::Display for AlertCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single watchdog finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub code: AlertCode,
    pub message: String,
}

impl Alert {
    pub fn new(code: AlertCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One ISO week of trend data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub iso_year: i32,
    pub iso_week: u32,
    /// First date in the week with data
    pub week_start: NaiveDate,
    /// Last date in the week with data
    pub week_end: NaiveDate,
    /// Number of days contributing to the week
    pub days: usize,
    /// Mean trend caloric intake (kcal/day)
    pub mean_cal_in: Option<f64>,
    /// Mean trend net calories (kcal/day, negative = deficit)
    pub mean_net_cal: Option<f64>,
    /// Mean activity expenditure (kcal/day)
    pub mean_pa: Option<f64>,
    pub start_wt: Option<f64>,
    pub end_wt: Option<f64>,
    /// end_wt - start_wt (kg)
    pub wt_change: Option<f64>,
    /// Mean resting metabolic rate (kcal/day)
    pub mean_rmr: Option<f64>,
    /// Mean RMR drop relative to the historical peak (0-1)
    pub mean_adaptation: Option<f64>,
}

impl WeeklyAggregate {
    /// Classifier input in (mean_net_cal, mean_pa, wt_change) order
    pub fn feature_vector(&self) -> Option<[f64; 3]> {
        Some([self.mean_net_cal?, self.mean_pa?, self.wt_change?])
    }
}

/// Forecast for a single target metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub target: Metric,
    /// Date of the last complete feature row the projection starts from
    pub anchor_date: NaiveDate,
    /// Trend value of the target at the anchor date
    pub current_value: f64,
    /// Day offset -> predicted value
    pub predictions: BTreeMap<u32, f64>,
    /// Day offset -> one-sigma spread, widening with the horizon
    pub uncertainty: BTreeMap<u32, f64>,
    /// Selected predictor columns, in selection order
    pub features_used: Vec<String>,
    /// In-sample R² (fit diagnostic only, not held-out accuracy)
    pub r2: f64,
    /// Base window in days the model was fitted on
    pub window: usize,
}

/// Classifier output for the most recent week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPrediction {
    pub state: ComplianceState,
    /// Probabilities in (on_track, at_risk, off_track) order
    pub probabilities: [f64; 3],
    /// Number of aggregated weeks considered
    pub weeks: usize,
}

impl WeeklyPrediction {
    pub fn unknown(weeks: usize) -> Self {
        Self {
            state: ComplianceState::Unknown,
            probabilities: [0.0; 3],
            weeks,
        }
    }
}

/// Outcome of projecting the weight forecast against a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalAssessment {
    pub feasible: bool,
    /// First forecast date crossing the goal weight
    pub predicted_date: Option<NaiveDate>,
    /// predicted_date - goal date in days (negative = early)
    pub delta_days: Option<i64>,
    /// Forecast weight at the end of the horizon
    pub last_prediction: f64,
}

/// A pipeline section that either produced a value or failed on its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionOutcome<T> {
    Ok { value: T },
    Failed { code: String, message: String },
    Skipped { reason: String },
}

impl<T> SectionOutcome<T> {
    pub fn from_result(result: Result<T, ComputeError>) -> Self {
        match result {
            Ok(value) => SectionOutcome::Ok { value },
            Err(e) => SectionOutcome::Failed {
                code: e.code().to_string(),
                message: e.to_string(),
            },
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            SectionOutcome::Ok { value } => Some(value),
            _ => None,
        }
    }
}

/// Report producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub report_id: String,
}

/// Summary of the daily frame the report was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSummary {
    pub rows: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub columns: Vec<String>,
}

/// Complete advisory output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryReport {
    pub producer: ReportProducer,
    /// Evaluation date used for staleness checks
    pub evaluated_on: NaiveDate,
    pub frame: FrameSummary,
    pub forecast: SectionOutcome<ForecastResult>,
    pub classification: SectionOutcome<WeeklyPrediction>,
    pub alerts: Vec<Alert>,
    pub final_state: ComplianceState,
}

impl AdvisoryReport {
    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
