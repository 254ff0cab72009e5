//! Cleaning and trend engine
//!
//! Turns a raw daily frame into a frame with interpolated, smoothed `Trend*`
//! columns and the derived physiology columns (Age, RMR, EnergyBalance, TDEE,
//! PA). Every output column is computed only when absent, so applying the
//! engine twice leaves the frame unchanged.

use crate::config::TrendConfig;
use crate::energy::{age_in_years, caloric_imbalance, resting_metabolic_rate};
use crate::frame::DailyFrame;
use crate::stats::{self, Series};
use crate::types::{Column, Metric, UserProfile};

/// Metrics that get a `Trend*` column, in output order
pub const SMOOTHED_METRICS: [Metric; 6] = [
    Metric::Weight,
    Metric::BodyFatPercentage,
    Metric::CaloriesIn,
    Metric::BasalCaloriesBurned,
    Metric::ActiveCaloriesBurned,
    Metric::NetCalories,
];

/// Counters that are never interpolated or smoothed
pub const UNSMOOTHED_METRICS: [Metric; 2] = [Metric::StepCount, Metric::DistanceWalkingRunning];

/// Smallest allowed expenditure margin above RMR (kcal/day)
pub const ENERGY_EPSILON: f64 = 1.0;

/// Cleaning and smoothing stage
#[derive(Debug, Clone, Default)]
pub struct TrendEngine {
    config: TrendConfig,
}

impl TrendEngine {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    /// Produce the trend frame; the input is not modified
    pub fn apply(&self, frame: &DailyFrame, profile: &UserProfile) -> DailyFrame {
        let mut out = frame.clone();
        if out.is_empty() {
            return out;
        }

        self.add_net_calories(&mut out);
        for metric in SMOOTHED_METRICS {
            self.add_trend(&mut out, metric);
        }
        self.add_composition(&mut out);
        self.add_physiology(&mut out, profile);

        tracing::debug!(
            rows = out.len(),
            columns = out.column_names().count(),
            "trend frame ready"
        );
        out
    }

    /// Raw NetCalories = CaloriesIn - (Basal + Active), one missing burn counts as zero
    fn add_net_calories(&self, frame: &mut DailyFrame) {
        let net = Column::Raw(Metric::NetCalories);
        if frame.has(net) {
            return;
        }
        let Some(intake) = frame.column(Column::Raw(Metric::CaloriesIn)) else {
            return;
        };
        let basal = frame.column(Column::Raw(Metric::BasalCaloriesBurned));
        let active = frame.column(Column::Raw(Metric::ActiveCaloriesBurned));
        if basal.is_none() && active.is_none() {
            return;
        }

        let values: Series = (0..intake.len())
            .map(|i| {
                let cal_in = intake[i]?;
                let b = basal.and_then(|s| s[i]);
                let a = active.and_then(|s| s[i]);
                if b.is_none() && a.is_none() {
                    return None;
                }
                Some(cal_in - (b.unwrap_or(0.0) + a.unwrap_or(0.0)))
            })
            .collect();
        frame.set_column(net, values);
    }

    fn add_trend(&self, frame: &mut DailyFrame, metric: Metric) {
        let trend = Column::Trend(metric);
        if frame.has(trend) || UNSMOOTHED_METRICS.contains(&metric) {
            return;
        }
        let Some(raw) = frame.column(Column::Raw(metric)) else {
            return;
        };

        let filled = stats::interpolate_gaps(frame.dates(), raw, self.config.span);
        let interpolated = filled.iter().flatten().count() - raw.iter().flatten().count();
        if interpolated > 0 {
            tracing::debug!(metric = %metric, interpolated, max_gap = self.config.span, "interpolated gaps");
        }

        let smoothed = match metric {
            Metric::CaloriesIn => filled,
            Metric::Weight => stats::centered_rolling_mean(
                &filled,
                self.config.weight_window,
                self.config.weight_min_periods,
            ),
            _ => stats::ewm(&filled, self.config.span),
        };
        frame.set_column(trend, smoothed);
    }

    /// TrendFatMass and TrendLeanBodyMass from TrendWeight and TrendBodyFatPercentage
    fn add_composition(&self, frame: &mut DailyFrame) {
        let (Some(weight), Some(body_fat)) = (
            frame.column(Column::Trend(Metric::Weight)),
            frame.column(Column::Trend(Metric::BodyFatPercentage)),
        ) else {
            return;
        };

        let fat = stats::zip_with(weight, body_fat, |w, bf| w * bf);
        let lean = stats::zip_with(weight, body_fat, |w, bf| w * (1.0 - bf));

        if !frame.has(Column::Trend(Metric::FatMass)) {
            frame.set_column(Column::Trend(Metric::FatMass), fat);
        }
        if !frame.has(Column::Trend(Metric::LeanBodyMass)) {
            frame.set_column(Column::Trend(Metric::LeanBodyMass), lean);
        }
    }

    fn add_physiology(&self, frame: &mut DailyFrame, profile: &UserProfile) {
        let age_col = Column::Raw(Metric::Age);
        if !frame.has(age_col) {
            let ages = frame
                .dates()
                .iter()
                .map(|d| Some(age_in_years(profile.dob, *d)))
                .collect();
            frame.set_column(age_col, ages);
        }

        let rmr_col = Column::Raw(Metric::Rmr);
        if !frame.has(rmr_col) {
            if let (Some(weight), Some(age)) = (
                frame.column(Column::Trend(Metric::Weight)),
                frame.column(age_col),
            ) {
                let sex = profile.sex;
                let rmr = stats::zip_with(weight, age, |w, a| resting_metabolic_rate(w, a, sex));
                frame.set_column(rmr_col, rmr);
            }
        }

        let balance_col = Column::Raw(Metric::EnergyBalance);
        if !frame.has(balance_col) {
            if let (Some(weight), Some(lean)) = (
                frame.column(Column::Trend(Metric::Weight)),
                frame.column(Column::Trend(Metric::LeanBodyMass)),
            ) {
                let window = self.config.balance_window;
                let d_weight = stats::rolling_mean(&stats::diff(weight, 1), window, window);
                let d_lean = stats::rolling_mean(&stats::diff(lean, 1), window, window);
                let balance =
                    stats::zip_with(&d_weight, &d_lean, |dw, dl| caloric_imbalance(dw - dl, dl));
                frame.set_column(balance_col, balance);
            } else {
                tracing::debug!("no lean mass trend, energy balance left undefined");
            }
        }

        let tdee_col = Column::Raw(Metric::Tdee);
        if !frame.has(tdee_col) {
            if let (Some(intake), Some(balance), Some(rmr)) = (
                frame.column(Column::Trend(Metric::CaloriesIn)),
                frame.column(balance_col),
                frame.column(rmr_col),
            ) {
                let tdee: Series = (0..intake.len())
                    .map(|i| Some((intake[i]? - balance[i]?).max(rmr[i]? + ENERGY_EPSILON)))
                    .collect();
                frame.set_column(tdee_col, tdee);
            }
        }

        let pa_col = Column::Raw(Metric::PhysicalActivity);
        if !frame.has(pa_col) {
            if let (Some(tdee), Some(rmr)) = (frame.column(tdee_col), frame.column(rmr_col)) {
                let pa = stats::zip_with(tdee, rmr, |t, r| (t - r).max(ENERGY_EPSILON));
                frame.set_column(pa_col, pa);
            }
        }
    }
}

/// Apply the trend engine with default settings
pub fn compute_trends(frame: &DailyFrame, profile: &UserProfile) -> DailyFrame {
    TrendEngine::default().apply(frame, profile)
}
