//! Metric forecaster
//!
//! Projects a trend metric forward by learning its change over the base
//! window W from correlated trend features, then extrapolating that change
//! linearly to each requested offset. Mass forecasts are damped by the
//! metabolic adaptation implied by the projected weight.

use crate::boosting::GradientBoostedRegressor;
use crate::config::ForecastConfig;
use crate::energy::{age_in_years, metabolic_adaptation, resting_metabolic_rate};
use crate::error::ComputeError;
use crate::frame::DailyFrame;
use crate::stats::{self, Series};
use crate::types::{Column, ForecastResult, Metric, UserProfile};
use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Candidate predictors for each forecast target
///
/// Candidates are the frame's trend columns minus the target itself and any
/// column that is an algebraic function of the target.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCatalog {
    trend_columns: Vec<Column>,
}

impl FeatureCatalog {
    pub fn from_frame(frame: &DailyFrame) -> Self {
        Self {
            trend_columns: frame.column_names().filter(|c| c.is_trend()).copied().collect(),
        }
    }

    /// Metrics never used to predict `target`
    pub fn excluded_for(target: Metric) -> &'static [Metric] {
        match target {
            Metric::Weight => &[Metric::LeanBodyMass, Metric::FatMass, Metric::NetCalories],
            Metric::BodyFatPercentage => &[
                Metric::Weight,
                Metric::LeanBodyMass,
                Metric::FatMass,
                Metric::NetCalories,
            ],
            Metric::LeanBodyMass => &[Metric::Weight, Metric::FatMass, Metric::NetCalories],
            Metric::FatMass => &[Metric::Weight, Metric::LeanBodyMass, Metric::NetCalories],
            Metric::CaloriesIn | Metric::BasalCaloriesBurned | Metric::ActiveCaloriesBurned => {
                &[Metric::NetCalories]
            }
            Metric::NetCalories => &[
                Metric::CaloriesIn,
                Metric::BasalCaloriesBurned,
                Metric::ActiveCaloriesBurned,
            ],
            _ => &[],
        }
    }

    pub fn candidates_for(&self, target: Metric) -> Vec<Column> {
        let excluded = Self::excluded_for(target);
        self.trend_columns
            .iter()
            .filter(|c| c.metric() != target && !excluded.contains(&c.metric()))
            .copied()
            .collect()
    }
}

/// Gradient-boosted forecaster for trend metrics
#[derive(Debug, Clone, Default)]
pub struct MetricForecaster {
    config: ForecastConfig,
}

impl MetricForecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast `target` at each day offset from the anchor date
    pub fn forecast(
        &self,
        frame: &DailyFrame,
        target: Metric,
        offsets: &[u32],
        profile: &UserProfile,
    ) -> Result<ForecastResult, ComputeError> {
        self.config.validate()?;
        let window = self.config.window;
        let working = self.working_columns(frame);
        let trend = working
            .get(&Column::Trend(target))
            .ok_or_else(|| ComputeError::MissingColumn(Column::Trend(target).to_string()))?;

        let delta = stats::diff(trend, window);

        let mut ranked: Vec<(Column, f64)> = FeatureCatalog::from_frame(frame)
            .candidates_for(target)
            .into_iter()
            .filter_map(|c| {
                let r = stats::pearson(working.get(&c)?, &delta)?;
                Some((c, r))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked.truncate(self.config.top_features);
        let selected: Vec<Column> = ranked.iter().map(|(c, _)| *c).collect();

        let mut feature_series: Vec<Series> = selected
            .iter()
            .filter_map(|c| working.get(c))
            .map(|s| stats::rolling_mean(s, window, window))
            .collect();
        feature_series.push(stats::shift(trend, 1));

        let feature_row = |i: usize| -> Option<Vec<f64>> {
            feature_series.iter().map(|s| s[i]).collect()
        };

        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..frame.len() {
            if let (Some(row), Some(d)) = (feature_row(i), delta[i]) {
                x.push(row);
                y.push(d);
            }
        }

        let required = self.config.min_rows();
        if x.len() < required {
            return Err(ComputeError::insufficient(
                &format!("forecast of {target}"),
                x.len(),
                required,
            ));
        }

        let model = GradientBoostedRegressor::fit(&x, &y, &self.config.boosting)?;
        let fitted = model.predict(&x);
        let r2 = stats::r_squared(&y, &fitted);
        let rmse = stats::rmse(&y, &fitted);

        let (anchor, latest_row) = (0..frame.len())
            .rev()
            .find_map(|i| {
                trend[i]?;
                feature_row(i).map(|row| (i, row))
            })
            .ok_or_else(|| ComputeError::insufficient(&format!("forecast anchor for {target}"), 0, 1))?;

        let anchor_date = frame.dates()[anchor];
        let current_value = trend[anchor].unwrap_or_default();
        let predicted_delta = model.predict_one(&latest_row);

        let damping = if target.is_mass() {
            Some(self.adaptation_reference(&working, frame.dates(), anchor, profile)?)
        } else {
            None
        };

        let mut predictions = BTreeMap::new();
        let mut uncertainty = BTreeMap::new();
        for &days in offsets {
            let horizon = f64::from(days) / window as f64;
            let mut scaled = predicted_delta * horizon;

            if let Some(reference) = &damping {
                let sim_date = anchor_date + Duration::days(i64::from(days));
                let sim_weight = reference.current_weight + scaled;
                let sim_rmr = resting_metabolic_rate(
                    sim_weight,
                    age_in_years(profile.dob, sim_date),
                    profile.sex,
                );
                scaled *= 1.0 - metabolic_adaptation(reference.peak_rmr, sim_rmr);
            }

            let mut value = current_value + scaled;
            if target == Metric::BodyFatPercentage {
                value = value.clamp(self.config.body_fat_min, self.config.body_fat_max);
            }
            predictions.insert(days, value);
            uncertainty.insert(days, rmse * horizon.sqrt());
        }

        tracing::debug!(
            target = %target,
            rows = x.len(),
            features = ?selected.iter().map(ToString::to_string).collect::<Vec<_>>(),
            r2,
            "forecast model fitted"
        );

        Ok(ForecastResult {
            target,
            anchor_date,
            current_value,
            predictions,
            uncertainty,
            features_used: selected.iter().map(ToString::to_string).collect(),
            r2,
            window,
        })
    }

    /// Trend columns with the intake floor applied
    fn working_columns(&self, frame: &DailyFrame) -> IndexMap<Column, Series> {
        let mut working: IndexMap<Column, Series> = frame
            .column_names()
            .filter(|c| c.is_trend())
            .filter_map(|c| frame.column(*c).map(|s| (*c, s.to_vec())))
            .collect();

        if let Some(intake) = working.get_mut(&Column::Trend(Metric::CaloriesIn)) {
            let floor = self.config.calorie_floor;
            let mut floored = 0usize;
            for v in intake.iter_mut().flatten() {
                if *v < floor {
                    *v = floor;
                    floored += 1;
                }
            }
            if floored > 0 {
                tracing::warn!(days = floored, floor, "intake below safe floor raised for forecasting");
            }
        }
        working
    }

    fn adaptation_reference(
        &self,
        working: &IndexMap<Column, Series>,
        dates: &[NaiveDate],
        anchor: usize,
        profile: &UserProfile,
    ) -> Result<AdaptationReference, ComputeError> {
        let weight = working
            .get(&Column::Trend(Metric::Weight))
            .ok_or_else(|| ComputeError::MissingColumn(Column::Trend(Metric::Weight).to_string()))?;

        let mut peak: Option<(usize, f64)> = None;
        for (i, w) in weight.iter().enumerate() {
            if let Some(w) = *w {
                if peak.map_or(true, |(_, best)| w > best) {
                    peak = Some((i, w));
                }
            }
        }
        let (peak_idx, peak_weight) =
            peak.ok_or_else(|| ComputeError::insufficient("peak weight", 0, 1))?;

        let current_weight = weight[..=anchor]
            .iter()
            .rev()
            .find_map(|w| *w)
            .ok_or_else(|| ComputeError::insufficient("current weight", 0, 1))?;

        let peak_rmr = resting_metabolic_rate(
            peak_weight,
            age_in_years(profile.dob, dates[peak_idx]),
            profile.sex,
        );
        Ok(AdaptationReference {
            peak_rmr,
            current_weight,
        })
    }
}

struct AdaptationReference {
    peak_rmr: f64,
    current_weight: f64,
}

/// Forecast `target` with default settings
pub fn forecast(
    frame: &DailyFrame,
    target: Metric,
    offsets: &[u32],
    profile: &UserProfile,
) -> Result<ForecastResult, ComputeError> {
    MetricForecaster::default().forecast(frame, target, offsets, profile)
}

/// Body composition implied by a weight forecast at one offset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastComposition {
    pub offset: u32,
    pub date: NaiveDate,
    pub weight: f64,
    pub body_fat: Option<f64>,
    pub fat_mass: Option<f64>,
    pub lean_mass: Option<f64>,
    pub rmr: f64,
}

/// Fat mass, lean mass and RMR at each forecast weight
///
/// Offsets missing from `body_fat` keep the composition fields undefined.
pub fn derive_forecast_composition(
    weight: &ForecastResult,
    body_fat: Option<&ForecastResult>,
    profile: &UserProfile,
) -> Vec<ForecastComposition> {
    weight
        .predictions
        .iter()
        .map(|(&offset, &w)| {
            let date = weight.anchor_date + Duration::days(i64::from(offset));
            let bf = body_fat.and_then(|r| r.predictions.get(&offset).copied());
            ForecastComposition {
                offset,
                date,
                weight: w,
                body_fat: bf,
                fat_mass: bf.map(|bf| w * bf),
                lean_mass: bf.map(|bf| w * (1.0 - bf)),
                rmr: resting_metabolic_rate(w, age_in_years(profile.dob, date), profile.sex),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::trend::compute_trends;
    use crate::types::Sex;

    pub(crate) fn profile() -> UserProfile {
        UserProfile::new(NaiveDate::from_ymd_opt(1990, 3, 15).unwrap(), Sex::Male, 178.0)
    }

    /// Daily records for a steady 500 kcal/day deficit starting at 90 kg
    pub(crate) fn deficit_frame(days: usize) -> DailyFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..days).map(|i| start + Duration::days(i as i64)).collect();
        let per_day = 500.0 / 7700.0;
        let weight = (0..days)
            .map(|i| Some(90.0 - per_day * i as f64 + 0.2 * ((i % 5) as f64 - 2.0) / 2.0))
            .collect();
        let body_fat = (0..days).map(|i| Some(0.28 - 0.0004 * i as f64)).collect();
        let intake = (0..days)
            .map(|i| Some(2100.0 + 40.0 * ((i % 7) as f64 - 3.0)))
            .collect();
        DailyFrame::from_columns(
            dates,
            vec![
                (Column::Raw(Metric::Weight), weight),
                (Column::Raw(Metric::BodyFatPercentage), body_fat),
                (Column::Raw(Metric::CaloriesIn), intake),
                (Column::Raw(Metric::BasalCaloriesBurned), vec![Some(1900.0); days]),
                (Column::Raw(Metric::ActiveCaloriesBurned), vec![Some(700.0); days]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_catalog_excludes_target_and_dependents() {
        let frame = compute_trends(&deficit_frame(90), &profile());
        let catalog = FeatureCatalog::from_frame(&frame);

        let weight = catalog.candidates_for(Metric::Weight);
        assert!(!weight.contains(&Column::Trend(Metric::Weight)));
        assert!(!weight.contains(&Column::Trend(Metric::LeanBodyMass)));
        assert!(!weight.contains(&Column::Trend(Metric::FatMass)));
        assert!(weight.contains(&Column::Trend(Metric::CaloriesIn)));

        let body_fat = catalog.candidates_for(Metric::BodyFatPercentage);
        assert!(!body_fat.contains(&Column::Trend(Metric::Weight)));
        assert!(!body_fat.contains(&Column::Trend(Metric::BodyFatPercentage)));
        assert!(body_fat.iter().all(Column::is_trend));
    }

    #[test]
    fn test_deficit_forecast_is_decreasing() {
        let frame = compute_trends(&deficit_frame(90), &profile());
        let result = forecast(&frame, Metric::Weight, &[7, 14, 30], &profile()).unwrap();

        let p7 = result.predictions[&7];
        let p14 = result.predictions[&14];
        let p30 = result.predictions[&30];
        assert!(p7 < result.current_value);
        assert!(p7 > p14 && p14 > p30);
        assert!(result.features_used.len() <= 5);
        assert!(result.r2.is_finite());
        assert!(result.uncertainty[&30] >= result.uncertainty[&7]);
    }

    #[test]
    fn test_zero_delta_predicts_current_value() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let n = 80;
        let dates = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        let frame = DailyFrame::from_columns(
            dates,
            vec![
                (Column::Raw(Metric::Weight), vec![Some(75.0); n]),
                (Column::Raw(Metric::CaloriesIn), vec![Some(2300.0); n]),
            ],
        )
        .unwrap();
        let frame = compute_trends(&frame, &profile());
        let result = forecast(&frame, Metric::Weight, &[7, 90, 365], &profile()).unwrap();
        for value in result.predictions.values() {
            assert!((value - 75.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_insufficient_rows() {
        let frame = compute_trends(&deficit_frame(50), &profile());
        let err = forecast(&frame, Metric::Weight, &[7], &profile()).unwrap_err();
        assert!(matches!(err, ComputeError::InsufficientData { required: 42, .. }));
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let frame = compute_trends(&deficit_frame(90), &profile());
        let forecaster = MetricForecaster::new(ForecastConfig {
            window: 0,
            ..ForecastConfig::default()
        });
        let err = forecaster
            .forecast(&frame, Metric::Weight, &[7], &profile())
            .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(_)));
        assert_eq!(err.code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_missing_trend_column() {
        let frame = compute_trends(&deficit_frame(90), &profile());
        let err = forecast(&frame, Metric::StepCount, &[7], &profile()).unwrap_err();
        assert!(matches!(err, ComputeError::MissingColumn(name) if name == "TrendStepCount"));
    }

    #[test]
    fn test_body_fat_forecast_is_clamped() {
        let frame = compute_trends(&deficit_frame(120), &profile());
        let result =
            forecast(&frame, Metric::BodyFatPercentage, &[7, 3650], &profile()).unwrap();
        for value in result.predictions.values() {
            assert!((0.03..=0.60).contains(value));
        }
    }

    #[test]
    fn test_composition_from_forecasts() {
        let frame = compute_trends(&deficit_frame(120), &profile());
        let weight = forecast(&frame, Metric::Weight, &[7, 30], &profile()).unwrap();
        let body_fat =
            forecast(&frame, Metric::BodyFatPercentage, &[7, 30], &profile()).unwrap();
        let composition = derive_forecast_composition(&weight, Some(&body_fat), &profile());
        assert_eq!(composition.len(), 2);
        for row in &composition {
            let fat = row.fat_mass.unwrap();
            let lean = row.lean_mass.unwrap();
            assert!((fat + lean - row.weight).abs() < 1e-9);
            assert!(row.rmr > 0.0);
        }

        let bare = derive_forecast_composition(&weight, None, &profile());
        assert!(bare.iter().all(|r| r.fat_mass.is_none()));
    }
}
