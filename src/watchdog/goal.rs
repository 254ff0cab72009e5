//! Goal feasibility

use super::{RuleContext, WatchdogRule};
use crate::config::{ForecastConfig, WatchdogConfig};
use crate::error::ComputeError;
use crate::forecast::MetricForecaster;
use crate::frame::DailyFrame;
use crate::types::{Alert, AlertCode, Column, GoalAssessment, GoalInfo, Metric, UserProfile};
use chrono::Duration;

/// Project the weight forecast day by day and find where it crosses the goal
///
/// The direction of travel is down when the goal is below the latest trend
/// weight, up otherwise.
pub fn assess_goal_feasibility(
    frame: &DailyFrame,
    profile: &UserProfile,
    goal: &GoalInfo,
    forecast: &ForecastConfig,
    horizon_days: u32,
) -> Result<GoalAssessment, ComputeError> {
    let trend = frame.require(Column::Trend(Metric::Weight))?;
    let current = trend
        .iter()
        .rev()
        .find_map(|w| *w)
        .ok_or_else(|| ComputeError::insufficient("goal check", 0, 1))?;

    let offsets: Vec<u32> = (1..=horizon_days.max(1)).collect();
    let result = MetricForecaster::new(forecast.clone()).forecast(frame, Metric::Weight, &offsets, profile)?;

    let aiming_down = goal.weight_kg < current;
    let crossing = result.predictions.iter().find(|&(_, &w)| {
        if aiming_down {
            w <= goal.weight_kg
        } else {
            w >= goal.weight_kg
        }
    });
    let last_prediction = result
        .predictions
        .values()
        .next_back()
        .copied()
        .unwrap_or(result.current_value);

    let assessment = match crossing {
        Some((&day, _)) => {
            let predicted = result.anchor_date + Duration::days(i64::from(day));
            GoalAssessment {
                feasible: true,
                predicted_date: Some(predicted),
                delta_days: Some((predicted - goal.date).num_days()),
                last_prediction,
            }
        }
        None => GoalAssessment {
            feasible: false,
            predicted_date: None,
            delta_days: None,
            last_prediction,
        },
    };
    tracing::debug!(
        goal_kg = goal.weight_kg,
        current_kg = current,
        feasible = assessment.feasible,
        delta_days = ?assessment.delta_days,
        "goal assessed"
    );
    Ok(assessment)
}

/// GoalNotReached / GoalTimingDrift
pub struct GoalFeasibilityRule;

impl GoalFeasibilityRule {
    fn judge(goal: &GoalInfo, assessment: &GoalAssessment, config: &WatchdogConfig) -> Option<Alert> {
        match (assessment.predicted_date, assessment.delta_days) {
            (Some(date), Some(delta)) if delta.abs() > config.goal_drift_days => {
                let when = if delta > 0 { "late" } else { "early" };
                Some(Alert::new(
                    AlertCode::GoalTimingDrift,
                    format!("Goal hit {} days {when} (pred {date})", delta.abs()),
                ))
            }
            (Some(_), _) => None,
            _ => Some(Alert::new(
                AlertCode::GoalNotReached,
                format!(
                    "Forecast never reaches goal ({:.1} kg). Weight at horizon {:.1} kg",
                    goal.weight_kg, assessment.last_prediction
                ),
            )),
        }
    }
}

impl WatchdogRule for GoalFeasibilityRule {
    fn code(&self) -> AlertCode {
        AlertCode::GoalNotReached
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let Some(goal) = ctx.goal else {
            return Ok(None);
        };
        let assessment = assess_goal_feasibility(
            ctx.frame,
            ctx.profile,
            goal,
            ctx.forecast,
            ctx.config.goal_horizon_days,
        )
        .map_err(|e| ComputeError::RuleEvaluation {
            rule: self.code().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::judge(goal, &assessment, ctx.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::tests::{deficit_frame, profile};
    use crate::trend::compute_trends;
    use chrono::NaiveDate;

    #[test]
    fn test_goal_above_falling_trend_is_not_reached() {
        let frame = compute_trends(&deficit_frame(100), &profile());
        let goal = GoalInfo {
            weight_kg: 95.0,
            date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        };
        let assessment =
            assess_goal_feasibility(&frame, &profile(), &goal, &ForecastConfig::default(), 365).unwrap();
        assert!(!assessment.feasible);
        assert!(assessment.delta_days.is_none());

        let alert = GoalFeasibilityRule::judge(&goal, &assessment, &WatchdogConfig::default()).unwrap();
        assert_eq!(alert.code, AlertCode::GoalNotReached);
    }

    #[test]
    fn test_reachable_goal_reports_timing() {
        let frame = compute_trends(&deficit_frame(100), &profile());
        let current = frame
            .require(Column::Trend(Metric::Weight))
            .unwrap()
            .iter()
            .rev()
            .find_map(|w| *w)
            .unwrap();
        let goal = GoalInfo {
            weight_kg: current - 2.0,
            date: frame.last_date().unwrap() - Duration::days(60),
        };
        let assessment =
            assess_goal_feasibility(&frame, &profile(), &goal, &ForecastConfig::default(), 365).unwrap();
        assert!(assessment.feasible);
        let delta = assessment.delta_days.unwrap();
        assert!(delta > 14);

        let alert = GoalFeasibilityRule::judge(&goal, &assessment, &WatchdogConfig::default()).unwrap();
        assert_eq!(alert.code, AlertCode::GoalTimingDrift);
        assert!(alert.message.contains("late"));
    }

    #[test]
    fn test_on_time_goal_has_no_alert() {
        let goal = GoalInfo {
            weight_kg: 80.0,
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        };
        let assessment = GoalAssessment {
            feasible: true,
            predicted_date: NaiveDate::from_ymd_opt(2024, 6, 10),
            delta_days: Some(9),
            last_prediction: 78.0,
        };
        assert!(GoalFeasibilityRule::judge(&goal, &assessment, &WatchdogConfig::default()).is_none());

        let early = GoalAssessment {
            predicted_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            delta_days: Some(-31),
            ..assessment
        };
        let alert = GoalFeasibilityRule::judge(&goal, &early, &WatchdogConfig::default()).unwrap();
        assert!(alert.message.contains("31 days early"));
    }
}
