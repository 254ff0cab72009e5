//! Rule-based watchdog
//!
//! Evaluates an ordered battery of deterministic safety, consistency and goal
//! rules against the latest weekly aggregate. Rules are independent: none sees
//! another's output, and a rule that cannot be evaluated is logged and skipped
//! without affecting the rest.

mod goal;
mod rules;

pub use goal::{assess_goal_feasibility, GoalFeasibilityRule};
pub use rules::{
    DeficitWithoutLossRule, LowRmrRule, MetabolicAdaptationRule, MinimumIntakeRule,
    RapidGainRule, RapidLossRule, StaleDataRule,
};

use crate::config::{AdvisoryConfig, ForecastConfig, TrendConfig, WatchdogConfig};
use crate::error::ComputeError;
use crate::frame::DailyFrame;
use crate::trend::TrendEngine;
use crate::types::{Alert, AlertCode, Column, GoalInfo, Metric, UserProfile, WeeklyAggregate};
use crate::weekly::{recent_weeks, DEFAULT_WEEKS_CONSIDERED};
use chrono::NaiveDate;

/// Everything a rule may inspect
pub struct RuleContext<'a> {
    pub latest: &'a WeeklyAggregate,
    pub weekly: &'a [WeeklyAggregate],
    pub frame: &'a DailyFrame,
    pub profile: &'a UserProfile,
    pub goal: Option<&'a GoalInfo>,
    /// Evaluation date for staleness checks
    pub today: NaiveDate,
    pub config: &'a WatchdogConfig,
    pub forecast: &'a ForecastConfig,
}

/// A single watchdog check
pub trait WatchdogRule: Send + Sync {
    /// Alert code this rule emits
    fn code(&self) -> AlertCode;

    /// `Ok(None)` when the rule passes; `Err` when its inputs are unavailable
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError>;
}

/// Field a rule needs from the latest week
pub(crate) fn required(
    rule: AlertCode,
    field: &str,
    value: Option<f64>,
) -> Result<f64, ComputeError> {
    value.ok_or_else(|| ComputeError::RuleEvaluation {
        rule: rule.to_string(),
        reason: format!("{field} is undefined for the latest week"),
    })
}

/// Ordered rule battery
pub struct Watchdog {
    rules: Vec<Box<dyn WatchdogRule>>,
    config: WatchdogConfig,
    forecast: ForecastConfig,
    trend: TrendConfig,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::from_config(&AdvisoryConfig::default())
    }
}

impl Watchdog {
    /// Standard rule set in evaluation order
    pub fn from_config(config: &AdvisoryConfig) -> Self {
        let rules: Vec<Box<dyn WatchdogRule>> = vec![
            Box::new(MinimumIntakeRule),
            Box::new(RapidLossRule),
            Box::new(RapidGainRule),
            Box::new(LowRmrRule),
            Box::new(DeficitWithoutLossRule),
            Box::new(MetabolicAdaptationRule),
            Box::new(StaleDataRule),
            Box::new(GoalFeasibilityRule),
        ];
        Self {
            rules,
            config: config.watchdog.clone(),
            forecast: config.forecast.clone(),
            trend: config.trend.clone(),
        }
    }

    /// Append a custom rule after the standard ones
    pub fn with_rule(mut self, rule: Box<dyn WatchdogRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rule_codes(&self) -> Vec<AlertCode> {
        self.rules.iter().map(|r| r.code()).collect()
    }

    /// Evaluate every rule against the most recent weeks of `frame`
    pub fn run(
        &self,
        frame: &DailyFrame,
        profile: &UserProfile,
        goal: Option<&GoalInfo>,
        today: NaiveDate,
    ) -> Vec<Alert> {
        let prepared;
        let frame = if frame.has(Column::Raw(Metric::Rmr)) {
            frame
        } else {
            prepared = TrendEngine::new(self.trend.clone()).apply(frame, profile);
            &prepared
        };

        let weekly = recent_weeks(frame, DEFAULT_WEEKS_CONSIDERED);
        let Some(latest) = weekly.last() else {
            return vec![Alert::new(
                AlertCode::NoData,
                "No weekly data available for watchdog checks",
            )];
        };

        let ctx = RuleContext {
            latest,
            weekly: &weekly,
            frame,
            profile,
            goal,
            today,
            config: &self.config,
            forecast: &self.forecast,
        };

        let mut alerts = Vec::new();
        for rule in &self.rules {
            match rule.evaluate(&ctx) {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(rule = %rule.code(), error = %e, "watchdog rule skipped");
                }
            }
        }

        tracing::debug!(
            weeks = weekly.len(),
            alerts = alerts.len(),
            "watchdog evaluation complete"
        );
        alerts
    }
}

/// Run the standard watchdog with default thresholds
pub fn run_watchdog(
    frame: &DailyFrame,
    profile: &UserProfile,
    goal: Option<&GoalInfo>,
    today: NaiveDate,
) -> Vec<Alert> {
    Watchdog::default().run(frame, profile, goal, today)
}
