//! Safety and consistency rules

use super::{required, RuleContext, WatchdogRule};
use crate::error::ComputeError;
use crate::types::{Alert, AlertCode};

/// Mean intake below the safe floor
pub struct MinimumIntakeRule;

impl WatchdogRule for MinimumIntakeRule {
    fn code(&self) -> AlertCode {
        AlertCode::UnsafeIntake
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let intake = required(self.code(), "mean_cal_in", ctx.latest.mean_cal_in)?;
        let floor = ctx.config.safe_min_calories;
        Ok((intake < floor).then(|| {
            Alert::new(
                self.code(),
                format!("Avg calories ({intake:.0}) below safety floor {floor:.0} kcal/d"),
            )
        }))
    }
}

/// Weekly loss faster than the safe rate
pub struct RapidLossRule;

impl WatchdogRule for RapidLossRule {
    fn code(&self) -> AlertCode {
        AlertCode::RapidWeightLoss
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let change = required(self.code(), "wt_change", ctx.latest.wt_change)?;
        Ok((change < -ctx.config.max_loss_kg_per_week).then(|| {
            Alert::new(
                self.code(),
                format!("Loss {change:.2} kg in 7 days exceeds recommended limit"),
            )
        }))
    }
}

/// Weekly gain faster than the safe rate
pub struct RapidGainRule;

impl WatchdogRule for RapidGainRule {
    fn code(&self) -> AlertCode {
        AlertCode::RapidWeightGain
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let change = required(self.code(), "wt_change", ctx.latest.wt_change)?;
        Ok((change > ctx.config.max_gain_kg_per_week).then(|| {
            Alert::new(
                self.code(),
                format!("Gain {change:.2} kg in 7 days exceeds recommended limit"),
            )
        }))
    }
}

/// Estimated RMR under the physiological floor
pub struct LowRmrRule;

impl WatchdogRule for LowRmrRule {
    fn code(&self) -> AlertCode {
        AlertCode::LowRmr
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let rmr = required(self.code(), "mean_rmr", ctx.latest.mean_rmr)?;
        let floor = ctx.config.rmr_floor;
        Ok((rmr < floor).then(|| {
            Alert::new(
                self.code(),
                format!(
                    "Estimated RMR {rmr:.0} kcal/d below floor ({floor:.0}); check data quality or health"
                ),
            )
        }))
    }
}

/// Large deficit while weight still rises
pub struct DeficitWithoutLossRule;

impl WatchdogRule for DeficitWithoutLossRule {
    fn code(&self) -> AlertCode {
        AlertCode::MismatchDeficit
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let net = required(self.code(), "mean_net_cal", ctx.latest.mean_net_cal)?;
        let change = required(self.code(), "wt_change", ctx.latest.wt_change)?;
        Ok((net < ctx.config.mismatch_deficit_kcal && change > 0.0).then(|| {
            Alert::new(
                self.code(),
                format!(
                    "Sustained deficit ({net:.0} kcal/d) but weight up {change:.2} kg; \
                     possible logging error or water retention"
                ),
            )
        }))
    }
}

/// RMR has fallen noticeably from its peak
pub struct MetabolicAdaptationRule;

impl WatchdogRule for MetabolicAdaptationRule {
    fn code(&self) -> AlertCode {
        AlertCode::MetabolicAdapt
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let adaptation = required(self.code(), "mean_adaptation", ctx.latest.mean_adaptation)?;
        Ok((adaptation > ctx.config.adaptation_threshold).then(|| {
            Alert::new(
                self.code(),
                format!(
                    "Estimated adaptation {:.1}%; expect a plateau, consider a diet break",
                    adaptation * 100.0
                ),
            )
        }))
    }
}

/// No new data for too long
pub struct StaleDataRule;

impl WatchdogRule for StaleDataRule {
    fn code(&self) -> AlertCode {
        AlertCode::StaleData
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<Option<Alert>, ComputeError> {
        let gap = (ctx.today - ctx.latest.week_end).num_days();
        Ok((gap > ctx.config.stale_after_days).then(|| {
            Alert::new(
                self.code(),
                format!("No new logs for {gap} days; predictions may be stale"),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ForecastConfig, WatchdogConfig};
    use crate::frame::DailyFrame;
    use crate::types::{Sex, UserProfile, WeeklyAggregate};
    use chrono::NaiveDate;

    fn week() -> WeeklyAggregate {
        let end = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        WeeklyAggregate {
            iso_year: 2024,
            iso_week: 10,
            week_start: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            week_end: end,
            days: 7,
            mean_cal_in: Some(1900.0),
            mean_net_cal: Some(-300.0),
            mean_pa: Some(350.0),
            start_wt: Some(80.0),
            end_wt: Some(79.6),
            wt_change: Some(-0.4),
            mean_rmr: Some(1700.0),
            mean_adaptation: Some(0.02),
        }
    }

    fn evaluate(rule: &dyn WatchdogRule, latest: &WeeklyAggregate) -> Result<Option<Alert>, ComputeError> {
        let frame = DailyFrame::default();
        let profile = UserProfile::new(NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(), Sex::Male, 180.0);
        let config = WatchdogConfig::default();
        let forecast = ForecastConfig::default();
        let ctx = RuleContext {
            latest,
            weekly: std::slice::from_ref(latest),
            frame: &frame,
            profile: &profile,
            goal: None,
            today: latest.week_end,
            config: &config,
            forecast: &forecast,
        };
        rule.evaluate(&ctx)
    }

    #[test]
    fn test_thresholds_are_strict() {
        let mut w = week();
        w.mean_cal_in = Some(1200.0);
        assert!(evaluate(&MinimumIntakeRule, &w).unwrap().is_none());
        w.mean_cal_in = Some(1199.0);
        assert!(evaluate(&MinimumIntakeRule, &w).unwrap().is_some());

        w.wt_change = Some(-2.0);
        assert!(evaluate(&RapidLossRule, &w).unwrap().is_none());
        w.wt_change = Some(-2.01);
        assert!(evaluate(&RapidLossRule, &w).unwrap().is_some());

        w.wt_change = Some(2.01);
        assert!(evaluate(&RapidGainRule, &w).unwrap().is_some());

        w.mean_adaptation = Some(0.08);
        assert!(evaluate(&MetabolicAdaptationRule, &w).unwrap().is_none());
        w.mean_adaptation = Some(0.081);
        let alert = evaluate(&MetabolicAdaptationRule, &w).unwrap().unwrap();
        assert!(alert.message.contains("8.1%"));
    }

    #[test]
    fn test_low_rmr() {
        let mut w = week();
        w.mean_rmr = Some(950.0);
        let alert = evaluate(&LowRmrRule, &w).unwrap().unwrap();
        assert_eq!(alert.code, AlertCode::LowRmr);
    }

    #[test]
    fn test_missing_field_is_error() {
        let mut w = week();
        w.mean_rmr = None;
        let err = evaluate(&LowRmrRule, &w).unwrap_err();
        assert!(matches!(err, ComputeError::RuleEvaluation { rule, .. } if rule == "LowRMR"));
    }

    #[test]
    fn test_deficit_requires_gain() {
        let mut w = week();
        w.mean_net_cal = Some(-600.0);
        assert!(evaluate(&DeficitWithoutLossRule, &w).unwrap().is_none());
        w.wt_change = Some(0.1);
        assert!(evaluate(&DeficitWithoutLossRule, &w).unwrap().is_some());
    }
}
