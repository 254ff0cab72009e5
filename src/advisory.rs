//! Advisory combiner
//!
//! Merges the classifier's state with watchdog alerts. Critical safety alerts
//! override the classifier, adaptation downgrades it to at-risk, and anything
//! else leaves it untouched.

use crate::types::{Alert, AlertCode, ComplianceState};

/// Final state from the classifier state and the watchdog alerts
pub fn combine(state: ComplianceState, alerts: &[Alert]) -> ComplianceState {
    if alerts.iter().any(|a| a.code.is_critical()) {
        ComplianceState::OffTrack
    } else if alerts.iter().any(|a| a.code == AlertCode::MetabolicAdapt) {
        ComplianceState::AtRisk
    } else {
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(code: AlertCode) -> Alert {
        Alert::new(code, code.as_str())
    }

    #[test]
    fn test_no_alerts_keeps_state() {
        for state in [
            ComplianceState::OnTrack,
            ComplianceState::AtRisk,
            ComplianceState::OffTrack,
            ComplianceState::Unknown,
        ] {
            assert_eq!(combine(state, &[]), state);
        }
    }

    #[test]
    fn test_critical_overrides_everything() {
        for code in [
            AlertCode::UnsafeIntake,
            AlertCode::RapidWeightLoss,
            AlertCode::RapidWeightGain,
            AlertCode::LowRmr,
        ] {
            let alerts = [alert(AlertCode::MetabolicAdapt), alert(code)];
            assert_eq!(combine(ComplianceState::OnTrack, &alerts), ComplianceState::OffTrack);
            assert_eq!(combine(ComplianceState::Unknown, &alerts), ComplianceState::OffTrack);
        }
    }

    #[test]
    fn test_adaptation_forces_at_risk() {
        let alerts = [alert(AlertCode::MetabolicAdapt)];
        assert_eq!(combine(ComplianceState::OnTrack, &alerts), ComplianceState::AtRisk);
        assert_eq!(combine(ComplianceState::OffTrack, &alerts), ComplianceState::AtRisk);
    }

    #[test]
    fn test_non_critical_alerts_ignored() {
        let alerts = [
            alert(AlertCode::StaleData),
            alert(AlertCode::MismatchDeficit),
            alert(AlertCode::GoalTimingDrift),
        ];
        assert_eq!(combine(ComplianceState::OnTrack, &alerts), ComplianceState::OnTrack);
    }
}
