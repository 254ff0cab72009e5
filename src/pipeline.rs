//! Pipeline orchestration
//!
//! This module provides the public entry point for fitassist. It runs the
//! full advisory pass over a user's daily history: ingestion, trend engine,
//! weight forecast, weekly classification, watchdog and the final combine.
//! A failing section is recorded in the report without aborting the rest.

use crate::advisory::combine;
use crate::classifier::{
    complete_weeks, train_compliance_model, ComplianceClassifier, GaussianNaiveBayes, ModelStore,
    TrainingReport,
};
use crate::config::AdvisoryConfig;
use crate::error::ComputeError;
use crate::forecast::MetricForecaster;
use crate::frame::{DailyFrame, DailyRecords};
use crate::trend::TrendEngine;
use crate::types::{
    AdvisoryReport, ComplianceState, ForecastResult, FrameSummary, GoalInfo, Metric,
    ReportProducer, SectionOutcome, UserProfile, WeeklyPrediction,
};
use crate::watchdog::Watchdog;
use crate::{PRODUCER_NAME, VERSION};
use chrono::NaiveDate;
use uuid::Uuid;

/// Run a single advisory pass with default settings and no classifier model.
///
/// # Arguments
/// * `records` - Daily records keyed by ISO date, then metric name
/// * `profile` - User profile used for RMR and adaptation
/// * `goal` - Optional weight goal checked by the watchdog
/// * `today` - Evaluation date for staleness checks
///
/// # Example
/// ```ignore
/// let report = advise(&records, &profile, None, today)?;
/// println!("{}", report.to_json_pretty()?);
/// ```
pub fn advise(
    records: &DailyRecords,
    profile: &UserProfile,
    goal: Option<&GoalInfo>,
    today: NaiveDate,
) -> Result<AdvisoryReport, ComputeError> {
    AdvisoryPipeline::default().run_records(records, profile, goal, today)
}

/// Stateful advisory runner holding configuration and the classifier model.
///
/// The model is loaded from the store on first use and cached afterwards.
pub struct AdvisoryPipeline {
    config: AdvisoryConfig,
    store: Option<ModelStore>,
    classifier: Option<ComplianceClassifier>,
}

impl Default for AdvisoryPipeline {
    fn default() -> Self {
        Self::new(AdvisoryConfig::default())
    }
}

impl AdvisoryPipeline {
    pub fn new(config: AdvisoryConfig) -> Self {
        Self {
            config,
            store: None,
            classifier: None,
        }
    }

    /// Load (and save retrained) models at this location
    pub fn with_model_store(mut self, store: ModelStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use an already fitted model instead of loading one
    pub fn with_model(mut self, model: GaussianNaiveBayes) -> Self {
        self.classifier = Some(ComplianceClassifier::new(model, self.config.classifier.clone()));
        self
    }

    pub fn config(&self) -> &AdvisoryConfig {
        &self.config
    }

    pub fn model_store(&self) -> Option<&ModelStore> {
        self.store.as_ref()
    }

    /// Build the dense frame from records and apply the trend engine
    pub fn prepare(&self, records: &DailyRecords, profile: &UserProfile) -> Result<DailyFrame, ComputeError> {
        let frame = DailyFrame::from_records(records)?;
        Ok(self.trends(&frame, profile))
    }

    /// Apply the trend engine to an ingested frame
    pub fn trends(&self, frame: &DailyFrame, profile: &UserProfile) -> DailyFrame {
        TrendEngine::new(self.config.trend.clone()).apply(frame, profile)
    }

    /// Forecast a metric from a trend frame at the configured offsets
    pub fn forecast(
        &self,
        trend: &DailyFrame,
        target: Metric,
        profile: &UserProfile,
    ) -> Result<ForecastResult, ComputeError> {
        MetricForecaster::new(self.config.forecast.clone()).forecast(
            trend,
            target,
            &self.config.offsets(),
            profile,
        )
    }

    /// Classify the latest week; too few weeks is the unknown state, not an error
    pub fn classify(&mut self, trend: &DailyFrame) -> Result<WeeklyPrediction, ComputeError> {
        let weeks = complete_weeks(trend, &self.config.classifier);
        if weeks < self.config.classifier.min_weeks {
            return Ok(WeeklyPrediction::unknown(weeks));
        }
        Ok(self.classifier()?.predict_weekly_state(trend))
    }

    fn classifier(&mut self) -> Result<&ComplianceClassifier, ComputeError> {
        if self.classifier.is_none() {
            let store = self.store.as_ref().ok_or_else(|| {
                ComputeError::ModelUnavailable("no model store configured".to_string())
            })?;
            let loaded = ComplianceClassifier::from_store(store, self.config.classifier.clone())?;
            tracing::debug!(path = %store.path().display(), "loaded compliance model");
            self.classifier = Some(loaded);
        }
        self.classifier
            .as_ref()
            .ok_or_else(|| ComputeError::ModelUnavailable("model not loaded".to_string()))
    }

    /// Ingest records and run the full advisory pass
    ///
    /// Only ingestion errors fail the call; later stages are reported per section.
    pub fn run_records(
        &mut self,
        records: &DailyRecords,
        profile: &UserProfile,
        goal: Option<&GoalInfo>,
        today: NaiveDate,
    ) -> Result<AdvisoryReport, ComputeError> {
        let frame = DailyFrame::from_records(records)?;
        Ok(self.run(&frame, profile, goal, today))
    }

    /// Run the full advisory pass over an ingested frame
    pub fn run(
        &mut self,
        frame: &DailyFrame,
        profile: &UserProfile,
        goal: Option<&GoalInfo>,
        today: NaiveDate,
    ) -> AdvisoryReport {
        let trend = self.trends(frame, profile);

        let forecast = SectionOutcome::from_result(self.forecast(&trend, Metric::Weight, profile));
        if let SectionOutcome::Failed { code, message } = &forecast {
            tracing::warn!(code = %code, error = %message, "forecast section failed");
        }

        let classification = SectionOutcome::from_result(self.classify(&trend));
        if let SectionOutcome::Failed { code, message } = &classification {
            tracing::warn!(code = %code, error = %message, "classification section failed");
        }

        let alerts = Watchdog::from_config(&self.config).run(&trend, profile, goal, today);

        let model_state = classification
            .value()
            .map(|p| p.state)
            .unwrap_or(ComplianceState::Unknown);
        let final_state = combine(model_state, &alerts);

        tracing::info!(
            rows = trend.len(),
            alerts = alerts.len(),
            model_state = %model_state,
            final_state = %final_state,
            "advisory pass complete"
        );

        AdvisoryReport {
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: VERSION.to_string(),
                report_id: Uuid::new_v4().to_string(),
            },
            evaluated_on: today,
            frame: FrameSummary {
                rows: trend.len(),
                first_date: trend.first_date(),
                last_date: trend.last_date(),
                columns: trend.column_names().map(|c| c.to_string()).collect(),
            },
            forecast,
            classification,
            alerts,
            final_state,
        }
    }

    /// Retrain the classifier on ingested frames and cache the new model
    ///
    /// The model is written to the store when one is configured.
    pub fn retrain(
        &mut self,
        frames: &[DailyFrame],
        profile: &UserProfile,
    ) -> Result<TrainingReport, ComputeError> {
        let trends: Vec<DailyFrame> = frames.iter().map(|f| self.trends(f, profile)).collect();
        let (model, report) = train_compliance_model(&trends, &self.config.classifier)?;
        if let Some(store) = &self.store {
            store.save(&model)?;
            tracing::info!(path = %store.path().display(), "saved compliance model");
        }
        self.classifier = Some(ComplianceClassifier::new(model, self.config.classifier.clone()));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::tests::{deficit_frame, profile};
    use crate::types::{AlertCode, Column};
    use tempfile::tempdir;

    fn model() -> GaussianNaiveBayes {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..5 {
            let jitter = i as f64;
            rows.push([-500.0 + 10.0 * jitter, 700.0 - 5.0 * jitter, -0.45 + 0.02 * jitter]);
            labels.push(ComplianceState::OnTrack);
            rows.push([0.0 + 10.0 * jitter, 500.0 - 5.0 * jitter, 0.0 + 0.02 * jitter]);
            labels.push(ComplianceState::AtRisk);
            rows.push([500.0 + 10.0 * jitter, 300.0 - 5.0 * jitter, 0.5 + 0.02 * jitter]);
            labels.push(ComplianceState::OffTrack);
        }
        GaussianNaiveBayes::fit(&rows, &labels).unwrap()
    }

    fn is_critical(report: &AdvisoryReport) -> bool {
        report.alerts.iter().any(|a| a.code.is_critical())
    }

    #[test]
    fn test_steady_deficit_end_to_end() {
        let frame = deficit_frame(90);
        let today = frame.last_date().unwrap();
        let mut pipeline = AdvisoryPipeline::default().with_model(model());
        let report = pipeline.run(&frame, &profile(), None, today);

        let forecast = report.forecast.value().expect("forecast section");
        assert_eq!(forecast.predictions.len(), 5);
        assert!(forecast.predictions[&90] < forecast.current_value);
        assert!(forecast.predictions[&90] < forecast.predictions[&7]);

        let prediction = report.classification.value().expect("classification section");
        assert_eq!(prediction.state, ComplianceState::OnTrack);
        assert!(!is_critical(&report), "unexpected alerts: {:?}", report.alerts);
        assert!(!report.alerts.iter().any(|a| a.code == AlertCode::UnsafeIntake));
        assert_eq!(report.final_state, ComplianceState::OnTrack);

        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.frame.rows, 90);
        assert!(report.frame.columns.contains(&"TrendWeight".to_string()));
    }

    #[test]
    fn test_long_deficit_reports_adaptation() {
        let frame = deficit_frame(420);
        let mut pipeline = AdvisoryPipeline::default().with_model(model());
        let report = pipeline.run(&frame, &profile(), None, frame.last_date().unwrap());

        assert!(
            report.alerts.iter().any(|a| a.code == AlertCode::MetabolicAdapt),
            "alerts: {:?}",
            report.alerts
        );
        assert!(!is_critical(&report), "unexpected alerts: {:?}", report.alerts);
        assert_eq!(report.final_state, ComplianceState::AtRisk);
    }

    #[test]
    fn test_intake_only_history() {
        let full = deficit_frame(90);
        let columns = [
            Metric::Weight,
            Metric::BodyFatPercentage,
            Metric::CaloriesIn,
        ]
        .into_iter()
        .map(|m| {
            let column = Column::Raw(m);
            (column, full.column(column).unwrap().to_vec())
        })
        .collect();
        let frame = DailyFrame::from_columns(full.dates().to_vec(), columns).unwrap();
        let mut pipeline = AdvisoryPipeline::default().with_model(model());
        let report = pipeline.run(&frame, &profile(), None, frame.last_date().unwrap());

        assert!(report.forecast.value().is_some(), "forecast: {:?}", report.forecast);
        assert!(!report.alerts.iter().any(|a| a.code == AlertCode::UnsafeIntake));
    }

    #[test]
    fn test_critical_alert_overrides_classifier() {
        let frame = deficit_frame(90);
        let n = frame.len();
        let frame = frame
            .with_column(Column::Raw(Metric::CaloriesIn), vec![Some(1000.0); n])
            .unwrap();
        let mut pipeline = AdvisoryPipeline::default().with_model(model());
        let report = pipeline.run(&frame, &profile(), None, frame.last_date().unwrap());

        assert!(report.alerts.iter().any(|a| a.code == AlertCode::UnsafeIntake));
        assert_eq!(report.final_state, ComplianceState::OffTrack);
    }

    #[test]
    fn test_missing_model_is_partial_failure() {
        let dir = tempdir().unwrap();
        let frame = deficit_frame(90);
        let mut pipeline =
            AdvisoryPipeline::default().with_model_store(ModelStore::new(dir.path().join("nb.json")));
        let report = pipeline.run(&frame, &profile(), None, frame.last_date().unwrap());

        assert!(report.forecast.value().is_some());
        match &report.classification {
            SectionOutcome::Failed { code, .. } => assert_eq!(code, "MODEL_UNAVAILABLE"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!is_critical(&report));
        assert_ne!(report.final_state, ComplianceState::OffTrack);
        assert_ne!(report.final_state, ComplianceState::OnTrack);
    }

    #[test]
    fn test_short_history() {
        let frame = deficit_frame(20);
        let mut pipeline = AdvisoryPipeline::default();
        let report = pipeline.run(&frame, &profile(), None, frame.last_date().unwrap());

        match &report.forecast {
            SectionOutcome::Failed { code, .. } => assert_eq!(code, "INSUFFICIENT_DATA"),
            other => panic!("expected failure, got {other:?}"),
        }
        let prediction = report.classification.value().unwrap();
        assert_eq!(prediction.state, ComplianceState::Unknown);
        assert_eq!(prediction.probabilities, [0.0; 3]);
    }

    #[test]
    fn test_retrain_saves_and_caches_model() {
        let dir = tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("nb.json"));
        let mut pipeline = AdvisoryPipeline::default().with_model_store(store.clone());

        let report = pipeline.retrain(&[deficit_frame(90)], &profile()).unwrap();
        assert!(report.total_weeks >= 10);
        assert!(store.exists());

        let frame = pipeline.trends(&deficit_frame(90), &profile());
        let prediction = pipeline.classify(&frame).unwrap();
        assert_ne!(prediction.state, ComplianceState::Unknown);

        let reloaded = AdvisoryPipeline::default()
            .with_model_store(store)
            .classify(&frame)
            .unwrap();
        assert_eq!(reloaded.state, prediction.state);
    }

    #[test]
    fn test_report_json_layout() {
        let frame = deficit_frame(90);
        let mut pipeline = AdvisoryPipeline::default().with_model(model());
        let report = pipeline.run(&frame, &profile(), None, frame.last_date().unwrap());

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["forecast"]["status"], "ok");
        assert_eq!(value["producer"]["version"], VERSION);
        assert_eq!(value["forecast"]["value"]["predictions"]["30"], report.forecast.value().unwrap().predictions[&30]);
        assert_eq!(value["final_state"], report.final_state.as_str());
    }

    #[test]
    fn test_run_records() {
        let json = r#"{
            "2024-01-01": {"Weight": 80.0, "CaloriesIn": 2000.0},
            "2024-01-03": {"Weight": 79.8, "BasalCaloriesOut": 1700.0}
        }"#;
        let records: DailyRecords = serde_json::from_str(json).unwrap();
        let today = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let report = advise(&records, &profile(), None, today).unwrap();
        assert_eq!(report.frame.rows, 3);
        assert!(report.forecast.value().is_none());
    }
}
