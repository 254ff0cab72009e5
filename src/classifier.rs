//! Weekly compliance classifier
//!
//! A Gaussian naive Bayes model over three weekly features
//! (mean_net_cal, mean_pa, wt_change). The model is trained offline, stored
//! as JSON through a [`ModelStore`], and loaded once per classifier.

use crate::config::ClassifierConfig;
use crate::error::ComputeError;
use crate::frame::DailyFrame;
use crate::types::{ComplianceState, WeeklyAggregate, WeeklyPrediction};
use crate::weekly::build_weekly_aggregates;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Feature names in model input order
pub const FEATURE_SCHEMA: [&str; 3] = ["mean_net_cal", "mean_pa", "wt_change"];

/// Variance smoothing relative to the largest feature variance
const VAR_SMOOTHING: f64 = 1e-9;

/// Gaussian naive Bayes with per-class feature means and variances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    schema: Vec<String>,
    classes: Vec<ComplianceState>,
    priors: Vec<f64>,
    means: Vec<[f64; 3]>,
    variances: Vec<[f64; 3]>,
}

impl GaussianNaiveBayes {
    /// Fit on labelled weekly feature rows
    ///
    /// Classes are stored sorted by name, so their order differs from the
    /// canonical probability order.
    pub fn fit(rows: &[[f64; 3]], labels: &[ComplianceState]) -> Result<Self, ComputeError> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(ComputeError::TrainingError(format!(
                "need matching non-empty rows and labels, got {} and {}",
                rows.len(),
                labels.len()
            )));
        }
        if labels.contains(&ComplianceState::Unknown) {
            return Err(ComputeError::TrainingError(
                "unknown is not a trainable class".to_string(),
            ));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ComputeError::TrainingError(
                "non-finite feature value".to_string(),
            ));
        }

        let max_variance = (0..3)
            .map(|f| variance(&rows.iter().map(|r| r[f]).collect::<Vec<_>>()))
            .fold(0.0, f64::max);
        let epsilon = if max_variance > 0.0 {
            VAR_SMOOTHING * max_variance
        } else {
            VAR_SMOOTHING
        };

        let mut classes: Vec<ComplianceState> = labels.to_vec();
        classes.sort_by_key(|c| c.as_str());
        classes.dedup();

        let n = rows.len() as f64;
        let mut priors = Vec::with_capacity(classes.len());
        let mut means = Vec::with_capacity(classes.len());
        let mut variances = Vec::with_capacity(classes.len());

        for class in &classes {
            let members: Vec<&[f64; 3]> = rows
                .iter()
                .zip(labels)
                .filter(|(_, l)| *l == class)
                .map(|(r, _)| r)
                .collect();
            priors.push(members.len() as f64 / n);

            let mut mean = [0.0; 3];
            let mut var = [0.0; 3];
            for f in 0..3 {
                let values: Vec<f64> = members.iter().map(|r| r[f]).collect();
                mean[f] = values.iter().sum::<f64>() / values.len() as f64;
                var[f] = variance(&values) + epsilon;
            }
            means.push(mean);
            variances.push(var);
        }

        Ok(Self {
            schema: FEATURE_SCHEMA.iter().map(|s| s.to_string()).collect(),
            classes,
            priors,
            means,
            variances,
        })
    }

    /// Classes in model order
    pub fn classes(&self) -> &[ComplianceState] {
        &self.classes
    }

    /// Posterior probabilities in model class order
    pub fn predict_proba(&self, row: &[f64; 3]) -> Vec<f64> {
        let log_posts: Vec<f64> = (0..self.classes.len())
            .map(|c| {
                let mut lp = self.priors[c].ln();
                for f in 0..3 {
                    let var = self.variances[c][f];
                    let diff = row[f] - self.means[c][f];
                    lp -= 0.5 * ((2.0 * PI * var).ln() + diff * diff / var);
                }
                lp
            })
            .collect();

        let max = log_posts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = log_posts.iter().map(|lp| (lp - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.iter().map(|e| e / total).collect()
    }

    /// Probabilities in (on_track, at_risk, off_track) order, absent classes as 0
    pub fn predict_canonical(&self, row: &[f64; 3]) -> [f64; 3] {
        let by_class: BTreeMap<&str, f64> = self
            .classes
            .iter()
            .map(ComplianceState::as_str)
            .zip(self.predict_proba(row))
            .collect();
        ComplianceState::CLASSES.map(|c| by_class.get(c.as_str()).copied().unwrap_or(0.0))
    }

    /// Most probable class in canonical order
    pub fn predict(&self, row: &[f64; 3]) -> ComplianceState {
        argmax_state(&self.predict_canonical(row))
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let model: GaussianNaiveBayes = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ComputeError> {
        if self.schema != FEATURE_SCHEMA {
            return Err(ComputeError::ModelUnavailable(format!(
                "feature schema {:?} does not match {:?}",
                self.schema, FEATURE_SCHEMA
            )));
        }
        let k = self.classes.len();
        if k == 0 || self.priors.len() != k || self.means.len() != k || self.variances.len() != k {
            return Err(ComputeError::ModelUnavailable(
                "class parameters are inconsistent".to_string(),
            ));
        }
        if self.variances.iter().flatten().any(|v| *v <= 0.0) {
            return Err(ComputeError::ModelUnavailable(
                "variances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Population variance
fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

fn argmax_state(probabilities: &[f64; 3]) -> ComplianceState {
    let mut best = 0;
    for (i, p) in probabilities.iter().enumerate() {
        if *p > probabilities[best] {
            best = i;
        }
    }
    ComplianceState::CLASSES[best]
}

/// File location of the persisted compliance model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the model; a missing file is `ModelUnavailable`
    pub fn load(&self) -> Result<GaussianNaiveBayes, ComputeError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ComputeError::ModelUnavailable(format!(
                    "no model at {}; train one with `fitassist train`",
                    self.path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let model = GaussianNaiveBayes::from_json(&json).map_err(|e| match e {
            ComputeError::JsonError(err) => {
                ComputeError::ModelUnavailable(format!("{}: {err}", self.path.display()))
            }
            other => other,
        })?;
        tracing::debug!(path = %self.path.display(), classes = model.classes.len(), "loaded compliance model");
        Ok(model)
    }

    /// Write the model to a sibling temp file, then rename it over the target
    pub fn save(&self, model: &GaussianNaiveBayes) -> Result<(), ComputeError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "model.json".into());
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        fs::write(&tmp, model.to_json()?)?;
        fs::rename(&tmp, &self.path)?;
        tracing::info!(path = %self.path.display(), "saved compliance model");
        Ok(())
    }
}

/// Complete feature rows of the most recent weeks
fn feature_window(frame: &DailyFrame, config: &ClassifierConfig) -> Vec<[f64; 3]> {
    let rows: Vec<[f64; 3]> = build_weekly_aggregates(frame)
        .iter()
        .filter_map(WeeklyAggregate::feature_vector)
        .collect();
    let skip = rows.len().saturating_sub(config.max_weeks);
    rows.into_iter().skip(skip).collect()
}

/// Number of complete feature weeks the classifier would consider
pub fn complete_weeks(frame: &DailyFrame, config: &ClassifierConfig) -> usize {
    feature_window(frame, config).len()
}

/// Classifier with a loaded model
#[derive(Debug, Clone)]
pub struct ComplianceClassifier {
    model: GaussianNaiveBayes,
    config: ClassifierConfig,
}

impl ComplianceClassifier {
    pub fn new(model: GaussianNaiveBayes, config: ClassifierConfig) -> Self {
        Self { model, config }
    }

    pub fn from_store(store: &ModelStore, config: ClassifierConfig) -> Result<Self, ComputeError> {
        Ok(Self::new(store.load()?, config))
    }

    pub fn model(&self) -> &GaussianNaiveBayes {
        &self.model
    }

    /// Classify the most recent week of a trend frame
    pub fn predict_weekly_state(&self, frame: &DailyFrame) -> WeeklyPrediction {
        let window = feature_window(frame, &self.config);
        match latest_row(&window, &self.config) {
            Ok(latest) => classify(&self.model, latest, window.len()),
            Err(unknown) => unknown,
        }
    }
}

/// Classify the most recent week, loading the model only when enough weeks exist
pub fn predict_weekly_state(
    frame: &DailyFrame,
    store: &ModelStore,
    config: &ClassifierConfig,
) -> Result<WeeklyPrediction, ComputeError> {
    let window = feature_window(frame, config);
    match latest_row(&window, config) {
        Ok(latest) => Ok(classify(&store.load()?, latest, window.len())),
        Err(unknown) => Ok(unknown),
    }
}

/// Row to classify, or the unknown prediction when too few weeks exist
fn latest_row<'w>(
    window: &'w [[f64; 3]],
    config: &ClassifierConfig,
) -> Result<&'w [f64; 3], WeeklyPrediction> {
    let weeks = window.len();
    match window.last() {
        Some(latest) if weeks >= config.min_weeks => Ok(latest),
        _ => {
            tracing::debug!(weeks, required = config.min_weeks, "too few weeks to classify");
            Err(WeeklyPrediction::unknown(weeks))
        }
    }
}

fn classify(model: &GaussianNaiveBayes, latest: &[f64; 3], weeks: usize) -> WeeklyPrediction {
    let probabilities = model.predict_canonical(latest);
    WeeklyPrediction {
        state: argmax_state(&probabilities),
        probabilities,
        weeks,
    }
}

/// Heuristic label for a training week
pub fn label_week(week: &[f64; 3], config: &ClassifierConfig) -> ComplianceState {
    let [net, _, change] = *week;
    if change < -config.label_weight_change_kg && net < -config.label_net_calories {
        ComplianceState::OnTrack
    } else if change > config.label_weight_change_kg && net > config.label_net_calories {
        ComplianceState::OffTrack
    } else {
        ComplianceState::AtRisk
    }
}

/// Precision and recall for one class on the holdout set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub support: usize,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
}

/// Summary of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub total_weeks: usize,
    pub train_weeks: usize,
    pub holdout_weeks: usize,
    /// Label counts over all weeks, canonical order
    pub label_counts: BTreeMap<String, usize>,
    pub holdout_accuracy: Option<f64>,
    pub per_class: BTreeMap<String, ClassMetrics>,
}

/// Every fifth week is held out when at least this many weeks exist
const HOLDOUT_STRIDE: usize = 5;

/// Train a model on heuristically labelled weeks from one or more trend frames
pub fn train_compliance_model(
    frames: &[DailyFrame],
    config: &ClassifierConfig,
) -> Result<(GaussianNaiveBayes, TrainingReport), ComputeError> {
    let rows: Vec<[f64; 3]> = frames
        .iter()
        .flat_map(build_weekly_aggregates)
        .filter_map(|w| w.feature_vector())
        .collect();
    if rows.is_empty() {
        return Err(ComputeError::TrainingError(
            "no complete weekly feature rows to train on".to_string(),
        ));
    }
    let labels: Vec<ComplianceState> = rows.iter().map(|r| label_week(r, config)).collect();

    let holdout = |i: usize| rows.len() >= HOLDOUT_STRIDE && i % HOLDOUT_STRIDE == HOLDOUT_STRIDE - 1;
    let (mut train_x, mut train_y, mut test_x, mut test_y) = (vec![], vec![], vec![], vec![]);
    for (i, (row, label)) in rows.iter().zip(&labels).enumerate() {
        if holdout(i) {
            test_x.push(*row);
            test_y.push(*label);
        } else {
            train_x.push(*row);
            train_y.push(*label);
        }
    }

    let model = GaussianNaiveBayes::fit(&train_x, &train_y)?;
    let predicted: Vec<ComplianceState> = test_x.iter().map(|r| model.predict(r)).collect();

    let holdout_accuracy = (!test_y.is_empty()).then(|| {
        let correct = predicted.iter().zip(&test_y).filter(|(p, t)| p == t).count();
        correct as f64 / test_y.len() as f64
    });

    let mut label_counts = BTreeMap::new();
    let mut per_class = BTreeMap::new();
    for class in ComplianceState::CLASSES {
        label_counts.insert(
            class.as_str().to_string(),
            labels.iter().filter(|l| **l == class).count(),
        );
        let support = test_y.iter().filter(|t| **t == class).count();
        let predicted_as = predicted.iter().filter(|p| **p == class).count();
        let hits = predicted
            .iter()
            .zip(&test_y)
            .filter(|(p, t)| **p == class && **t == class)
            .count();
        per_class.insert(
            class.as_str().to_string(),
            ClassMetrics {
                support,
                precision: (predicted_as > 0).then(|| hits as f64 / predicted_as as f64),
                recall: (support > 0).then(|| hits as f64 / support as f64),
            },
        );
    }

    let report = TrainingReport {
        total_weeks: rows.len(),
        train_weeks: train_x.len(),
        holdout_weeks: test_x.len(),
        label_counts,
        holdout_accuracy,
        per_class,
    };
    tracing::info!(
        weeks = report.total_weeks,
        holdout = report.holdout_weeks,
        accuracy = ?report.holdout_accuracy,
        "trained compliance model"
    );
    Ok((model, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Column, Metric};
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;

    fn training_rows() -> (Vec<[f64; 3]>, Vec<ComplianceState>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..6 {
            let j = i as f64;
            rows.push([-600.0 - 10.0 * j, 300.0 + j, -0.6 - 0.02 * j]);
            labels.push(ComplianceState::OnTrack);
            rows.push([0.0 + 15.0 * j, 250.0 - j, 0.0 + 0.03 * j]);
            labels.push(ComplianceState::AtRisk);
            rows.push([500.0 + 12.0 * j, 150.0 + j, 0.6 + 0.02 * j]);
            labels.push(ComplianceState::OffTrack);
        }
        (rows, labels)
    }

    /// Trend-like frame whose weeks alternate between deficit and surplus
    fn weekly_frame(weeks: usize) -> DailyFrame {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let days = weeks * 7;
        let dates = (0..days).map(|i| start + Duration::days(i as i64)).collect();
        let mut weight = Vec::with_capacity(days);
        let mut w = 85.0;
        for _ in 0..days {
            weight.push(Some(w));
            w -= 0.1;
        }
        DailyFrame::from_columns(
            dates,
            vec![
                (Column::Trend(Metric::Weight), weight),
                (Column::Trend(Metric::NetCalories), vec![Some(-550.0); days]),
                (Column::Trend(Metric::ActiveCaloriesBurned), vec![Some(320.0); days]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_probabilities_are_canonical_and_sum_to_one() {
        let (rows, labels) = training_rows();
        let model = GaussianNaiveBayes::fit(&rows, &labels).unwrap();
        assert_eq!(
            model.classes(),
            &[ComplianceState::AtRisk, ComplianceState::OffTrack, ComplianceState::OnTrack]
        );

        let proba = model.predict_canonical(&[-620.0, 302.0, -0.65]);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba[0] > 0.9);
        assert_eq!(model.predict(&[-620.0, 302.0, -0.65]), ComplianceState::OnTrack);
        assert_eq!(model.predict(&[520.0, 152.0, 0.63]), ComplianceState::OffTrack);
    }

    #[test]
    fn test_missing_class_padded_with_zero() {
        let rows = vec![[-600.0, 300.0, -0.6], [-650.0, 310.0, -0.7], [0.0, 250.0, 0.0], [10.0, 240.0, 0.1]];
        let labels = vec![
            ComplianceState::OnTrack,
            ComplianceState::OnTrack,
            ComplianceState::AtRisk,
            ComplianceState::AtRisk,
        ];
        let model = GaussianNaiveBayes::fit(&rows, &labels).unwrap();
        let proba = model.predict_canonical(&[500.0, 100.0, 0.8]);
        assert_eq!(proba[2], 0.0);
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_label_week() {
        let config = ClassifierConfig::default();
        assert_eq!(label_week(&[-300.0, 0.0, -0.5], &config), ComplianceState::OnTrack);
        assert_eq!(label_week(&[300.0, 0.0, 0.5], &config), ComplianceState::OffTrack);
        assert_eq!(label_week(&[-300.0, 0.0, 0.1], &config), ComplianceState::AtRisk);
        assert_eq!(label_week(&[-250.0, 0.0, -0.5], &config), ComplianceState::AtRisk);
    }

    #[test]
    fn test_three_weeks_is_unknown_four_is_classified() {
        let (rows, labels) = training_rows();
        let classifier = ComplianceClassifier::new(
            GaussianNaiveBayes::fit(&rows, &labels).unwrap(),
            ClassifierConfig::default(),
        );

        let three = classifier.predict_weekly_state(&weekly_frame(3));
        assert_eq!(three.state, ComplianceState::Unknown);
        assert_eq!(three.probabilities, [0.0; 3]);
        assert_eq!(three.weeks, 3);

        let four = classifier.predict_weekly_state(&weekly_frame(4));
        assert_ne!(four.state, ComplianceState::Unknown);
        assert_eq!(four.weeks, 4);
        assert!((four.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_capped_at_twelve_weeks() {
        let (rows, labels) = training_rows();
        let classifier = ComplianceClassifier::new(
            GaussianNaiveBayes::fit(&rows, &labels).unwrap(),
            ClassifierConfig::default(),
        );
        let prediction = classifier.predict_weekly_state(&weekly_frame(20));
        assert_eq!(prediction.weeks, 12);
        assert_eq!(prediction.state, ComplianceState::OnTrack);
    }

    #[test]
    fn test_empty_frame_is_unknown_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("missing.json"));
        let prediction =
            predict_weekly_state(&DailyFrame::default(), &store, &ClassifierConfig::default()).unwrap();
        assert_eq!(prediction, WeeklyPrediction::unknown(0));

        let err = predict_weekly_state(&weekly_frame(5), &store, &ClassifierConfig::default())
            .unwrap_err();
        assert!(matches!(err, ComputeError::ModelUnavailable(_)));
    }

    #[test]
    fn test_model_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models").join("compliance.json"));
        let (rows, labels) = training_rows();
        let model = GaussianNaiveBayes::fit(&rows, &labels).unwrap();

        store.save(&model).unwrap();
        assert!(store.exists());
        assert!(!dir.path().join("models").join("compliance.json.tmp").exists());
        assert_eq!(store.load().unwrap(), model);

        let prediction = predict_weekly_state(&weekly_frame(6), &store, &ClassifierConfig::default()).unwrap();
        assert_eq!(prediction.weeks, 6);
    }

    #[test]
    fn test_corrupt_model_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let err = ModelStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ComputeError::ModelUnavailable(_)));

        let (rows, labels) = training_rows();
        let model = GaussianNaiveBayes::fit(&rows, &labels).unwrap();
        let json = model.to_json().unwrap().replace("mean_pa", "steps");
        std::fs::write(&path, json).unwrap();
        assert!(matches!(
            ModelStore::new(&path).load().unwrap_err(),
            ComputeError::ModelUnavailable(_)
        ));
    }

    #[test]
    fn test_train_compliance_model_holdout() {
        let frames: Vec<DailyFrame> = (0..2).map(|_| weekly_frame(10)).collect();
        let (model, report) = train_compliance_model(&frames, &ClassifierConfig::default()).unwrap();
        assert_eq!(report.total_weeks, 20);
        assert_eq!(report.holdout_weeks, 4);
        assert_eq!(report.train_weeks, 16);
        assert_eq!(report.label_counts["on_track"], 20);
        assert_eq!(report.holdout_accuracy, Some(1.0));
        assert_eq!(model.classes(), &[ComplianceState::OnTrack]);
    }

    #[test]
    fn test_training_requires_rows() {
        let err = train_compliance_model(&[DailyFrame::default()], &ClassifierConfig::default())
            .unwrap_err();
        assert!(matches!(err, ComputeError::TrainingError(_)));
    }
}
