//! Gradient-boosted regression trees
//!
//! Squared-loss boosting over shallow CART trees. Splits are exact and
//! deterministic: candidates are scanned in feature order, then threshold
//! order, and only a strictly better gain replaces the current best.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Ensemble of regression trees fitted to successive residuals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    base: f64,
    learning_rate: f64,
    n_features: usize,
    trees: Vec<Node>,
}

impl GradientBoostedRegressor {
    /// Fit on a row-major feature matrix
    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &BoostingConfig) -> Result<Self, ComputeError> {
        if x.is_empty() || x.len() != y.len() {
            return Err(ComputeError::TrainingError(format!(
                "feature rows ({}) and targets ({}) must be non-empty and equal",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(ComputeError::TrainingError(
                "feature rows have inconsistent widths".to_string(),
            ));
        }
        if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
            return Err(ComputeError::TrainingError(
                "non-finite value in training data".to_string(),
            ));
        }

        let base = y.iter().sum::<f64>() / y.len() as f64;
        let mut predictions = vec![base; y.len()];
        let mut trees = Vec::with_capacity(config.n_estimators);
        let all: Vec<usize> = (0..y.len()).collect();

        for _ in 0..config.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let tree = build_node(x, &residuals, &all, 0, config);
            for (i, row) in x.iter().enumerate() {
                predictions[i] += config.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            base,
            learning_rate: config.learning_rate,
            n_features,
            trees,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base, |acc, tree| acc + self.learning_rate * tree.predict(row))
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }
}

fn build_node(
    x: &[Vec<f64>],
    residuals: &[f64],
    indices: &[usize],
    depth: usize,
    config: &BoostingConfig,
) -> Node {
    let leaf_value = indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64;
    if depth >= config.max_depth || indices.len() < 2 * config.min_samples_leaf.max(1) {
        return Node::Leaf(leaf_value);
    }

    let Some(best) = best_split(x, residuals, indices, config.min_samples_leaf.max(1)) else {
        return Node::Leaf(leaf_value);
    };

    let (left, right): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| x[i][best.feature] <= best.threshold);

    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(build_node(x, residuals, &left, depth + 1, config)),
        right: Box::new(build_node(x, residuals, &right, depth + 1, config)),
    }
}

fn best_split(
    x: &[Vec<f64>],
    residuals: &[f64],
    indices: &[usize],
    min_leaf: usize,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let total: f64 = indices.iter().map(|&i| residuals[i]).sum();
    let parent_score = total * total / n as f64;
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..x[indices[0]].len() {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for k in 0..n - 1 {
            left_sum += residuals[order[k]];
            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let here = x[order[k]][feature];
            let next = x[order[k + 1]][feature];
            if next <= here {
                continue;
            }

            let right_sum = total - left_sum;
            let gain = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64
                - parent_score;
            let improves = match &best {
                Some(current) => gain > current.gain,
                None => gain > 1e-12,
            };
            if improves {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (here + next) / 2.0,
                    gain,
                });
            }
        }
    }
    best
}
