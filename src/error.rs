//! Error types for FitAssist

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Insufficient data for {operation}: have {available}, need {required}")]
    InsufficientData {
        operation: String,
        available: usize,
        required: usize,
    },

    #[error("Compliance model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Rule {rule} failed: {reason}")]
    RuleEvaluation { rule: String, reason: String },

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid user profile: {0}")]
    InvalidProfile(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Failed to parse daily records: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ComputeError {
    /// Shorthand for an `InsufficientData` error
    pub fn insufficient(operation: &str, available: usize, required: usize) -> Self {
        ComputeError::InsufficientData {
            operation: operation.to_string(),
            available,
            required,
        }
    }

    /// Short machine-readable code used by reports and the CLI
    pub fn code(&self) -> &'static str {
        match self {
            ComputeError::MissingColumn(_) => "MISSING_COLUMN",
            ComputeError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            ComputeError::ModelUnavailable(_) => "MODEL_UNAVAILABLE",
            ComputeError::RuleEvaluation { .. } => "RULE_EVALUATION_ERROR",
            ComputeError::UnknownMetric(_) => "UNKNOWN_METRIC",
            ComputeError::InvalidProfile(_) => "INVALID_PROFILE",
            ComputeError::DateParseError(_) => "DATE_PARSE_ERROR",
            ComputeError::ParseError(_) => "PARSE_ERROR",
            ComputeError::JsonError(_) => "JSON_ERROR",
            ComputeError::Io(_) => "IO_ERROR",
            ComputeError::TrainingError(_) => "TRAINING_ERROR",
            ComputeError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}
