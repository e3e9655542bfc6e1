//! Error types for rf-validate

use rf_db::DbError;
use thiserror::Error;

/// Errors evaluating a scenario, as opposed to a scenario failing its check
#[derive(Error, Debug)]
pub enum ValidationError {
    /// V001: a query could not be evaluated (missing table, lost connection, ...)
    #[error("[V001] Scenario '{scenario}' could not be evaluated: {message}")]
    ScenarioEvaluationFailed { scenario: String, message: String },

    /// V002: the scenario names an aggregate the registry does not know
    #[error("[V002] Aggregate '{0}' is not registered")]
    UnknownAggregate(String),

    /// V003: data handle failure outside any one scenario
    #[error("[V003] Storage error: {0}")]
    Storage(#[from] DbError),
}

impl ValidationError {
    pub(crate) fn evaluation(scenario: &str, message: impl Into<String>) -> Self {
        ValidationError::ScenarioEvaluationFailed {
            scenario: scenario.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for ValidationError
pub type ValidationResult<T> = Result<T, ValidationError>;
