//! Error types for rf-compile

use thiserror::Error;

/// Failure reported by an interpreter implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct InterpretationError {
    pub message: String,
}

impl InterpretationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Rule compilation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// C001: identifier does not resolve to exactly one table or column
    #[error("[C001] Ambiguous rule: '{identifier}' does not resolve to a unique {kind}{}", candidates_hint(.candidates))]
    Ambiguous {
        identifier: String,
        kind: &'static str,
        candidates: Vec<String>,
    },

    /// C002: aggregate kind missing from the registry
    #[error("[C002] Unsupported aggregation '{function}'")]
    UnsupportedAggregation { function: String },

    /// C003: rule is inconsistent with the source schema
    #[error("[C003] Schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// C004: the interpreter failed or returned an unusable candidate
    #[error("[C004] Interpretation failed: {message}")]
    Interpretation { message: String },

    /// C005: the interpreter did not answer in time
    #[error("[C005] Interpreter timed out after {seconds}s")]
    InterpreterTimeout { seconds: u64 },
}

fn candidates_hint(candidates: &[String]) -> String {
    if candidates.is_empty() {
        String::new()
    } else {
        format!(" (candidates: {})", candidates.join(", "))
    }
}

impl CompileError {
    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        CompileError::SchemaMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn interpretation(message: impl Into<String>) -> Self {
        CompileError::Interpretation {
            message: message.into(),
        }
    }
}

impl From<InterpretationError> for CompileError {
    fn from(err: InterpretationError) -> Self {
        CompileError::Interpretation {
            message: err.message,
        }
    }
}

impl From<rf_core::CoreError> for CompileError {
    fn from(err: rf_core::CoreError) -> Self {
        CompileError::SchemaMismatch {
            message: err.to_string(),
        }
    }
}

/// Result type alias for CompileError
pub type CompileResult<T> = Result<T, CompileError>;
