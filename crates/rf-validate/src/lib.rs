//! rf-validate - Validation scenarios for Ruleflow
//!
//! This crate derives independent correctness assertions from a compiled
//! rule and its run result, and evaluates them against the source and
//! target data handles.

pub mod error;
pub mod query;
pub mod scenario;
pub mod statistics;
pub mod synthesizer;
pub mod validator;

pub use error::{ValidationError, ValidationResult};
pub use query::{GroupedValues, Observation, ScenarioQuery};
pub use scenario::{Comparator, Scenario, ScenarioKind};
pub use statistics::{summarize_table, ColumnStatistics, NumericStatistics, TableStatistics};
pub use synthesizer::ValidationSynthesizer;
pub use validator::{ScenarioResult, ValidationReport, Validator};
