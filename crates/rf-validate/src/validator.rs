//! Scenario evaluation

use crate::error::{ValidationError, ValidationResult};
use crate::query::{Observation, ScenarioQuery};
use crate::scenario::{Scenario, ScenarioKind};
use crate::statistics::{summarize_table, TableStatistics};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rf_core::serde_helpers::duration_ms;
use rf_core::{AggregateRegistry, ExecConfig};
use rf_db::DataHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub kind: ScenarioKind,
    pub description: String,

    /// Whether the comparator held
    pub passed: bool,

    /// What the target side observed
    pub actual: Option<Observation>,

    /// What the source side (or a constant) says it should be
    pub expected: Option<Observation>,

    /// Human-readable outcome
    pub message: String,

    /// Set when the scenario could not be evaluated at all
    pub error: Option<String>,

    /// Audit SQL for the expected side
    pub source_sql: Option<String>,

    /// Audit SQL for the actual side
    pub target_sql: String,

    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl ScenarioResult {
    fn base(scenario: &Scenario, duration: Duration) -> Self {
        let (source_sql, target_sql) = scenario.audit_sql();
        Self {
            scenario_id: scenario.id.clone(),
            kind: scenario.kind,
            description: scenario.description.clone(),
            passed: false,
            actual: None,
            expected: None,
            message: String::new(),
            error: None,
            source_sql,
            target_sql,
            duration,
        }
    }

    /// Create a passed result
    pub fn pass(
        scenario: &Scenario,
        actual: Observation,
        expected: Option<Observation>,
        duration: Duration,
    ) -> Self {
        Self {
            passed: true,
            actual: Some(actual),
            expected,
            message: "ok".to_string(),
            ..Self::base(scenario, duration)
        }
    }

    /// Create a failed result
    pub fn fail(
        scenario: &Scenario,
        actual: Observation,
        expected: Option<Observation>,
        message: String,
        duration: Duration,
    ) -> Self {
        Self {
            actual: Some(actual),
            expected,
            message,
            ..Self::base(scenario, duration)
        }
    }

    /// Create a result for a scenario that could not be evaluated
    pub fn error(scenario: &Scenario, error: String, duration: Duration) -> Self {
        Self {
            message: error.clone(),
            error: Some(error),
            ..Self::base(scenario, duration)
        }
    }
}

/// Evidence gathered from one validation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub scenario_results: Vec<ScenarioResult>,

    /// `passed / total`; 1.0 when there were no scenarios
    pub pass_rate: f64,

    /// Set when the scenario list was empty
    pub no_scenarios: bool,

    pub passed: usize,

    /// Scenarios whose check did not hold
    pub failed: usize,

    /// Scenarios that could not be evaluated
    pub errors: usize,

    #[serde(with = "duration_ms")]
    pub duration: Duration,

    pub generated_at: DateTime<Utc>,

    /// Profile of the validated target table, when one was taken
    #[serde(default)]
    pub statistics: Option<TableStatistics>,
}

impl ValidationReport {
    /// Create a report from scenario results
    pub fn from_results(scenario_results: Vec<ScenarioResult>, duration: Duration) -> Self {
        let total = scenario_results.len();
        let passed = scenario_results.iter().filter(|r| r.passed).count();
        let errors = scenario_results
            .iter()
            .filter(|r| r.error.is_some())
            .count();
        let failed = total - passed - errors;
        let pass_rate = if total == 0 {
            1.0
        } else {
            passed as f64 / total as f64
        };

        Self {
            scenario_results,
            pass_rate,
            no_scenarios: total == 0,
            passed,
            failed,
            errors,
            duration,
            generated_at: Utc::now(),
            statistics: None,
        }
    }

    /// Check if every scenario passed
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }

    pub fn result(&self, scenario_id: &str) -> Option<&ScenarioResult> {
        self.scenario_results
            .iter()
            .find(|r| r.scenario_id == scenario_id)
    }
}

/// Evaluates scenarios against source and target data handles.
///
/// Scenarios only read. They run concurrently and a failure or evaluation
/// error in one never stops the others.
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<AggregateRegistry>,
    batch_size: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(Arc::new(AggregateRegistry::with_builtins()))
    }
}

impl Validator {
    pub fn new(registry: Arc<AggregateRegistry>) -> Self {
        Self {
            registry,
            batch_size: ExecConfig::default().batch_size,
        }
    }

    /// Rows per read while scanning
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Run every scenario and collect the report
    pub async fn validate(
        &self,
        scenarios: &[Scenario],
        source: &dyn DataHandle,
        target: &dyn DataHandle,
    ) -> ValidationReport {
        let start = Instant::now();
        log::info!("Running {} validation scenarios", scenarios.len());

        let results = join_all(
            scenarios
                .iter()
                .map(|s| self.run_scenario(s, source, target)),
        )
        .await;

        let report = ValidationReport::from_results(results, start.elapsed());
        log::info!(
            "Validation finished: {} passed, {} failed, {} errors (pass rate {:.3})",
            report.passed,
            report.failed,
            report.errors,
            report.pass_rate
        );
        report
    }

    /// Profile `table` on `handle` for the report
    pub async fn summarize(
        &self,
        handle: &dyn DataHandle,
        table: &str,
    ) -> ValidationResult<TableStatistics> {
        summarize_table(handle, table, self.batch_size).await
    }

    /// Evaluate a single scenario
    pub async fn run_scenario(
        &self,
        scenario: &Scenario,
        source: &dyn DataHandle,
        target: &dyn DataHandle,
    ) -> ScenarioResult {
        let start = Instant::now();

        let expected = match &scenario.source_query {
            Some(q) => {
                let handle = if q.reads_target() { target } else { source };
                match self.observe(scenario, q, handle).await {
                    Ok(obs) => Some(obs),
                    Err(e) => return self.errored(scenario, e, start),
                }
            }
            None => None,
        };
        let actual = match self.observe(scenario, &scenario.target_query, target).await {
            Ok(obs) => obs,
            Err(e) => return self.errored(scenario, e, start),
        };

        match scenario
            .comparator
            .check(&actual, expected.as_ref(), scenario.tolerance)
        {
            Ok(()) => {
                log::debug!("Scenario {} passed", scenario.id);
                ScenarioResult::pass(scenario, actual, expected, start.elapsed())
            }
            Err(message) => {
                log::warn!("Scenario {} failed: {}", scenario.id, message);
                ScenarioResult::fail(scenario, actual, expected, message, start.elapsed())
            }
        }
    }

    async fn observe(
        &self,
        scenario: &Scenario,
        query: &ScenarioQuery,
        handle: &dyn DataHandle,
    ) -> Result<Observation, ValidationError> {
        query
            .evaluate(handle, &self.registry, self.batch_size)
            .await
            .map_err(|e| ValidationError::evaluation(&scenario.id, e.to_string()))
    }

    fn errored(&self, scenario: &Scenario, err: ValidationError, start: Instant) -> ScenarioResult {
        log::warn!("{}", err);
        ScenarioResult::error(scenario, err.to_string(), start.elapsed())
    }
}

#[cfg(test)]
#[path = "validator_test.rs"]
mod tests;
