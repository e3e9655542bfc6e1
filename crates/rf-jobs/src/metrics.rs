//! Run metrics
//!
//! Every ETL and validation job that reaches a terminal state is recorded
//! here, keyed by the target table it wrote or checked. Histories are
//! bounded so a long-lived orchestrator does not grow without limit.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::job::{Job, JobId, JobKind};
use crate::state::JobState;
use chrono::{DateTime, Utc};
use rf_core::serde_helpers::duration_ms;
use rf_core::RunResult;
use rf_validate::ValidationReport;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// ETL runs kept per target table
const ETL_HISTORY: usize = 100;
/// Validation runs kept per target table
const TEST_HISTORY: usize = 50;

/// Throughput and row accounting for one ETL job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlMetrics {
    pub job_id: JobId,
    pub source_table: String,
    pub target_table: String,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub records_processed: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    pub records_per_second: f64,
    pub batch_count: u64,
    /// Percentage of read rows that were not skipped
    pub success_rate: f64,
}

impl EtlMetrics {
    /// Metrics for a terminal ETL job; `None` for other kinds or live jobs
    pub fn from_job(job: &Job) -> Option<Self> {
        if job.kind != JobKind::Etl || !job.is_terminal() {
            return None;
        }
        let req = job.etl_request()?;
        let run = job.etl_outcome().map(|o| &o.run);
        let duration = match run {
            Some(run) => run.elapsed,
            None => wall_time(job),
        };
        let (read, written, skipped, batches) = run.map_or((0, 0, 0, 0), |r| {
            (r.rows_read, r.rows_written, r.rows_skipped, r.batches)
        });
        Some(Self {
            job_id: job.id,
            source_table: req.source_table.clone(),
            target_table: req.target_table.clone(),
            state: job.state,
            started_at: job.started_at,
            finished_at: job.finished_at,
            duration,
            records_processed: read,
            records_written: written,
            records_skipped: skipped,
            records_per_second: per_second(read, duration),
            batch_count: batches,
            success_rate: run.map_or(0.0, row_acceptance),
        })
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// Whether throughput reached `threshold_rps`
    pub fn meets_threshold(&self, threshold_rps: f64) -> bool {
        self.records_per_second >= threshold_rps
    }
}

/// Scenario counts for one validation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub job_id: JobId,
    pub target_table: String,
    pub state: JobState,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    /// Percentage of scenarios that passed
    pub pass_rate: f64,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl TestMetrics {
    /// Metrics for a terminal validation job of `target_table`
    pub fn from_job(job: &Job, target_table: impl Into<String>) -> Option<Self> {
        if job.kind != JobKind::Validation || !job.is_terminal() {
            return None;
        }
        let report = job.validation_report();
        Some(Self {
            job_id: job.id,
            target_table: target_table.into(),
            state: job.state,
            finished_at: job.finished_at,
            total_tests: report.map_or(0, |r| r.scenario_results.len()),
            passed: report.map_or(0, |r| r.passed),
            failed: report.map_or(0, |r| r.failed),
            errors: report.map_or(0, |r| r.errors),
            pass_rate: report.map_or(0.0, |r| round2(r.pass_rate * 100.0)),
            duration: report.map_or_else(|| wall_time(job), |r| r.duration),
        })
    }
}

/// Data quality of one run on a 0-100 scale.
///
/// The score averages the share of source rows the run accepted with the
/// validation pass rate, when a validation ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub score: f64,
    pub row_acceptance: f64,
    pub pass_rate: Option<f64>,
}

impl QualityScore {
    pub fn from_run(run: &RunResult, validation: Option<&ValidationReport>) -> Self {
        let row_acceptance = row_acceptance(run);
        let pass_rate = validation.map(|v| round2(v.pass_rate * 100.0));
        let score = match pass_rate {
            Some(p) => round2((row_acceptance + p) / 2.0),
            None => row_acceptance,
        };
        Self {
            score,
            row_acceptance,
            pass_rate,
        }
    }
}

/// Aggregate over recorded ETL runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EtlSummary {
    pub total_jobs: usize,
    pub successful_jobs: usize,
    pub failed_jobs: usize,
    /// Percentage of jobs that succeeded
    pub success_rate: f64,
    pub total_records_processed: u64,
    #[serde(with = "duration_ms")]
    pub total_duration: Duration,
    pub average_records_per_second: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

/// Aggregate over recorded validation runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total_test_runs: usize,
    pub total_tests_executed: usize,
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_errors: usize,
    /// Percentage of executed scenarios that passed
    pub overall_pass_rate: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

/// Snapshot written by [`MetricsCollector::export_to_file`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsExport {
    pub etl_metrics: EtlSummary,
    pub test_metrics: TestSummary,
    pub per_table: BTreeMap<String, TableMetrics>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetrics {
    pub etl: EtlSummary,
    pub tests: TestSummary,
}

#[derive(Debug, Default)]
struct History {
    etl: BTreeMap<String, VecDeque<EtlMetrics>>,
    tests: BTreeMap<String, VecDeque<TestMetrics>>,
}

/// In-process metrics history, newest entry first per table
#[derive(Debug, Default)]
pub struct MetricsCollector {
    history: Mutex<History>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, History> {
        // Entries are pushed whole, so a poisoned lock still holds consistent data
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_etl(&self, metrics: EtlMetrics) {
        log::info!(
            "ETL job {} {}: {} records in {:?} ({:.1} rec/s)",
            metrics.job_id,
            metrics.state,
            metrics.records_processed,
            metrics.duration,
            metrics.records_per_second
        );
        let mut history = self.lock();
        let runs = history.etl.entry(metrics.target_table.clone()).or_default();
        runs.push_front(metrics);
        runs.truncate(ETL_HISTORY);
    }

    pub fn record_test(&self, metrics: TestMetrics) {
        log::info!(
            "Validation job {} for {}: {}/{} passed",
            metrics.job_id,
            metrics.target_table,
            metrics.passed,
            metrics.total_tests
        );
        let mut history = self.lock();
        let runs = history.tests.entry(metrics.target_table.clone()).or_default();
        runs.push_front(metrics);
        runs.truncate(TEST_HISTORY);
    }

    /// Recorded metrics of one ETL job
    pub fn etl_metrics(&self, job_id: JobId) -> Option<EtlMetrics> {
        self.lock()
            .etl
            .values()
            .flatten()
            .find(|m| m.job_id == job_id)
            .cloned()
    }

    /// Whether an ETL job reached `threshold_rps`. Unknown jobs pass.
    pub fn check_performance_threshold(&self, job_id: JobId, threshold_rps: f64) -> bool {
        match self.etl_metrics(job_id) {
            Some(m) if !m.meets_threshold(threshold_rps) => {
                log::warn!(
                    "Performance below threshold: {:.2} < {} rec/s (job {})",
                    m.records_per_second,
                    threshold_rps,
                    job_id
                );
                false
            }
            _ => true,
        }
    }

    /// ETL aggregate for one target table, or every table
    pub fn etl_summary(&self, target_table: Option<&str>) -> EtlSummary {
        let history = self.lock();
        summarize_etl(select(&history.etl, target_table))
    }

    /// Validation aggregate for one target table, or every table
    pub fn test_summary(&self, target_table: Option<&str>) -> TestSummary {
        let history = self.lock();
        summarize_tests(select(&history.tests, target_table))
    }

    pub fn export(&self) -> MetricsExport {
        let history = self.lock();
        let tables: Vec<&String> = history.etl.keys().chain(history.tests.keys()).collect();
        let per_table = tables
            .into_iter()
            .map(|t| {
                let metrics = TableMetrics {
                    etl: summarize_etl(select(&history.etl, Some(t))),
                    tests: summarize_tests(select(&history.tests, Some(t))),
                };
                (t.clone(), metrics)
            })
            .collect();
        MetricsExport {
            etl_metrics: summarize_etl(select(&history.etl, None)),
            test_metrics: summarize_tests(select(&history.tests, None)),
            per_table,
            exported_at: Utc::now(),
        }
    }

    /// Write [`MetricsCollector::export`] as pretty JSON
    pub fn export_to_file(&self, path: &Path) -> OrchestrationResult<()> {
        let failed = |message: String| OrchestrationError::MetricsExport {
            path: path.display().to_string(),
            message,
        };
        let json = serde_json::to_string_pretty(&self.export()).map_err(|e| failed(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| failed(e.to_string()))?;
        log::info!("Metrics exported to {}", path.display());
        Ok(())
    }
}

fn select<'a, T>(
    history: &'a BTreeMap<String, VecDeque<T>>,
    table: Option<&str>,
) -> Vec<&'a T> {
    match table {
        Some(t) => history.get(t).map(|runs| runs.iter().collect()).unwrap_or_default(),
        None => history.values().flatten().collect(),
    }
}

fn summarize_etl(runs: Vec<&EtlMetrics>) -> EtlSummary {
    if runs.is_empty() {
        return EtlSummary::default();
    }
    let successful_jobs = runs.iter().filter(|m| m.succeeded()).count();
    let total_records_processed: u64 = runs.iter().map(|m| m.records_processed).sum();
    let total_duration: Duration = runs.iter().map(|m| m.duration).sum();
    EtlSummary {
        total_jobs: runs.len(),
        successful_jobs,
        failed_jobs: runs.len() - successful_jobs,
        success_rate: round2(successful_jobs as f64 / runs.len() as f64 * 100.0),
        total_records_processed,
        total_duration,
        average_records_per_second: per_second(total_records_processed, total_duration),
        last_execution: runs.iter().filter_map(|m| m.finished_at).max(),
    }
}

fn summarize_tests(runs: Vec<&TestMetrics>) -> TestSummary {
    if runs.is_empty() {
        return TestSummary::default();
    }
    let total_tests_executed: usize = runs.iter().map(|m| m.total_tests).sum();
    let total_passed: usize = runs.iter().map(|m| m.passed).sum();
    TestSummary {
        total_test_runs: runs.len(),
        total_tests_executed,
        total_passed,
        total_failed: runs.iter().map(|m| m.failed).sum(),
        total_errors: runs.iter().map(|m| m.errors).sum(),
        overall_pass_rate: if total_tests_executed == 0 {
            0.0
        } else {
            round2(total_passed as f64 / total_tests_executed as f64 * 100.0)
        },
        last_execution: runs.iter().filter_map(|m| m.finished_at).max(),
    }
}

fn row_acceptance(run: &RunResult) -> f64 {
    if run.rows_read == 0 {
        return 100.0;
    }
    let accepted = run.rows_read.saturating_sub(run.rows_skipped);
    round2(accepted as f64 / run.rows_read as f64 * 100.0)
}

fn per_second(records: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        records as f64 / secs
    } else {
        0.0
    }
}

fn wall_time(job: &Job) -> Duration {
    match (job.started_at, job.finished_at) {
        (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
        _ => Duration::ZERO,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{EtlOutcome, EtlRequest, JobInput, JobResult, ValidationRequest};
    use rf_core::{TableRef, TargetEntity, TransformSpec};
    use rf_validate::ValidationReport;

    fn spec() -> TransformSpec {
        TransformSpec {
            source_entities: vec![TableRef::new("orders")],
            target_entity: TargetEntity {
                name: "totals".into(),
                primary_key: vec!["customer_id".into()],
                row_per_source_row: false,
                columns: vec![],
            },
            group_by: vec![],
            aggregations: vec![],
            filters: vec![],
            derived_columns: vec![],
            ranking: vec![],
            source_columns: vec![],
            references: vec![],
            non_nullable: vec![],
        }
    }

    fn run(read: u64, skipped: u64, millis: u64) -> RunResult {
        let mut run = RunResult::new("totals");
        run.rows_read = read;
        run.rows_skipped = skipped;
        run.rows_written = 2;
        run.batches = 3;
        run.elapsed = Duration::from_millis(millis);
        run
    }

    fn etl_job(outcome: Option<RunResult>) -> Job {
        let mut job = Job::new(1, JobInput::Etl(EtlRequest::new("orders", "totals", "rule")), None);
        job.transition(JobState::Running).unwrap();
        match outcome {
            Some(run) => {
                job.result = Some(JobResult::Etl(EtlOutcome { spec: spec(), run }));
                job.transition(JobState::Succeeded).unwrap();
            }
            None => job.transition(JobState::Failed).unwrap(),
        }
        job
    }

    fn report(passed: usize, failed: usize) -> ValidationReport {
        let mut report = ValidationReport::from_results(vec![], Duration::from_millis(10));
        report.passed = passed;
        report.failed = failed;
        report.pass_rate = passed as f64 / (passed + failed) as f64;
        report
    }

    #[test]
    fn test_throughput_and_acceptance() {
        let m = EtlMetrics::from_job(&etl_job(Some(run(1000, 50, 500)))).unwrap();
        assert_eq!(m.records_processed, 1000);
        assert_eq!(m.records_per_second, 2000.0);
        assert_eq!(m.success_rate, 95.0);
        assert_eq!(m.batch_count, 3);
        assert!(m.meets_threshold(1000.0));
        assert!(!m.meets_threshold(2500.0));
    }

    #[test]
    fn test_failed_and_live_jobs() {
        let failed = EtlMetrics::from_job(&etl_job(None)).unwrap();
        assert!(!failed.succeeded());
        assert_eq!(failed.records_processed, 0);
        assert_eq!(failed.records_per_second, 0.0);

        let pending = Job::new(2, JobInput::Etl(EtlRequest::new("orders", "totals", "rule")), None);
        assert!(EtlMetrics::from_job(&pending).is_none());
    }

    #[test]
    fn test_quality_score() {
        let r = run(200, 10, 100);
        let without = QualityScore::from_run(&r, None);
        assert_eq!(without.score, 95.0);
        assert_eq!(without.pass_rate, None);

        let with = QualityScore::from_run(&r, Some(&report(3, 1)));
        assert_eq!(with.pass_rate, Some(75.0));
        assert_eq!(with.score, 85.0);

        assert_eq!(QualityScore::from_run(&run(0, 0, 0), None).score, 100.0);
    }

    #[test]
    fn test_summaries_and_threshold() {
        let collector = MetricsCollector::new();
        let fast = EtlMetrics::from_job(&etl_job(Some(run(3000, 0, 1000)))).unwrap();
        let slow = EtlMetrics::from_job(&etl_job(Some(run(100, 0, 1000)))).unwrap();
        let failed = EtlMetrics::from_job(&etl_job(None)).unwrap();
        let (fast_id, slow_id) = (fast.job_id, slow.job_id);
        collector.record_etl(fast);
        collector.record_etl(slow);
        collector.record_etl(failed);

        let summary = collector.etl_summary(Some("totals"));
        assert_eq!(summary.total_jobs, 3);
        assert_eq!(summary.successful_jobs, 2);
        assert_eq!(summary.failed_jobs, 1);
        assert_eq!(summary.success_rate, 66.67);
        assert_eq!(summary.total_records_processed, 3100);
        assert!(collector.etl_summary(Some("other")).total_jobs == 0);

        assert!(collector.check_performance_threshold(fast_id, 1000.0));
        assert!(!collector.check_performance_threshold(slow_id, 1000.0));
        assert!(collector.check_performance_threshold(uuid::Uuid::new_v4(), 1000.0));
    }

    #[test]
    fn test_test_summary() {
        let collector = MetricsCollector::new();
        for (passed, failed) in [(3, 1), (4, 0)] {
            let mut job = Job::new(
                1,
                JobInput::Validation(ValidationRequest {
                    etl_job_id: uuid::Uuid::new_v4(),
                }),
                None,
            );
            job.transition(JobState::Running).unwrap();
            job.result = Some(JobResult::Validation(report(passed, failed)));
            job.transition(JobState::Succeeded).unwrap();
            let mut m = TestMetrics::from_job(&job, "totals").unwrap();
            m.total_tests = passed + failed;
            collector.record_test(m);
        }
        let summary = collector.test_summary(None);
        assert_eq!(summary.total_test_runs, 2);
        assert_eq!(summary.total_tests_executed, 8);
        assert_eq!(summary.total_passed, 7);
        assert_eq!(summary.overall_pass_rate, 87.5);
    }

    #[test]
    fn test_history_is_bounded() {
        let collector = MetricsCollector::new();
        let m = EtlMetrics::from_job(&etl_job(Some(run(10, 0, 10)))).unwrap();
        for _ in 0..ETL_HISTORY + 5 {
            collector.record_etl(m.clone());
        }
        assert_eq!(collector.etl_summary(None).total_jobs, ETL_HISTORY);
    }

    #[test]
    fn test_export_to_file() {
        let collector = MetricsCollector::new();
        collector.record_etl(EtlMetrics::from_job(&etl_job(Some(run(10, 0, 10)))).unwrap());
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        collector.export_to_file(&path).unwrap();

        let exported: MetricsExport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(exported.etl_metrics.total_jobs, 1);
        assert_eq!(exported.per_table["totals"].etl.total_records_processed, 10);
        assert_eq!(exported.test_metrics, TestSummary::default());

        let missing = dir.path().join("no/such/dir/metrics.json");
        assert!(matches!(
            collector.export_to_file(&missing),
            Err(OrchestrationError::MetricsExport { .. })
        ));
    }
}
