//! Final reports

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::job::{ErrorInfo, Job, JobId, JobKind};
use crate::metrics::{EtlMetrics, QualityScore};
use crate::state::JobState;
use chrono::{DateTime, Utc};
use rf_core::{RunResult, TransformSpec};
use rf_validate::ValidationReport;
use serde::{Deserialize, Serialize};

/// Run and validation evidence for one finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Id of the job the report describes
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub transform: Option<TransformSpec>,
    pub run: Option<RunResult>,
    pub validation: Option<ValidationReport>,
    pub scenario_count: usize,
    /// Throughput of the ETL run
    #[serde(default)]
    pub metrics: Option<EtlMetrics>,
    #[serde(default)]
    pub quality: Option<QualityScore>,
    pub error: Option<ErrorInfo>,
    pub generated_at: DateTime<Utc>,
}

/// Merges run results and validation reports into [`Report`]s
pub struct ReportBuilder;

impl ReportBuilder {
    /// Build the report for a terminal job.
    ///
    /// `children` are the job's workflow children (ignored for other kinds);
    /// a validation job passes its ETL job so the run is included.
    pub fn build(job: &Job, children: &[Job]) -> OrchestrationResult<Report> {
        if !job.is_terminal() {
            return Err(OrchestrationError::JobNotFinished {
                job_id: job.id,
                state: job.state,
            });
        }

        let etl_job = std::iter::once(job)
            .chain(children)
            .find(|j| j.etl_outcome().is_some());
        let etl = etl_job.and_then(Job::etl_outcome);
        let validation = std::iter::once(job)
            .chain(children)
            .find_map(|j| j.validation_report())
            .cloned();
        let error = job
            .error
            .clone()
            .or_else(|| children.iter().find_map(|c| c.error.clone()));

        Ok(Report {
            job_id: job.id,
            kind: job.kind,
            state: job.state,
            transform: etl.map(|o| o.spec.clone()),
            run: etl.map(|o| o.run.clone()),
            scenario_count: validation
                .as_ref()
                .map_or(0, |v| v.scenario_results.len()),
            metrics: etl_job.and_then(EtlMetrics::from_job),
            quality: etl.map(|o| QualityScore::from_run(&o.run, validation.as_ref())),
            validation,
            error,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{EtlOutcome, EtlRequest, ErrorKind, JobInput, JobResult};

    fn etl_job() -> Job {
        Job::new(1, JobInput::Etl(EtlRequest::new("orders", "totals", "rule")), None)
    }

    #[test]
    fn test_unfinished_job_has_no_report() {
        let job = etl_job();
        assert_eq!(
            ReportBuilder::build(&job, &[]),
            Err(OrchestrationError::JobNotFinished {
                job_id: job.id,
                state: JobState::Pending
            })
        );
    }

    #[test]
    fn test_failed_workflow_reports_child_error() {
        let mut wf = Job::new(
            2,
            JobInput::Workflow(EtlRequest::new("orders", "totals", "rule")),
            None,
        );
        let mut child = etl_job();
        child.parent_id = Some(wf.id);
        child.transition(JobState::Running).unwrap();
        child.error = Some(ErrorInfo::new(ErrorKind::Compile, child.id, "[C002] boom"));
        child.transition(JobState::Failed).unwrap();
        wf.transition(JobState::Running).unwrap();
        wf.transition(JobState::Failed).unwrap();

        let report = ReportBuilder::build(&wf, &[child]).unwrap();
        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.scenario_count, 0);
        assert!(report.run.is_none());
        assert_eq!(
            report.error.and_then(|e| e.code),
            Some("C002".to_string())
        );
    }

    #[test]
    fn test_report_carries_throughput_and_quality() {
        let mut etl = etl_job();
        etl.transition(JobState::Running).unwrap();
        let mut run = RunResult::new("totals");
        run.rows_read = 40;
        run.rows_skipped = 4;
        run.elapsed = std::time::Duration::from_millis(200);
        etl.result = Some(JobResult::Etl(EtlOutcome {
            spec: TransformSpec {
                source_entities: vec![],
                target_entity: rf_core::TargetEntity {
                    name: "totals".into(),
                    primary_key: vec![],
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
            },
            run,
        }));
        etl.transition(JobState::Succeeded).unwrap();

        let report = ReportBuilder::build(&etl, &[]).unwrap();
        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.records_processed, 40);
        assert_eq!(metrics.records_per_second, 200.0);
        let quality = report.quality.unwrap();
        assert_eq!(quality.score, 90.0);
        assert_eq!(quality.pass_rate, None);
    }
}
