//! Job model

use crate::error::OrchestrationResult;
use crate::state::{validate_transition, JobState};
use chrono::{DateTime, Utc};
use rf_core::{ExecConfig, RunResult, TransformSpec};
use rf_validate::ValidationReport;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type JobId = Uuid;

/// What a job does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// Compile a rule and run it
    Etl,
    /// Synthesize and evaluate scenarios for a finished ETL job
    Validation,
    /// One ETL child followed by one validation child
    Workflow,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobKind::Etl => "ETL",
            JobKind::Validation => "VALIDATION",
            JobKind::Workflow => "WORKFLOW",
        };
        f.write_str(s)
    }
}

/// Rule to compile and run from a source table into a target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlRequest {
    pub source_table: String,
    pub target_table: String,
    pub rule_text: String,
    pub batch_size: usize,
    /// Overrides `execution.strict` from the configuration
    #[serde(default)]
    pub strict: Option<bool>,
}

impl EtlRequest {
    pub fn new(
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        rule_text: impl Into<String>,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            target_table: target_table.into(),
            rule_text: rule_text.into(),
            batch_size: ExecConfig::default().batch_size,
            strict: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }
}

/// Validate the output of an ETL job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub etl_job_id: JobId,
}

/// Submitted input of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobInput {
    Etl(EtlRequest),
    Validation(ValidationRequest),
    Workflow(EtlRequest),
}

/// Compiled rule plus the run it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlOutcome {
    pub spec: TransformSpec,
    pub run: RunResult,
}

/// Result attached to a succeeded job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    Etl(EtlOutcome),
    Validation(ValidationReport),
}

/// Error category recorded on a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Compile,
    Execution,
    Timeout,
    Cancelled,
    Validation,
    Orchestration,
}

/// Structured error attached to a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// Bracketed code from the error message, e.g. `X001`
    pub code: Option<String>,
    pub message: String,
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, job_id: JobId, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            code: error_code(&message),
            message,
            job_id,
            occurred_at: Utc::now(),
        }
    }
}

/// `"[X001] Data integrity ..."` -> `Some("X001")`
fn error_code(message: &str) -> Option<String> {
    let rest = message.strip_prefix('[')?;
    let end = rest.find(']')?;
    Some(rest[..end].to_string())
}

/// A workflow child and its last known state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRef {
    pub job_id: JobId,
    pub state: JobState,
}

/// Children of a workflow job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildStates {
    pub etl: Option<ChildRef>,
    pub validation: Option<ChildRef>,
}

/// A tracked unit of work, mutated only through state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Position in the orchestrator's submission sequence
    pub seq: u64,
    pub kind: JobKind,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input: JobInput,
    pub result: Option<JobResult>,
    pub error: Option<ErrorInfo>,
    pub parent_id: Option<JobId>,
    /// Set for workflow jobs only
    pub child_states: Option<ChildStates>,
}

impl Job {
    /// A fresh PENDING job
    pub fn new(seq: u64, input: JobInput, parent_id: Option<JobId>) -> Self {
        let kind = match &input {
            JobInput::Etl(_) => JobKind::Etl,
            JobInput::Validation(_) => JobKind::Validation,
            JobInput::Workflow(_) => JobKind::Workflow,
        };
        Self {
            id: Uuid::new_v4(),
            seq,
            kind,
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            input,
            result: None,
            error: None,
            parent_id,
            child_states: (kind == JobKind::Workflow).then(ChildStates::default),
        }
    }

    /// Move to `to`, stamping start and finish times
    pub fn transition(&mut self, to: JobState) -> OrchestrationResult<()> {
        validate_transition(self.id, self.state, to)?;
        let now = Utc::now();
        if to == JobState::Running {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        self.state = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn etl_outcome(&self) -> Option<&EtlOutcome> {
        match &self.result {
            Some(JobResult::Etl(outcome)) => Some(outcome),
            _ => None,
        }
    }

    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match &self.result {
            Some(JobResult::Validation(report)) => Some(report),
            _ => None,
        }
    }

    /// ETL parameters of an ETL or workflow job
    pub fn etl_request(&self) -> Option<&EtlRequest> {
        match &self.input {
            JobInput::Etl(req) | JobInput::Workflow(req) => Some(req),
            JobInput::Validation(_) => None,
        }
    }
}
