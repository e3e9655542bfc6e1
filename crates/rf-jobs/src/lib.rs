//! rf-jobs - Job orchestration for Ruleflow
//!
//! [`JobOrchestrator`] accepts ETL, validation and workflow submissions,
//! queues them for a fixed pool of worker tasks, and moves each job through
//! the `PENDING -> RUNNING -> {SUCCEEDED, FAILED, CANCELLED}` state machine.
//! Jobs are kept in an injected [`JobStore`]; finished jobs are turned into
//! [`Report`]s by [`ReportBuilder`], and their throughput and pass rates
//! are kept by a [`MetricsCollector`].

pub mod error;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod state;
pub mod store;

pub use error::{OrchestrationError, OrchestrationResult};
pub use job::{
    ChildRef, ChildStates, ErrorInfo, ErrorKind, EtlOutcome, EtlRequest, Job, JobId, JobInput,
    JobKind, JobResult, ValidationRequest,
};
pub use metrics::{
    EtlMetrics, EtlSummary, MetricsCollector, MetricsExport, QualityScore, TestMetrics, TestSummary,
};
pub use orchestrator::{JobOrchestrator, OrchestratorBuilder};
pub use report::{Report, ReportBuilder};
pub use state::{allowed_transitions, validate_transition, JobState};
pub use store::{InMemoryJobStore, JobStore};
