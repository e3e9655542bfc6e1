//! Job orchestrator and worker pool
//!
//! Submissions are saved as PENDING and their ids queued on an mpsc channel
//! that a fixed number of worker tasks drain. Every state change goes
//! through [`Inner::update`], which serializes read-modify-write cycles on
//! the store and wakes [`JobOrchestrator::wait`]ers when a job finishes.
//!
//! Workflow children run inline on the worker that owns the workflow, so a
//! workflow never waits on a queue slot held by itself.

use crate::error::{OrchestrationError, OrchestrationResult};
use crate::job::{
    ChildRef, ErrorInfo, ErrorKind, EtlOutcome, EtlRequest, Job, JobId, JobInput, JobKind,
    JobResult, ValidationRequest,
};
use crate::metrics::{EtlMetrics, MetricsCollector, TestMetrics};
use crate::report::{Report, ReportBuilder};
use crate::state::JobState;
use crate::store::{InMemoryJobStore, JobStore};
use rf_compile::{CompileError, CompileOptions, Interpreter, RuleCompiler};
use rf_core::{AggregateRegistry, Config};
use rf_db::{DataHandle, DbError};
use rf_exec::{ExecutionError, PlanExecutor};
use rf_validate::{ValidationError, ValidationReport, ValidationSynthesizer, Validator};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why a job did not succeed
#[derive(Debug, Clone)]
struct JobFailure {
    kind: ErrorKind,
    message: String,
}

impl JobFailure {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn cancelled() -> Self {
        Self::from(ExecutionError::Cancelled { batches: 0 })
    }
}

impl From<CompileError> for JobFailure {
    fn from(err: CompileError) -> Self {
        Self::new(ErrorKind::Compile, err.to_string())
    }
}

impl From<ExecutionError> for JobFailure {
    fn from(err: ExecutionError) -> Self {
        let kind = match err {
            ExecutionError::Cancelled { .. } => ErrorKind::Cancelled,
            ExecutionError::Timeout { .. } => ErrorKind::Timeout,
            _ => ErrorKind::Execution,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<DbError> for JobFailure {
    fn from(err: DbError) -> Self {
        ExecutionError::from(err).into()
    }
}

impl From<ValidationError> for JobFailure {
    fn from(err: ValidationError) -> Self {
        Self::new(ErrorKind::Validation, err.to_string())
    }
}

impl From<OrchestrationError> for JobFailure {
    fn from(err: OrchestrationError) -> Self {
        Self::new(ErrorKind::Orchestration, err.to_string())
    }
}

type Outcome = Result<Option<JobResult>, JobFailure>;
type ChildRun = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// State shared between the orchestrator handle and its workers
struct Inner {
    store: Arc<dyn JobStore>,
    compiler: RuleCompiler,
    executor: PlanExecutor,
    synthesizer: ValidationSynthesizer,
    validator: Validator,
    source: Arc<dyn DataHandle>,
    target: Arc<dyn DataHandle>,
    config: Config,
    seq: AtomicU64,
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
    table_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    updates: tokio::sync::Mutex<()>,
    finished: Notify,
    metrics: MetricsCollector,
}

impl Inner {
    async fn load(&self, id: JobId) -> OrchestrationResult<Job> {
        self.store
            .load(id)
            .await?
            .ok_or(OrchestrationError::JobNotFound(id))
    }

    /// Load, mutate and save one job under the update lock.
    ///
    /// Nothing is saved when `f` fails. State changes are logged, mirrored
    /// into the parent workflow's child states, and wake waiters once the
    /// job is terminal.
    async fn update<F>(&self, id: JobId, f: F) -> OrchestrationResult<Job>
    where
        F: FnOnce(&mut Job) -> OrchestrationResult<()> + Send,
    {
        let _guard = self.updates.lock().await;
        let mut job = self.load(id).await?;
        let before = job.state;
        f(&mut job)?;
        self.store.save(&job).await?;
        if job.state != before {
            log::info!("Job {} ({}) {} -> {}", job.id, job.kind, before, job.state);
            if let Some(parent) = job.parent_id {
                self.sync_child_state(parent, &job).await?;
            }
            if job.is_terminal() {
                self.record_metrics(&job).await;
                self.finished.notify_waiters();
            }
        }
        Ok(job)
    }

    /// Record `child`'s state on its parent workflow. Caller holds the update lock.
    async fn sync_child_state(&self, parent_id: JobId, child: &Job) -> OrchestrationResult<()> {
        let mut parent = self.load(parent_id).await?;
        let Some(children) = parent.child_states.as_mut() else {
            return Ok(());
        };
        let slot = ChildRef {
            job_id: child.id,
            state: child.state,
        };
        match child.kind {
            JobKind::Etl => children.etl = Some(slot),
            JobKind::Validation => children.validation = Some(slot),
            JobKind::Workflow => return Ok(()),
        }
        self.store.save(&parent).await
    }

    /// Save a new PENDING job, linking it to its parent workflow
    async fn create_job(&self, input: JobInput, parent_id: Option<JobId>) -> OrchestrationResult<Job> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let job = Job::new(seq, input, parent_id);
        let _guard = self.updates.lock().await;
        self.store.save(&job).await?;
        if let Some(parent) = parent_id {
            self.sync_child_state(parent, &job).await?;
        }
        log::info!("Submitted {} job {} (#{})", job.kind, job.id, job.seq);
        Ok(job)
    }

    /// Add a terminal ETL or validation job to the metrics history
    async fn record_metrics(&self, job: &Job) {
        match &job.input {
            JobInput::Etl(_) => {
                if let Some(metrics) = EtlMetrics::from_job(job) {
                    let threshold = self.config.jobs.performance_threshold_rps;
                    if metrics.succeeded() && !metrics.meets_threshold(threshold) {
                        log::warn!(
                            "Job {} ran at {:.1} rec/s, below the {} rec/s threshold",
                            job.id,
                            metrics.records_per_second,
                            threshold
                        );
                    }
                    self.metrics.record_etl(metrics);
                }
            }
            JobInput::Validation(req) => {
                let target = match self.load(req.etl_job_id).await {
                    Ok(etl) => etl.etl_request().map(|r| r.target_table.clone()),
                    Err(_) => None,
                };
                let target = target.unwrap_or_else(|| "unknown".to_string());
                if let Some(metrics) = TestMetrics::from_job(job, target) {
                    self.metrics.record_test(metrics);
                }
            }
            JobInput::Workflow(_) => {}
        }
    }

    fn register_token(&self, id: JobId, parent: Option<&CancellationToken>) -> CancellationToken {
        let token = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(id, token.clone());
        }
        token
    }

    fn release_token(&self, id: JobId) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.remove(&id);
        }
    }

    fn cancel_token(&self, id: JobId) {
        let token = self.tokens.lock().ok().and_then(|t| t.get(&id).cloned());
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Write lock for a target table, shared by every ETL job writing it
    fn table_lock(&self, table: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.table_locks.lock() {
            Ok(mut locks) => locks
                .entry(table.to_ascii_lowercase())
                .or_default()
                .clone(),
            // A poisoned map only loses sharing; fall back to a private lock
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.config.jobs.timeout_secs)
    }

    /// Run one PENDING job to a terminal state
    async fn run_job(self: Arc<Self>, id: JobId, parent: Option<CancellationToken>) {
        let token = self.register_token(id, parent.as_ref());
        let job = match self.update(id, |j| j.transition(JobState::Running)).await {
            Ok(job) => job,
            Err(e) => {
                log::warn!("Job {} not started: {}", id, e);
                self.release_token(id);
                return;
            }
        };

        // A parent cancelled between creating this job and starting it
        if token.is_cancelled() {
            self.finish(id, Err(JobFailure::cancelled()), &token).await;
            self.release_token(id);
            return;
        }

        let timeout = self.job_timeout();
        let mut work = std::pin::pin!(self.execute(&job, &token));
        tokio::select! {
            outcome = &mut work => self.finish(id, outcome, &token).await,
            _ = tokio::time::sleep(timeout) => {
                log::warn!("Job {} exceeded its {:?} timeout", id, timeout);
                let err = ExecutionError::Timeout { seconds: timeout.as_secs() };
                self.finish(id, Err(err.into()), &token).await;
                token.cancel();
                // In-flight work stops at its next checkpoint
                let _ = work.await;
            }
        }
        self.release_token(id);
    }

    fn run_child(self: &Arc<Self>, id: JobId, parent: &CancellationToken) -> ChildRun {
        Box::pin(Arc::clone(self).run_job(id, Some(parent.clone())))
    }

    /// Attach the outcome unless the job already reached a terminal state
    async fn finish(&self, id: JobId, outcome: Outcome, token: &CancellationToken) {
        let result = self
            .update(id, |job| match outcome {
                Ok(result) => {
                    job.transition(JobState::Succeeded)?;
                    job.result = result;
                    Ok(())
                }
                Err(failure) => {
                    let state = if failure.kind == ErrorKind::Cancelled && token.is_cancelled() {
                        JobState::Cancelled
                    } else {
                        JobState::Failed
                    };
                    job.transition(state)?;
                    log::warn!("Job {} {}: {}", job.id, state, failure.message);
                    job.error = Some(ErrorInfo::new(failure.kind, job.id, failure.message));
                    Ok(())
                }
            })
            .await;
        if let Err(e) = result {
            log::debug!("Discarding outcome of job {}: {}", id, e);
        }
    }

    async fn execute(self: &Arc<Self>, job: &Job, token: &CancellationToken) -> Outcome {
        match &job.input {
            JobInput::Etl(req) => Ok(Some(JobResult::Etl(self.run_etl(req, token).await?))),
            JobInput::Validation(req) => Ok(Some(JobResult::Validation(
                self.run_validation(req, token).await?,
            ))),
            JobInput::Workflow(req) => {
                self.run_workflow(job, req, token).await?;
                Ok(None)
            }
        }
    }

    async fn run_etl(&self, req: &EtlRequest, token: &CancellationToken) -> Result<EtlOutcome, JobFailure> {
        let schema = self.source.schema().await?;
        let options = CompileOptions::tables(req.source_table.clone(), req.target_table.clone());
        let spec = self
            .compiler
            .compile_with(&req.rule_text, &schema, &options)
            .await?;
        if token.is_cancelled() {
            return Err(JobFailure::cancelled());
        }

        let lock = self.table_lock(&spec.target_entity.name);
        let _write_guard = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(JobFailure::cancelled()),
            guard = lock.lock_owned() => guard,
        };

        let mut cfg = self.config.execution.clone();
        if let Some(strict) = req.strict {
            cfg.strict = strict;
        }
        let run = self
            .executor
            .execute(&spec, req.batch_size, &cfg, token)
            .await?;
        Ok(EtlOutcome { spec, run })
    }

    async fn run_validation(
        &self,
        req: &ValidationRequest,
        token: &CancellationToken,
    ) -> Result<ValidationReport, JobFailure> {
        let etl = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(JobFailure::cancelled()),
            job = self.wait_terminal(req.etl_job_id) => job?,
        };
        let outcome = match (etl.state, etl.etl_outcome()) {
            (JobState::Succeeded, Some(outcome)) => outcome,
            (state, _) => {
                return Err(JobFailure::new(
                    ErrorKind::Orchestration,
                    format!("ETL job {} finished {}; nothing to validate", etl.id, state),
                ))
            }
        };

        let scenarios = self.synthesizer.synthesize(&outcome.spec, &outcome.run);
        let mut report = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(JobFailure::cancelled()),
            report = self.validator.validate(&scenarios, self.source.as_ref(), self.target.as_ref()) => report,
        };
        let table = &outcome.spec.target_entity.name;
        match self.validator.summarize(self.target.as_ref(), table).await {
            Ok(stats) => report.statistics = Some(stats),
            Err(e) => log::warn!("No statistics for {}: {}", table, e),
        }
        Ok(report)
    }

    /// ETL child, then (only if it succeeded) the validation child
    async fn run_workflow(
        self: &Arc<Self>,
        job: &Job,
        req: &EtlRequest,
        token: &CancellationToken,
    ) -> Result<(), JobFailure> {
        let etl = self.create_job(JobInput::Etl(req.clone()), Some(job.id)).await?;
        self.run_child(etl.id, token).await;
        let etl = self.load(etl.id).await?;
        if etl.state != JobState::Succeeded {
            return Err(child_failure(&etl));
        }
        if token.is_cancelled() {
            return Err(JobFailure::cancelled());
        }

        let validation = self
            .create_job(
                JobInput::Validation(ValidationRequest { etl_job_id: etl.id }),
                Some(job.id),
            )
            .await?;
        // The child inherits the workflow's token, so a cancel that landed
        // after the check above stops it before it reads anything
        self.run_child(validation.id, token).await;
        if token.is_cancelled() {
            return Err(JobFailure::cancelled());
        }
        let validation = self.load(validation.id).await?;
        if validation.state != JobState::Succeeded {
            return Err(child_failure(&validation));
        }
        Ok(())
    }

    /// Resolve once `id` is terminal
    async fn wait_terminal(&self, id: JobId) -> OrchestrationResult<Job> {
        loop {
            let notified = self.finished.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();
            let job = self.load(id).await?;
            if job.is_terminal() {
                return Ok(job);
            }
            notified.await;
        }
    }
}

/// Workflow failure caused by `child`. The child's message leads so its
/// error code carries over to the workflow.
fn child_failure(child: &Job) -> JobFailure {
    let origin = format!("{} child {} finished {}", child.kind, child.id, child.state);
    let Some(err) = child.error.as_ref() else {
        return JobFailure::new(ErrorKind::Orchestration, origin);
    };
    let kind = match err.kind {
        // A child cancelled on its own fails the workflow rather than cancelling it
        ErrorKind::Cancelled => ErrorKind::Orchestration,
        kind => kind,
    };
    JobFailure::new(kind, format!("{} ({})", err.message, origin))
}

/// Builder for [`JobOrchestrator`]
pub struct OrchestratorBuilder {
    interpreter: Arc<dyn Interpreter>,
    source: Arc<dyn DataHandle>,
    target: Arc<dyn DataHandle>,
    config: Config,
    store: Option<Arc<dyn JobStore>>,
    registry: Option<Arc<AggregateRegistry>>,
}

impl OrchestratorBuilder {
    pub fn new(
        interpreter: Arc<dyn Interpreter>,
        source: Arc<dyn DataHandle>,
        target: Arc<dyn DataHandle>,
    ) -> Self {
        Self {
            interpreter,
            source,
            target,
            config: Config::default(),
            store: None,
            registry: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Job store; an [`InMemoryJobStore`] when not set
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Aggregate registry shared by compiler, executor and validator
    pub fn registry(mut self, registry: Arc<AggregateRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Spawn the worker pool. Must be called inside a Tokio runtime.
    pub fn start(self) -> JobOrchestrator {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(AggregateRegistry::with_builtins()));
        let config = self.config;
        let inner = Arc::new(Inner {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryJobStore::new())),
            compiler: RuleCompiler::new(self.interpreter)
                .with_registry(registry.clone())
                .with_config(&config),
            executor: PlanExecutor::new(self.source.clone(), self.target.clone())
                .with_registry(registry.clone()),
            synthesizer: ValidationSynthesizer::new(registry.clone())
                .with_config(&config.validation),
            validator: Validator::new(registry).with_batch_size(config.execution.batch_size),
            source: self.source,
            target: self.target,
            seq: AtomicU64::new(0),
            tokens: Mutex::new(HashMap::new()),
            table_locks: Mutex::new(HashMap::new()),
            updates: tokio::sync::Mutex::new(()),
            finished: Notify::new(),
            metrics: MetricsCollector::new(),
            config,
        });

        let (sender, receiver) = mpsc::unbounded_channel::<JobId>();
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..inner.config.jobs.workers)
            .map(|n| {
                let inner = Arc::clone(&inner);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move {
                    loop {
                        let next = receiver.lock().await.recv().await;
                        let Some(id) = next else { break };
                        log::debug!("Worker {} picked up job {}", n, id);
                        Arc::clone(&inner).run_job(id, None).await;
                    }
                    log::debug!("Worker {} stopped", n);
                })
            })
            .collect();
        log::info!(
            "Job orchestrator started with {} workers",
            inner.config.jobs.workers
        );

        JobOrchestrator {
            inner,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }
}

/// Submits, tracks and cancels ETL, validation and workflow jobs
pub struct JobOrchestrator {
    inner: Arc<Inner>,
    sender: Mutex<Option<mpsc::UnboundedSender<JobId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobOrchestrator {
    pub fn builder(
        interpreter: Arc<dyn Interpreter>,
        source: Arc<dyn DataHandle>,
        target: Arc<dyn DataHandle>,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(interpreter, source, target)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Queue an ETL job; returns as soon as the job is saved
    pub async fn submit_etl(&self, request: EtlRequest) -> OrchestrationResult<JobId> {
        check_etl_request(&request)?;
        self.submit(JobInput::Etl(request)).await
    }

    /// Queue validation of an ETL job's output
    pub async fn submit_validation(&self, etl_job_id: JobId) -> OrchestrationResult<JobId> {
        let etl = self.inner.load(etl_job_id).await?;
        if etl.kind != JobKind::Etl {
            return Err(OrchestrationError::invalid(format!(
                "job {} is a {} job, not an ETL job",
                etl_job_id, etl.kind
            )));
        }
        self.submit(JobInput::Validation(ValidationRequest { etl_job_id }))
            .await
    }

    /// Queue an ETL run followed by validation of its output
    pub async fn submit_workflow(&self, request: EtlRequest) -> OrchestrationResult<JobId> {
        check_etl_request(&request)?;
        self.submit(JobInput::Workflow(request)).await
    }

    async fn submit(&self, input: JobInput) -> OrchestrationResult<JobId> {
        let sender = self
            .sender
            .lock()
            .ok()
            .and_then(|s| s.clone())
            .ok_or(OrchestrationError::ShutDown)?;
        let job = self.inner.create_job(input, None).await?;
        sender
            .send(job.id)
            .map_err(|_| OrchestrationError::ShutDown)?;
        Ok(job.id)
    }

    /// Throughput and pass-rate history of finished jobs
    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.metrics
    }

    /// Whether an ETL job met the configured throughput threshold
    pub fn check_performance_threshold(&self, id: JobId) -> bool {
        self.inner
            .metrics
            .check_performance_threshold(id, self.inner.config.jobs.performance_threshold_rps)
    }

    /// Write the metrics history summary as JSON to `path`
    pub fn export_metrics(&self, path: &Path) -> OrchestrationResult<()> {
        self.inner.metrics.export_to_file(path)
    }

    /// Snapshot of a job; never waits on job execution
    pub async fn status(&self, id: JobId) -> OrchestrationResult<Job> {
        self.inner.load(id).await
    }

    /// Jobs matching the filters, newest first
    pub async fn list_jobs(
        &self,
        kind: Option<JobKind>,
        state: Option<JobState>,
    ) -> OrchestrationResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .inner
            .store
            .list()
            .await?
            .into_iter()
            .filter(|j| kind.map_or(true, |k| j.kind == k))
            .filter(|j| state.map_or(true, |s| j.state == s))
            .collect();
        jobs.sort_by(|a, b| b.seq.cmp(&a.seq));
        Ok(jobs)
    }

    /// Resolve once the job reaches a terminal state
    pub async fn wait(&self, id: JobId) -> OrchestrationResult<Job> {
        self.inner.wait_terminal(id).await
    }

    /// Request cancellation of a running job.
    ///
    /// Returns `Ok(true)` when the job was RUNNING and is now CANCELLED; it
    /// will not reach SUCCEEDED afterwards, though a write already being
    /// committed may still land. A PENDING job is left alone (`Ok(false)`).
    /// Cancelling a workflow also cancels its running child.
    pub async fn cancel(&self, id: JobId) -> OrchestrationResult<bool> {
        let cancelled = self
            .inner
            .update(id, |job| {
                job.transition(JobState::Cancelled)?;
                job.error = Some(ErrorInfo::new(
                    ErrorKind::Cancelled,
                    job.id,
                    "cancelled by request",
                ));
                Ok(())
            })
            .await;
        let job = match cancelled {
            Ok(job) => job,
            Err(OrchestrationError::InvalidTransition {
                from: JobState::Pending,
                ..
            }) => {
                log::info!("Job {} is still pending; not cancelled", id);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        self.inner.cancel_token(id);

        if let Some(children) = job.child_states {
            for child in [children.etl, children.validation].into_iter().flatten() {
                if child.state != JobState::Running {
                    continue;
                }
                let res = self
                    .inner
                    .update(child.job_id, |c| {
                        c.transition(JobState::Cancelled)?;
                        c.error = Some(ErrorInfo::new(
                            ErrorKind::Cancelled,
                            c.id,
                            format!("parent workflow {} cancelled", id),
                        ));
                        Ok(())
                    })
                    .await;
                if let Err(e) = res {
                    log::debug!("Child {} of {} not cancelled: {}", child.job_id, id, e);
                }
            }
        }
        Ok(true)
    }

    /// Report for a terminal job
    pub async fn get_report(&self, id: JobId) -> OrchestrationResult<Report> {
        let job = self.inner.load(id).await?;
        let mut related = Vec::new();
        match (&job.input, job.child_states.clone()) {
            (JobInput::Validation(req), _) => related.push(self.inner.load(req.etl_job_id).await?),
            (_, Some(children)) => {
                for child in [children.etl, children.validation].into_iter().flatten() {
                    related.push(self.inner.load(child.job_id).await?);
                }
            }
            _ => {}
        }
        ReportBuilder::build(&job, &related)
    }

    /// Stop accepting jobs and wait for the workers to drain the queue
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let workers: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut w) => w.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for worker in workers {
            if let Err(e) = worker.await {
                log::warn!("Worker task ended abnormally: {}", e);
            }
        }
        log::info!("Job orchestrator shut down");
    }
}

fn check_etl_request(request: &EtlRequest) -> OrchestrationResult<()> {
    if request.source_table.trim().is_empty() {
        return Err(OrchestrationError::invalid("source table is empty"));
    }
    if request.target_table.trim().is_empty() {
        return Err(OrchestrationError::invalid("target table is empty"));
    }
    if request.rule_text.trim().is_empty() {
        return Err(OrchestrationError::invalid("rule text is empty"));
    }
    if request.batch_size == 0 {
        return Err(OrchestrationError::invalid(
            "batch size must be greater than 0",
        ));
    }
    Ok(())
}
