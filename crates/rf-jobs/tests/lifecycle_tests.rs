//! Job lifecycle: cancellation, timeouts, listing and request checks

mod common;

use common::*;
use rf_core::Value;
use rf_db::MemoryHandle;
use rf_jobs::{EtlRequest, ErrorKind, JobKind, JobState, OrchestrationError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Ten paid orders read one per batch, each batch delayed by `delay`
fn slow_source(delay: Duration) -> Arc<MemoryHandle> {
    let orders = (1..=10)
        .map(|i| order(i, i % 3 + 1, Value::Int(i * 10), "paid"))
        .collect();
    let source = source_with(orders);
    source.set_read_delay(Some(delay));
    source
}

fn slow_request() -> EtlRequest {
    EtlRequest::new("orders", TARGET, TOTALS_RULE).with_batch_size(1)
}

#[tokio::test]
async fn test_cancel_running_job() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator(slow_source(Duration::from_millis(100)), target.clone());

    let id = orch.submit_etl(slow_request()).await.unwrap();
    wait_until_running(&orch, id).await;
    assert!(orch.cancel(id).await.unwrap());

    let job = orch.wait(id).await.unwrap();
    assert_eq!(job.state, JobState::Cancelled);
    assert_eq!(job.error.unwrap().kind, ErrorKind::Cancelled);

    // The executor notices at its next batch and never writes
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(target.rows(TARGET).is_err());
    assert_eq!(orch.status(id).await.unwrap().state, JobState::Cancelled);
}

#[tokio::test]
async fn test_cancel_pending_terminal_and_unknown() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator_with(
        slow_source(Duration::from_millis(50)),
        target,
        config(1, 30),
    );

    let first = orch.submit_etl(slow_request()).await.unwrap();
    let second = orch.submit_etl(slow_request()).await.unwrap();
    wait_until_running(&orch, first).await;

    // The only worker is busy with the first job
    assert_eq!(orch.status(second).await.unwrap().state, JobState::Pending);
    assert!(!orch.cancel(second).await.unwrap());

    assert!(orch.cancel(first).await.unwrap());
    assert!(matches!(
        orch.cancel(first).await,
        Err(OrchestrationError::AlreadyTerminal {
            state: JobState::Cancelled,
            ..
        })
    ));

    let unknown = Uuid::new_v4();
    assert_eq!(
        orch.cancel(unknown).await,
        Err(OrchestrationError::JobNotFound(unknown))
    );

    orch.cancel(second).await.ok();
    let second = orch.wait(second).await.unwrap();
    assert!(second.is_terminal());
}

#[tokio::test]
async fn test_cancel_workflow_cancels_child() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator(slow_source(Duration::from_millis(100)), target);

    let id = orch.submit_workflow(slow_request()).await.unwrap();
    let etl = loop {
        let job = orch.status(id).await.unwrap();
        match job.child_states.and_then(|c| c.etl) {
            Some(child) if child.state == JobState::Running => break child.job_id,
            _ => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    };

    assert!(orch.cancel(id).await.unwrap());
    assert_eq!(orch.wait(id).await.unwrap().state, JobState::Cancelled);
    assert_eq!(orch.wait(etl).await.unwrap().state, JobState::Cancelled);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let job = orch.status(id).await.unwrap();
    assert!(job.child_states.unwrap().validation.is_none());
}

#[tokio::test]
async fn test_timeout_fails_job() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator_with(
        slow_source(Duration::from_millis(300)),
        target.clone(),
        config(2, 1),
    );

    let id = orch.submit_etl(slow_request()).await.unwrap();
    let job = orch.wait(id).await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    let err = job.error.unwrap();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.code.as_deref(), Some("X003"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(orch.status(id).await.unwrap().state, JobState::Failed);
    assert!(target.rows(TARGET).is_err());
}

#[tokio::test]
async fn test_list_jobs_newest_first() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator(source_with(two_customer_orders()), target);

    let a = orch
        .submit_etl(EtlRequest::new("orders", TARGET, TOTALS_RULE))
        .await
        .unwrap();
    let b = orch
        .submit_etl(EtlRequest::new("orders", TARGET, "not a known rule"))
        .await
        .unwrap();
    let w = orch
        .submit_workflow(EtlRequest::new("orders", TARGET, TOTALS_RULE))
        .await
        .unwrap();
    for id in [a, b, w] {
        orch.wait(id).await.unwrap();
    }

    let all = orch.list_jobs(None, None).await.unwrap();
    // Workflow, its two children, then the two ETL jobs
    assert_eq!(all.len(), 5);
    assert!(all.windows(2).all(|p| p[0].seq > p[1].seq));

    let top: Vec<_> = orch
        .list_jobs(None, None)
        .await
        .unwrap()
        .into_iter()
        .filter(|j| j.parent_id.is_none())
        .map(|j| j.id)
        .collect();
    assert_eq!(top, vec![w, b, a]);

    let failed = orch
        .list_jobs(Some(JobKind::Etl), Some(JobState::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, b);

    let workflows = orch.list_jobs(Some(JobKind::Workflow), None).await.unwrap();
    assert_eq!(workflows.len(), 1);
    let children = workflows[0].child_states.unwrap();
    let etl_child = orch.status(children.etl.unwrap().job_id).await.unwrap();
    assert_eq!(etl_child.parent_id, Some(w));
}

#[tokio::test]
async fn test_invalid_requests_are_rejected() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator(source_with(two_customer_orders()), target);

    let bad = [
        EtlRequest::new("", TARGET, TOTALS_RULE),
        EtlRequest::new("orders", "", TOTALS_RULE),
        EtlRequest::new("orders", TARGET, "   "),
        EtlRequest::new("orders", TARGET, TOTALS_RULE).with_batch_size(0),
    ];
    for req in bad {
        assert!(matches!(
            orch.submit_etl(req.clone()).await,
            Err(OrchestrationError::InvalidRequest { .. })
        ));
        assert!(matches!(
            orch.submit_workflow(req).await,
            Err(OrchestrationError::InvalidRequest { .. })
        ));
    }
    assert!(orch.list_jobs(None, None).await.unwrap().is_empty());

    let missing = Uuid::new_v4();
    assert_eq!(
        orch.submit_validation(missing).await,
        Err(OrchestrationError::JobNotFound(missing))
    );

    let w = orch
        .submit_workflow(EtlRequest::new("orders", TARGET, TOTALS_RULE))
        .await
        .unwrap();
    assert!(matches!(
        orch.submit_validation(w).await,
        Err(OrchestrationError::InvalidRequest { .. })
    ));
    assert_eq!(
        orch.status(missing).await,
        Err(OrchestrationError::JobNotFound(missing))
    );
}

#[tokio::test]
async fn test_report_requires_finished_job() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator(slow_source(Duration::from_millis(50)), target);

    let id = orch.submit_etl(slow_request()).await.unwrap();
    assert!(matches!(
        orch.get_report(id).await,
        Err(OrchestrationError::JobNotFinished { .. })
    ));

    let job = orch.wait(id).await.unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    let report = orch.get_report(id).await.unwrap();
    assert_eq!(report.kind, JobKind::Etl);
    assert_eq!(report.run.unwrap().rows_read, 10);
    assert!(report.validation.is_none());
    assert_eq!(report.scenario_count, 0);
}

#[tokio::test]
async fn test_shutdown_rejects_new_jobs() {
    let target = Arc::new(MemoryHandle::new());
    let orch = orchestrator(source_with(two_customer_orders()), target);

    let id = orch
        .submit_etl(EtlRequest::new("orders", TARGET, TOTALS_RULE))
        .await
        .unwrap();
    orch.shutdown().await;

    // Queued work drains before the workers exit
    assert_eq!(orch.status(id).await.unwrap().state, JobState::Succeeded);
    assert_eq!(
        orch.submit_etl(EtlRequest::new("orders", TARGET, TOTALS_RULE))
            .await,
        Err(OrchestrationError::ShutDown)
    );
}
