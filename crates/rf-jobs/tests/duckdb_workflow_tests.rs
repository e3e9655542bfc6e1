//! Workflow against DuckDB handles opened from a config file

mod common;

use common::{interpreter, TARGET, TOTALS_RULE};
use rf_core::Config;
use rf_db::{DataHandle, DuckDbHandle};
use rf_jobs::{EtlRequest, JobOrchestrator, JobState};
use std::sync::Arc;
use tempfile::TempDir;

fn write_config(dir: &TempDir) -> Config {
    let target = dir.path().join("warehouse.duckdb");
    let yaml = format!(
        "database:\n  source:\n    path: \":memory:\"\n  target:\n    path: \"{}\"\njobs:\n  workers: 2\n  timeout_secs: 60\nexecution:\n  batch_size: 2\n",
        target.display()
    );
    std::fs::write(dir.path().join("ruleflow.yml"), yaml).unwrap();
    Config::load_from_dir(dir.path()).unwrap()
}

fn seeded_source(config: &Config) -> DuckDbHandle {
    let db = DuckDbHandle::new(&config.database.source.path).unwrap();
    db.execute_batch(
        "CREATE TABLE orders (order_id INTEGER PRIMARY KEY, customer_id INTEGER, \
         amount INTEGER, status VARCHAR);
         CREATE TABLE customers (id INTEGER PRIMARY KEY, name VARCHAR);
         INSERT INTO customers VALUES (1, 'Ada'), (2, 'Grace');
         INSERT INTO orders VALUES
           (1, 1, 100, 'paid'),
           (2, 1, 50, 'paid'),
           (3, 2, 200, 'paid'),
           (4, 2, 75, 'void');",
    )
    .unwrap();
    db
}

#[tokio::test]
async fn test_duckdb_workflow_persists_and_validates() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    assert_eq!(config.execution.batch_size, 2);

    let source = Arc::new(seeded_source(&config));
    let target = Arc::new(DuckDbHandle::new(&config.database.target.path).unwrap());
    let orch = JobOrchestrator::builder(Arc::new(interpreter()), source, target.clone())
        .config(config.clone())
        .start();

    let req = EtlRequest::new("orders", TARGET, TOTALS_RULE)
        .with_batch_size(config.execution.batch_size);
    let first = orch.submit_workflow(req.clone()).await.unwrap();
    let job = orch.wait(first).await.unwrap();
    assert_eq!(job.state, JobState::Succeeded, "{:?}", job.error);

    let report = orch.get_report(first).await.unwrap();
    let validation = report.validation.unwrap();
    assert_eq!(validation.pass_rate, 1.0, "{:#?}", validation.scenario_results);
    assert!(target.relation_exists(TARGET).await.unwrap());
    assert_eq!(target.count_rows(TARGET).unwrap(), 2);

    // A second run upserts over the same keys
    let second = orch.submit_workflow(req).await.unwrap();
    assert_eq!(orch.wait(second).await.unwrap().state, JobState::Succeeded);
    assert_eq!(target.count_rows(TARGET).unwrap(), 2);
    assert_eq!(
        report.run.unwrap().output_checksum,
        orch.get_report(second).await.unwrap().run.unwrap().output_checksum
    );
    orch.shutdown().await;
}
