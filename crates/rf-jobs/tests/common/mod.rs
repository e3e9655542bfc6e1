//! Shared fixtures for orchestrator tests

#![allow(dead_code)]

use rf_compile::{
    CandidateAggregation, CandidateRank, CandidateReference, CandidateRule, StaticInterpreter,
};
use rf_core::{ColumnDef, ColumnType, CompareOp, Config, Predicate, Row, TableSchema, Value};
use rf_db::MemoryHandle;
use rf_jobs::{JobId, JobOrchestrator, JobState};
use std::sync::Arc;
use std::time::Duration;

pub const TOTALS_RULE: &str = "Total paid spend and order count per customer, ranked by spend";
pub const TARGET: &str = "customer_totals";

pub fn order(order_id: i64, customer: i64, amount: Value, status: &str) -> Row {
    let mut r = Row::new();
    r.insert("order_id".into(), Value::Int(order_id));
    r.insert("customer_id".into(), Value::Int(customer));
    r.insert("amount".into(), amount);
    r.insert("status".into(), Value::from(status));
    r
}

pub fn customer(id: i64, name: &str) -> Row {
    let mut r = Row::new();
    r.insert("id".into(), Value::Int(id));
    r.insert("name".into(), Value::from(name));
    r
}

/// Customers 1 and 2 with paid orders 100 + 50 and 200, plus one void order
pub fn two_customer_orders() -> Vec<Row> {
    vec![
        order(1, 1, Value::Int(100), "paid"),
        order(2, 1, Value::Int(50), "paid"),
        order(3, 2, Value::Int(200), "paid"),
        order(4, 2, Value::Int(75), "void"),
    ]
}

pub fn source_with(orders: Vec<Row>) -> Arc<MemoryHandle> {
    let db = MemoryHandle::new();
    db.create_table(TableSchema {
        primary_key: vec!["order_id".into()],
        ..TableSchema::new(
            "orders",
            vec![
                ColumnDef::new("order_id", ColumnType::Integer).required(),
                ColumnDef::new("customer_id", ColumnType::Integer),
                ColumnDef::new("amount", ColumnType::Integer),
                ColumnDef::new("status", ColumnType::Text),
            ],
        )
    })
    .unwrap();
    db.create_table(TableSchema {
        primary_key: vec!["id".into()],
        ..TableSchema::new(
            "customers",
            vec![
                ColumnDef::new("id", ColumnType::Integer).required(),
                ColumnDef::new("name", ColumnType::Text),
            ],
        )
    })
    .unwrap();
    db.insert_rows("orders", orders).unwrap();
    db.insert_rows(
        "customers",
        vec![customer(1, "Ada"), customer(2, "Grace"), customer(3, "Edsger")],
    )
    .unwrap();
    Arc::new(db)
}

pub fn totals_candidate() -> CandidateRule {
    CandidateRule {
        source_tables: vec!["orders".into()],
        target_table: Some(TARGET.into()),
        group_by: vec!["customer_id".into()],
        aggregations: vec![
            CandidateAggregation {
                function: "sum".into(),
                column: Some("amount".into()),
                output: Some("total_amount".into()),
            },
            CandidateAggregation {
                function: "count".into(),
                column: None,
                output: Some("order_count".into()),
            },
        ],
        filters: vec![Predicate::compare("status", CompareOp::Eq, "paid")],
        ranking: vec![CandidateRank {
            output: "spend_rank".into(),
            order_by: "total_amount".into(),
            descending: true,
            secondary: Some("customer_id".into()),
            secondary_descending: false,
            dense: false,
        }],
        references: vec![CandidateReference {
            column: "customer_id".into(),
            table: "customers".into(),
            references: "id".into(),
        }],
        non_nullable: vec!["customer_id".into()],
        ..Default::default()
    }
}

pub fn interpreter() -> StaticInterpreter {
    StaticInterpreter::new().with_rule(TOTALS_RULE, totals_candidate())
}

pub fn config(workers: usize, timeout_secs: u64) -> Config {
    let mut config = Config::default();
    config.jobs.workers = workers;
    config.jobs.timeout_secs = timeout_secs;
    config
}

pub fn orchestrator(source: Arc<MemoryHandle>, target: Arc<MemoryHandle>) -> JobOrchestrator {
    orchestrator_with(source, target, config(4, 30))
}

pub fn orchestrator_with(
    source: Arc<MemoryHandle>,
    target: Arc<MemoryHandle>,
    config: Config,
) -> JobOrchestrator {
    JobOrchestrator::builder(Arc::new(interpreter()), source, target)
        .config(config)
        .start()
}

/// Poll until the job leaves PENDING
pub async fn wait_until_running(orch: &JobOrchestrator, id: JobId) {
    for _ in 0..200 {
        if orch.status(id).await.unwrap().state != JobState::Pending {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never started", id);
}

pub fn int(row: &Row, column: &str) -> i64 {
    row[column].as_i64().unwrap()
}
