use super::*;
use crate::query::RowBatches;
use rf_core::{ColumnDef, ColumnType};

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn seeded() -> MemoryHandle {
    let db = MemoryHandle::new();
    db.create_table(TableSchema::new(
        "orders",
        vec![
            ColumnDef::new("customer_id", ColumnType::Integer),
            ColumnDef::new("amount", ColumnType::Integer),
        ],
    ))
    .unwrap();
    db.insert_rows(
        "orders",
        vec![
            row(&[("customer_id", Value::Int(2)), ("amount", Value::Int(200))]),
            row(&[("customer_id", Value::Int(1)), ("amount", Value::Int(100))]),
            row(&[("customer_id", Value::Int(1)), ("amount", Value::Int(50))]),
        ],
    )
    .unwrap();
    db
}

#[tokio::test]
async fn test_reads_are_sorted_and_paged() {
    let db = seeded();
    let query = ReadQuery::new("orders", vec!["customer_id".into(), "amount".into()])
        .ordered_by(vec!["customer_id".into()]);
    let mut batches = RowBatches::new(&db, query, 2);
    let mut amounts: Vec<Value> = Vec::new();
    while let Some(batch) = batches.next_batch().await.unwrap() {
        amounts.extend(batch.iter().map(|r| r["amount"].clone()));
    }
    assert_eq!(batches.rows_read(), 3);
    assert_eq!(amounts, vec![Value::Int(50), Value::Int(100), Value::Int(200)]);
    assert_eq!(db.read_count(), 2);
}

#[tokio::test]
async fn test_read_fault_fails_after_n_reads() {
    let db = seeded();
    db.set_read_fault(Some(ReadFault::ConnectionLost { after: 1 }));
    let query = ReadQuery::new("orders", vec!["amount".into()]);
    assert!(db.read_batch(&query, 0, 1).await.is_ok());
    let err = db.read_batch(&query, 1, 1).await.unwrap_err();
    assert!(err.is_connection());
}

#[tokio::test]
async fn test_upsert_replaces_matching_keys() {
    let db = MemoryHandle::new();
    let columns = vec![
        ColumnDef::new("k", ColumnType::Integer),
        ColumnDef::new("v", ColumnType::Text),
    ];
    let key = vec!["k".to_string()];
    for rows in [
        vec![
            row(&[("k", Value::Int(1)), ("v", Value::from("a"))]),
            row(&[("k", Value::Int(2)), ("v", Value::from("b"))]),
        ],
        vec![row(&[("k", Value::Int(2)), ("v", Value::from("c"))])],
    ] {
        db.write(WriteRequest {
            table: "t",
            columns: &columns,
            key: &key,
            rows: &rows,
            mode: WriteMode::Upsert,
        })
        .await
        .unwrap();
    }
    let rows = db.rows("t").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.contains(&row(&[("k", Value::Int(2)), ("v", Value::from("c"))])));
    assert_eq!(db.describe("t").await.unwrap().unwrap().primary_key, key);
}

#[tokio::test]
async fn test_rejected_write_leaves_table_untouched() {
    let db = seeded();
    db.set_reject_writes(true);
    let rows = vec![row(&[("customer_id", Value::Int(9)), ("amount", Value::Int(1))])];
    let result = db
        .write(WriteRequest {
            table: "orders",
            columns: &[],
            key: &["customer_id".to_string()],
            rows: &rows,
            mode: WriteMode::Upsert,
        })
        .await;
    assert!(matches!(result, Err(DbError::WriteRejected { .. })));
    assert_eq!(db.rows("orders").unwrap().len(), 3);
}

#[tokio::test]
async fn test_schema_lists_tables() {
    let db = seeded();
    let schema = db.schema().await.unwrap();
    assert_eq!(schema.tables.len(), 1);
    assert_eq!(db.db_type(), "memory");
}
