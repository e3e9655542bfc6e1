//! In-memory data handle
//!
//! Rows live in a `BTreeMap` of tables behind an `RwLock`. Writes build the
//! new table contents off to the side and swap them in, so a rejected write
//! leaves the table untouched. Read delays and read faults can be injected to
//! exercise cancellation, timeouts, and connection loss.

use crate::error::{DbError, DbResult};
use crate::query::ReadQuery;
use crate::traits::{DataHandle, WriteMode, WriteRequest};
use async_trait::async_trait;
use rf_core::{GroupKey, Row, TableSchema, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Injected read failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFault {
    /// Reads succeed `after` times, then fail as if the connection dropped
    ConnectionLost { after: usize },
}

#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Row>,
}

/// In-memory data handle
#[derive(Default)]
pub struct MemoryHandle {
    tables: RwLock<BTreeMap<String, MemTable>>,
    read_fault: Mutex<Option<ReadFault>>,
    read_delay: Mutex<Option<Duration>>,
    reads: AtomicUsize,
    reject_writes: AtomicBool,
}

impl MemoryHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) an empty table
    pub fn create_table(&self, schema: TableSchema) -> DbResult<()> {
        let mut tables = self.write_lock()?;
        tables.insert(
            schema.name.clone(),
            MemTable {
                schema,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Append rows without any key matching
    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) -> DbResult<()> {
        let mut tables = self.write_lock()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
        t.rows.extend(rows);
        Ok(())
    }

    /// Snapshot of a table's rows in storage order
    pub fn rows(&self, table: &str) -> DbResult<Vec<Row>> {
        let tables = self.read_lock()?;
        tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| DbError::TableNotFound(table.to_string()))
    }

    /// Fail reads according to `fault`; `None` clears it
    pub fn set_read_fault(&self, fault: Option<ReadFault>) {
        if let Ok(mut slot) = self.read_fault.lock() {
            *slot = fault;
        }
    }

    /// Sleep before serving every read batch
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.read_delay.lock() {
            *slot = delay;
        }
    }

    /// Reject every subsequent write
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of read batches served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn read_lock(&self) -> DbResult<std::sync::RwLockReadGuard<'_, BTreeMap<String, MemTable>>> {
        self.tables
            .read()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    fn write_lock(&self) -> DbResult<std::sync::RwLockWriteGuard<'_, BTreeMap<String, MemTable>>> {
        self.tables
            .write()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    fn check_fault(&self) -> DbResult<()> {
        let served = self.reads.fetch_add(1, Ordering::SeqCst);
        let fault = self
            .read_fault
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))?;
        match *fault {
            Some(ReadFault::ConnectionLost { after }) if served >= after => Err(
                DbError::ConnectionError(format!("connection lost after {} reads", after)),
            ),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DataHandle for MemoryHandle {
    async fn read_batch(
        &self,
        query: &ReadQuery,
        offset: usize,
        limit: usize,
    ) -> DbResult<Vec<Row>> {
        let delay = self.read_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_fault()?;

        let tables = self.read_lock()?;
        let table = tables
            .get(&query.table)
            .ok_or_else(|| DbError::TableNotFound(query.table.clone()))?;
        let columns = if query.columns.is_empty() {
            table.schema.column_names()
        } else {
            query.columns.clone()
        };
        if let Some(missing) = columns.iter().find(|c| table.schema.column(c).is_none()) {
            return Err(DbError::ColumnNotFound {
                table: query.table.clone(),
                column: missing.clone(),
            });
        }

        let sort = ReadQuery {
            columns: columns.clone(),
            ..query.clone()
        }
        .sort_columns();
        let mut ordered: Vec<&Row> = table.rows.iter().collect();
        ordered.sort_by_cached_key(|r| GroupKey::from_row(r, &sort));

        Ok(ordered
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| {
                columns
                    .iter()
                    .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect())
    }

    async fn write(&self, request: WriteRequest<'_>) -> DbResult<usize> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(DbError::WriteRejected {
                table: request.table.to_string(),
                message: "writes are disabled".to_string(),
            });
        }
        if request.key.is_empty() {
            return Err(DbError::WriteRejected {
                table: request.table.to_string(),
                message: "upsert requires at least one key column".to_string(),
            });
        }
        let WriteMode::Upsert = request.mode;

        let mut tables = self.write_lock()?;
        let mut next = match tables.get(request.table) {
            Some(existing) => existing.clone(),
            None => MemTable {
                schema: TableSchema {
                    primary_key: request.key.to_vec(),
                    ..TableSchema::new(request.table, request.columns.to_vec())
                },
                rows: Vec::new(),
            },
        };

        let mut incoming: BTreeMap<GroupKey, Row> = BTreeMap::new();
        for row in request.rows {
            incoming.insert(GroupKey::from_row(row, request.key), row.clone());
        }
        next.rows
            .retain(|r| !incoming.contains_key(&GroupKey::from_row(r, request.key)));
        next.rows.extend(incoming.into_values());

        tables.insert(request.table.to_string(), next);
        Ok(request.rows.len())
    }

    async fn describe(&self, table: &str) -> DbResult<Option<TableSchema>> {
        Ok(self.read_lock()?.get(table).map(|t| t.schema.clone()))
    }

    async fn table_names(&self) -> DbResult<Vec<String>> {
        Ok(self.read_lock()?.keys().cloned().collect())
    }

    fn db_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
