//! Data handle trait definition

use crate::error::DbResult;
use crate::query::ReadQuery;
use async_trait::async_trait;
use rf_core::{ColumnDef, Row, SchemaDescriptor, TableSchema};

/// How rows are written to a target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace rows sharing a key, insert the rest
    Upsert,
}

/// One atomic write against a target table
#[derive(Debug, Clone)]
pub struct WriteRequest<'a> {
    pub table: &'a str,
    /// Column layout, used to create the table when missing
    pub columns: &'a [ColumnDef],
    /// Key columns rows are matched on
    pub key: &'a [String],
    pub rows: &'a [Row],
    pub mode: WriteMode,
}

/// Source/target store abstraction for Ruleflow
///
/// Any store that can page through a table in a stable order and write a set
/// of rows atomically is compatible. Implementations must be Send + Sync.
#[async_trait]
pub trait DataHandle: Send + Sync {
    /// Read rows `offset..offset + limit` of the query's stable ordering
    async fn read_batch(&self, query: &ReadQuery, offset: usize, limit: usize)
        -> DbResult<Vec<Row>>;

    /// Apply a write atomically: either every row lands or none do
    async fn write(&self, request: WriteRequest<'_>) -> DbResult<usize>;

    /// Describe a table, or `None` when it does not exist
    async fn describe(&self, table: &str) -> DbResult<Option<TableSchema>>;

    /// Names of every table in the store
    async fn table_names(&self) -> DbResult<Vec<String>>;

    /// Data handle type identifier for logging
    fn db_type(&self) -> &'static str;

    /// Check if a table exists
    async fn relation_exists(&self, table: &str) -> DbResult<bool> {
        Ok(self.describe(table).await?.is_some())
    }

    /// Schema descriptor over every table, as handed to the interpreter
    async fn schema(&self) -> DbResult<SchemaDescriptor> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            if let Some(table) = self.describe(&name).await? {
                tables.push(table);
            }
        }
        Ok(SchemaDescriptor::new(tables))
    }
}
