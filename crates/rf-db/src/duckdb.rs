//! DuckDB data handle implementation

use crate::error::{DbError, DbResult};
use crate::query::ReadQuery;
use crate::traits::{DataHandle, WriteMode, WriteRequest};
use async_trait::async_trait;
use duckdb::types::Value as DuckValue;
use duckdb::{params, params_from_iter, Connection};
use rf_core::sql_utils::{quote_ident, quote_list, quote_qualified};
use rf_core::{ColumnDef, ColumnType, Row, TableSchema, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const STAGE_TABLE: &str = "__rf_stage";

/// DuckDB data handle
pub struct DuckDbHandle {
    conn: Mutex<Connection>,
}

impl DuckDbHandle {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute multiple SQL statements (fixtures and setup)
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| DbError::ExecutionError(e.to_string()))
    }

    /// Count rows of a table
    pub fn count_rows(&self, table: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_qualified(table));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn describe_sync(conn: &Connection, name: &str) -> DbResult<Option<TableSchema>> {
        let (schema, table) = split_name(name);
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
        )?;
        let columns = stmt
            .query_map(params![schema, table], |row| {
                let name: String = row.get(0)?;
                let data_type: String = row.get(1)?;
                let nullable: Option<String> = row.get(2)?;
                Ok(ColumnDef {
                    name,
                    column_type: ColumnType::from_sql_type(&data_type),
                    nullable: nullable.as_deref() != Some("NO"),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Ok(None);
        }

        let mut stmt = conn.prepare(
            "SELECT unnest(constraint_column_names) FROM duckdb_constraints() \
             WHERE schema_name = ? AND table_name = ? AND constraint_type = 'PRIMARY KEY'",
        )?;
        let primary_key = stmt
            .query_map(params![schema, table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut described = TableSchema::new(table, columns);
        described.primary_key = primary_key;
        Ok(Some(described))
    }

    fn read_batch_sync(&self, query: &ReadQuery, offset: usize, limit: usize) -> DbResult<Vec<Row>> {
        let conn = self.lock()?;
        let schema = Self::describe_sync(&conn, &query.table)?
            .ok_or_else(|| DbError::TableNotFound(query.table.clone()))?;

        let columns = if query.columns.is_empty() {
            schema.column_names()
        } else {
            query.columns.clone()
        };
        let query = ReadQuery {
            columns,
            ..query.clone()
        };

        // Normalize every column to one of the types `Value` can hold.
        let mut select = Vec::with_capacity(query.columns.len());
        for name in &query.columns {
            let col = schema.column(name).ok_or_else(|| DbError::ColumnNotFound {
                table: query.table.clone(),
                column: name.clone(),
            })?;
            let cast = match col.column_type {
                ColumnType::Integer => "BIGINT",
                ColumnType::Decimal => "DOUBLE",
                ColumnType::Boolean => "BOOLEAN",
                ColumnType::Text | ColumnType::Timestamp => "VARCHAR",
            };
            select.push(format!(
                "CAST({} AS {}) AS {}",
                quote_ident(name),
                cast,
                quote_ident(name)
            ));
        }
        let order = query
            .sort_columns()
            .iter()
            .map(|c| format!("{} ASC NULLS FIRST", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            select.join(", "),
            quote_qualified(&query.table),
            order,
            limit,
            offset
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                let mut out = Row::new();
                for (i, name) in query.columns.iter().enumerate() {
                    let v: DuckValue = row.get(i)?;
                    out.insert(name.clone(), from_duck(v));
                }
                Ok(out)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn write_sync(&self, request: &WriteRequest<'_>) -> DbResult<usize> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION")?;
        match Self::upsert_in_tx(&conn, request) {
            Ok(n) => {
                conn.execute_batch("COMMIT")?;
                Ok(n)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback of write to '{}' failed: {}", request.table, rollback);
                }
                Err(e)
            }
        }
    }

    /// Stage the rows, delete target rows with matching keys, then insert.
    /// Runs inside the caller's transaction.
    fn upsert_in_tx(conn: &Connection, request: &WriteRequest<'_>) -> DbResult<usize> {
        let WriteMode::Upsert = request.mode;
        let col_defs = request
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let names: Vec<&str> = request.columns.iter().map(|c| c.name.as_str()).collect();
        let target = quote_qualified(request.table);

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {target} ({col_defs}); \
             DROP TABLE IF EXISTS {stage}; \
             CREATE TEMP TABLE {stage} ({col_defs});",
            stage = quote_ident(STAGE_TABLE),
        ))?;

        let placeholders = vec!["?"; names.len()].join(", ");
        let insert_stage = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(STAGE_TABLE),
            quote_list(&names),
            placeholders
        );
        {
            let mut stmt = conn.prepare(&insert_stage)?;
            for row in request.rows {
                let values = names
                    .iter()
                    .map(|n| to_duck(row.get(*n).unwrap_or(&Value::Null)));
                stmt.execute(params_from_iter(values))?;
            }
        }

        let matches = request
            .key
            .iter()
            .map(|k| format!("s.{k} IS NOT DISTINCT FROM t.{k}", k = quote_ident(k)))
            .collect::<Vec<_>>()
            .join(" AND ");
        conn.execute_batch(&format!(
            "DELETE FROM {target} AS t WHERE EXISTS (SELECT 1 FROM {stage} AS s WHERE {matches}); \
             INSERT INTO {target} ({cols}) SELECT {cols} FROM {stage}; \
             DROP TABLE {stage};",
            stage = quote_ident(STAGE_TABLE),
            cols = quote_list(&names),
        ))?;
        Ok(request.rows.len())
    }

    fn table_names_sync(&self) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("main", name),
    }
}

fn to_duck(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Int(i) => DuckValue::BigInt(*i),
        Value::Float(f) => DuckValue::Double(*f),
        Value::Text(s) => DuckValue::Text(s.clone()),
    }
}

fn from_duck(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Int(i64::from(i)),
        DuckValue::SmallInt(i) => Value::Int(i64::from(i)),
        DuckValue::Int(i) => Value::Int(i64::from(i)),
        DuckValue::BigInt(i) => Value::Int(i),
        DuckValue::UTinyInt(i) => Value::Int(i64::from(i)),
        DuckValue::USmallInt(i) => Value::Int(i64::from(i)),
        DuckValue::UInt(i) => Value::Int(i64::from(i)),
        DuckValue::Float(f) => Value::Float(f64::from(f)),
        DuckValue::Double(f) => Value::Float(f),
        DuckValue::Text(s) => Value::Text(s),
        other => Value::Text(format!("{:?}", other)),
    }
}

#[async_trait]
impl DataHandle for DuckDbHandle {
    async fn read_batch(
        &self,
        query: &ReadQuery,
        offset: usize,
        limit: usize,
    ) -> DbResult<Vec<Row>> {
        self.read_batch_sync(query, offset, limit)
    }

    async fn write(&self, request: WriteRequest<'_>) -> DbResult<usize> {
        if request.key.is_empty() {
            return Err(DbError::WriteRejected {
                table: request.table.to_string(),
                message: "upsert requires at least one key column".to_string(),
            });
        }
        self.write_sync(&request)
    }

    async fn describe(&self, table: &str) -> DbResult<Option<TableSchema>> {
        let conn = self.lock()?;
        Self::describe_sync(&conn, table)
    }

    async fn table_names(&self) -> DbResult<Vec<String>> {
        self.table_names_sync()
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
