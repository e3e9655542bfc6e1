//! Schema descriptors for source and target tables
//!
//! Identifier resolution is exact-first, then case-insensitive. A
//! case-insensitive lookup only succeeds when exactly one candidate matches;
//! anything else is reported back so the compiler can raise an ambiguity.

use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit integer
    Integer,
    /// Floating point / decimal
    Decimal,
    /// Free text
    #[default]
    Text,
    /// Boolean
    Boolean,
    /// Date or timestamp, carried as ISO-8601 text
    Timestamp,
}

impl ColumnType {
    /// Whether values of this type take part in arithmetic
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Decimal)
    }

    /// Whether `value` is acceptable for a column of this type (NULL always is)
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ColumnType::Integer, Value::Int(_)) => true,
            (ColumnType::Decimal, Value::Int(_) | Value::Float(_)) => true,
            (ColumnType::Text, Value::Text(_)) => true,
            (ColumnType::Boolean, Value::Bool(_)) => true,
            (ColumnType::Timestamp, Value::Text(_) | Value::Int(_)) => true,
            _ => false,
        }
    }

    /// DuckDB column type used when creating target tables
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Decimal => "DOUBLE",
            ColumnType::Text => "VARCHAR",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Map an engine type name (as reported by `information_schema`) to a logical type
    pub fn from_sql_type(sql_type: &str) -> Self {
        let upper = sql_type.trim().to_ascii_uppercase();
        if upper.starts_with("DECIMAL")
            || upper.starts_with("NUMERIC")
            || matches!(upper.as_str(), "DOUBLE" | "FLOAT" | "REAL" | "FLOAT4" | "FLOAT8")
        {
            ColumnType::Decimal
        } else if upper.ends_with("INT") || upper.ends_with("INTEGER") {
            ColumnType::Integer
        } else if upper == "BOOLEAN" || upper == "BOOL" {
            ColumnType::Boolean
        } else if upper.starts_with("TIMESTAMP") || upper == "DATE" {
            ColumnType::Timestamp
        } else {
            ColumnType::Text
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Decimal => write!(f, "decimal"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Timestamp => write!(f, "timestamp"),
        }
    }
}

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,

    /// Logical type
    #[serde(rename = "type")]
    pub column_type: ColumnType,

    /// Whether NULL is allowed
    #[serde(default = "crate::serde_helpers::default_true")]
    pub nullable: bool,
}

impl ColumnDef {
    /// Create a nullable column definition
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    /// Mark the column as NOT NULL
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Reason a row cannot be used against `columns`, if any.
///
/// A NULL in one of `key_columns` or in a non-nullable column is rejected,
/// as is any value the declared type does not accept.
pub fn check_row(columns: &[ColumnDef], key_columns: &[String], row: &Row) -> Result<(), String> {
    for col in columns {
        let value = row.get(&col.name).unwrap_or(&Value::Null);
        if value.is_null() {
            if key_columns.contains(&col.name) {
                return Err(format!("null in key column '{}'", col.name));
            }
            if !col.nullable {
                return Err(format!("null in required column '{}'", col.name));
            }
        } else if !col.column_type.accepts(value) {
            return Err(format!(
                "column '{}' expects {}, got {} '{}'",
                col.name,
                col.column_type,
                value.type_name(),
                value
            ));
        }
    }
    Ok(())
}

/// Outcome of resolving an identifier against a set of known names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Exact, case-sensitive match
    Exact(String),
    /// Unique case-insensitive match (canonical spelling returned)
    CaseInsensitive(String),
    /// Several case-insensitive matches
    Ambiguous(Vec<String>),
    /// No match at all
    Missing,
}

impl Resolution {
    /// Canonical name if the identifier resolved to exactly one candidate
    pub fn resolved(&self) -> Option<&str> {
        match self {
            Resolution::Exact(n) | Resolution::CaseInsensitive(n) => Some(n),
            _ => None,
        }
    }
}

/// Resolve `wanted` among `names`
pub fn resolve_name<'a, I>(names: I, wanted: &str) -> Resolution
where
    I: IntoIterator<Item = &'a str>,
{
    let mut folded = Vec::new();
    for name in names {
        if name == wanted {
            return Resolution::Exact(name.to_string());
        }
        if name.eq_ignore_ascii_case(wanted) {
            folded.push(name.to_string());
        }
    }
    match folded.len() {
        0 => Resolution::Missing,
        1 => Resolution::CaseInsensitive(folded.remove(0)),
        _ => Resolution::Ambiguous(folded),
    }
}

/// Schema of a single table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name (optionally schema-qualified)
    pub name: String,

    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,

    /// Primary key columns, if declared
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Create a table schema without a primary key
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key: Vec::new(),
        }
    }

    /// Look up a column by exact name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Resolve a column name exact-first, then case-insensitively
    pub fn resolve_column(&self, name: &str) -> Resolution {
        resolve_name(self.columns.iter().map(|c| c.name.as_str()), name)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// The set of tables visible to the compiler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Known tables
    pub tables: Vec<TableSchema>,
}

impl SchemaDescriptor {
    /// Create a descriptor from a list of tables
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    /// Look up a table by exact name
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Resolve a table name exact-first, then case-insensitively
    pub fn resolve_table(&self, name: &str) -> Resolution {
        resolve_name(self.tables.iter().map(|t| t.name.as_str()), name)
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod tests;
