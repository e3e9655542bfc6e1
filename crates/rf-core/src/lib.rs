//! rf-core - Core library for Ruleflow
//!
//! This crate provides the compiled rule model (`TransformSpec`), row values
//! and schema descriptors, the extensible aggregate registry, expression
//! evaluation, run results, and configuration shared by every Ruleflow
//! component.

pub mod aggregate;
pub mod checksum;
pub mod config;
pub mod error;
pub mod expr;
pub mod run_result;
pub mod schema;
pub mod serde_helpers;
pub mod spec;
pub mod sql_utils;
pub mod value;

pub use aggregate::{column_total, Accumulator, AggregateCheck, AggregateDef, AggregateRegistry};
pub use checksum::rows_checksum;
pub use config::{
    Config, DatabaseConfig, DatabasesConfig, ExecConfig, FormulaConfig, JobsConfig, ValidationConfig,
};
pub use error::{CoreError, CoreResult};
pub use expr::{ArithOp, CompareOp, Condition, Expr, Predicate, SegmentBranch};
pub use run_result::{RunResult, ROW_COUNT_KEY};
pub use schema::{check_row, ColumnDef, ColumnType, Resolution, SchemaDescriptor, TableSchema};
pub use spec::{
    AggExpr, ColumnRef, DerivedExpr, ForeignKeyRef, RankSpec, SortKey, TableRef, TargetEntity,
    TransformSpec,
};
pub use value::{GroupKey, Row, Value};
