//! rf-db - Data handle layer for Ruleflow
//!
//! This crate provides the `DataHandle` trait the executor and validator
//! read and write through, a lazy batch reader, and two
//! implementations: DuckDB and an in-memory store used for tests and
//! fault injection.

pub mod duckdb;
pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

pub use crate::duckdb::DuckDbHandle;
pub use error::{DbError, DbResult};
pub use memory::{MemoryHandle, ReadFault};
pub use query::{ReadQuery, RowBatches};
pub use traits::{DataHandle, WriteMode, WriteRequest};
