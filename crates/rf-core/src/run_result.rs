//! Outcome of one ETL execution

use crate::serde_helpers::duration_ms;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Key in [`RunResult::checksum_aggregates`] holding the written row count
pub const ROW_COUNT_KEY: &str = "__row_count";

/// Counters and lightweight checksums produced by one ETL run.
///
/// `checksum_aggregates` holds the total of every additive aggregation output
/// over the rows written, so the validator can check the target without a
/// second full source scan. `source_totals` holds the same totals computed
/// directly from the filtered source rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub target_table: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub batches: u64,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub checksum_aggregates: BTreeMap<String, Value>,
    pub source_totals: BTreeMap<String, Value>,
    /// SHA-256 over the written rows in key order
    pub output_checksum: String,
    /// First few reasons rows were skipped
    pub skipped_samples: Vec<String>,
}

impl RunResult {
    /// Empty result for a target table
    pub fn new(target_table: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            rows_read: 0,
            rows_written: 0,
            rows_skipped: 0,
            batches: 0,
            elapsed: Duration::ZERO,
            checksum_aggregates: BTreeMap::new(),
            source_totals: BTreeMap::new(),
            output_checksum: String::new(),
            skipped_samples: Vec::new(),
        }
    }

    /// Row count recorded in the checksum aggregates
    pub fn checksum_row_count(&self) -> Option<i64> {
        self.checksum_aggregates
            .get(ROW_COUNT_KEY)
            .and_then(Value::as_i64)
    }
}
