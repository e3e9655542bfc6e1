//! Statistical summary of a written table
//!
//! Gathered once per validation pass over the target table so a report
//! shows what the data looks like next to whether the checks held.

use crate::error::ValidationResult;
use rf_core::{ColumnType, Value};
use rf_db::{DataHandle, DbError, ReadQuery, RowBatches};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-column profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStatistics {
    pub column_type: ColumnType,
    pub null_count: u64,
    /// Share of NULLs in percent, rounded to two decimals
    pub null_percentage: f64,
    /// Distinct non-null values
    pub unique_count: u64,
    /// Numeric columns only, `None` when every value is NULL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric: Option<NumericStatistics>,
}

/// Spread of a numeric column's non-null values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; 0 for a single value
    pub std_dev: f64,
}

/// Profile of a whole table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub table: String,
    pub record_count: u64,
    pub column_count: usize,
    pub columns: BTreeMap<String, ColumnStatistics>,
}

impl TableStatistics {
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStatistics> {
        self.columns.get(name)
    }
}

#[derive(Default)]
struct ColumnProfile {
    nulls: u64,
    distinct: BTreeSet<Value>,
    numbers: Vec<f64>,
}

/// Scan `table` in batches of `batch_size` rows and profile every column
pub async fn summarize_table(
    handle: &dyn DataHandle,
    table: &str,
    batch_size: usize,
) -> ValidationResult<TableStatistics> {
    let schema = handle
        .describe(table)
        .await?
        .ok_or_else(|| DbError::TableNotFound(table.to_string()))?;
    let names = schema.column_names();

    let mut profiles: Vec<ColumnProfile> = names.iter().map(|_| ColumnProfile::default()).collect();
    let mut records = 0u64;
    let query = ReadQuery::new(table, names.clone()).ordered_by(schema.primary_key.clone());
    let mut batches = RowBatches::new(handle, query, batch_size);
    while let Some(batch) = batches.next_batch().await? {
        for row in &batch {
            records += 1;
            for (name, profile) in names.iter().zip(profiles.iter_mut()) {
                match row.get(name) {
                    None | Some(Value::Null) => profile.nulls += 1,
                    Some(v) => {
                        if let Some(x) = v.as_f64() {
                            profile.numbers.push(x);
                        }
                        profile.distinct.insert(v.clone());
                    }
                }
            }
        }
    }

    let columns = schema
        .columns
        .iter()
        .zip(profiles)
        .map(|(def, profile)| {
            let numeric = matches!(def.column_type, ColumnType::Integer | ColumnType::Decimal);
            let stats = ColumnStatistics {
                column_type: def.column_type,
                null_count: profile.nulls,
                null_percentage: percent(profile.nulls, records),
                unique_count: profile.distinct.len() as u64,
                numeric: if numeric {
                    numeric_statistics(profile.numbers)
                } else {
                    None
                },
            };
            (def.name.clone(), stats)
        })
        .collect();

    log::debug!("Profiled {} rows of {}", records, table);
    Ok(TableStatistics {
        table: table.to_string(),
        record_count: records,
        column_count: names.len(),
        columns,
    })
}

fn numeric_statistics(mut values: Vec<f64>) -> Option<NumericStatistics> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };
    let std_dev = if n > 1 {
        let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };
    Some(NumericStatistics {
        min: values[0],
        max: values[n - 1],
        mean: round2(mean),
        median: round2(median),
        std_dev: round2(std_dev),
    })
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
