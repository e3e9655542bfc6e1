//! Scenario queries
//!
//! A [`ScenarioQuery`] describes one side of a scenario's comparison. It is
//! evaluated by scanning a data handle in bounded batches, so the validator
//! works against any store the executor can read. Every query also renders
//! an equivalent SQL statement that is kept in reports for auditing.

use crate::error::{ValidationError, ValidationResult};
use rf_core::sql_utils::{quote_ident, quote_list, quote_qualified, sql_literal};
use rf_core::{
    check_row, column_total, Accumulator, AggregateRegistry, ColumnDef, Expr, GroupKey,
    Predicate, Row, Value,
};
use rf_db::{DataHandle, ReadQuery, RowBatches};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One value per group key
pub type GroupedValues = BTreeMap<GroupKey, Value>;

/// What a query observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Observation {
    /// A single value (a total, a count, a literal)
    Scalar(Value),
    /// One value per group key, written as a list of `{ key, value }` entries
    Groups(#[serde(with = "group_entries")] GroupedValues),
    /// Sorted distinct values
    Values(Vec<Value>),
}

mod group_entries {
    use super::GroupedValues;
    use rf_core::{GroupKey, Value};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize)]
    struct EntryRef<'a> {
        key: &'a GroupKey,
        value: &'a Value,
    }

    #[derive(Deserialize)]
    struct Entry {
        key: GroupKey,
        value: Value,
    }

    pub fn serialize<S: Serializer>(groups: &GroupedValues, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(groups.iter().map(|(key, value)| EntryRef { key, value }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<GroupedValues, D::Error> {
        let entries = Vec::<Entry>::deserialize(d)?;
        Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
    }
}

impl Observation {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Observation::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_groups(&self) -> Option<&GroupedValues> {
        match self {
            Observation::Groups(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_values(&self) -> Option<&[Value]> {
        match self {
            Observation::Values(v) => Some(v),
            _ => None,
        }
    }
}

/// One side of a scenario comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum ScenarioQuery {
    /// Recompute an aggregate per group from raw rows.
    ///
    /// Rows rejected by `row_checks` are left out, mirroring the rows the
    /// executor skips.
    GroupAggregate {
        table: String,
        group_by: Vec<String>,
        function: String,
        column: Option<String>,
        #[serde(default)]
        filters: Vec<Predicate>,
        #[serde(default)]
        row_checks: Vec<ColumnDef>,
    },
    /// Stored value of `column` per key
    GroupValues {
        table: String,
        key: Vec<String>,
        column: String,
    },
    /// An expression evaluated over each stored row, per key.
    ///
    /// Its inputs are stored output columns, so it always reads the target.
    Recompute {
        table: String,
        key: Vec<String>,
        expr: Expr,
    },
    /// Distinct non-null values of a column
    ColumnValues { table: String, column: String },
    /// SQL `SUM` of a column
    ColumnTotal { table: String, column: String },
    /// Number of rows matching every filter
    RowCount {
        table: String,
        #[serde(default)]
        filters: Vec<Predicate>,
    },
    /// Keys occurring more than once, with their occurrence counts
    DuplicateKeys { table: String, key: Vec<String> },
    /// A constant known when the scenario was built
    Literal { value: Value },
}

impl ScenarioQuery {
    /// Table read by the query, if any
    pub fn table(&self) -> Option<&str> {
        match self {
            ScenarioQuery::GroupAggregate { table, .. }
            | ScenarioQuery::GroupValues { table, .. }
            | ScenarioQuery::Recompute { table, .. }
            | ScenarioQuery::ColumnValues { table, .. }
            | ScenarioQuery::ColumnTotal { table, .. }
            | ScenarioQuery::RowCount { table, .. }
            | ScenarioQuery::DuplicateKeys { table, .. } => Some(table),
            ScenarioQuery::Literal { .. } => None,
        }
    }

    /// Whether the query must run against the target regardless of side
    pub fn reads_target(&self) -> bool {
        matches!(self, ScenarioQuery::Recompute { .. })
    }

    /// Evaluate by scanning `handle` in batches of `batch_size` rows
    pub async fn evaluate(
        &self,
        handle: &dyn DataHandle,
        registry: &AggregateRegistry,
        batch_size: usize,
    ) -> ValidationResult<Observation> {
        match self {
            ScenarioQuery::GroupAggregate {
                table,
                group_by,
                function,
                column,
                filters,
                row_checks,
            } => {
                let def = registry
                    .lookup(function)
                    .ok_or_else(|| ValidationError::UnknownAggregate(function.clone()))?;
                let mut columns = group_by.clone();
                columns.extend(column.iter().cloned());
                columns.extend(filters.iter().map(|f| f.column().to_string()));
                columns.extend(row_checks.iter().map(|c| c.name.clone()));
                let columns = dedup(columns);

                let mut groups: BTreeMap<GroupKey, Accumulator> = BTreeMap::new();
                scan(handle, table, columns, group_by, batch_size, |row| {
                    if check_row(row_checks, group_by, row).is_err()
                        || !filters.iter().all(|f| f.matches(row))
                    {
                        return;
                    }
                    let acc = groups
                        .entry(GroupKey::from_row(row, group_by))
                        .or_insert_with(|| Accumulator::new(def.tracks_distinct));
                    match column {
                        Some(c) => acc.update(Some(row.get(c).unwrap_or(&Value::Null))),
                        None => acc.update(None),
                    }
                })
                .await?;
                Ok(Observation::Groups(
                    groups
                        .into_iter()
                        .map(|(k, acc)| {
                            let value = def.finish(&acc, column.is_some());
                            (k, value)
                        })
                        .collect(),
                ))
            }
            ScenarioQuery::GroupValues { table, key, column } => {
                let mut columns = key.clone();
                columns.push(column.clone());
                let mut out = BTreeMap::new();
                scan(handle, table, dedup(columns), key, batch_size, |row| {
                    out.insert(
                        GroupKey::from_row(row, key),
                        row.get(column).cloned().unwrap_or(Value::Null),
                    );
                })
                .await?;
                Ok(Observation::Groups(out))
            }
            ScenarioQuery::Recompute { table, key, expr } => {
                let mut columns = key.clone();
                columns.extend(expr.columns());
                let mut out = BTreeMap::new();
                scan(handle, table, dedup(columns), key, batch_size, |row| {
                    out.insert(GroupKey::from_row(row, key), expr.eval(row));
                })
                .await?;
                Ok(Observation::Groups(out))
            }
            ScenarioQuery::ColumnValues { table, column } => {
                let mut seen = BTreeSet::new();
                let cols = vec![column.clone()];
                scan(handle, table, cols.clone(), &cols, batch_size, |row| {
                    if let Some(v) = row.get(column).filter(|v| !v.is_null()) {
                        seen.insert(v.clone());
                    }
                })
                .await?;
                Ok(Observation::Values(seen.into_iter().collect()))
            }
            ScenarioQuery::ColumnTotal { table, column } => {
                let mut values = Vec::new();
                let cols = vec![column.clone()];
                scan(handle, table, cols.clone(), &cols, batch_size, |row| {
                    values.push(row.get(column).cloned().unwrap_or(Value::Null));
                })
                .await?;
                Ok(Observation::Scalar(column_total(&values)))
            }
            ScenarioQuery::RowCount { table, filters } => {
                let columns = dedup(filters.iter().map(|f| f.column().to_string()).collect());
                let mut count = 0i64;
                scan(handle, table, columns, &[], batch_size, |row| {
                    if filters.iter().all(|f| f.matches(row)) {
                        count += 1;
                    }
                })
                .await?;
                Ok(Observation::Scalar(Value::Int(count)))
            }
            ScenarioQuery::DuplicateKeys { table, key } => {
                let mut counts: BTreeMap<GroupKey, i64> = BTreeMap::new();
                scan(handle, table, key.clone(), key, batch_size, |row| {
                    *counts.entry(GroupKey::from_row(row, key)).or_default() += 1;
                })
                .await?;
                Ok(Observation::Groups(
                    counts
                        .into_iter()
                        .filter(|(_, n)| *n > 1)
                        .map(|(k, n)| (k, Value::Int(n)))
                        .collect(),
                ))
            }
            ScenarioQuery::Literal { value } => Ok(Observation::Scalar(value.clone())),
        }
    }

    /// Equivalent SQL, for the audit trail
    pub fn to_sql(&self) -> String {
        match self {
            ScenarioQuery::GroupAggregate {
                table,
                group_by,
                function,
                column,
                filters,
                ..
            } => {
                let keys = quote_list(group_by);
                let mut conditions: Vec<String> = group_by
                    .iter()
                    .map(|k| format!("{} IS NOT NULL", quote_ident(k)))
                    .collect();
                conditions.extend(filters.iter().map(Predicate::to_sql));
                format!(
                    "SELECT {keys}, {} AS value\nFROM {}{}\nGROUP BY {keys}\nORDER BY {keys}",
                    aggregate_sql(function, column.as_deref()),
                    quote_qualified(table),
                    where_clause(&conditions)
                )
            }
            ScenarioQuery::GroupValues { table, key, column } => {
                let keys = quote_list(key);
                format!(
                    "SELECT {keys}, {} AS value\nFROM {}\nORDER BY {keys}",
                    quote_ident(column),
                    quote_qualified(table)
                )
            }
            ScenarioQuery::Recompute { table, key, expr } => {
                let keys = quote_list(key);
                format!(
                    "SELECT {keys}, {} AS value\nFROM {}\nORDER BY {keys}",
                    expr.to_sql(),
                    quote_qualified(table)
                )
            }
            ScenarioQuery::ColumnValues { table, column } => {
                let qc = quote_ident(column);
                format!(
                    "SELECT DISTINCT {qc}\nFROM {}\nWHERE {qc} IS NOT NULL\nORDER BY {qc}",
                    quote_qualified(table)
                )
            }
            ScenarioQuery::ColumnTotal { table, column } => format!(
                "SELECT SUM({}) AS total FROM {}",
                quote_ident(column),
                quote_qualified(table)
            ),
            ScenarioQuery::RowCount { table, filters } => {
                let conditions: Vec<String> = filters.iter().map(Predicate::to_sql).collect();
                format!(
                    "SELECT COUNT(*) AS row_count FROM {}{}",
                    quote_qualified(table),
                    where_clause(&conditions)
                )
            }
            ScenarioQuery::DuplicateKeys { table, key } => {
                let keys = quote_list(key);
                format!(
                    "SELECT {keys}, COUNT(*) AS cnt\nFROM {}\nGROUP BY {keys}\nHAVING COUNT(*) > 1",
                    quote_qualified(table)
                )
            }
            ScenarioQuery::Literal { value } => format!("SELECT {} AS value", sql_literal(value)),
        }
    }
}

fn aggregate_sql(function: &str, column: Option<&str>) -> String {
    let name = function.to_ascii_lowercase();
    match (name.as_str(), column) {
        ("count", None) => "COUNT(*)".to_string(),
        ("count_distinct", Some(c)) => format!("COUNT(DISTINCT {})", quote_ident(c)),
        (_, Some(c)) => format!("{}({})", name.to_ascii_uppercase(), quote_ident(c)),
        (_, None) => format!("{}(*)", name.to_ascii_uppercase()),
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {}", conditions.join("\n  AND "))
    }
}

fn dedup(columns: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(columns.len());
    for c in columns {
        if !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Feed every row of `table` to `visit`, one batch at a time
async fn scan(
    handle: &dyn DataHandle,
    table: &str,
    columns: Vec<String>,
    order_by: &[String],
    batch_size: usize,
    mut visit: impl FnMut(&Row),
) -> ValidationResult<()> {
    if !handle.relation_exists(table).await? {
        return Err(rf_db::DbError::TableNotFound(table.to_string()).into());
    }
    let query = ReadQuery::new(table, columns).ordered_by(order_by.to_vec());
    let mut batches = RowBatches::new(handle, query, batch_size);
    while let Some(batch) = batches.next_batch().await? {
        batch.iter().for_each(&mut visit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Comparator;
    use rf_core::{ColumnType, CompareOp, TableSchema};
    use rf_db::MemoryHandle;

    #[test]
    fn test_group_aggregate_sql() {
        let q = ScenarioQuery::GroupAggregate {
            table: "orders".into(),
            group_by: vec!["customer_id".into()],
            function: "sum".into(),
            column: Some("amount".into()),
            filters: vec![Predicate::compare("status", CompareOp::Eq, "paid")],
            row_checks: vec![],
        };
        assert_eq!(
            q.to_sql(),
            "SELECT \"customer_id\", SUM(\"amount\") AS value\n\
             FROM \"orders\"\n\
             WHERE \"customer_id\" IS NOT NULL\n  AND \"status\" = 'paid'\n\
             GROUP BY \"customer_id\"\n\
             ORDER BY \"customer_id\""
        );
    }

    #[test]
    fn test_duplicate_keys_sql() {
        let q = ScenarioQuery::DuplicateKeys {
            table: "customer_summary".into(),
            key: vec!["customer_id".into()],
        };
        assert!(q.to_sql().contains("HAVING COUNT(*) > 1"));
    }

    #[test]
    fn test_count_star_sql() {
        assert_eq!(aggregate_sql("count", None), "COUNT(*)");
        assert_eq!(
            aggregate_sql("count_distinct", Some("sku")),
            "COUNT(DISTINCT \"sku\")"
        );
    }

    #[test]
    fn test_observation_serializes_groups_as_entries() {
        let mut groups = GroupedValues::new();
        groups.insert(GroupKey(vec![Value::Int(1), "a|b".into()]), Value::Int(150));
        groups.insert(GroupKey(vec![Value::Int(2), "c".into()]), Value::Int(200));
        let obs = Observation::Groups(groups);
        let json = serde_json::to_string(&obs).unwrap();
        assert_eq!(
            json,
            r#"{"groups":[{"key":[1,"a|b"],"value":150},{"key":[2,"c"],"value":200}]}"#
        );
        let back: Observation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obs);
    }

    fn keyed_table(rows: Vec<(Value, Value, i64)>) -> MemoryHandle {
        let db = MemoryHandle::new();
        db.create_table(TableSchema::new(
            "pairs",
            vec![
                ColumnDef::new("a", ColumnType::Text),
                ColumnDef::new("b", ColumnType::Text),
                ColumnDef::new("v", ColumnType::Integer),
            ],
        ))
        .unwrap();
        db.insert_rows(
            "pairs",
            rows.into_iter()
                .map(|(a, b, v)| {
                    Row::from([
                        ("a".to_string(), a),
                        ("b".to_string(), b),
                        ("v".to_string(), Value::Int(v)),
                    ])
                })
                .collect(),
        )
        .unwrap();
        db
    }

    fn stored_values() -> ScenarioQuery {
        ScenarioQuery::GroupValues {
            table: "pairs".into(),
            key: vec!["a".into(), "b".into()],
            column: "v".into(),
        }
    }

    #[tokio::test]
    async fn test_keys_containing_separator_stay_distinct() {
        let registry = AggregateRegistry::with_builtins();
        let expected = keyed_table(vec![
            ("a|b".into(), "c".into(), 1),
            ("a".into(), "b|c".into(), 1),
        ]);
        let actual = keyed_table(vec![
            ("a|b".into(), "c".into(), 1),
            ("a".into(), "b|c".into(), 999),
        ]);
        let expected = stored_values().evaluate(&expected, &registry, 10).await.unwrap();
        let actual = stored_values().evaluate(&actual, &registry, 10).await.unwrap();

        assert_eq!(actual.as_groups().unwrap().len(), 2);
        let err = Comparator::Equals
            .check(&actual, Some(&expected), 0.0)
            .unwrap_err();
        assert!(err.contains("got 999"), "{err}");
    }

    #[tokio::test]
    async fn test_text_and_integer_keys_stay_distinct() {
        let registry = AggregateRegistry::with_builtins();
        let db = keyed_table(vec![
            ("1".into(), "x".into(), 5),
            (Value::Int(1), "x".into(), 7),
        ]);
        let groups = stored_values().evaluate(&db, &registry, 10).await.unwrap();
        let groups = groups.as_groups().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups.get(&GroupKey(vec!["1".into(), "x".into()])),
            Some(&Value::Int(5))
        );
        assert_eq!(
            groups.get(&GroupKey(vec![Value::Int(1), "x".into()])),
            Some(&Value::Int(7))
        );
    }
}
