//! Scenario synthesis
//!
//! Scenarios come out in a fixed order so report diffs across runs line up:
//! one SUM_MATCH/COUNT_MATCH per aggregation in declaration order, the
//! row-count COUNT_MATCH, one SUM_MATCH per checksum aggregate, then
//! NULL_CHECK, UNIQUENESS, REFERENTIAL, RANGE_CHECK and DERIVED_FORMULA
//! scenarios, each in declaration order.

use crate::query::ScenarioQuery;
use crate::scenario::{Comparator, Scenario, ScenarioKind};
use rf_core::{
    AggregateCheck, AggregateRegistry, ColumnType, Predicate, RunResult, TransformSpec,
    ValidationConfig, Value, ROW_COUNT_KEY,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Derives scenarios from a compiled rule and its run result
#[derive(Debug, Clone)]
pub struct ValidationSynthesizer {
    registry: Arc<AggregateRegistry>,
    decimal_tolerance: f64,
}

impl Default for ValidationSynthesizer {
    fn default() -> Self {
        Self::new(Arc::new(AggregateRegistry::with_builtins()))
    }
}

impl ValidationSynthesizer {
    pub fn new(registry: Arc<AggregateRegistry>) -> Self {
        Self {
            registry,
            decimal_tolerance: ValidationConfig::default().decimal_tolerance,
        }
    }

    pub fn with_config(mut self, config: &ValidationConfig) -> Self {
        self.decimal_tolerance = config.decimal_tolerance;
        self
    }

    /// Build every scenario for `spec` and the run that produced `result`
    pub fn synthesize(&self, spec: &TransformSpec, result: &RunResult) -> Vec<Scenario> {
        let target = spec.target_entity.name.as_str();
        let key = spec.group_columns();
        let source = spec
            .primary_source()
            .map(|t| t.name.clone())
            .unwrap_or_default();
        let mut out = Vec::new();

        for agg in &spec.aggregations {
            let kind = match self.registry.lookup(&agg.function).map(|d| d.check) {
                Some(AggregateCheck::CountMatch) => ScenarioKind::CountMatch,
                _ => ScenarioKind::SumMatch,
            };
            let (comparator, tolerance) = self.numeric_check(agg.output_type);
            out.push(Scenario {
                id: format!("{}.{}", id_prefix(kind), agg.output),
                description: format!(
                    "{} of {} per group in {} matches {}.{}",
                    agg.function,
                    agg.column.as_deref().unwrap_or("*"),
                    source,
                    target,
                    agg.output
                ),
                kind,
                source_query: Some(ScenarioQuery::GroupAggregate {
                    table: source.clone(),
                    group_by: key.clone(),
                    function: agg.function.clone(),
                    column: agg.column.clone(),
                    filters: spec.filters.clone(),
                    row_checks: spec.source_columns.clone(),
                }),
                target_query: ScenarioQuery::GroupValues {
                    table: target.to_string(),
                    key: key.clone(),
                    column: agg.output.clone(),
                },
                comparator,
                tolerance,
            });
        }

        out.push(Scenario {
            id: "count_match.row_count".to_string(),
            description: format!(
                "{} holds the {} rows the run wrote",
                target, result.rows_written
            ),
            kind: ScenarioKind::CountMatch,
            source_query: Some(ScenarioQuery::Literal {
                value: Value::Int(result.rows_written as i64),
            }),
            target_query: ScenarioQuery::RowCount {
                table: target.to_string(),
                filters: Vec::new(),
            },
            comparator: Comparator::Equals,
            tolerance: 0.0,
        });

        for (column, written) in &result.checksum_aggregates {
            if column == ROW_COUNT_KEY || spec.target_column(column).is_none() {
                continue;
            }
            let expected = result.source_totals.get(column).unwrap_or(written);
            let column_type = spec
                .target_column(column)
                .map(|c| c.column_type)
                .unwrap_or_default();
            let (comparator, tolerance) = self.numeric_check(column_type);
            out.push(Scenario {
                id: format!("checksum.{}", column),
                description: format!(
                    "total of {}.{} matches the filtered source total recorded by the run",
                    target, column
                ),
                kind: ScenarioKind::SumMatch,
                source_query: Some(ScenarioQuery::Literal {
                    value: expected.clone(),
                }),
                target_query: ScenarioQuery::ColumnTotal {
                    table: target.to_string(),
                    column: column.clone(),
                },
                comparator,
                tolerance,
            });
        }

        for column in &spec.non_nullable {
            out.push(Scenario {
                id: format!("null_check.{}", column),
                description: format!("{}.{} contains no NULLs", target, column),
                kind: ScenarioKind::NullCheck,
                source_query: Some(ScenarioQuery::Literal {
                    value: Value::Int(0),
                }),
                target_query: ScenarioQuery::RowCount {
                    table: target.to_string(),
                    filters: vec![Predicate::IsNull {
                        column: column.clone(),
                    }],
                },
                comparator: Comparator::Equals,
                tolerance: 0.0,
            });
        }

        let pk = &spec.target_entity.primary_key;
        out.push(Scenario {
            id: format!("uniqueness.{}", pk.join(",")),
            description: format!("({}) is unique in {}", pk.join(", "), target),
            kind: ScenarioKind::Uniqueness,
            source_query: None,
            target_query: ScenarioQuery::DuplicateKeys {
                table: target.to_string(),
                key: pk.clone(),
            },
            comparator: Comparator::IsUnique,
            tolerance: 0.0,
        });

        for fk in &spec.references {
            out.push(Scenario {
                id: format!("referential.{}", fk.column),
                description: format!(
                    "every {}.{} exists in {}.{}",
                    target, fk.column, fk.references.table, fk.references.column
                ),
                kind: ScenarioKind::Referential,
                source_query: Some(ScenarioQuery::ColumnValues {
                    table: fk.references.table.clone(),
                    column: fk.references.column.clone(),
                }),
                target_query: ScenarioQuery::ColumnValues {
                    table: target.to_string(),
                    column: fk.column.clone(),
                },
                comparator: Comparator::SubsetOf,
                tolerance: 0.0,
            });
        }

        for derived in &spec.derived_columns {
            let Some((min, max)) = derived.valid_range else {
                continue;
            };
            out.push(Scenario {
                id: format!("range_check.{}", derived.name),
                description: format!("{}.{} lies within [{}, {}]", target, derived.name, min, max),
                kind: ScenarioKind::RangeCheck,
                source_query: None,
                target_query: ScenarioQuery::ColumnValues {
                    table: target.to_string(),
                    column: derived.name.clone(),
                },
                comparator: Comparator::InRange { min, max },
                tolerance: 0.0,
            });
        }

        for derived in &spec.derived_columns {
            let (comparator, tolerance) = self.numeric_check(derived.output_type);
            out.push(Scenario {
                id: format!("derived_formula.{}", derived.name),
                description: format!(
                    "{}.{} equals {} recomputed from stored inputs",
                    target, derived.name, derived.expr
                ),
                kind: ScenarioKind::DerivedFormula,
                source_query: Some(ScenarioQuery::Recompute {
                    table: target.to_string(),
                    key: key.clone(),
                    expr: derived.expr.clone(),
                }),
                target_query: ScenarioQuery::GroupValues {
                    table: target.to_string(),
                    key: key.clone(),
                    column: derived.name.clone(),
                },
                comparator,
                tolerance,
            });
        }

        disambiguate_ids(&mut out);
        log::debug!("Synthesized {} scenarios for {}", out.len(), target);
        out
    }

    /// Exact for integers and non-numeric values, relative tolerance for decimals
    fn numeric_check(&self, column_type: ColumnType) -> (Comparator, f64) {
        match column_type {
            ColumnType::Decimal => (Comparator::WithinTolerance, self.decimal_tolerance),
            _ => (Comparator::Equals, 0.0),
        }
    }
}

/// Suffix repeated ids with `.2`, `.3`, ... so every scenario id is unique
fn disambiguate_ids(scenarios: &mut [Scenario]) {
    let mut seen: HashSet<String> = scenarios.iter().map(|s| s.id.clone()).collect();
    let mut taken = HashSet::new();
    for scenario in scenarios.iter_mut() {
        if taken.insert(scenario.id.clone()) {
            continue;
        }
        let mut n = 2;
        let id = loop {
            let candidate = format!("{}.{}", scenario.id, n);
            if !seen.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        seen.insert(id.clone());
        taken.insert(id.clone());
        scenario.id = id;
    }
}

fn id_prefix(kind: ScenarioKind) -> &'static str {
    match kind {
        ScenarioKind::SumMatch => "sum_match",
        ScenarioKind::CountMatch => "count_match",
        ScenarioKind::NullCheck => "null_check",
        ScenarioKind::RangeCheck => "range_check",
        ScenarioKind::Uniqueness => "uniqueness",
        ScenarioKind::Referential => "referential",
        ScenarioKind::DerivedFormula => "derived_formula",
    }
}

#[cfg(test)]
#[path = "synthesizer_test.rs"]
mod tests;
