//! The compiled rule model
//!
//! A [`TransformSpec`] is the deterministic, engine-independent description
//! of one business rule. It is produced once by the compiler and then only
//! read: the executor runs it and the synthesizer derives scenarios from it.
//!
//! Column scoping rules:
//! - group keys, aggregation inputs and filters name columns of the primary
//!   source entity (`source_entities[0]`);
//! - derived expressions and rank keys name output columns defined before
//!   them (group keys, aggregation outputs, earlier derived columns);
//! - the remaining source entities are only referenced by [`ForeignKeyRef`]s.

use crate::error::{CoreError, CoreResult};
use crate::expr::{Expr, Predicate};
use crate::schema::{ColumnDef, ColumnType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A table participating in the transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A fully resolved `table.column` reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// One aggregate output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggExpr {
    /// Output column name in the target entity
    pub output: String,
    /// Canonical aggregate name from the registry
    pub function: String,
    /// Input column; `None` means every row (COUNT(*))
    pub column: Option<String>,
    pub output_type: ColumnType,
}

/// A computed column evaluated over an aggregated output row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedExpr {
    pub name: String,
    pub expr: Expr,
    pub output_type: ColumnType,
    /// Inclusive bounds the value must fall within, e.g. `[0, 100]` for a score
    #[serde(default)]
    pub valid_range: Option<(f64, f64)>,
}

/// Ordering key over output columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// A rank column computed over the complete aggregate set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankSpec {
    pub output: String,
    pub order_by: SortKey,
    /// Tie-breaker for non-dense ranking; ascending group key when absent
    #[serde(default)]
    pub secondary: Option<SortKey>,
    #[serde(default)]
    pub dense: bool,
}

/// A target column whose values must exist in another source table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    pub column: String,
    pub references: ColumnRef,
}

/// Target table description with its canonical column order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntity {
    pub name: String,
    pub primary_key: Vec<String>,
    /// Fact-table marker: the key may name source columns outside `group_by`
    #[serde(default)]
    pub row_per_source_row: bool,
    pub columns: Vec<ColumnDef>,
}

/// Compiled, immutable representation of a business rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub source_entities: Vec<TableRef>,
    pub target_entity: TargetEntity,
    #[serde(default)]
    pub group_by: Vec<ColumnRef>,
    #[serde(default)]
    pub aggregations: Vec<AggExpr>,
    #[serde(default)]
    pub filters: Vec<Predicate>,
    #[serde(default)]
    pub derived_columns: Vec<DerivedExpr>,
    #[serde(default)]
    pub ranking: Vec<RankSpec>,
    /// Primary source columns the plan reads, with their declared types
    #[serde(default)]
    pub source_columns: Vec<ColumnDef>,
    #[serde(default)]
    pub references: Vec<ForeignKeyRef>,
    #[serde(default)]
    pub non_nullable: Vec<String>,
}

impl TransformSpec {
    /// The table rows are streamed from
    pub fn primary_source(&self) -> Option<&TableRef> {
        self.source_entities.first()
    }

    /// Columns forming the group key, in key order.
    ///
    /// For fact tables the primary key columns not already grouped on are
    /// appended, so every source row with a distinct key is its own group.
    pub fn group_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self.group_by.iter().map(|c| c.column.clone()).collect();
        if self.target_entity.row_per_source_row {
            for pk in &self.target_entity.primary_key {
                if !cols.contains(pk) {
                    cols.push(pk.clone());
                }
            }
        }
        cols
    }

    /// Output column names in canonical order: group keys, aggregations,
    /// derived columns, rank outputs
    pub fn canonical_columns(&self) -> Vec<String> {
        let mut out = self.group_columns();
        out.extend(self.aggregations.iter().map(|a| a.output.clone()));
        out.extend(self.derived_columns.iter().map(|d| d.name.clone()));
        out.extend(self.ranking.iter().map(|r| r.output.clone()));
        out
    }

    /// Target column names as declared on the target entity
    pub fn output_columns(&self) -> Vec<String> {
        self.target_entity
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn source_column(&self, name: &str) -> Option<&ColumnDef> {
        self.source_columns.iter().find(|c| c.name == name)
    }

    pub fn target_column(&self, name: &str) -> Option<&ColumnDef> {
        self.target_entity.columns.iter().find(|c| c.name == name)
    }

    pub fn aggregation(&self, output: &str) -> Option<&AggExpr> {
        self.aggregations.iter().find(|a| a.output == output)
    }

    fn invalid(&self, message: impl Into<String>) -> CoreError {
        CoreError::SpecInvalid {
            target: self.target_entity.name.clone(),
            message: message.into(),
        }
    }

    /// Check every structural invariant of the compiled rule
    pub fn validate(&self) -> CoreResult<()> {
        let Some(primary) = self.primary_source() else {
            return Err(self.invalid("no source entities"));
        };
        if self.target_entity.name.trim().is_empty() {
            return Err(self.invalid("target entity has no name"));
        }
        if self.target_entity.primary_key.is_empty() {
            return Err(self.invalid("target entity has no primary key"));
        }

        let source_known = |name: &str| self.source_column(name).is_some();

        for g in &self.group_by {
            if g.table != primary.name {
                return Err(self.invalid(format!(
                    "group key '{}.{}' is not on the primary source '{}'",
                    g.table, g.column, primary.name
                )));
            }
            if !source_known(&g.column) {
                return Err(self.invalid(format!("unknown group column '{}'", g.column)));
            }
        }

        let grouped: Vec<&str> = self.group_by.iter().map(|g| g.column.as_str()).collect();
        for pk in &self.target_entity.primary_key {
            let ok = if self.target_entity.row_per_source_row {
                source_known(pk)
            } else {
                grouped.contains(&pk.as_str())
            };
            if !ok {
                return Err(self.invalid(format!(
                    "primary key column '{}' is not a group key",
                    pk
                )));
            }
        }

        let mut available: BTreeSet<String> = self.group_columns().into_iter().collect();
        let mut seen_outputs = available.clone();

        for agg in &self.aggregations {
            if let Some(col) = &agg.column {
                if !source_known(col) {
                    return Err(self.invalid(format!(
                        "aggregation '{}' reads unknown column '{}'",
                        agg.output, col
                    )));
                }
            }
            if !seen_outputs.insert(agg.output.clone()) {
                return Err(self.invalid(format!("duplicate output column '{}'", agg.output)));
            }
        }
        available.extend(self.aggregations.iter().map(|a| a.output.clone()));

        for f in &self.filters {
            if !source_known(f.column()) {
                return Err(self.invalid(format!("filter on unknown column '{}'", f.column())));
            }
        }

        for d in &self.derived_columns {
            for col in d.expr.columns() {
                if !available.contains(&col) {
                    return Err(self.invalid(format!(
                        "derived column '{}' references '{}' which is not defined before it",
                        d.name, col
                    )));
                }
            }
            if let Some((lo, hi)) = d.valid_range {
                if lo.is_nan() || hi.is_nan() || lo > hi {
                    return Err(self.invalid(format!(
                        "derived column '{}' has an inverted range [{}, {}]",
                        d.name, lo, hi
                    )));
                }
            }
            if !seen_outputs.insert(d.name.clone()) {
                return Err(self.invalid(format!("duplicate output column '{}'", d.name)));
            }
            available.insert(d.name.clone());
        }

        for r in &self.ranking {
            for key in std::iter::once(&r.order_by).chain(r.secondary.as_ref()) {
                if !available.contains(&key.column) {
                    return Err(self.invalid(format!(
                        "rank '{}' orders by unknown column '{}'",
                        r.output, key.column
                    )));
                }
            }
            if !seen_outputs.insert(r.output.clone()) {
                return Err(self.invalid(format!("duplicate output column '{}'", r.output)));
            }
        }

        if self.output_columns() != self.canonical_columns() {
            return Err(self.invalid(format!(
                "target columns [{}] are not in canonical order [{}]",
                self.output_columns().join(", "),
                self.canonical_columns().join(", ")
            )));
        }

        for fk in &self.references {
            if self.target_column(&fk.column).is_none() {
                return Err(self.invalid(format!(
                    "reference on unknown target column '{}'",
                    fk.column
                )));
            }
            if !self
                .source_entities
                .iter()
                .any(|t| t.name == fk.references.table)
            {
                return Err(self.invalid(format!(
                    "referenced table '{}' is not a source entity",
                    fk.references.table
                )));
            }
        }

        for col in &self.non_nullable {
            if self.target_column(col).is_none() {
                return Err(self.invalid(format!("non-nullable column '{}' is not an output", col)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "spec_test.rs"]
mod tests;
