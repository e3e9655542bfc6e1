//! Deterministic normalization of interpreter output into a TransformSpec

use crate::candidate::{CandidateRule, CandidateSegment};
use crate::error::{CompileError, CompileResult};
use crate::interpreter::Interpreter;
use rf_core::schema::resolve_name;
use rf_core::{
    AggExpr, AggregateRegistry, ColumnDef, ColumnRef, ColumnType, Condition, Config, DerivedExpr,
    Expr, FormulaConfig, ForeignKeyRef, RankSpec, Resolution, SchemaDescriptor, SegmentBranch,
    SortKey, TableRef, TableSchema, TargetEntity, TransformSpec, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Caller-supplied table choices that take precedence over the interpreter's
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub source_table: Option<String>,
    pub target_table: Option<String>,
}

impl CompileOptions {
    pub fn tables(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_table: Some(source.into()),
            target_table: Some(target.into()),
        }
    }
}

/// Compiles rule text into a [`TransformSpec`]
#[derive(Clone)]
pub struct RuleCompiler {
    interpreter: Arc<dyn Interpreter>,
    registry: Arc<AggregateRegistry>,
    formulas: BTreeMap<String, FormulaConfig>,
    interpreter_timeout: Duration,
}

impl RuleCompiler {
    pub fn new(interpreter: Arc<dyn Interpreter>) -> Self {
        Self {
            interpreter,
            registry: Arc::new(AggregateRegistry::with_builtins()),
            formulas: BTreeMap::new(),
            interpreter_timeout: Duration::from_secs(60),
        }
    }

    /// Take formulas and the interpreter timeout from configuration
    pub fn with_config(mut self, config: &Config) -> Self {
        self.formulas = config.formulas.clone();
        self.interpreter_timeout = Duration::from_secs(config.jobs.interpreter_timeout_secs);
        self
    }

    pub fn with_registry(mut self, registry: Arc<AggregateRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_interpreter_timeout(mut self, timeout: Duration) -> Self {
        self.interpreter_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<AggregateRegistry> {
        &self.registry
    }

    /// Compile using the interpreter's own table choices
    pub async fn compile(
        &self,
        rule_text: &str,
        schema: &SchemaDescriptor,
    ) -> CompileResult<TransformSpec> {
        self.compile_with(rule_text, schema, &CompileOptions::default())
            .await
    }

    /// Interpret the rule text, then normalize the candidate
    pub async fn compile_with(
        &self,
        rule_text: &str,
        schema: &SchemaDescriptor,
        options: &CompileOptions,
    ) -> CompileResult<TransformSpec> {
        let candidate = match tokio::time::timeout(
            self.interpreter_timeout,
            self.interpreter.interpret(rule_text, schema),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(CompileError::InterpreterTimeout {
                    seconds: self.interpreter_timeout.as_secs(),
                })
            }
        };
        self.normalize(&candidate, schema, options)
    }

    /// Resolve and validate a candidate. Pure: the same inputs always give
    /// the same spec.
    pub fn normalize(
        &self,
        candidate: &CandidateRule,
        schema: &SchemaDescriptor,
        options: &CompileOptions,
    ) -> CompileResult<TransformSpec> {
        let source_name = options
            .source_table
            .as_deref()
            .or(candidate.source_tables.first().map(String::as_str))
            .ok_or_else(|| CompileError::interpretation("rule names no source table"))?;
        let source = resolve_table(schema, source_name)?;

        let target_name = options
            .target_table
            .as_deref()
            .or(candidate.target_table.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CompileError::interpretation("rule names no target table"))?
            .to_string();

        let mut b = SpecBuilder::new(source, target_name.clone());

        for g in &candidate.group_by {
            let col = b.resolve_source_column(g)?;
            if !b.group.contains(&col) {
                b.group.push(col);
            }
        }

        let mut key = Vec::new();
        for pk in &candidate.primary_key {
            let col = if candidate.row_per_source_row {
                b.resolve_source_column(pk)?
            } else {
                resolve_in(&b.group, pk, "group key")?
            };
            if !key.contains(&col) {
                key.push(col);
            }
        }
        if key.is_empty() {
            if candidate.row_per_source_row || b.group.is_empty() {
                return Err(CompileError::mismatch(format!(
                    "target '{}' needs a primary key",
                    target_name
                )));
            }
            key = b.group.clone();
        }
        b.key_columns = key.clone();
        for g in b.group_columns() {
            let ty = b.source_type(&g);
            b.outputs.push((g, ty));
        }

        self.add_aggregations(&mut b, candidate)?;

        let mut filters = Vec::with_capacity(candidate.filters.len());
        for f in &candidate.filters {
            let col = b.resolve_source_column(f.column())?;
            b.filter_columns.push(col.clone());
            filters.push(f.with_column(col));
        }

        self.add_derived(&mut b, candidate)?;
        for segment in &candidate.segments {
            b.add_segment(segment)?;
        }

        let mut ranking = Vec::with_capacity(candidate.ranking.len());
        for r in &candidate.ranking {
            let order = b.resolve_output(&r.order_by)?;
            let secondary = match &r.secondary {
                Some(s) => Some(SortKey {
                    column: b.resolve_output(s)?,
                    descending: r.secondary_descending,
                }),
                None => None,
            };
            b.claim_output(&r.output, ColumnType::Integer)?;
            ranking.push(RankSpec {
                output: r.output.clone(),
                order_by: SortKey {
                    column: order,
                    descending: r.descending,
                },
                secondary,
                dense: r.dense,
            });
        }

        let mut source_entities = vec![TableRef::new(b.source.name.clone())];
        for extra in &candidate.source_tables {
            let t = resolve_table(schema, extra)?;
            if !source_entities.iter().any(|e| e.name == t.name) {
                source_entities.push(TableRef::new(t.name.clone()));
            }
        }

        let mut references = Vec::with_capacity(candidate.references.len());
        for r in &candidate.references {
            let column = b.resolve_output(&r.column)?;
            let table = resolve_table(schema, &r.table)?;
            let referenced = resolve_column(table, &r.references)?;
            if !source_entities.iter().any(|e| e.name == table.name) {
                source_entities.push(TableRef::new(table.name.clone()));
            }
            references.push(ForeignKeyRef {
                column,
                references: ColumnRef::new(table.name.clone(), referenced),
            });
        }

        let mut non_nullable = key.clone();
        for n in &candidate.non_nullable {
            let col = b.resolve_output(n)?;
            if !non_nullable.contains(&col) {
                non_nullable.push(col);
            }
        }

        let group_columns = b.group_columns();
        let columns = b
            .outputs
            .iter()
            .map(|(name, ty)| ColumnDef {
                name: name.clone(),
                column_type: *ty,
                nullable: !non_nullable.contains(name) && !group_columns.contains(name),
            })
            .collect();

        let source_columns = b.source_columns();
        let spec = TransformSpec {
            source_entities,
            target_entity: TargetEntity {
                name: target_name,
                primary_key: key,
                row_per_source_row: candidate.row_per_source_row,
                columns,
            },
            group_by: b
                .group
                .iter()
                .map(|g| ColumnRef::new(b.source.name.clone(), g.clone()))
                .collect(),
            aggregations: b.aggregations,
            filters,
            derived_columns: b.derived,
            ranking,
            source_columns,
            references,
            non_nullable,
        };
        spec.validate()?;
        log::debug!(
            "Compiled rule into '{}' ({} aggregations, {} derived, {} ranks)",
            spec.target_entity.name,
            spec.aggregations.len(),
            spec.derived_columns.len(),
            spec.ranking.len()
        );
        Ok(spec)
    }

    fn add_aggregations(&self, b: &mut SpecBuilder<'_>, candidate: &CandidateRule) -> CompileResult<()> {
        for agg in &candidate.aggregations {
            let def = self.registry.lookup(&agg.function).ok_or_else(|| {
                CompileError::UnsupportedAggregation {
                    function: agg.function.clone(),
                }
            })?;
            let column = match &agg.column {
                Some(c) if c.trim() != "*" => Some(b.resolve_source_column(c)?),
                _ => None,
            };
            let input_type = column.as_deref().map(|c| b.source_type(c));
            if def.requires_column && column.is_none() {
                return Err(CompileError::mismatch(format!(
                    "aggregation '{}' needs an input column",
                    def.name
                )));
            }
            if def.numeric_input && !input_type.is_some_and(ColumnType::is_numeric) {
                return Err(CompileError::mismatch(format!(
                    "aggregation '{}' needs a numeric column, '{}' is {}",
                    def.name,
                    column.as_deref().unwrap_or("*"),
                    input_type.unwrap_or_default()
                )));
            }

            let existing = b
                .aggregations
                .iter()
                .find(|a| a.function == def.name && a.column == column)
                .map(|a| a.output.clone());
            if let Some(existing) = existing {
                log::debug!(
                    "Dropping duplicate aggregation {}({}); already produced as '{}'",
                    def.name,
                    column.as_deref().unwrap_or("*"),
                    existing
                );
                if let Some(alias) = agg.output.as_deref() {
                    b.add_alias(alias, &existing)?;
                }
                continue;
            }

            let output = agg.output.clone().unwrap_or_else(|| match &column {
                Some(c) => format!("{}_{}", def.name, c),
                None => def.name.clone(),
            });
            let output_type = def.output_type(input_type);
            b.claim_output(&output, output_type)?;
            b.aggregations.push(AggExpr {
                output,
                function: def.name.clone(),
                column,
                output_type,
            });
        }
        Ok(())
    }

    fn add_derived(&self, b: &mut SpecBuilder<'_>, candidate: &CandidateRule) -> CompileResult<()> {
        for d in &candidate.derived {
            let (raw, declared_type, range) = match (&d.expr, &d.formula) {
                (Some(expr), _) => (expr.clone(), None, d.valid_range),
                (None, Some(name)) => {
                    let formula = self
                        .formulas
                        .get(name)
                        .or_else(|| {
                            self.formulas
                                .iter()
                                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                                .map(|(_, v)| v)
                        })
                        .ok_or_else(|| {
                            let known: Vec<&str> =
                                self.formulas.keys().map(String::as_str).collect();
                            CompileError::mismatch(format!(
                                "unknown formula '{}' (configured: {})",
                                name,
                                if known.is_empty() {
                                    "none".to_string()
                                } else {
                                    known.join(", ")
                                }
                            ))
                        })?;
                    (
                        formula.expr.clone(),
                        Some(formula.output_type),
                        d.valid_range.or(formula.range),
                    )
                }
                (None, None) => {
                    return Err(CompileError::interpretation(format!(
                        "derived column '{}' has neither an expression nor a formula",
                        d.name
                    )))
                }
            };
            let expr = raw.try_map_columns(&mut |c: &str| b.resolve_output(c))?;
            let inferred = expr.infer_type(&|c: &str| b.output_type(c));
            let output_type = declared_type.unwrap_or(inferred);
            b.claim_output(&d.name, output_type)?;
            b.derived.push(DerivedExpr {
                name: d.name.clone(),
                expr,
                output_type,
                valid_range: range,
            });
        }
        Ok(())
    }
}

/// Accumulates resolved pieces while a candidate is normalized
struct SpecBuilder<'a> {
    source: &'a TableSchema,
    target: String,
    group: Vec<String>,
    /// Target primary key
    key_columns: Vec<String>,
    filter_columns: Vec<String>,
    aggregations: Vec<AggExpr>,
    derived: Vec<DerivedExpr>,
    /// Output columns defined so far, in canonical order
    outputs: Vec<(String, ColumnType)>,
    /// Names of merged duplicate aggregations -> the output that survived
    aliases: Vec<(String, String)>,
}

impl<'a> SpecBuilder<'a> {
    fn new(source: &'a TableSchema, target: String) -> Self {
        Self {
            source,
            target,
            group: Vec::new(),
            key_columns: Vec::new(),
            filter_columns: Vec::new(),
            aggregations: Vec::new(),
            derived: Vec::new(),
            outputs: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Group key columns; fact tables also key on their primary key
    fn group_columns(&self) -> Vec<String> {
        let mut cols = self.group.clone();
        for k in &self.key_columns {
            if !cols.contains(k) {
                cols.push(k.clone());
            }
        }
        cols
    }

    fn resolve_source_column(&self, wanted: &str) -> CompileResult<String> {
        let column = match wanted.split_once('.') {
            Some((table, column)) => {
                if !table.eq_ignore_ascii_case(&self.source.name) {
                    return Err(CompileError::mismatch(format!(
                        "'{}' is not a column of the primary source '{}'",
                        wanted, self.source.name
                    )));
                }
                column
            }
            None => wanted,
        };
        resolve_column(self.source, column)
    }

    fn source_type(&self, column: &str) -> ColumnType {
        self.source
            .column(column)
            .map(|c| c.column_type)
            .unwrap_or_default()
    }

    fn output_type(&self, column: &str) -> Option<ColumnType> {
        self.outputs
            .iter()
            .find(|(n, _)| n == column)
            .map(|(_, t)| *t)
    }

    /// Resolve an output column; names of merged aggregations resolve to
    /// the output that replaced them
    fn resolve_output(&self, wanted: &str) -> CompileResult<String> {
        let names: Vec<String> = self.outputs.iter().map(|(n, _)| n.clone()).collect();
        resolve_in(&names, wanted, "output column").or_else(|err| {
            let wanted = wanted.trim();
            self.aliases
                .iter()
                .find(|(alias, _)| alias == wanted)
                .or_else(|| {
                    self.aliases
                        .iter()
                        .find(|(alias, _)| alias.eq_ignore_ascii_case(wanted))
                })
                .map(|(_, target)| target.clone())
                .ok_or(err)
        })
    }

    fn add_alias(&mut self, alias: &str, target: &str) -> CompileResult<()> {
        if alias.eq_ignore_ascii_case(target) {
            return Ok(());
        }
        if self.is_claimed(alias) {
            return Err(CompileError::mismatch(format!(
                "output column '{}' is defined twice in '{}'",
                alias, self.target
            )));
        }
        log::debug!("Output '{}' is an alias of '{}'", alias, target);
        self.aliases.push((alias.to_string(), target.to_string()));
        Ok(())
    }

    fn is_claimed(&self, name: &str) -> bool {
        self.outputs.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
            || self.aliases.iter().any(|(a, _)| a.eq_ignore_ascii_case(name))
    }

    fn claim_output(&mut self, name: &str, ty: ColumnType) -> CompileResult<()> {
        if name.trim().is_empty() {
            return Err(CompileError::interpretation("output column without a name"));
        }
        if self.is_claimed(name) {
            return Err(CompileError::mismatch(format!(
                "output column '{}' is defined twice in '{}'",
                name, self.target
            )));
        }
        self.outputs.push((name.to_string(), ty));
        Ok(())
    }

    /// Expand a segment into a CASE expression that keeps declaration order
    fn add_segment(&mut self, segment: &CandidateSegment) -> CompileResult<()> {
        let column = self.resolve_output(&segment.column)?;
        let branches = segment
            .thresholds
            .iter()
            .map(|t| SegmentBranch {
                when: Condition::new(
                    Expr::Column(column.clone()),
                    t.op,
                    Expr::Literal(t.value.clone()),
                ),
                then: Expr::Literal(Value::Text(t.label.clone())),
            })
            .collect();
        let default = segment
            .default
            .clone()
            .map(Value::Text)
            .unwrap_or(Value::Null);
        self.claim_output(&segment.name, ColumnType::Text)?;
        self.derived.push(DerivedExpr {
            name: segment.name.clone(),
            expr: Expr::Case {
                branches,
                default: Box::new(Expr::Literal(default)),
            },
            output_type: ColumnType::Text,
            valid_range: None,
        });
        Ok(())
    }

    /// Primary source columns the plan reads, in table declaration order
    fn source_columns(&self) -> Vec<ColumnDef> {
        let mut used = self.group_columns();
        used.extend(self.aggregations.iter().filter_map(|a| a.column.clone()));
        used.extend(self.filter_columns.iter().cloned());
        self.source
            .columns
            .iter()
            .filter(|c| used.contains(&c.name))
            .cloned()
            .collect()
    }
}

fn resolution_to_result(
    resolution: Resolution,
    wanted: &str,
    kind: &'static str,
) -> CompileResult<String> {
    match resolution {
        Resolution::Exact(name) => Ok(name),
        Resolution::CaseInsensitive(name) => {
            log::debug!("Resolved {} '{}' case-insensitively to '{}'", kind, wanted, name);
            Ok(name)
        }
        Resolution::Ambiguous(candidates) => Err(CompileError::Ambiguous {
            identifier: wanted.to_string(),
            kind,
            candidates,
        }),
        Resolution::Missing => Err(CompileError::Ambiguous {
            identifier: wanted.to_string(),
            kind,
            candidates: Vec::new(),
        }),
    }
}

fn resolve_table<'s>(schema: &'s SchemaDescriptor, wanted: &str) -> CompileResult<&'s TableSchema> {
    let name = resolution_to_result(schema.resolve_table(wanted.trim()), wanted, "table")?;
    schema.table(&name).ok_or_else(|| CompileError::Ambiguous {
        identifier: wanted.to_string(),
        kind: "table",
        candidates: Vec::new(),
    })
}

fn resolve_column(table: &TableSchema, wanted: &str) -> CompileResult<String> {
    resolution_to_result(table.resolve_column(wanted.trim()), wanted, "column")
}

fn resolve_in(names: &[String], wanted: &str, kind: &'static str) -> CompileResult<String> {
    resolution_to_result(
        resolve_name(names.iter().map(String::as_str), wanted.trim()),
        wanted,
        kind,
    )
}

#[cfg(test)]
#[path = "compiler_test.rs"]
mod tests;
