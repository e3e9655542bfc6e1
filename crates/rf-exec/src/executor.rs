//! Batched plan execution

use crate::error::{ExecResult, ExecutionError};
use crate::rank::assign_ranks;
use rf_core::{
    check_row, column_total, rows_checksum, Accumulator, AggregateDef, AggregateRegistry, ExecConfig,
    GroupKey, Row, RunResult, TransformSpec, Value, ROW_COUNT_KEY,
};
use rf_db::{DataHandle, ReadQuery, RowBatches, WriteMode, WriteRequest};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs transform specs from a source handle into a target handle
#[derive(Clone)]
pub struct PlanExecutor {
    source: Arc<dyn DataHandle>,
    target: Arc<dyn DataHandle>,
    registry: Arc<AggregateRegistry>,
}

/// Aggregation resolved against the registry
struct BoundAgg {
    def: Arc<AggregateDef>,
    column: Option<String>,
    output: String,
}

impl BoundAgg {
    fn update(&self, acc: &mut Accumulator, row: &Row) {
        match &self.column {
            Some(c) => acc.update(Some(row.get(c).unwrap_or(&Value::Null))),
            None => acc.update(None),
        }
    }

    fn finish(&self, acc: &Accumulator) -> Value {
        self.def.finish(acc, self.column.is_some())
    }
}

/// Running state across batches
struct Progress {
    result: RunResult,
    groups: BTreeMap<GroupKey, Vec<Accumulator>>,
    source_totals: Vec<Accumulator>,
}

impl PlanExecutor {
    pub fn new(source: Arc<dyn DataHandle>, target: Arc<dyn DataHandle>) -> Self {
        Self {
            source,
            target,
            registry: Arc::new(AggregateRegistry::with_builtins()),
        }
    }

    pub fn with_registry(mut self, registry: Arc<AggregateRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Execute `spec` and upsert its output into the target.
    ///
    /// `cancel` is checked before every batch read and once more before the
    /// write, never in the middle of a batch.
    pub async fn execute(
        &self,
        spec: &TransformSpec,
        batch_size: usize,
        cfg: &ExecConfig,
        cancel: &CancellationToken,
    ) -> ExecResult<RunResult> {
        if batch_size == 0 {
            return Err(ExecutionError::InvalidBatchSize(batch_size));
        }
        spec.validate().map_err(|e| ExecutionError::InvalidPlan {
            message: e.to_string(),
        })?;
        let aggs = self.bind_aggregations(spec)?;
        let started = Instant::now();
        let group_cols = spec.group_columns();
        let source_table = spec
            .primary_source()
            .map(|t| t.name.clone())
            .unwrap_or_default();

        log::info!(
            "Executing plan {} ({}) -> {} ({}), batch size {}, strict {}",
            source_table,
            self.source.db_type(),
            spec.target_entity.name,
            self.target.db_type(),
            batch_size,
            cfg.strict
        );

        let query = ReadQuery::new(
            source_table.clone(),
            spec.source_columns.iter().map(|c| c.name.clone()).collect(),
        )
        .ordered_by(group_cols.clone());
        let mut batches = RowBatches::new(self.source.as_ref(), query, batch_size);

        let mut progress = Progress {
            result: RunResult::new(spec.target_entity.name.clone()),
            groups: BTreeMap::new(),
            source_totals: aggs.iter().map(|a| Accumulator::new(a.def.tracks_distinct)).collect(),
        };

        loop {
            if cancel.is_cancelled() {
                log::info!(
                    "Plan for {} cancelled after {} batches ({} rows)",
                    spec.target_entity.name,
                    progress.result.batches,
                    batches.rows_read()
                );
                return Err(ExecutionError::Cancelled {
                    batches: progress.result.batches,
                });
            }
            let Some(batch) = batches.next_batch().await? else {
                break;
            };
            self.fold_batch(spec, &aggs, &group_cols, cfg, batch, &mut progress)?;
            log::debug!(
                "Batch {} of {}: {} rows read, {} groups, {} skipped",
                progress.result.batches,
                source_table,
                progress.result.rows_read,
                progress.groups.len(),
                progress.result.rows_skipped
            );
        }

        let Progress {
            mut result,
            groups,
            source_totals,
        } = progress;

        let (keys, mut rows): (Vec<GroupKey>, Vec<Row>) = groups
            .into_iter()
            .map(|(key, accs)| {
                let mut row: Row = group_cols.iter().cloned().zip(key.0.iter().cloned()).collect();
                for (agg, acc) in aggs.iter().zip(&accs) {
                    row.insert(agg.output.clone(), agg.finish(acc));
                }
                (key, row)
            })
            .unzip();

        for row in rows.iter_mut() {
            for d in &spec.derived_columns {
                let v = d.expr.eval(row);
                row.insert(d.name.clone(), v);
            }
        }
        for r in &spec.ranking {
            assign_ranks(r, &mut rows, &keys);
        }

        let output_cols = spec.output_columns();
        result.output_checksum = rows_checksum(&output_cols, &rows);
        for (agg, total) in aggs.iter().zip(&source_totals) {
            if !agg.def.additive {
                continue;
            }
            result
                .source_totals
                .insert(agg.output.clone(), agg.finish(total));
            result.checksum_aggregates.insert(
                agg.output.clone(),
                column_total(rows.iter().filter_map(|r| r.get(&agg.output))),
            );
        }
        result
            .checksum_aggregates
            .insert(ROW_COUNT_KEY.to_string(), Value::Int(rows.len() as i64));

        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled {
                batches: result.batches,
            });
        }

        result.rows_written = self
            .target
            .write(WriteRequest {
                table: &spec.target_entity.name,
                columns: &spec.target_entity.columns,
                key: &spec.target_entity.primary_key,
                rows: &rows,
                mode: WriteMode::Upsert,
            })
            .await? as u64;
        result.elapsed = started.elapsed();

        log::info!(
            "Wrote {} rows to {} ({} read, {} skipped, {} batches) in {:?}",
            result.rows_written,
            result.target_table,
            result.rows_read,
            result.rows_skipped,
            result.batches,
            result.elapsed
        );
        Ok(result)
    }

    fn bind_aggregations(&self, spec: &TransformSpec) -> ExecResult<Vec<BoundAgg>> {
        spec.aggregations
            .iter()
            .map(|a| {
                let def = self.registry.lookup(&a.function).ok_or_else(|| {
                    ExecutionError::InvalidPlan {
                        message: format!("aggregate '{}' is not registered", a.function),
                    }
                })?;
                Ok(BoundAgg {
                    def,
                    column: a.column.clone(),
                    output: a.output.clone(),
                })
            })
            .collect()
    }

    /// Fold one batch into batch-local accumulators, then merge them into the
    /// running group totals
    fn fold_batch(
        &self,
        spec: &TransformSpec,
        aggs: &[BoundAgg],
        group_cols: &[String],
        cfg: &ExecConfig,
        batch: Vec<Row>,
        progress: &mut Progress,
    ) -> ExecResult<()> {
        progress.result.batches += 1;
        progress.result.rows_read += batch.len() as u64;

        let mut local: BTreeMap<GroupKey, Vec<Accumulator>> = BTreeMap::new();
        for row in &batch {
            if let Err(reason) = check_row(&spec.source_columns, group_cols, row) {
                if cfg.strict {
                    return Err(ExecutionError::DataIntegrity { message: reason });
                }
                log::warn!(
                    "Skipping malformed source row for {}: {}",
                    progress.result.target_table,
                    reason
                );
                progress.result.rows_skipped += 1;
                if progress.result.skipped_samples.len() < cfg.max_skip_samples {
                    progress.result.skipped_samples.push(reason);
                }
                continue;
            }
            if !spec.filters.iter().all(|f| f.matches(row)) {
                continue;
            }
            let accs = local.entry(GroupKey::from_row(row, group_cols)).or_insert_with(|| {
                aggs.iter()
                    .map(|a| Accumulator::new(a.def.tracks_distinct))
                    .collect()
            });
            for ((agg, acc), total) in aggs
                .iter()
                .zip(accs.iter_mut())
                .zip(progress.source_totals.iter_mut())
            {
                agg.update(acc, row);
                agg.update(total, row);
            }
        }

        for (key, accs) in local {
            match progress.groups.get_mut(&key) {
                Some(running) => {
                    for (r, a) in running.iter_mut().zip(&accs) {
                        r.merge(a);
                    }
                }
                None => {
                    progress.groups.insert(key, accs);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
