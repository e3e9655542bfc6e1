//! Read descriptors and the lazy batch reader

use crate::error::DbResult;
use crate::traits::DataHandle;
use rf_core::Row;

/// Which rows of a table to read and in which order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadQuery {
    pub table: String,
    pub columns: Vec<String>,
    /// Leading sort columns; every other selected column follows as a
    /// tie-breaker so that paging with offsets is stable
    pub order_by: Vec<String>,
}

impl ReadQuery {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            order_by: Vec::new(),
        }
    }

    pub fn ordered_by(mut self, keys: Vec<String>) -> Self {
        self.order_by = keys;
        self
    }

    /// Full sort order: `order_by` first, then the remaining columns
    pub fn sort_columns(&self) -> Vec<String> {
        let mut cols = self.order_by.clone();
        for c in &self.columns {
            if !cols.contains(c) {
                cols.push(c.clone());
            }
        }
        cols
    }
}

/// Lazy, finite sequence of row batches.
///
/// Nothing is read until [`RowBatches::next_batch`] is called.
pub struct RowBatches<'a> {
    handle: &'a dyn DataHandle,
    query: ReadQuery,
    batch_size: usize,
    offset: usize,
    done: bool,
}

impl<'a> RowBatches<'a> {
    pub fn new(handle: &'a dyn DataHandle, query: ReadQuery, batch_size: usize) -> Self {
        Self {
            handle,
            query,
            batch_size: batch_size.max(1),
            offset: 0,
            done: false,
        }
    }

    /// Next non-empty batch, or `None` once the table is exhausted
    pub async fn next_batch(&mut self) -> DbResult<Option<Vec<Row>>> {
        if self.done {
            return Ok(None);
        }
        let rows = self
            .handle
            .read_batch(&self.query, self.offset, self.batch_size)
            .await?;
        self.offset += rows.len();
        if rows.len() < self.batch_size {
            self.done = true;
        }
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }

    /// Rows handed out so far
    pub fn rows_read(&self) -> usize {
        self.offset
    }

    pub fn query(&self) -> &ReadQuery {
        &self.query
    }
}
