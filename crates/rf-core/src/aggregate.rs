//! Extensible aggregate registry
//!
//! Aggregates are data, not an enum: each [`AggregateDef`] says how a shared
//! [`Accumulator`] is finished into a value, what type it produces, and which
//! validation check covers it. The executor and the state machine never match
//! on aggregate names, so new kinds are added with [`AggregateRegistry::register`].

use crate::schema::ColumnType;
use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Which scenario kind verifies an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateCheck {
    /// Compare recomputed source value with the stored value
    SumMatch,
    /// Compare recomputed counts with the stored value
    CountMatch,
}

/// Partial aggregate state for one group
///
/// Batch-local accumulators are merged into the running group totals, so
/// every field must combine associatively.
#[derive(Debug, Clone)]
pub struct Accumulator {
    /// Rows seen (COUNT(*))
    pub rows: u64,
    /// Non-null values seen
    pub count: u64,
    /// Floating sum of non-null numeric values
    pub sum: f64,
    /// Exact integer sum while every value is an integer and nothing overflowed
    pub int_sum: Option<i64>,
    /// Smallest non-null value
    pub min: Option<Value>,
    /// Largest non-null value
    pub max: Option<Value>,
    /// Distinct non-null values, when tracked
    pub distinct: Option<BTreeSet<Value>>,
}

impl Accumulator {
    /// Fresh accumulator; `track_distinct` enables the distinct set
    pub fn new(track_distinct: bool) -> Self {
        Self {
            rows: 0,
            count: 0,
            sum: 0.0,
            int_sum: Some(0),
            min: None,
            max: None,
            distinct: track_distinct.then(BTreeSet::new),
        }
    }

    /// Fold one input value in (`None` for COUNT(*) style aggregates)
    pub fn update(&mut self, value: Option<&Value>) {
        self.rows += 1;
        let Some(value) = value else {
            return;
        };
        if value.is_null() {
            return;
        }
        self.count += 1;
        if let Some(x) = value.as_f64() {
            self.sum += x;
        }
        self.int_sum = match (self.int_sum, value) {
            (Some(acc), Value::Int(i)) => acc.checked_add(*i),
            _ => None,
        };
        if self.min.as_ref().map_or(true, |m| value < m) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().map_or(true, |m| value > m) {
            self.max = Some(value.clone());
        }
        if let Some(set) = self.distinct.as_mut() {
            set.insert(value.clone());
        }
    }

    /// Combine another partial state into this one
    pub fn merge(&mut self, other: &Accumulator) {
        self.rows += other.rows;
        self.count += other.count;
        self.sum += other.sum;
        self.int_sum = match (self.int_sum, other.int_sum) {
            (Some(a), Some(b)) => a.checked_add(b),
            _ => None,
        };
        if let Some(m) = &other.min {
            if self.min.as_ref().map_or(true, |cur| m < cur) {
                self.min = Some(m.clone());
            }
        }
        if let Some(m) = &other.max {
            if self.max.as_ref().map_or(true, |cur| m > cur) {
                self.max = Some(m.clone());
            }
        }
        if let (Some(mine), Some(theirs)) = (self.distinct.as_mut(), other.distinct.as_ref()) {
            mine.extend(theirs.iter().cloned());
        }
    }
}

/// Definition of one aggregate kind
#[derive(Debug, Clone)]
pub struct AggregateDef {
    /// Canonical lowercase name
    pub name: String,
    /// Alternative spellings accepted from the interpreter
    pub aliases: Vec<String>,
    /// Whether an input column is mandatory
    pub requires_column: bool,
    /// Whether the input column must be numeric
    pub numeric_input: bool,
    /// Whether the accumulator must keep distinct values
    pub tracks_distinct: bool,
    /// Whether per-group results add up to the overall total (used for checksums)
    pub additive: bool,
    /// Scenario kind that verifies this aggregate
    pub check: AggregateCheck,
    /// Output type given the input column type
    pub output_type: fn(Option<ColumnType>) -> ColumnType,
    /// Turn the accumulated state into the final value
    pub finish: fn(&Accumulator, bool) -> Value,
}

impl AggregateDef {
    /// Final value for an accumulator; `has_column` is false for COUNT(*)
    pub fn finish(&self, acc: &Accumulator, has_column: bool) -> Value {
        (self.finish)(acc, has_column)
    }

    /// Output type for a given input type
    pub fn output_type(&self, input: Option<ColumnType>) -> ColumnType {
        (self.output_type)(input)
    }
}

fn sum_output(input: Option<ColumnType>) -> ColumnType {
    match input {
        Some(ColumnType::Integer) => ColumnType::Integer,
        _ => ColumnType::Decimal,
    }
}

fn same_as_input(input: Option<ColumnType>) -> ColumnType {
    input.unwrap_or(ColumnType::Decimal)
}

fn finish_sum(acc: &Accumulator, _: bool) -> Value {
    if acc.count == 0 {
        return Value::Null;
    }
    match acc.int_sum {
        Some(i) => Value::Int(i),
        None => Value::Float(acc.sum),
    }
}

fn finish_count(acc: &Accumulator, has_column: bool) -> Value {
    let n = if has_column { acc.count } else { acc.rows };
    Value::Int(n as i64)
}

fn finish_count_distinct(acc: &Accumulator, _: bool) -> Value {
    Value::Int(acc.distinct.as_ref().map_or(0, |s| s.len()) as i64)
}

fn finish_avg(acc: &Accumulator, _: bool) -> Value {
    if acc.count == 0 {
        Value::Null
    } else {
        Value::Float(acc.sum / acc.count as f64)
    }
}

fn finish_min(acc: &Accumulator, _: bool) -> Value {
    acc.min.clone().unwrap_or(Value::Null)
}

fn finish_max(acc: &Accumulator, _: bool) -> Value {
    acc.max.clone().unwrap_or(Value::Null)
}

/// SQL `SUM` over a sequence of values: integer while every input is an
/// integer, NULL when there is no non-null input
pub fn column_total<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut acc = Accumulator::new(false);
    for v in values {
        acc.update(Some(v));
    }
    finish_sum(&acc, true)
}

/// Registry of known aggregate kinds, keyed by canonical name and alias
#[derive(Debug, Clone)]
pub struct AggregateRegistry {
    defs: BTreeMap<String, Arc<AggregateDef>>,
    aliases: BTreeMap<String, String>,
}

impl Default for AggregateRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl AggregateRegistry {
    /// Registry with no aggregates at all
    pub fn empty() -> Self {
        Self {
            defs: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Registry preloaded with sum, count, count_distinct, avg, min, max
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register(AggregateDef {
            name: "sum".into(),
            aliases: vec!["total".into()],
            requires_column: true,
            numeric_input: true,
            tracks_distinct: false,
            additive: true,
            check: AggregateCheck::SumMatch,
            output_type: sum_output,
            finish: finish_sum,
        });
        reg.register(AggregateDef {
            name: "count".into(),
            aliases: vec!["number_of".into()],
            requires_column: false,
            numeric_input: false,
            tracks_distinct: false,
            additive: true,
            check: AggregateCheck::CountMatch,
            output_type: |_| ColumnType::Integer,
            finish: finish_count,
        });
        reg.register(AggregateDef {
            name: "count_distinct".into(),
            aliases: vec!["distinct_count".into(), "unique_count".into()],
            requires_column: true,
            numeric_input: false,
            tracks_distinct: true,
            additive: false,
            check: AggregateCheck::CountMatch,
            output_type: |_| ColumnType::Integer,
            finish: finish_count_distinct,
        });
        reg.register(AggregateDef {
            name: "avg".into(),
            aliases: vec!["mean".into(), "average".into()],
            requires_column: true,
            numeric_input: true,
            tracks_distinct: false,
            additive: false,
            check: AggregateCheck::SumMatch,
            output_type: |_| ColumnType::Decimal,
            finish: finish_avg,
        });
        reg.register(AggregateDef {
            name: "min".into(),
            aliases: vec!["minimum".into(), "earliest".into()],
            requires_column: true,
            numeric_input: false,
            tracks_distinct: false,
            additive: false,
            check: AggregateCheck::SumMatch,
            output_type: same_as_input,
            finish: finish_min,
        });
        reg.register(AggregateDef {
            name: "max".into(),
            aliases: vec!["maximum".into(), "latest".into()],
            requires_column: true,
            numeric_input: false,
            tracks_distinct: false,
            additive: false,
            check: AggregateCheck::SumMatch,
            output_type: same_as_input,
            finish: finish_max,
        });
        reg
    }

    /// Add (or replace) an aggregate kind
    pub fn register(&mut self, def: AggregateDef) {
        let name = def.name.to_ascii_lowercase();
        for alias in &def.aliases {
            self.aliases
                .insert(alias.to_ascii_lowercase(), name.clone());
        }
        self.defs.insert(name, Arc::new(def));
    }

    /// Look up an aggregate by canonical name or alias, ignoring case
    pub fn lookup(&self, name: &str) -> Option<Arc<AggregateDef>> {
        let key = name.trim().to_ascii_lowercase();
        let canonical = self.aliases.get(&key).unwrap_or(&key);
        self.defs.get(canonical).cloned()
    }

    /// Canonical names of all registered aggregates
    pub fn names(&self) -> Vec<&str> {
        self.defs.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
#[path = "aggregate_test.rs"]
mod tests;
