//! Row-level expressions, filter predicates and segment branches
//!
//! Expressions are evaluated with SQL NULL semantics: any arithmetic on NULL,
//! and division by zero, yields NULL. Comparisons involving NULL are false.

use crate::schema::ColumnType;
use crate::sql_utils::{quote_ident, sql_literal};
use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// Binary arithmetic operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithOp {
    #[serde(alias = "+")]
    Add,
    #[serde(alias = "-")]
    Sub,
    #[serde(alias = "*")]
    Mul,
    #[serde(alias = "/")]
    Div,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    /// Apply the operator to two values
    pub fn apply(self, left: &Value, right: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (left, right) {
            let exact = match self {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => None,
            };
            if let Some(v) = exact {
                return Value::Int(v);
            }
        }
        let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
            return Value::Null;
        };
        match self {
            ArithOp::Add => Value::Float(a + b),
            ArithOp::Sub => Value::Float(a - b),
            ArithOp::Mul => Value::Float(a * b),
            ArithOp::Div if b == 0.0 => Value::Null,
            ArithOp::Div => Value::Float(a / b),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[serde(alias = "=", alias = "==")]
    Eq,
    #[serde(alias = "!=", alias = "<>")]
    Ne,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Compare two values; false whenever either side is NULL
    pub fn test(self, left: &Value, right: &Value) -> bool {
        if left.is_null() || right.is_null() {
            return false;
        }
        let ord = left.cmp(right);
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Comparison between two expressions, used as a CASE branch guard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Expr,
    pub op: CompareOp,
    pub right: Expr,
}

impl Condition {
    pub fn new(left: Expr, op: CompareOp, right: Expr) -> Self {
        Self { left, op, right }
    }

    pub fn holds(&self, row: &Row) -> bool {
        self.op.test(&self.left.eval(row), &self.right.eval(row))
    }

    pub fn to_sql(&self) -> String {
        format!(
            "{} {} {}",
            self.left.to_sql(),
            self.op.symbol(),
            self.right.to_sql()
        )
    }
}

/// One `WHEN ... THEN ...` arm. Branches are tried in declaration order and
/// the first one whose condition holds wins, so overlapping thresholds keep
/// their meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBranch {
    pub when: Condition,
    pub then: Expr,
}

/// Expression over the columns of a single row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Column(String),
    Literal(Value),
    Binary {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Case {
        branches: Vec<SegmentBranch>,
        #[serde(default = "null_expr")]
        default: Box<Expr>,
    },
}

fn null_expr() -> Box<Expr> {
    Box::new(Expr::Literal(Value::Null))
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn binary(op: ArithOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluate against a row; unknown columns read as NULL
    pub fn eval(&self, row: &Row) -> Value {
        match self {
            Expr::Column(name) => row.get(name).cloned().unwrap_or(Value::Null),
            Expr::Literal(v) => v.clone(),
            Expr::Binary { op, left, right } => op.apply(&left.eval(row), &right.eval(row)),
            Expr::Case { branches, default } => branches
                .iter()
                .find(|b| b.when.holds(row))
                .map(|b| b.then.eval(row))
                .unwrap_or_else(|| default.eval(row)),
        }
    }

    /// Every column name referenced anywhere in the expression
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Column(name) => {
                out.insert(name.clone());
            }
            Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Case { branches, default } => {
                for b in branches {
                    b.when.left.collect_columns(out);
                    b.when.right.collect_columns(out);
                    b.then.collect_columns(out);
                }
                default.collect_columns(out);
            }
        }
    }

    /// Rewrite every column reference, stopping at the first error
    pub fn try_map_columns<E>(
        &self,
        f: &mut impl FnMut(&str) -> Result<String, E>,
    ) -> Result<Expr, E> {
        Ok(match self {
            Expr::Column(name) => Expr::Column(f(name)?),
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.try_map_columns(f)?),
                right: Box::new(right.try_map_columns(f)?),
            },
            Expr::Case { branches, default } => {
                let mut mapped = Vec::with_capacity(branches.len());
                for b in branches {
                    mapped.push(SegmentBranch {
                        when: Condition {
                            left: b.when.left.try_map_columns(f)?,
                            op: b.when.op,
                            right: b.when.right.try_map_columns(f)?,
                        },
                        then: b.then.try_map_columns(f)?,
                    });
                }
                Expr::Case {
                    branches: mapped,
                    default: Box::new(default.try_map_columns(f)?),
                }
            }
        })
    }

    /// Infer the result type, looking column types up with `lookup`
    pub fn infer_type(&self, lookup: &impl Fn(&str) -> Option<ColumnType>) -> ColumnType {
        match self {
            Expr::Column(name) => lookup(name).unwrap_or_default(),
            Expr::Literal(v) => match v {
                Value::Int(_) => ColumnType::Integer,
                Value::Float(_) => ColumnType::Decimal,
                Value::Bool(_) => ColumnType::Boolean,
                Value::Text(_) | Value::Null => ColumnType::Text,
            },
            Expr::Binary { op, left, right } => {
                let l = left.infer_type(lookup);
                let r = right.infer_type(lookup);
                if *op != ArithOp::Div && l == ColumnType::Integer && r == ColumnType::Integer {
                    ColumnType::Integer
                } else {
                    ColumnType::Decimal
                }
            }
            Expr::Case { branches, default } => {
                let mut arms: Vec<&Expr> = branches.iter().map(|b| &b.then).collect();
                if !matches!(default.as_ref(), Expr::Literal(Value::Null)) {
                    arms.push(default);
                }
                let types: Vec<ColumnType> = arms.iter().map(|e| e.infer_type(lookup)).collect();
                match types.first() {
                    None => ColumnType::Text,
                    Some(first) if types.iter().all(|t| t == first) => *first,
                    Some(_) if types.iter().all(|t| t.is_numeric()) => ColumnType::Decimal,
                    Some(_) => ColumnType::Text,
                }
            }
        }
    }

    /// Render as a SQL expression for audit output
    pub fn to_sql(&self) -> String {
        match self {
            Expr::Column(name) => quote_ident(name),
            Expr::Literal(v) => sql_literal(v),
            Expr::Binary { op, left, right } => match op {
                ArithOp::Div => format!(
                    "({} / NULLIF({}, 0))",
                    left.to_sql(),
                    right.to_sql()
                ),
                _ => format!("({} {} {})", left.to_sql(), op.symbol(), right.to_sql()),
            },
            Expr::Case { branches, default } => {
                let mut sql = String::from("CASE");
                for b in branches {
                    sql.push_str(&format!(" WHEN {} THEN {}", b.when.to_sql(), b.then.to_sql()));
                }
                sql.push_str(&format!(" ELSE {} END", default.to_sql()));
                sql
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Row filter applied to source rows before aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        column: String,
    },
    NotNull {
        column: String,
    },
    InList {
        column: String,
        values: Vec<Value>,
    },
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::IsNull { column }
            | Predicate::NotNull { column }
            | Predicate::InList { column, .. } => column,
        }
    }

    /// Same predicate against a different column name
    pub fn with_column(&self, column: String) -> Predicate {
        match self {
            Predicate::Compare { op, value, .. } => Predicate::Compare {
                column,
                op: *op,
                value: value.clone(),
            },
            Predicate::IsNull { .. } => Predicate::IsNull { column },
            Predicate::NotNull { .. } => Predicate::NotNull { column },
            Predicate::InList { values, .. } => Predicate::InList {
                column,
                values: values.clone(),
            },
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Predicate::Compare { op, value: rhs, .. } => op.test(value, rhs),
            Predicate::IsNull { .. } => value.is_null(),
            Predicate::NotNull { .. } => !value.is_null(),
            Predicate::InList { values, .. } => {
                !value.is_null() && values.iter().any(|v| v == value)
            }
        }
    }

    pub fn to_sql(&self) -> String {
        let col = quote_ident(self.column());
        match self {
            Predicate::Compare { op, value, .. } => {
                format!("{} {} {}", col, op.symbol(), sql_literal(value))
            }
            Predicate::IsNull { .. } => format!("{} IS NULL", col),
            Predicate::NotNull { .. } => format!("{} IS NOT NULL", col),
            Predicate::InList { values, .. } => format!(
                "{} IN ({})",
                col,
                values.iter().map(sql_literal).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

#[cfg(test)]
#[path = "expr_test.rs"]
mod tests;
