//! Candidate rules returned by an interpreter
//!
//! A candidate is the loosely-typed structure an interpreter extracts from
//! rule text. Identifiers are unresolved and may be misspelled in case,
//! qualified (`orders.amount`) or not, and aggregates are free-form names.
//! Every field defaults, so an interpreter can return a partial JSON object.

use rf_core::{CompareOp, Expr, Predicate, Value};
use serde::{Deserialize, Serialize};

/// Structured rule proposed by the interpreter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRule {
    /// Source tables; the first is the table rows are aggregated from
    pub source_tables: Vec<String>,
    pub target_table: Option<String>,
    pub primary_key: Vec<String>,
    pub group_by: Vec<String>,
    pub aggregations: Vec<CandidateAggregation>,
    pub filters: Vec<Predicate>,
    pub derived: Vec<CandidateDerived>,
    pub segments: Vec<CandidateSegment>,
    pub ranking: Vec<CandidateRank>,
    pub references: Vec<CandidateReference>,
    pub non_nullable: Vec<String>,
    /// Fact table: one target row per source row keyed by `primary_key`
    pub row_per_source_row: bool,
}

impl CandidateRule {
    /// Parse a candidate from an interpreter's JSON answer
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// "total amount spent" -> `{ function: "sum", column: "amount", output: "total_spent" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAggregation {
    pub function: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// A computed column given either inline or by configured formula name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDerived {
    pub name: String,
    #[serde(default)]
    pub expr: Option<Expr>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub valid_range: Option<(f64, f64)>,
}

/// Named thresholds such as "VIP: > $5000, Regular: > $100, otherwise New"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSegment {
    pub name: String,
    pub column: String,
    /// Evaluated in declaration order, first match wins
    pub thresholds: Vec<CandidateThreshold>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateThreshold {
    pub label: String,
    pub op: CompareOp,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRank {
    pub output: String,
    pub order_by: String,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub secondary: Option<String>,
    #[serde(default)]
    pub secondary_descending: bool,
    #[serde(default)]
    pub dense: bool,
}

/// "customer_id must exist in customers.id"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateReference {
    pub column: String,
    pub table: String,
    pub references: String,
}
