//! Scenario model and comparators

use crate::query::{GroupedValues, Observation, ScenarioQuery};
use rf_core::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mismatches listed in a failure message before eliding the rest
const MAX_LISTED: usize = 5;

/// What a scenario asserts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioKind {
    SumMatch,
    CountMatch,
    NullCheck,
    RangeCheck,
    Uniqueness,
    Referential,
    DerivedFormula,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioKind::SumMatch => "SUM_MATCH",
            ScenarioKind::CountMatch => "COUNT_MATCH",
            ScenarioKind::NullCheck => "NULL_CHECK",
            ScenarioKind::RangeCheck => "RANGE_CHECK",
            ScenarioKind::Uniqueness => "UNIQUENESS",
            ScenarioKind::Referential => "REFERENTIAL",
            ScenarioKind::DerivedFormula => "DERIVED_FORMULA",
        };
        f.write_str(s)
    }
}

/// How the target observation is judged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Comparator {
    /// Actual equals expected exactly
    Equals,
    /// Numeric values agree within the scenario's relative tolerance
    WithinTolerance,
    /// Every actual value appears among the expected values
    SubsetOf,
    /// The actual duplicate-key set is empty
    IsUnique,
    /// Every actual value lies within `[min, max]`
    InRange { min: f64, max: f64 },
}

impl Comparator {
    /// `Ok(())` when the check holds, otherwise a description of what differs
    pub fn check(
        &self,
        actual: &Observation,
        expected: Option<&Observation>,
        tolerance: f64,
    ) -> Result<(), String> {
        match self {
            Comparator::Equals => compare(actual, expected, 0.0),
            Comparator::WithinTolerance => compare(actual, expected, tolerance),
            Comparator::SubsetOf => {
                let (Some(values), Some(allowed)) =
                    (actual.as_values(), expected.and_then(Observation::as_values))
                else {
                    return Err(shape_error(actual, expected));
                };
                let missing: Vec<&Value> = values
                    .iter()
                    .filter(|v| allowed.binary_search(*v).is_err())
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(format!(
                        "{} value(s) missing from the referenced column: {}",
                        missing.len(),
                        listed(missing.iter().map(|v| v.to_string()))
                    ))
                }
            }
            Comparator::IsUnique => {
                let Some(dups) = actual.as_groups() else {
                    return Err(shape_error(actual, expected));
                };
                if dups.is_empty() {
                    Ok(())
                } else {
                    Err(format!(
                        "{} duplicate key(s): {}",
                        dups.len(),
                        listed(dups.iter().map(|(k, n)| format!("{} (x{})", k, n)))
                    ))
                }
            }
            Comparator::InRange { min, max } => {
                let Some(values) = actual.as_values() else {
                    return Err(shape_error(actual, expected));
                };
                let outside: Vec<&Value> = values
                    .iter()
                    .filter(|v| match v.as_f64() {
                        Some(x) => x < *min || x > *max,
                        None => !v.is_null(),
                    })
                    .collect();
                if outside.is_empty() {
                    Ok(())
                } else {
                    Err(format!(
                        "{} value(s) outside [{}, {}]: {}",
                        outside.len(),
                        min,
                        max,
                        listed(outside.iter().map(|v| v.to_string()))
                    ))
                }
            }
        }
    }
}

/// An independent, automatically derived correctness assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Stable identifier, e.g. `sum_match.total_spent`
    pub id: String,
    pub description: String,
    pub kind: ScenarioKind,
    /// Expected side; `None` when the check only inspects the target
    pub source_query: Option<ScenarioQuery>,
    /// Actual side, read from the target
    pub target_query: ScenarioQuery,
    pub comparator: Comparator,
    /// Relative tolerance for numeric comparisons; 0 means exact
    pub tolerance: f64,
}

impl Scenario {
    /// Audit SQL for both sides
    pub fn audit_sql(&self) -> (Option<String>, String) {
        (
            self.source_query.as_ref().map(ScenarioQuery::to_sql),
            self.target_query.to_sql(),
        )
    }
}

fn compare(actual: &Observation, expected: Option<&Observation>, tolerance: f64) -> Result<(), String> {
    match (actual, expected) {
        (Observation::Scalar(a), Some(Observation::Scalar(e))) => {
            if values_match(a, e, tolerance) {
                Ok(())
            } else {
                Err(format!("expected {}, got {}", e, a))
            }
        }
        (Observation::Groups(a), Some(Observation::Groups(e))) => compare_groups(a, e, tolerance),
        (Observation::Values(a), Some(Observation::Values(e))) if a == e => Ok(()),
        (Observation::Values(_), Some(Observation::Values(_))) => {
            Err("value sets differ".to_string())
        }
        _ => Err(shape_error(actual, expected)),
    }
}

fn compare_groups(
    actual: &GroupedValues,
    expected: &GroupedValues,
    tolerance: f64,
) -> Result<(), String> {
    let mut problems = Vec::new();
    for (key, e) in expected {
        match actual.get(key) {
            None => problems.push(format!("group {} missing from target", key)),
            Some(a) if !values_match(a, e, tolerance) => {
                problems.push(format!("group {}: expected {}, got {}", key, e, a))
            }
            Some(_) => {}
        }
    }
    for key in actual.keys().filter(|k| !expected.contains_key(*k)) {
        problems.push(format!("group {} not present in source", key));
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "{} group(s) differ: {}",
            problems.len(),
            listed(problems.into_iter())
        ))
    }
}

/// Numeric values within relative `tolerance` of each other, anything else equal
pub(crate) fn values_match(actual: &Value, expected: &Value, tolerance: f64) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) if tolerance > 0.0 => {
            let scale = a.abs().max(e.abs());
            (a - e).abs() <= tolerance * scale
        }
        _ => actual == expected,
    }
}

fn listed(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    if items.len() > MAX_LISTED {
        format!(
            "{}, ... ({} more)",
            items[..MAX_LISTED].join(", "),
            items.len() - MAX_LISTED
        )
    } else {
        items.join(", ")
    }
}

fn shape_error(actual: &Observation, expected: Option<&Observation>) -> String {
    format!(
        "cannot compare {} with {}",
        shape(Some(actual)),
        shape(expected)
    )
}

fn shape(obs: Option<&Observation>) -> &'static str {
    match obs {
        Some(Observation::Scalar(_)) => "a single value",
        Some(Observation::Groups(_)) => "grouped values",
        Some(Observation::Values(_)) => "a value set",
        None => "nothing",
    }
}

#[cfg(test)]
#[path = "scenario_test.rs"]
mod tests;
