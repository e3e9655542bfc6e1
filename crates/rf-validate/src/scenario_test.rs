use super::*;
use rf_core::GroupKey;

fn groups(pairs: &[(i64, Value)]) -> Observation {
    Observation::Groups(
        pairs
            .iter()
            .map(|(k, v)| (GroupKey(vec![Value::Int(*k)]), v.clone()))
            .collect(),
    )
}

#[test]
fn test_equals_groups() {
    let expected = groups(&[(1, Value::Int(150)), (2, Value::Int(200))]);
    let actual = groups(&[(1, Value::Int(150)), (2, Value::Int(200))]);
    assert!(Comparator::Equals.check(&actual, Some(&expected), 0.0).is_ok());
}

#[test]
fn test_equals_reports_missing_and_extra_groups() {
    let expected = groups(&[(1, Value::Int(150)), (2, Value::Int(200))]);
    let actual = groups(&[(1, Value::Int(151)), (3, Value::Int(5))]);
    let err = Comparator::Equals
        .check(&actual, Some(&expected), 0.0)
        .unwrap_err();
    assert!(err.contains("group 1: expected 150, got 151"), "{err}");
    assert!(err.contains("group 2 missing"), "{err}");
    assert!(err.contains("group 3 not present"), "{err}");
}

#[test]
fn test_within_tolerance_absorbs_rounding() {
    let expected = Observation::Scalar(Value::Float(1000.0));
    let close = Observation::Scalar(Value::Float(1000.0000001));
    let far = Observation::Scalar(Value::Float(1000.1));
    let cmp = Comparator::WithinTolerance;
    assert!(cmp.check(&close, Some(&expected), 1e-6).is_ok());
    assert!(cmp.check(&far, Some(&expected), 1e-6).is_err());
}

#[test]
fn test_int_and_float_compare_numerically() {
    assert!(values_match(&Value::Int(150), &Value::Float(150.0), 0.0));
    assert!(values_match(&Value::Null, &Value::Null, 1e-6));
    assert!(!values_match(&Value::Null, &Value::Int(0), 1e-6));
}

#[test]
fn test_subset_of() {
    let allowed = Observation::Values(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let ok = Observation::Values(vec![Value::Int(1), Value::Int(3)]);
    let bad = Observation::Values(vec![Value::Int(1), Value::Int(9)]);
    assert!(Comparator::SubsetOf.check(&ok, Some(&allowed), 0.0).is_ok());
    let err = Comparator::SubsetOf
        .check(&bad, Some(&allowed), 0.0)
        .unwrap_err();
    assert!(err.contains('9'), "{err}");
}

#[test]
fn test_is_unique() {
    let none = Observation::Groups(GroupedValues::new());
    assert!(Comparator::IsUnique.check(&none, None, 0.0).is_ok());
    let dup = groups(&[(7, Value::Int(2))]);
    let err = Comparator::IsUnique.check(&dup, None, 0.0).unwrap_err();
    assert_eq!(err, "1 duplicate key(s): 7 (x2)");
}

#[test]
fn test_in_range() {
    let cmp = Comparator::InRange {
        min: 0.0,
        max: 100.0,
    };
    let ok = Observation::Values(vec![Value::Null, Value::Int(0), Value::Float(99.5)]);
    let bad = Observation::Values(vec![Value::Float(-1.0), Value::Int(50), Value::Int(101)]);
    assert!(cmp.check(&ok, None, 0.0).is_ok());
    let err = cmp.check(&bad, None, 0.0).unwrap_err();
    assert!(err.starts_with("2 value(s) outside"), "{err}");
}

#[test]
fn test_shape_mismatch_is_a_failure() {
    let err = Comparator::Equals
        .check(&Observation::Scalar(Value::Int(1)), None, 0.0)
        .unwrap_err();
    assert_eq!(err, "cannot compare a single value with nothing");
}

#[test]
fn test_long_lists_are_elided() {
    let s = listed((0..8).map(|i| i.to_string()));
    assert_eq!(s, "0, 1, 2, 3, 4, ... (3 more)");
}

#[test]
fn test_kind_serializes_screaming() {
    let json = serde_json::to_string(&ScenarioKind::DerivedFormula).unwrap();
    assert_eq!(json, "\"DERIVED_FORMULA\"");
    assert_eq!(ScenarioKind::SumMatch.to_string(), "SUM_MATCH");
}
