use super::*;

#[test]
fn test_null_sorts_first() {
    let mut values = vec![
        Value::Text("a".into()),
        Value::Int(3),
        Value::Null,
        Value::Bool(true),
    ];
    values.sort();
    assert_eq!(values[0], Value::Null);
    assert_eq!(values[1], Value::Bool(true));
    assert_eq!(values[2], Value::Int(3));
    assert_eq!(values[3], Value::Text("a".into()));
}

#[test]
fn test_int_and_float_compare_numerically() {
    assert_eq!(Value::Int(2), Value::Float(2.0));
    assert!(Value::Int(2) < Value::Float(2.5));
    assert!(Value::Float(-1.0) < Value::Int(0));
}

#[test]
fn test_int_and_float_compare_exactly_past_f64_precision() {
    let two_53 = 1i64 << 53;
    let big = Value::Int(two_53 + 1);
    let float = Value::Float(two_53 as f64);
    assert!(float < big);
    assert!(big > float);
    assert_ne!(big, float);
    // Rounding through f64 would make these equal and break transitivity
    assert_eq!(Value::Int(two_53), float);
    assert!(Value::Int(two_53) < big);

    assert!(Value::Int(i64::MAX) < Value::Float(9_223_372_036_854_775_808.0));
    assert!(Value::Int(i64::MIN) == Value::Float(-9_223_372_036_854_775_808.0));
    assert!(Value::Int(0) < Value::Float(f64::INFINITY));
    assert!(Value::Int(0) > Value::Float(f64::NEG_INFINITY));
    assert!(Value::Int(i64::MAX) < Value::Float(f64::NAN));
    assert_eq!(Value::Float(-0.0), Value::Int(0));
    assert_eq!(Value::Float(-0.0), Value::Float(0.0));
}

#[test]
fn test_untagged_json_roundtrip_keeps_kinds() {
    let parsed: Vec<Value> = serde_json::from_str(r#"[null, true, 150, 1.5, "vip"]"#).unwrap();
    assert!(matches!(parsed[0], Value::Null));
    assert!(matches!(parsed[1], Value::Bool(true)));
    assert!(matches!(parsed[2], Value::Int(150)));
    assert!(matches!(parsed[3], Value::Float(_)));
    assert!(matches!(parsed[4], Value::Text(_)));
}

#[test]
fn test_group_key_from_row_fills_missing_with_null() {
    let mut row = Row::new();
    row.insert("customer_id".into(), Value::Int(1));
    let key = GroupKey::from_row(&row, &["customer_id".into(), "region".into()]);
    assert_eq!(key.0, vec![Value::Int(1), Value::Null]);
    assert!(key.has_null());
    assert_eq!(key.to_string(), "1|NULL");
}

#[test]
fn test_group_key_ordering_is_lexicographic() {
    let a = GroupKey(vec![Value::Int(1), Value::Text("b".into())]);
    let b = GroupKey(vec![Value::Int(1), Value::Text("c".into())]);
    let c = GroupKey(vec![Value::Int(2), Value::Text("a".into())]);
    assert!(a < b);
    assert!(b < c);
}
