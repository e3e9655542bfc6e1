use super::*;

fn fold(values: &[Value], track_distinct: bool) -> Accumulator {
    let mut acc = Accumulator::new(track_distinct);
    for v in values {
        acc.update(Some(v));
    }
    acc
}

#[test]
fn test_sum_stays_integer_for_integer_input() {
    let reg = AggregateRegistry::with_builtins();
    let sum = reg.lookup("sum").unwrap();
    let acc = fold(&[Value::Int(100), Value::Int(50)], false);
    assert!(matches!(sum.finish(&acc, true), Value::Int(150)));
}

#[test]
fn test_sum_switches_to_float_for_decimals() {
    let reg = AggregateRegistry::with_builtins();
    let sum = reg.lookup("SUM").unwrap();
    let acc = fold(&[Value::Int(1), Value::Float(0.5)], false);
    assert_eq!(sum.finish(&acc, true), Value::Float(1.5));
}

#[test]
fn test_sum_of_only_nulls_is_null() {
    let reg = AggregateRegistry::with_builtins();
    let acc = fold(&[Value::Null, Value::Null], false);
    assert!(reg.lookup("sum").unwrap().finish(&acc, true).is_null());
}

#[test]
fn test_count_star_counts_rows_and_count_column_skips_nulls() {
    let reg = AggregateRegistry::with_builtins();
    let count = reg.lookup("count").unwrap();
    let acc = fold(&[Value::Int(1), Value::Null, Value::Int(3)], false);
    assert_eq!(count.finish(&acc, false), Value::Int(3));
    assert_eq!(count.finish(&acc, true), Value::Int(2));
}

#[test]
fn test_aliases_resolve_to_canonical() {
    let reg = AggregateRegistry::with_builtins();
    assert_eq!(reg.lookup("Total").unwrap().name, "sum");
    assert_eq!(reg.lookup("average").unwrap().name, "avg");
    assert_eq!(reg.lookup("distinct_count").unwrap().name, "count_distinct");
    assert!(reg.lookup("median").is_none());
}

#[test]
fn test_merge_matches_single_pass() {
    let values = [
        Value::Int(5),
        Value::Int(1),
        Value::Int(9),
        Value::Int(1),
        Value::Null,
    ];
    let whole = fold(&values, true);
    let mut left = fold(&values[..2], true);
    let right = fold(&values[2..], true);
    left.merge(&right);

    assert_eq!(left.rows, whole.rows);
    assert_eq!(left.count, whole.count);
    assert_eq!(left.int_sum, whole.int_sum);
    assert_eq!(left.min, whole.min);
    assert_eq!(left.max, whole.max);
    assert_eq!(left.distinct, whole.distinct);
}

#[test]
fn test_register_custom_aggregate() {
    let mut reg = AggregateRegistry::with_builtins();
    reg.register(AggregateDef {
        name: "range".into(),
        aliases: vec!["spread".into()],
        requires_column: true,
        numeric_input: true,
        tracks_distinct: false,
        additive: false,
        check: AggregateCheck::SumMatch,
        output_type: |_| ColumnType::Decimal,
        finish: |acc, _| match (
            acc.min.as_ref().and_then(Value::as_f64),
            acc.max.as_ref().and_then(Value::as_f64),
        ) {
            (Some(lo), Some(hi)) => Value::Float(hi - lo),
            _ => Value::Null,
        },
    });
    let def = reg.lookup("spread").unwrap();
    let acc = fold(&[Value::Int(2), Value::Int(7)], false);
    assert_eq!(def.finish(&acc, true), Value::Float(5.0));
    assert!(reg.names().contains(&"range"));
}

#[test]
fn test_column_total() {
    let ints = [Value::Int(150), Value::Null, Value::Int(200)];
    assert_eq!(column_total(&ints), Value::Int(350));
    let mixed = [Value::Int(1), Value::Float(0.25)];
    assert_eq!(column_total(&mixed), Value::Float(1.25));
    assert!(column_total(std::iter::empty()).is_null());
}
