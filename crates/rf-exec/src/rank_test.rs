use super::*;

fn groups(totals: &[(i64, i64, i64)]) -> (Vec<Row>, Vec<GroupKey>) {
    let rows: Vec<Row> = totals
        .iter()
        .map(|(id, total, units)| {
            let mut r = Row::new();
            r.insert("id".into(), Value::Int(*id));
            r.insert("total".into(), Value::Int(*total));
            r.insert("units".into(), Value::Int(*units));
            r
        })
        .collect();
    let keys = totals
        .iter()
        .map(|(id, _, _)| GroupKey(vec![Value::Int(*id)]))
        .collect();
    (rows, keys)
}

fn ranks(rows: &[Row], output: &str) -> Vec<i64> {
    rows.iter()
        .map(|r| r[output].as_i64().unwrap())
        .collect()
}

fn spec(dense: bool, secondary: Option<SortKey>) -> RankSpec {
    RankSpec {
        output: "rank".into(),
        order_by: SortKey::desc("total"),
        secondary,
        dense,
    }
}

#[test]
fn test_ties_break_by_ascending_group_key() {
    let (mut rows, keys) = groups(&[(3, 100, 1), (1, 100, 1), (2, 300, 1)]);
    assign_ranks(&spec(false, None), &mut rows, &keys);
    assert_eq!(ranks(&rows, "rank"), vec![3, 2, 1]);
}

#[test]
fn test_ties_break_by_secondary_key() {
    let (mut rows, keys) = groups(&[(1, 100, 5), (2, 100, 9), (3, 50, 1)]);
    assign_ranks(&spec(false, Some(SortKey::desc("units"))), &mut rows, &keys);
    assert_eq!(ranks(&rows, "rank"), vec![2, 1, 3]);
}

#[test]
fn test_dense_ranking_shares_ranks_without_gaps() {
    let (mut rows, keys) = groups(&[(1, 100, 0), (2, 300, 0), (3, 100, 0), (4, 50, 0)]);
    assign_ranks(&spec(true, Some(SortKey::asc("units"))), &mut rows, &keys);
    assert_eq!(ranks(&rows, "rank"), vec![2, 1, 2, 3]);
}

#[test]
fn test_ranking_is_reproducible() {
    let (mut a, keys) = groups(&[(5, 10, 0), (4, 10, 0), (3, 20, 0), (2, 10, 0)]);
    let mut b = a.clone();
    assign_ranks(&spec(false, None), &mut a, &keys);
    assign_ranks(&spec(false, None), &mut b, &keys);
    assert_eq!(a, b);
    assert_eq!(ranks(&a, "rank"), vec![4, 3, 1, 2]);
}

#[test]
fn test_empty_input() {
    let mut rows: Vec<Row> = Vec::new();
    assign_ranks(&spec(false, None), &mut rows, &[]);
    assert!(rows.is_empty());
}
