//! Rank assignment over the complete aggregate set

use rf_core::{GroupKey, RankSpec, Row, SortKey, Value};
use std::cmp::Ordering;

fn key_cmp(key: &SortKey, a: &Row, b: &Row) -> Ordering {
    let null = Value::Null;
    let va = a.get(&key.column).unwrap_or(&null);
    let vb = b.get(&key.column).unwrap_or(&null);
    let ord = va.cmp(vb);
    if key.descending {
        ord.reverse()
    } else {
        ord
    }
}

/// Write `spec.output` into every row.
///
/// `rows[i]` belongs to group `keys[i]`. Dense ranking gives tied rows the
/// same rank and does not skip ranks. Otherwise every row gets a distinct
/// rank, with ties on the ranking key broken by the secondary key and then by
/// ascending group key, so the assignment is identical across runs.
pub fn assign_ranks(spec: &RankSpec, rows: &mut [Row], keys: &[GroupKey]) {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&i, &j| {
        let mut ord = key_cmp(&spec.order_by, &rows[i], &rows[j]);
        if !spec.dense {
            if let Some(secondary) = &spec.secondary {
                ord = ord.then_with(|| key_cmp(secondary, &rows[i], &rows[j]));
            }
        }
        ord.then_with(|| keys[i].cmp(&keys[j]))
    });

    let mut ranks = vec![0i64; rows.len()];
    let mut current = 0i64;
    for (pos, &idx) in order.iter().enumerate() {
        current = if !spec.dense {
            pos as i64 + 1
        } else if pos == 0
            || key_cmp(&spec.order_by, &rows[order[pos - 1]], &rows[idx]) != Ordering::Equal
        {
            current + 1
        } else {
            current
        };
        ranks[idx] = current;
    }
    for (row, rank) in rows.iter_mut().zip(ranks) {
        row.insert(spec.output.clone(), Value::Int(rank));
    }
}

#[cfg(test)]
#[path = "rank_test.rs"]
mod tests;
