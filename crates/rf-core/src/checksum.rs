//! SHA-256 checksums for run output.

use crate::value::Row;
use sha2::{Digest, Sha256};

/// Checksum over whole rows in the given order.
///
/// Each row contributes its columns in `columns` order, so two runs that
/// write the same rows in the same key order produce the same digest.
pub fn rows_checksum<'a>(columns: &[String], rows: impl IntoIterator<Item = &'a Row>) -> String {
    let mut hasher = Sha256::new();
    for row in rows {
        for col in columns {
            match row.get(col) {
                Some(v) => hasher.update(format!("{:?}", v).as_bytes()),
                None => hasher.update(b"Null"),
            }
            hasher.update([0x1f]);
        }
        hasher.update([0x1e]);
    }
    format!("{:x}", hasher.finalize())
}
