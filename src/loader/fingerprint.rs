use sha2::{Digest, Sha256};

use crate::table::PROVENANCE_COLUMNS;

pub const FINGERPRINT_COLUMN: &str = "row_fingerprint";
pub const ROW_INDEX_COLUMN: &str = "row_index";

const NAME_VALUE_SEPARATOR: &[u8] = b"\x1e";
const FIELD_SEPARATOR: &[u8] = b"\x1f";

pub fn is_fingerprinted(column: &str) -> bool {
    !PROVENANCE_COLUMNS
        .iter()
        .chain([FINGERPRINT_COLUMN, ROW_INDEX_COLUMN].iter())
        .any(|excluded| excluded.eq_ignore_ascii_case(column))
}

/// SHA-256 over the row's content columns. Provenance, the row index and the
/// fingerprint itself are ignored; the remaining `(name, value)` pairs are
/// trimmed, sorted by name and joined with control-character separators.
///
/// This is deliberately not a plain concatenation of every column's value in
/// name order. Each value is tagged with its column name and empty values are
/// left out, so a column added to the target later (empty on old rows) leaves
/// the fingerprints of rows loaded before it unchanged. Names are compared in
/// ASCII lower case, as SQLite compares identifiers.
pub fn fingerprint_row<'a, I>(cells: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut pairs: Vec<(String, &str)> = cells
        .into_iter()
        .filter(|(column, _)| is_fingerprinted(column))
        .filter_map(|(column, value)| {
            let value = value?.trim();
            (!value.is_empty()).then(|| (column.to_ascii_lowercase(), value))
        })
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for (index, (column, value)) in pairs.iter().enumerate() {
        if index > 0 {
            hasher.update(FIELD_SEPARATOR);
        }
        hasher.update(column.as_bytes());
        hasher.update(NAME_VALUE_SEPARATOR);
        hasher.update(value.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}
