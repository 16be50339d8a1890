use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::Record;
use crate::schema::Schema;

/// One level of a multi-column sort. `column_index` points into the schema's
/// column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortEntry {
    pub column_index: usize,
    pub descending: bool,
}

/// Ordered sort levels, primary first. A column index appears at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortState {
    entries: Vec<SortEntry>,
}

impl SortState {
    /// Build a state from raw entries, keeping the first occurrence of each
    /// column index.
    pub fn new(entries: Vec<SortEntry>) -> Self {
        let mut deduped: Vec<SortEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            if !deduped.iter().any(|e| e.column_index == entry.column_index) {
                deduped.push(entry);
            }
        }
        SortState { entries: deduped }
    }

    pub fn entries(&self) -> &[SortEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Three-state cycle for a header click: unsorted columns append
    /// ascending, ascending flips to descending in place, descending drops
    /// out of the sequence. Returns a new state.
    pub fn toggle(&self, column_index: usize) -> SortState {
        let mut entries = self.entries.clone();
        match entries.iter().position(|e| e.column_index == column_index) {
            Some(idx) if entries[idx].descending => {
                entries.remove(idx);
            }
            Some(idx) => {
                entries[idx].descending = true;
            }
            None => {
                entries.push(SortEntry {
                    column_index,
                    descending: false,
                });
            }
        }
        SortState { entries }
    }

    /// Remove the column from the sequence regardless of direction.
    pub fn clear(&self, column_index: usize) -> SortState {
        SortState {
            entries: self
                .entries
                .iter()
                .copied()
                .filter(|e| e.column_index != column_index)
                .collect(),
        }
    }

    /// Stable multi-key ordering of `records`: returns the permutation of
    /// indices into the slice. Rows tied on every key keep their original
    /// relative order. Entries pointing outside the schema are skipped.
    pub fn order(&self, records: &[Record], schema: &Schema) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..records.len()).collect();
        if self.entries.is_empty() {
            return indices;
        }

        let keys: Vec<(&SortEntry, &crate::schema::ColumnSpec)> = self
            .entries
            .iter()
            .filter_map(|entry| schema.column(entry.column_index).map(|spec| (entry, spec)))
            .collect();
        if keys.is_empty() {
            return indices;
        }

        indices.sort_by(|&a, &b| {
            for (entry, spec) in &keys {
                let left = records[a].field(&spec.id).unwrap_or_default();
                let right = records[b].field(&spec.id).unwrap_or_default();
                let ord = compare_cells(left, right);
                if ord != Ordering::Equal {
                    return if entry.descending { ord.reverse() } else { ord };
                }
            }
            Ordering::Equal
        });
        indices
    }
}

/// Numeric-aware cell comparison: values that parse as floats compare
/// numerically and sort before values that do not; everything else falls
/// back to string order.
fn compare_cells(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(left), Ok(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
