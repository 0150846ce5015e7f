//! The per-tune row dictionary: slot 0 is always the zero row, and every
//! other distinct non-zero row seen in a used pattern gets a slot, ordered
//! by descending reference count.

use crate::row::Row;
use itertools::Itertools;
use std::collections::HashMap;

/// Number of primary (single-byte) dictionary slots, including slot 0.
pub const PRIMARY_SLOTS: usize = 224;
/// Total addressable slots once the `0xFF` escape extends the index space.
pub const MAX_SLOTS: usize = PRIMARY_SLOTS + 256;

/// An ordered list of rows: `entries[0]` is always [`Row::ZERO`]; the rest
/// are the distinct non-zero rows observed across a tune's used patterns,
/// most-referenced first (ties broken by the rows' natural `Ord`, which is
/// lexicographic over `(note, instrument, effect, param)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDictionary {
    entries: Vec<Row>,
}

impl RowDictionary {
    /// Builds a dictionary from the bag of non-zero rows observed across a
    /// tune's (truncated, transformed) patterns.
    pub fn build<I: IntoIterator<Item = Row>>(rows: I) -> RowDictionary {
        let mut counts: HashMap<Row, u32> = HashMap::new();
        for row in rows {
            if row.is_zero() {
                continue;
            }
            *counts.entry(row).or_insert(0) += 1;
        }

        let ranked: Vec<Row> = counts
            .into_iter()
            .sorted_by(|(row_a, count_a), (row_b, count_b)| {
                count_b.cmp(count_a).then_with(|| row_a.cmp(row_b))
            })
            .map(|(row, _)| row)
            .collect();

        let mut entries = Vec::with_capacity(ranked.len() + 1);
        entries.push(Row::ZERO);
        entries.extend(ranked);
        RowDictionary { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Row> {
        self.entries.get(index).copied()
    }

    pub fn index_of(&self, row: &Row) -> Option<usize> {
        if row.is_zero() {
            return Some(0);
        }
        self.entries.iter().position(|r| r == row)
    }

    pub fn entries(&self) -> &[Row] {
        &self.entries
    }

    /// Whether every referenced slot fits without the `0xFF` escape.
    pub fn fits_primary(&self) -> bool {
        self.entries.len() <= PRIMARY_SLOTS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(note: u8) -> Row {
        Row {
            note,
            instrument: 1,
            effect: 0,
            param: 0,
        }
    }

    #[test]
    fn slot_zero_is_always_the_zero_row() {
        let dict = RowDictionary::build(vec![Row::ZERO, Row::ZERO]);
        assert_eq!(dict.get(0), Some(Row::ZERO));
        assert_eq!(dict.len(), 1);
    }

    #[test]
    fn sorted_by_descending_frequency_then_lexicographically() {
        let dict = RowDictionary::build(vec![row(10), row(5), row(5), row(10), row(5)]);
        // row(5) appears 3 times, row(10) appears 2 times.
        assert_eq!(dict.get(1), Some(row(5)));
        assert_eq!(dict.get(2), Some(row(10)));
    }

    #[test]
    fn ties_broken_lexicographically() {
        let dict = RowDictionary::build(vec![row(10), row(5)]);
        // Equal counts (1 each): row(5) < row(10) lexicographically.
        assert_eq!(dict.get(1), Some(row(5)));
        assert_eq!(dict.get(2), Some(row(10)));
    }

    #[test]
    fn single_entry_fits_primary_slots() {
        let dict = RowDictionary::build(vec![row(1)]);
        assert_eq!(dict.len(), 2);
        assert!(dict.fits_primary());
        assert_eq!(dict.index_of(&row(1)), Some(1));
    }
}
