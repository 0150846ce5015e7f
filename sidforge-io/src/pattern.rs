//! The `Pattern` type: 64 rows played on a single channel, plus the
//! `truncate_at` bound beyond which the playroutine can never read.

use crate::row::Row;
use crate::SidforgeIoError;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

/// Number of rows in every pattern, truncated or not.
pub const PATTERN_ROWS: usize = 64;

/// A fixed-size sequence of 64 rows plus the first row index past which the
/// playroutine can never reach during playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    #[serde(with = "BigArray")]
    pub rows: [Row; PATTERN_ROWS],
    /// First row index (`1..=64`) beyond which no reader may look; rows at
    /// or past this point are never actually played.
    pub truncate_at: u8,
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern {
            rows: [Row::ZERO; PATTERN_ROWS],
            truncate_at: PATTERN_ROWS as u8,
        }
    }
}

impl Pattern {
    pub fn new(rows: [Row; PATTERN_ROWS], truncate_at: u8) -> Result<Self, SidforgeIoError> {
        if !(1..=PATTERN_ROWS as u8).contains(&truncate_at) {
            return Err(SidforgeIoError::InvalidTruncateAt(truncate_at));
        }
        Ok(Pattern { rows, truncate_at })
    }

    /// The rows actually reachable during playback: `rows[..truncate_at]`.
    pub fn active_rows(&self) -> &[Row] {
        &self.rows[..self.truncate_at as usize]
    }

    /// True if every row up to `truncate_at` is the zero row.
    pub fn is_silent(&self) -> bool {
        self.active_rows().iter().all(Row::is_zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_is_all_zero_and_untruncated() {
        let p = Pattern::default();
        assert_eq!(p.truncate_at, 64);
        assert!(p.is_silent());
    }

    #[test]
    fn truncate_at_out_of_range_rejected() {
        assert!(Pattern::new([Row::ZERO; PATTERN_ROWS], 0).is_err());
        assert!(Pattern::new([Row::ZERO; PATTERN_ROWS], 65).is_err());
        assert!(Pattern::new([Row::ZERO; PATTERN_ROWS], 1).is_ok());
    }

    #[test]
    fn active_rows_respects_truncate_at() {
        let mut rows = [Row::ZERO; PATTERN_ROWS];
        rows[0].note = 60;
        let p = Pattern::new(rows, 1).unwrap();
        assert_eq!(p.active_rows().len(), 1);
        assert_eq!(p.active_rows()[0].note, 60);
    }
}
