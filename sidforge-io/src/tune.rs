//! The `Tune`: the in-memory aggregate of everything read out of (or about
//! to be written into) one song's data -- instruments, patterns, orders and
//! auxiliary tables.

use crate::instrument::Instrument;
use crate::order::Order;
use crate::pattern::Pattern;
use std::collections::BTreeMap;

/// Size of one of the two memory banks the playroutine alternately loads.
pub const BANK_SIZE: usize = 24 * 1024;

/// Valid gap codes: a pattern with gap code `g` stores one row per
/// `(g + 1)`-row slot, with zero rows materialized in between.
pub const VALID_GAP_CODES: [u8; 7] = [0, 1, 3, 7, 15, 31, 63];

pub fn is_valid_gap_code(g: u8) -> bool {
    VALID_GAP_CODES.contains(&g)
}

/// The three byte tables (wave, arpeggio, filter) instruments index into
/// via their internal start/end/loop offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxTables {
    pub wave: Vec<u8>,
    pub arp: Vec<u8>,
    pub filter: Vec<u8>,
}

/// Everything the parser reads out of one source tune blob, and everything
/// the serializer needs to lay a compiled tune back out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tune {
    /// Index into the blob's base-relative address space each pattern's
    /// rows were read from. Retained so the reachability/effect analysis
    /// phase and the dictionary/packer phase can refer to patterns by the
    /// same identity the source data used.
    pub patterns: BTreeMap<u16, Pattern>,
    pub instruments: Vec<Instrument>,
    pub orders: Vec<Order>,
    pub aux: AuxTables,
    /// Load address the blob's internal references are relative to.
    pub base_address: u16,
    pub start_order: u8,
}

impl Tune {
    pub fn num_orders(&self) -> usize {
        self.orders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_code_validation() {
        for g in VALID_GAP_CODES {
            assert!(is_valid_gap_code(g));
        }
        assert!(!is_valid_gap_code(2));
        assert!(!is_valid_gap_code(64));
    }
}
