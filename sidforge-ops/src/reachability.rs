//! Order-progression reachability: which orders a tune's playback can ever
//! reach from its start order, and what each of them touches.
//!
//! Patterns are addressed by `pattern_index`, a position into the tune's
//! pattern table ordered by the same address key the parser assigned them
//! ([`Tune::patterns`] is a `BTreeMap`, so iteration order is address order).

use sidforge_io::row::NOTE_REST;
use sidforge_io::tune::Tune;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Pattern break: ends the current order's playback early.
pub const EFFECT_PATTERN_BREAK: u8 = 13;
/// Position jump: the next order is the effect's parameter.
pub const EFFECT_POSITION_JUMP: u8 = 11;
/// Speed change. Recognised so it is never mistaken for a branch effect;
/// it has no bearing on which orders get visited.
pub const EFFECT_SPEED: u8 = 15;

/// What [`analyze`] finds reachable from a tune's start order.
#[derive(Debug, Clone, Default)]
pub struct Reachability {
    /// Orders visited, in visitation order. The walk stops the moment an
    /// order would be revisited, so this list never contains a duplicate.
    pub orders: Vec<usize>,
    /// Addresses of every pattern referenced by a visited order.
    pub patterns: BTreeSet<u16>,
    /// Instrument indices used by any note-on row in a reachable pattern,
    /// up to that pattern's computed truncation.
    pub instruments: BTreeSet<u8>,
    /// Per-pattern truncation: one past the latest of:
    /// - the pattern's own stored `truncate_at`,
    /// - one past the earliest break/jump row observed across channels at
    ///   any order that references it.
    ///
    /// A pattern reused at several orders is truncated to the loosest
    /// (largest) bound any of its occurrences needs.
    pub truncate_at: BTreeMap<u16, u8>,
}

fn pattern_at(tune: &Tune, index: u8) -> Option<(u16, &sidforge_io::pattern::Pattern)> {
    tune.patterns.iter().nth(index as usize).map(|(&addr, p)| (addr, p))
}

/// Simulates order progression starting at `tune.start_order`.
///
/// For each order, every channel's pattern is scanned for the first
/// pattern-break or position-jump effect. The minimum such row across all
/// three channels sets that order's truncation; a position jump (the
/// earliest one found, if more than one channel carries one) selects the
/// next order, otherwise playback falls through to `current + 1`.
/// Revisiting an order ends the walk.
pub fn analyze(tune: &Tune) -> Reachability {
    let mut result = Reachability::default();
    if tune.orders.is_empty() {
        return result;
    }

    let mut visited = HashSet::new();
    let mut current = tune.start_order as usize;

    while current < tune.orders.len() && visited.insert(current) {
        result.orders.push(current);
        let order = tune.orders[current];

        let mut referenced = Vec::with_capacity(order.channels.len());
        let mut earliest_break: Option<u8> = None;
        let mut jump_row: Option<u8> = None;
        let mut jump_target: Option<usize> = None;

        for entry in order.channels {
            let Some((addr, pattern)) = pattern_at(tune, entry.pattern_index) else {
                continue;
            };
            result.patterns.insert(addr);
            referenced.push(addr);

            for (row_idx, row) in pattern.active_rows().iter().enumerate() {
                let row_idx = row_idx as u8;
                if row.note != NOTE_REST {
                    result.instruments.insert(row.instrument);
                }
                match row.effect {
                    EFFECT_PATTERN_BREAK => {
                        earliest_break = Some(earliest_break.map_or(row_idx, |e| e.min(row_idx)));
                        break;
                    }
                    EFFECT_POSITION_JUMP => {
                        earliest_break = Some(earliest_break.map_or(row_idx, |e| e.min(row_idx)));
                        if jump_row.map_or(true, |jr| row_idx < jr) {
                            jump_row = Some(row_idx);
                            jump_target = Some(row.param as usize);
                        }
                        break;
                    }
                    _ => {}
                }
            }
        }

        for addr in &referenced {
            let pattern = &tune.patterns[addr];
            let bound = earliest_break.map_or(pattern.truncate_at, |row| row + 1);
            result
                .truncate_at
                .entry(*addr)
                .and_modify(|t| *t = (*t).max(bound))
                .or_insert(bound);
        }

        current = jump_target.unwrap_or(current + 1);
    }

    result
}
