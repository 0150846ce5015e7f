//! The global table solver: fits every tune's set of distance deltas (or
//! transpositions) into a single 256-byte shared table, each tune reading
//! its own values back through a per-tune window base.
//!
//! An anytime search: greedy placement (largest sets first, each on the
//! smallest base not yet blocking it) followed by a compaction pass that
//! relocates tunes to an earlier base when one has since become free,
//! repeated until nothing moves or the time budget runs out.

use rayon::prelude::*;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Returned when no assignment of bases to sets fits within a 256-byte
/// table under the given window width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Infeasible;

/// A solved shared table plus the base each input set was assigned.
#[derive(Debug, Clone)]
pub struct TableSolution {
    pub table: Vec<u8>,
    pub bases: Vec<usize>,
}

fn dedup_bytes(set: &[i8]) -> Vec<u8> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for &v in set {
        let b = v as u8;
        if seen.insert(b) {
            out.push(b);
        }
    }
    out
}

/// Checks whether `values` can be made to fit in `table[base..base+window]`
/// without disturbing any other already-placed set, returning the
/// `(absolute_index, value)` writes that placement would require.
fn try_window(table: &[Option<u8>], values: &[u8], window: usize, base: usize) -> Option<Vec<(usize, u8)>> {
    let mut present = HashSet::new();
    let mut free_slots = Vec::new();
    for offset in 0..window {
        let idx = base + offset;
        match table.get(idx).copied().flatten() {
            Some(v) => {
                present.insert(v);
            }
            None => free_slots.push(idx),
        }
    }
    let missing: Vec<u8> = values.iter().copied().filter(|v| !present.contains(v)).collect();
    if missing.len() > free_slots.len() {
        return None;
    }
    Some(missing.into_iter().zip(free_slots).collect())
}

fn apply(table: &mut Vec<Option<u8>>, base: usize, window: usize, writes: Vec<(usize, u8)>) {
    if table.len() < base + window {
        table.resize(base + window, None);
    }
    for (idx, v) in writes {
        table[idx] = Some(v);
    }
}

fn place(table: &mut Vec<Option<u8>>, values: &[u8], window: usize) -> Option<usize> {
    if window == 0 || window > 256 {
        return None;
    }
    for base in 0..=(256 - window) {
        if let Some(writes) = try_window(table, values, window, base) {
            apply(table, base, window, writes);
            return Some(base);
        }
    }
    None
}

fn try_relocate(table: &mut Vec<Option<u8>>, values: &[u8], window: usize, current_base: usize) -> Option<usize> {
    for base in 0..current_base {
        if let Some(writes) = try_window(table, values, window, base) {
            apply(table, base, window, writes);
            return Some(base);
        }
    }
    None
}

/// Solves the table-fitting problem for `sets` under `window`, spending up
/// to `budget` on the refinement passes beyond the initial greedy pass (the
/// greedy pass itself always runs to completion or failure).
pub fn solve(sets: &[Vec<i8>], window: usize, budget: Duration) -> Result<TableSolution, Infeasible> {
    let deadline = Instant::now() + budget;
    let mut table: Vec<Option<u8>> = Vec::new();
    let mut bases = vec![0usize; sets.len()];

    let deduped: Vec<Vec<u8>> = sets.iter().map(|s| dedup_bytes(s)).collect();
    let mut order: Vec<usize> = (0..sets.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(deduped[i].len()));

    for &i in &order {
        bases[i] = place(&mut table, &deduped[i], window).ok_or(Infeasible)?;
    }

    loop {
        if Instant::now() >= deadline {
            break;
        }
        let mut moved = false;
        for &i in &order {
            if bases[i] == 0 {
                continue;
            }
            if let Some(better) = try_relocate(&mut table, &deduped[i], window, bases[i]) {
                bases[i] = better;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    let used_len = table.iter().rposition(|slot| slot.is_some()).map(|i| i + 1).unwrap_or(0);
    let table: Vec<u8> = table.into_iter().take(used_len).map(|slot| slot.unwrap_or(0)).collect();

    Ok(TableSolution { table, bases })
}

/// Re-verifies a solved table: every element of every input set must be
/// reachable through `table[base..base+window]`. Returns the index of the
/// first set that fails.
pub fn verify(sets: &[Vec<i8>], window: usize, solution: &TableSolution) -> Result<(), usize> {
    for (i, set) in sets.iter().enumerate() {
        let base = solution.bases[i];
        for &v in set {
            let want = v as u8;
            let present = (0..window).any(|offset| solution.table.get(base + offset).copied().unwrap_or(0) == want);
            if !present {
                return Err(i);
            }
        }
    }
    Ok(())
}

/// For the distance table only: picks an 8-bit constant such that each
/// tune's start-offset triplet, shifted by subtracting the constant, can
/// join that tune's delta set with minimal increase to the overall union.
/// The 10 candidates with the smallest resulting union are fully solved in
/// parallel; the smallest solved table wins.
pub fn search_start_constant(
    delta_sets: &[Vec<i8>],
    start_offsets: &[[u8; 3]],
    window: usize,
    candidates: usize,
    budget: Duration,
) -> Result<(u8, TableSolution), Infeasible> {
    let augmented_for = |c: u8| -> Vec<Vec<i8>> {
        delta_sets
            .iter()
            .zip(start_offsets)
            .map(|(set, offsets)| {
                let mut augmented = set.clone();
                for &o in offsets {
                    augmented.push(o.wrapping_sub(c) as i8);
                }
                augmented
            })
            .collect()
    };

    let mut ranked: Vec<(u8, usize)> = (0u16..=255)
        .map(|c| {
            let c = c as u8;
            let union: HashSet<u8> = augmented_for(c).iter().flatten().map(|&v| v as u8).collect();
            (c, union.len())
        })
        .collect();
    ranked.sort_by_key(|&(_, card)| card);
    ranked.truncate(candidates);

    let solved: Vec<(u8, TableSolution)> = ranked
        .par_iter()
        .filter_map(|&(c, _)| solve(&augmented_for(c), window, budget).ok().map(|sol| (c, sol)))
        .collect();

    solved.into_iter().min_by_key(|(_, sol)| sol.table.len()).ok_or(Infeasible)
}
