//! Pattern transformation ahead of dictionary building: the global effect
//! remap and row-equivalence substitution.
//!
//! Instrument cosmetic rewrites (vibrato permutation, end-index bump,
//! pulse-width nibble swap) already live on `Instrument` itself in
//! `sidforge-io`; this module only rewrites rows and patterns.

use itertools::Itertools;
use sidforge_io::pattern::Pattern;
use sidforge_io::row::Row;
use std::collections::{HashMap, HashSet};

/// The one effect code whose parameter's high nibble selects a sub-command
/// rather than being an ordinary parameter byte.
pub const EXTENDED_EFFECT: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TopKey {
    Effect(u8),
    Extended,
}

impl TopKey {
    /// The code this key would sort by if it had never been remapped, used
    /// only to break frequency ties deterministically.
    fn tie_break_code(self) -> u8 {
        match self {
            TopKey::Effect(code) => code,
            TopKey::Extended => EXTENDED_EFFECT,
        }
    }
}

/// Renumbers every distinct effect code observed across a set of patterns'
/// active rows by descending frequency, ties broken by the original code.
/// `EXTENDED_EFFECT` is counted as a single bucket regardless of which
/// sub-code its rows carry; the sub-codes themselves (the parameter's high
/// nibble) are renumbered separately, within their own namespace.
///
/// Effect code `0` ("no effect") is never counted and never remapped.
#[derive(Debug, Clone, Default)]
pub struct EffectRemap {
    effect_codes: HashMap<u8, u8>,
    extended_subcodes: HashMap<u8, u8>,
    extended_effect_code: Option<u8>,
}

impl EffectRemap {
    pub fn build<'a, I: IntoIterator<Item = &'a Pattern>>(patterns: I) -> EffectRemap {
        let mut top_counts: HashMap<TopKey, u32> = HashMap::new();
        let mut sub_counts: HashMap<u8, u32> = HashMap::new();

        for pattern in patterns {
            for row in pattern.active_rows() {
                if row.effect == 0 {
                    continue;
                }
                if row.effect == EXTENDED_EFFECT {
                    *top_counts.entry(TopKey::Extended).or_insert(0) += 1;
                    *sub_counts.entry(row.param >> 4).or_insert(0) += 1;
                } else {
                    *top_counts.entry(TopKey::Effect(row.effect)).or_insert(0) += 1;
                }
            }
        }

        let ranked_top: Vec<TopKey> = top_counts
            .into_iter()
            .sorted_by(|(a_key, a_count), (b_key, b_count)| {
                b_count.cmp(a_count).then_with(|| a_key.tie_break_code().cmp(&b_key.tie_break_code()))
            })
            .map(|(key, _)| key)
            .collect();

        let mut effect_codes = HashMap::new();
        let mut extended_effect_code = None;
        for (i, key) in ranked_top.into_iter().enumerate() {
            let new_code = (i + 1) as u8;
            match key {
                TopKey::Effect(old) => {
                    effect_codes.insert(old, new_code);
                }
                TopKey::Extended => extended_effect_code = Some(new_code),
            }
        }

        let ranked_sub: Vec<u8> = sub_counts
            .into_iter()
            .sorted_by(|(a_sub, a_count), (b_sub, b_count)| b_count.cmp(a_count).then_with(|| a_sub.cmp(b_sub)))
            .map(|(sub, _)| sub)
            .collect();
        let extended_subcodes: HashMap<u8, u8> =
            ranked_sub.into_iter().enumerate().map(|(i, old)| (old, i as u8)).collect();

        EffectRemap {
            effect_codes,
            extended_subcodes,
            extended_effect_code,
        }
    }

    /// Applies the remap to one row. Rows with effect `0` pass through
    /// unchanged.
    pub fn apply(&self, row: Row) -> Row {
        if row.effect == 0 {
            return row;
        }
        if row.effect == EXTENDED_EFFECT {
            let new_effect = self.extended_effect_code.expect("row carries an effect the remap was never built from");
            let new_sub = self.extended_subcodes[&(row.param >> 4)];
            return Row {
                effect: new_effect,
                param: (new_sub << 4) | (row.param & 0x0F),
                ..row
            };
        }
        Row {
            effect: self.effect_codes[&row.effect],
            ..row
        }
    }

    pub fn apply_pattern(&self, pattern: &Pattern) -> Pattern {
        let mut all = pattern.rows;
        for row in all.iter_mut().take(pattern.truncate_at as usize) {
            *row = self.apply(*row);
        }
        Pattern::new(all, pattern.truncate_at).expect("truncate_at preserved from a valid pattern")
    }
}

/// A row-for-row substitution map, supplied by an earlier analysis pass and
/// trusted to be idempotent (applying it twice gives the same result as
/// applying it once). Rows in `excluded` are never substituted even if the
/// map has an entry for them.
#[derive(Debug, Clone, Default)]
pub struct RowEquivalence {
    substitutions: HashMap<Row, Row>,
    excluded: HashSet<Row>,
}

impl RowEquivalence {
    pub fn new(substitutions: HashMap<Row, Row>, excluded: HashSet<Row>) -> RowEquivalence {
        RowEquivalence { substitutions, excluded }
    }

    pub fn apply(&self, row: Row) -> Row {
        if self.excluded.contains(&row) {
            return row;
        }
        self.substitutions.get(&row).copied().unwrap_or(row)
    }

    pub fn apply_pattern(&self, pattern: &Pattern) -> Pattern {
        let mut all = pattern.rows;
        for row in all.iter_mut().take(pattern.truncate_at as usize) {
            *row = self.apply(*row);
        }
        Pattern::new(all, pattern.truncate_at).expect("truncate_at preserved from a valid pattern")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(effect: u8, param: u8) -> Row {
        Row {
            note: 1,
            instrument: 0,
            effect,
            param,
        }
    }

    fn pattern_with(rows: Vec<Row>) -> Pattern {
        let mut all = [Row::ZERO; 64];
        let n = rows.len();
        for (i, r) in rows.into_iter().enumerate() {
            all[i] = r;
        }
        Pattern::new(all, n.max(1) as u8).unwrap()
    }

    #[test]
    fn most_frequent_effect_gets_code_one() {
        let p = pattern_with(vec![row(5, 0), row(5, 0), row(3, 0)]);
        let remap = EffectRemap::build([&p]);
        assert_eq!(remap.apply(row(5, 0)).effect, 1);
        assert_eq!(remap.apply(row(3, 0)).effect, 2);
    }

    #[test]
    fn zero_effect_never_remapped() {
        let p = pattern_with(vec![row(5, 0)]);
        let remap = EffectRemap::build([&p]);
        assert_eq!(remap.apply(Row::ZERO), Row::ZERO);
    }

    #[test]
    fn extended_subcodes_remapped_independently_of_top_level_codes() {
        let p = pattern_with(vec![
            row(EXTENDED_EFFECT, 0x20),
            row(EXTENDED_EFFECT, 0x20),
            row(EXTENDED_EFFECT, 0x10),
        ]);
        let remap = EffectRemap::build([&p]);
        // sub-code 2 is more frequent than sub-code 1, so it gets new sub 0.
        assert_eq!(remap.apply(row(EXTENDED_EFFECT, 0x20)).param >> 4, 0);
        assert_eq!(remap.apply(row(EXTENDED_EFFECT, 0x10)).param >> 4, 1);
    }

    #[test]
    fn extended_bucket_competes_with_plain_effects_by_combined_frequency() {
        let p = pattern_with(vec![
            row(EXTENDED_EFFECT, 0x10),
            row(EXTENDED_EFFECT, 0x20),
            row(EXTENDED_EFFECT, 0x30),
            row(7, 0),
        ]);
        let remap = EffectRemap::build([&p]);
        // three extended rows outrank the single plain-effect-7 row.
        assert_eq!(remap.apply(row(EXTENDED_EFFECT, 0x10)).effect, 1);
        assert_eq!(remap.apply(row(7, 0)).effect, 2);
    }

    #[test]
    fn row_equivalence_respects_the_excluded_list() {
        let mut subs = HashMap::new();
        subs.insert(row(5, 1), row(5, 2));
        let mut excluded = HashSet::new();
        excluded.insert(row(5, 1));
        let eq = RowEquivalence::new(subs, excluded);
        assert_eq!(eq.apply(row(5, 1)), row(5, 1));
    }

    #[test]
    fn row_equivalence_substitutes_unexcluded_rows() {
        let mut subs = HashMap::new();
        subs.insert(row(5, 1), row(5, 2));
        let eq = RowEquivalence::new(subs, HashSet::new());
        assert_eq!(eq.apply(row(5, 1)), row(5, 2));
    }
}
