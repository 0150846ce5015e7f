//! The orchestrator: runs the full tune-compilation pipeline phase by
//! phase, fail-fast, synchronizing only where a phase consumes state every
//! tune contributed to (table solving) or shares afterward (the solved
//! tables).
//!
//! Per-tune phases (parse, analyze, transform, pack) run one worker per
//! tune via `rayon`; table solving and lookup-map construction are
//! single-threaded, consuming every tune's contribution at once.
//!
//! The differential validator (interpreting both the raw blob and the
//! compiled-plus-playroutine binary and diffing their chip-register write
//! streams) needs an assembled playroutine binary, which is a build asset
//! outside this crate's data model -- it isn't wired in here. `sidforge-vm`
//! and `validator` give everything a caller needs to run it once that
//! binary is available.

use crate::packer::{encode_pattern, pack_patterns, select_gap_code, verify_pattern_round_trip, PackError};
use crate::reachability::{self, Reachability};
use crate::solver::{self, TableSolution};
use crate::transform::{EffectRemap, RowEquivalence};
use rayon::prelude::*;
use sidforge_io::dictionary::RowDictionary;
use sidforge_io::instrument::Instrument;
use sidforge_io::order::{channel_deltas, NUM_CHANNELS};
use sidforge_io::parser::{parse_tune, TuneParseError};
use sidforge_io::pattern::Pattern;
use sidforge_io::row::Row;
use sidforge_io::serializer::{serialize_tune, CompiledTuneSections, SerializeError};
use sidforge_io::tune::Tune;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::time::Duration;

pub const DICT_WINDOW_DELTA: usize = sidforge_io::order::DICT_WINDOW_DELTA;
pub const DICT_WINDOW_TRANSPOSE: usize = sidforge_io::order::DICT_WINDOW_TRANSPOSE;
/// How many start-constant candidates the distance-table solve ranks and
/// fully solves before keeping the best.
pub const START_CONSTANT_CANDIDATES: usize = 10;

/// The vibrato-depth permutation every instrument's nibble is remapped
/// through during the transform phase. The playroutine owns the real
/// table; until it is wired in from that source, this is the identity
/// permutation, which makes the rewrite a no-op on the depth nibble while
/// still exercising the end-index bump and pulse-width nibble swap.
pub const VIBRATO_PERMUTATION: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

#[derive(Debug)]
pub enum CompileError {
    Parse { tune: usize, source: TuneParseError },
    DeltaTableInfeasible,
    TransposeTableInfeasible,
    PatternRoundTrip { tune: usize, source: PackError },
    Serialize { tune: usize, source: SerializeError },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Parse { tune, source } => write!(f, "tune {tune}: {source}"),
            Self::DeltaTableInfeasible => {
                write!(f, "no assignment fits every tune's pattern-delta set into the shared table")
            }
            Self::TransposeTableInfeasible => {
                write!(f, "no assignment fits every tune's transpose set into the shared table")
            }
            Self::PatternRoundTrip { tune, source } => write!(f, "tune {tune}: {source}"),
            Self::Serialize { tune, source } => write!(f, "tune {tune}: {source}"),
        }
    }
}

impl Error for CompileError {}

/// Everything produced for one tune by the time it is ready to write out.
pub struct CompiledTune {
    pub reachability: Reachability,
    pub dictionary: RowDictionary,
    pub bytes: Vec<u8>,
}

/// The result of a full compilation run.
pub struct CompileReport {
    pub tunes: Vec<CompiledTune>,
    pub delta_table: TableSolution,
    pub transpose_table: TableSolution,
    pub start_constant: u8,
}

fn truncate_pattern(pattern: &Pattern, truncate_at: Option<u8>) -> Pattern {
    match truncate_at {
        Some(t) if t != pattern.truncate_at => {
            Pattern::new(pattern.rows, t).expect("reachability-derived truncate_at stays within [1, 64]")
        }
        _ => pattern.clone(),
    }
}

/// Builds the dictionary and packed stream for one tune's reachable,
/// transformed patterns, then verifies that every pattern decodes back to
/// its original (truncated) rows out of the shared packed stream -- the
/// "patterns" and "bitstream round-trip" checks. The returned offsets are
/// keyed by pattern address (not by ordinal slot) -- unreached patterns
/// never appear, so the caller has to re-expand them against the tune's
/// full pattern set to preserve `pattern_index` alignment in the serialized
/// offsets table.
fn build_dictionary_and_pack(patterns: &BTreeMap<u16, Pattern>) -> Result<(RowDictionary, BTreeMap<u16, u16>, Vec<u8>), PackError> {
    let gap_codes: BTreeMap<u16, u8> = patterns.iter().map(|(&addr, p)| (addr, select_gap_code(p))).collect();

    let bag: Vec<Row> = patterns
        .iter()
        .flat_map(|(addr, p)| crate::packer::sampled_rows(p, gap_codes[addr]))
        .collect();
    let dictionary = RowDictionary::build(bag);

    let mut encoded: BTreeMap<u16, Vec<u8>> = BTreeMap::new();
    for (&addr, p) in patterns {
        encoded.insert(addr, encode_pattern(p, gap_codes[&addr], &dictionary));
    }
    let packed = pack_patterns(&encoded);

    for (&addr, pattern) in patterns {
        let offset = packed.offsets[&addr];
        verify_pattern_round_trip(addr, pattern, gap_codes[&addr], &packed.bytes, offset, &dictionary)?;
    }

    Ok((dictionary, packed.offsets, packed.bytes))
}

fn lookup_indices(table: &[u8], base: usize, window: usize, deltas: &[i32]) -> Vec<u8> {
    deltas
        .iter()
        .map(|&d| {
            let want = d as i8 as u8;
            (0..window)
                .find(|&off| table.get(base + off).copied().unwrap_or(0) == want)
                .expect("solved table covers every value in this tune's delta set") as u8
        })
        .collect()
}

/// Compiles `blobs` (one raw tune blob per tune) against per-tune
/// row-equivalence maps, spending up to `table_budget` refining each shared
/// table beyond its initial greedy placement.
pub fn compile(blobs: &[Vec<u8>], equivalences: &[RowEquivalence], table_budget: Duration) -> Result<CompileReport, CompileError> {
    // Phase 1: parse, one worker per tune.
    let tunes: Vec<Tune> = blobs
        .par_iter()
        .enumerate()
        .map(|(i, blob)| parse_tune(blob).map_err(|source| CompileError::Parse { tune: i, source }))
        .collect::<Result<Vec<_>, _>>()?;

    // Phase 2: reachability analysis, one worker per tune.
    let reachabilities: Vec<Reachability> = tunes.par_iter().map(reachability::analyze).collect();

    // Phase 3: global effect remap, computed once from every tune's
    // reachable patterns.
    let remap = {
        let reachable_patterns: Vec<&Pattern> = tunes
            .iter()
            .zip(&reachabilities)
            .flat_map(|(tune, r)| r.patterns.iter().filter_map(move |addr| tune.patterns.get(addr)))
            .collect();
        EffectRemap::build(reachable_patterns)
    };

    // Phase 5: row-equivalence substitution, then the effect remap,
    // applied to every reachable pattern (one worker per tune).
    let transformed: Vec<BTreeMap<u16, Pattern>> = tunes
        .par_iter()
        .zip(&reachabilities)
        .zip(equivalences)
        .map(|((tune, r), eq)| {
            r.patterns
                .iter()
                .filter_map(|addr| tune.patterns.get(addr).map(|p| (*addr, p)))
                .map(|(addr, pattern)| {
                    let truncated = truncate_pattern(pattern, r.truncate_at.get(&addr).copied());
                    let substituted = eq.apply_pattern(&truncated);
                    (addr, remap.apply_pattern(&substituted))
                })
                .collect()
        })
        .collect();

    // Phase 7: per-tune dictionary build and pattern packing, each verified
    // by a full pattern round-trip against the packed stream.
    let packed: Vec<(RowDictionary, BTreeMap<u16, u16>, Vec<u8>)> = transformed
        .par_iter()
        .enumerate()
        .map(|(i, patterns)| build_dictionary_and_pack(patterns).map_err(|source| CompileError::PatternRoundTrip { tune: i, source }))
        .collect::<Result<Vec<_>, _>>()?;

    // Phase 9: collect the pattern-delta and transpose sets, per tune,
    // across all channels.
    let mut delta_sets = Vec::with_capacity(tunes.len());
    let mut transpose_sets = Vec::with_capacity(tunes.len());
    let mut per_tune_deltas: Vec<[Vec<i32>; NUM_CHANNELS]> = Vec::with_capacity(tunes.len());
    let mut per_tune_transposes: Vec<[Vec<i32>; NUM_CHANNELS]> = Vec::with_capacity(tunes.len());
    for tune in &tunes {
        let mut deltas: [Vec<i32>; NUM_CHANNELS] = Default::default();
        let mut transposes: [Vec<i32>; NUM_CHANNELS] = Default::default();
        let mut delta_set = Vec::new();
        let mut transpose_set = Vec::new();
        for (ch, (d, t)) in (0..NUM_CHANNELS).map(|ch| (ch, channel_deltas(&tune.orders, ch))) {
            delta_set.extend(d.iter().map(|&v| v as i8));
            transpose_set.extend(t.iter().map(|&v| v as i8));
            deltas[ch] = d;
            transposes[ch] = t;
        }
        delta_sets.push(delta_set);
        transpose_sets.push(transpose_set);
        per_tune_deltas.push(deltas);
        per_tune_transposes.push(transposes);
    }

    // Phase 10: solve both shared tables. The distance table additionally
    // searches for a start constant so every tune's start-offset triplet
    // can be folded into the same set as its deltas.
    let start_offsets: Vec<[u8; 3]> = tunes
        .iter()
        .map(|t| {
            let order = t.orders.get(t.start_order as usize).copied().unwrap_or_default();
            [
                order.channels[0].pattern_index,
                order.channels[1].pattern_index,
                order.channels[2].pattern_index,
            ]
        })
        .collect();
    let (start_constant, delta_table) = solver::search_start_constant(
        &delta_sets,
        &start_offsets,
        DICT_WINDOW_DELTA,
        START_CONSTANT_CANDIDATES,
        table_budget,
    )
    .map_err(|_| CompileError::DeltaTableInfeasible)?;
    let transpose_table =
        solver::solve(&transpose_sets, DICT_WINDOW_TRANSPOSE, table_budget).map_err(|_| CompileError::TransposeTableInfeasible)?;

    // Phase 11: build each tune's per-channel, per-order lookup index
    // arrays against the solved tables, then serialize.
    let mut compiled = Vec::with_capacity(tunes.len());
    for (i, tune) in tunes.iter().enumerate() {
        let (dictionary, offsets, packed_stream) = packed[i].clone();
        // Re-expand to one slot per declared pattern (address-sorted, which
        // is also `pattern_index` order) so unreached patterns still occupy
        // their slot; their offset is never read since no order references
        // them.
        let pattern_offsets: Vec<u16> = tune.patterns.keys().map(|addr| offsets.get(addr).copied().unwrap_or(0)).collect();
        let transpose_idx: [Vec<u8>; NUM_CHANNELS] = std::array::from_fn(|ch| {
            lookup_indices(&transpose_table.table, transpose_table.bases[i], DICT_WINDOW_TRANSPOSE, &per_tune_transposes[i][ch])
        });
        let pattern_delta_idx: [Vec<u8>; NUM_CHANNELS] = std::array::from_fn(|ch| {
            lookup_indices(&delta_table.table, delta_table.bases[i], DICT_WINDOW_DELTA, &per_tune_deltas[i][ch])
        });

        // The unused tail past the highest instrument index any reachable,
        // truncated pattern actually references is discarded, then every
        // surviving instrument is rewritten (end indices, pulse-width
        // nibbles, vibrato depth).
        let used_instruments = reachabilities[i].instruments.iter().next_back().map_or(0, |&max| max as usize + 1).min(tune.instruments.len());
        let instruments: Vec<Instrument> = tune.instruments[..used_instruments]
            .iter()
            .copied()
            .map(|ins| ins.rewrite(&VIBRATO_PERMUTATION))
            .collect();

        let sections = CompiledTuneSections {
            instruments,
            transpose_idx,
            pattern_delta_idx,
            filter_table: tune.aux.filter.clone(),
            wave_table: tune.aux.wave.clone(),
            arp_table: tune.aux.arp.clone(),
            dictionary,
            pattern_offsets,
            packed_stream,
        };
        let bytes = serialize_tune(&sections).map_err(|source| CompileError::Serialize { tune: i, source })?;
        compiled.push(CompiledTune {
            reachability: reachabilities[i].clone(),
            dictionary: sections.dictionary,
            bytes,
        });
    }

    Ok(CompileReport {
        tunes: compiled,
        delta_table,
        transpose_table,
        start_constant,
    })
}

/// Renders one of the two assembler-include files the compiler emits
/// alongside the per-tune binaries: a byte table plus, for the distance
/// table, its start constant.
pub fn render_table_include(label: &str, table: &[u8], start_constant: Option<u8>) -> String {
    let mut out = String::new();
    out.push_str(&format!("; {label}\n"));
    if let Some(c) = start_constant {
        out.push_str(&format!("{label}_start_constant = ${c:02X}\n"));
    }
    out.push_str(&format!("{label}:\n"));
    for chunk in table.chunks(16) {
        let bytes: Vec<String> = chunk.iter().map(|b| format!("${b:02X}")).collect();
        out.push_str(&format!("    .byte {}\n", bytes.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidforge_io::instrument::Instrument;
    use sidforge_io::order::{Order, OrderEntry};
    use sidforge_io::pattern::PATTERN_ROWS;
    use sidforge_io::tune::AuxTables;
    use std::collections::{HashMap, HashSet};

    fn minimal_tune() -> Tune {
        let mut rows = [Row::ZERO; PATTERN_ROWS];
        rows[0] = Row {
            note: 60,
            instrument: 0,
            effect: 0,
            param: 0,
        };
        let pattern = Pattern::new(rows, 1).unwrap();
        let mut patterns = BTreeMap::new();
        patterns.insert(0u16, pattern);

        Tune {
            patterns,
            instruments: vec![Instrument::default()],
            orders: vec![Order {
                channels: [
                    OrderEntry::new(0, 0).unwrap(),
                    OrderEntry::new(0, 0).unwrap(),
                    OrderEntry::new(0, 0).unwrap(),
                ],
            }],
            aux: AuxTables {
                wave: vec![1, 2, 3],
                arp: vec![4],
                filter: vec![5],
            },
            base_address: 0x1000,
            start_order: 0,
        }
    }

    /// Mirrors the raw tune blob layout `sidforge_io::parser::parse_tune`
    /// reads: a fixed header, then orders, instruments, patterns and the
    /// three auxiliary tables in sequence.
    fn write_blob(tune: &Tune) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&tune.base_address.to_le_bytes());
        out.push(tune.start_order);
        out.extend_from_slice(&(tune.orders.len() as u16).to_le_bytes());
        out.push(tune.instruments.len() as u8);
        out.extend_from_slice(&(tune.patterns.len() as u16).to_le_bytes());
        out.extend_from_slice(&(tune.aux.wave.len() as u16).to_le_bytes());
        out.extend_from_slice(&(tune.aux.arp.len() as u16).to_le_bytes());
        out.extend_from_slice(&(tune.aux.filter.len() as u16).to_le_bytes());

        for order in &tune.orders {
            for entry in &order.channels {
                out.push(entry.pattern_index);
                out.push(entry.transpose as u8);
            }
        }
        for instrument in &tune.instruments {
            out.extend_from_slice(&instrument.to_bytes());
        }
        for (&addr, pattern) in &tune.patterns {
            out.extend_from_slice(&addr.wrapping_add(tune.base_address).to_le_bytes());
            out.push(pattern.truncate_at);
            for row in &pattern.rows {
                out.extend_from_slice(&row.to_bytes());
            }
        }
        out.extend_from_slice(&tune.aux.wave);
        out.extend_from_slice(&tune.aux.arp);
        out.extend_from_slice(&tune.aux.filter);
        out
    }

    #[test]
    fn compiling_a_minimal_tune_produces_a_bank_sized_binary() {
        let tune = minimal_tune();
        let blob = write_blob(&tune);
        let eq = RowEquivalence::new(HashMap::new(), HashSet::new());
        let report = compile(&[blob], std::slice::from_ref(&eq), Duration::from_millis(50)).unwrap();
        assert_eq!(report.tunes.len(), 1);
        assert!(report.tunes[0].bytes.len() <= sidforge_io::tune::BANK_SIZE);
    }

    #[test]
    fn render_table_include_lists_every_byte() {
        let text = render_table_include("sf_delta_table", &[0, 1, 2], Some(0x10));
        assert!(text.contains("sf_delta_table_start_constant = $10"));
        assert!(text.contains("$00, $01, $02"));
    }
}
