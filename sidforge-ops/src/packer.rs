//! Dictionary and pattern packing: gap-code selection, the per-pattern
//! command stream, byte-identical canonicalization and the overlap
//! optimizer that concatenates canonical patterns into one shared stream.

use sidforge_io::command::{CommandError, PatternCommand, REPEAT_MAX, ZERO_RUN_MAX_EXTRA};
use sidforge_io::dictionary::RowDictionary;
use sidforge_io::pattern::{Pattern, PATTERN_ROWS};
use sidforge_io::row::Row;
use sidforge_io::tune::VALID_GAP_CODES;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// The rows a pattern's gap coding actually samples: every `gap_code + 1`-th
/// row, up to its truncation.
pub fn sampled_rows(pattern: &Pattern, gap_code: u8) -> Vec<Row> {
    let stride = gap_code as usize + 1;
    pattern.active_rows().iter().step_by(stride).copied().collect()
}

/// The largest valid gap code for `pattern`: the widest stride at which
/// every row it would skip, within the pattern's truncated prefix, is the
/// zero row.
pub fn select_gap_code(pattern: &Pattern) -> u8 {
    let rows = pattern.active_rows();
    let mut best = 0u8;
    for &g in &VALID_GAP_CODES {
        let stride = g as usize + 1;
        let skips_only_zero = rows.iter().enumerate().all(|(i, row)| i % stride == 0 || row.is_zero());
        if skips_only_zero {
            best = best.max(g);
        }
    }
    best
}

/// Encodes `pattern`'s sampled rows (per `gap_code`) as a command stream
/// against `dictionary`. Every non-zero row must already have a dictionary
/// slot.
pub fn encode_pattern(pattern: &Pattern, gap_code: u8, dictionary: &RowDictionary) -> Vec<u8> {
    let sampled = sampled_rows(pattern, gap_code);
    let mut out = Vec::new();
    let mut last_emitted: Option<Row> = None;
    let mut i = 0;

    while i < sampled.len() {
        let row = sampled[i];
        if row.is_zero() {
            let mut run = 0u8;
            while i + 1 + run as usize < sampled.len()
                && sampled[i + 1 + run as usize].is_zero()
                && run < ZERO_RUN_MAX_EXTRA
            {
                run += 1;
            }
            PatternCommand::ZeroRun { extra: run }
                .encode(&mut out)
                .expect("zero-run extra bounded by ZERO_RUN_MAX_EXTRA");
            i += 1 + run as usize;
        } else if last_emitted == Some(row) {
            let mut count = 0u8;
            while count < REPEAT_MAX && i + count as usize < sampled.len() && sampled[i + count as usize] == row {
                count += 1;
            }
            PatternCommand::RepeatPrev { count }
                .encode(&mut out)
                .expect("repeat count bounded by REPEAT_MAX");
            i += count as usize;
        } else {
            let index = dictionary.index_of(&row).expect("row present in the dictionary built from these patterns");
            PatternCommand::DictRef { index }
                .encode(&mut out)
                .expect("dictionary index within range");
            last_emitted = Some(row);
            i += 1;
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackError {
    Command(CommandError),
    DictionaryIndexMissing(usize),
    RepeatWithNoPreviousRow,
    RoundTripMismatch { address: u16, row: usize },
}

impl fmt::Display for PackError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Command(source) => write!(f, "{source}"),
            Self::DictionaryIndexMissing(index) => write!(f, "dictionary has no entry at index {index}"),
            Self::RepeatWithNoPreviousRow => {
                write!(f, "repeat-previous command with no preceding dictionary reference")
            }
            Self::RoundTripMismatch { address, row } => {
                write!(f, "pattern at address {address:#06x} row {row} did not decode back to its original value")
            }
        }
    }
}

impl Error for PackError {}

/// Decodes a pattern's command stream starting at `offset` in the shared
/// packed stream, re-inflating zero-runs and row-repeats across `gap_code`'s
/// stride, until `truncate_at` logical rows are accounted for. Rows at or
/// past `truncate_at` are left at [`Row::ZERO`], mirroring what
/// [`encode_pattern`] never encodes in the first place.
pub fn decode_pattern(
    packed_stream: &[u8],
    offset: usize,
    gap_code: u8,
    truncate_at: u8,
    dictionary: &RowDictionary,
) -> Result<[Row; PATTERN_ROWS], PackError> {
    let stride = gap_code as usize + 1;
    let mut rows = [Row::ZERO; PATTERN_ROWS];
    let mut pos = offset;
    let mut produced = 0usize;
    let mut last_emitted: Option<Row> = None;

    while produced < truncate_at as usize {
        let cmd = PatternCommand::decode_next(packed_stream, &mut pos).map_err(PackError::Command)?;
        match cmd {
            PatternCommand::ZeroRun { extra } => {
                produced += (1 + extra as usize) * stride;
            }
            PatternCommand::DictRef { index } => {
                let row = dictionary.get(index).ok_or(PackError::DictionaryIndexMissing(index))?;
                rows[produced] = row;
                last_emitted = Some(row);
                produced += stride;
            }
            PatternCommand::RepeatPrev { count } => {
                let row = last_emitted.ok_or(PackError::RepeatWithNoPreviousRow)?;
                for r in 0..count as usize {
                    let idx = produced + r * stride;
                    if idx >= PATTERN_ROWS {
                        break;
                    }
                    rows[idx] = row;
                }
                produced += count as usize * stride;
            }
        }
    }

    Ok(rows)
}

/// Decodes the pattern stored at `offset` and checks that its first
/// `pattern.truncate_at` rows match `pattern` exactly, i.e. that
/// `decode(encode(pattern)) == pattern` up to truncation.
pub fn verify_pattern_round_trip(
    address: u16,
    pattern: &Pattern,
    gap_code: u8,
    packed_stream: &[u8],
    offset: u16,
    dictionary: &RowDictionary,
) -> Result<(), PackError> {
    let decoded = decode_pattern(packed_stream, offset as usize, gap_code, pattern.truncate_at, dictionary)?;
    for (row, (&want, &got)) in pattern.active_rows().iter().zip(decoded.iter()).enumerate() {
        if want != got {
            return Err(PackError::RoundTripMismatch { address, row });
        }
    }
    Ok(())
}

fn find_substring(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Length of the longest suffix of `haystack` that is also a prefix of
/// `needle`.
fn suffix_prefix_overlap(haystack: &[u8], needle: &[u8]) -> usize {
    let max = haystack.len().min(needle.len());
    for len in (1..=max).rev() {
        if haystack[haystack.len() - len..] == needle[..len] {
            return len;
        }
    }
    0
}

/// The result of packing a set of per-pattern command streams into one
/// shared buffer: the concatenated bytes, and each original pattern's
/// starting offset into them.
#[derive(Debug, Clone, Default)]
pub struct PackedStream {
    pub bytes: Vec<u8>,
    pub offsets: BTreeMap<u16, u16>,
}

/// Canonicalizes byte-identical encoded patterns to a single stored copy,
/// then concatenates the distinct sequences longest-first, reusing any
/// existing substring match or suffix/prefix overlap before appending new
/// bytes.
pub fn pack_patterns(encoded: &BTreeMap<u16, Vec<u8>>) -> PackedStream {
    let mut by_bytes: BTreeMap<Vec<u8>, Vec<u16>> = BTreeMap::new();
    for (&addr, bytes) in encoded {
        by_bytes.entry(bytes.clone()).or_default().push(addr);
    }

    let mut unique: Vec<Vec<u8>> = by_bytes.keys().cloned().collect();
    unique.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut stream = Vec::new();
    let mut placed_at: BTreeMap<Vec<u8>, u16> = BTreeMap::new();

    for seq in &unique {
        if let Some(pos) = find_substring(&stream, seq) {
            placed_at.insert(seq.clone(), pos as u16);
            continue;
        }
        let overlap = suffix_prefix_overlap(&stream, seq);
        let offset = stream.len() - overlap;
        stream.extend_from_slice(&seq[overlap..]);
        placed_at.insert(seq.clone(), offset as u16);
    }

    let mut offsets = BTreeMap::new();
    for (bytes, addrs) in &by_bytes {
        let offset = placed_at[bytes];
        for &addr in addrs {
            offsets.insert(addr, offset);
        }
    }

    PackedStream { bytes: stream, offsets }
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

    fn pattern_with(rows: Vec<Row>, truncate_at: u8) -> Pattern {
        let mut all = [Row::ZERO; 64];
        for (i, r) in rows.into_iter().enumerate() {
            all[i] = r;
        }
        Pattern::new(all, truncate_at).unwrap()
    }

    #[test]
    fn gap_code_zero_when_no_zero_rows_to_skip() {
        let p = pattern_with(vec![row(1), row(2), row(3), row(4)], 4);
        assert_eq!(select_gap_code(&p), 0);
    }

    #[test]
    fn gap_code_picks_largest_stride_that_skips_only_zero_rows() {
        // note at row 0, zero rows everywhere else up to truncate_at=4.
        let p = pattern_with(vec![row(1)], 4);
        // every valid stride skips only zero rows here; largest is 63.
        assert_eq!(select_gap_code(&p), 63);
    }

    #[test]
    fn encode_pattern_uses_repeat_for_consecutive_identical_rows() {
        let r = row(5);
        let p = pattern_with(vec![r, r, r], 3);
        let dict = RowDictionary::build(vec![r]);
        let bytes = encode_pattern(&p, 0, &dict);
        // DictRef(1) then RepeatPrev{count: 2}.
        assert_eq!(bytes, vec![0x01, 0xE0 + 1]);
    }

    #[test]
    fn encode_pattern_folds_zero_runs() {
        let p = pattern_with(vec![], 4);
        let dict = RowDictionary::build(vec![]);
        let bytes = encode_pattern(&p, 0, &dict);
        assert_eq!(bytes, vec![0x00, 0x03]);
    }

    #[test]
    fn identical_patterns_share_one_stored_copy() {
        let mut encoded = BTreeMap::new();
        encoded.insert(0u16, vec![1, 2, 3]);
        encoded.insert(5u16, vec![1, 2, 3]);
        let packed = pack_patterns(&encoded);
        assert_eq!(packed.offsets[&0], packed.offsets[&5]);
        assert_eq!(packed.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn suffix_prefix_overlap_is_reused() {
        let mut encoded = BTreeMap::new();
        encoded.insert(0u16, vec![1, 2, 3, 4]);
        encoded.insert(1u16, vec![3, 4, 5]);
        let packed = pack_patterns(&encoded);
        assert_eq!(packed.bytes, vec![1, 2, 3, 4, 5]);
        assert_eq!(packed.offsets[&0], 0);
        assert_eq!(packed.offsets[&1], 2);
    }

    #[test]
    fn full_substring_match_needs_no_new_bytes() {
        let mut encoded = BTreeMap::new();
        encoded.insert(0u16, vec![1, 2, 3, 4, 5]);
        encoded.insert(1u16, vec![2, 3, 4]);
        let packed = pack_patterns(&encoded);
        assert_eq!(packed.bytes, vec![1, 2, 3, 4, 5]);
        assert_eq!(packed.offsets[&1], 1);
    }

    #[test]
    fn decode_pattern_round_trips_repeated_rows() {
        let r = row(5);
        let p = pattern_with(vec![r, r, r], 3);
        let dict = RowDictionary::build(vec![r]);
        let bytes = encode_pattern(&p, 0, &dict);
        let decoded = decode_pattern(&bytes, 0, 0, p.truncate_at, &dict).unwrap();
        assert_eq!(&decoded[..3], p.active_rows());
    }

    #[test]
    fn decode_pattern_round_trips_zero_runs() {
        let p = pattern_with(vec![], 4);
        let dict = RowDictionary::build(vec![]);
        let bytes = encode_pattern(&p, 0, &dict);
        let decoded = decode_pattern(&bytes, 0, 0, p.truncate_at, &dict).unwrap();
        assert_eq!(&decoded[..4], p.active_rows());
    }

    #[test]
    fn decode_pattern_round_trips_all_zero_pattern_at_widest_gap_code() {
        let p = pattern_with(vec![], 64);
        let dict = RowDictionary::build(vec![]);
        let gap_code = select_gap_code(&p);
        assert_eq!(gap_code, 63);
        let bytes = encode_pattern(&p, gap_code, &dict);
        let decoded = decode_pattern(&bytes, 0, gap_code, p.truncate_at, &dict).unwrap();
        assert_eq!(decoded, [Row::ZERO; PATTERN_ROWS]);
    }

    #[test]
    fn decode_pattern_respects_gap_code_stride() {
        let r1 = row(1);
        let r2 = row(2);
        let p = pattern_with(vec![r1, Row::ZERO, r2, Row::ZERO], 4);
        let dict = RowDictionary::build(vec![r1, r2]);
        let gap_code = select_gap_code(&p);
        let bytes = encode_pattern(&p, gap_code, &dict);
        let decoded = decode_pattern(&bytes, 0, gap_code, p.truncate_at, &dict).unwrap();
        assert_eq!(&decoded[..4], p.active_rows());
    }

    #[test]
    fn verify_pattern_round_trip_accepts_a_correctly_packed_pattern() {
        let r = row(7);
        let p = pattern_with(vec![r, r], 2);
        let dict = RowDictionary::build(vec![r]);
        let mut encoded = BTreeMap::new();
        encoded.insert(0u16, encode_pattern(&p, 0, &dict));
        let packed = pack_patterns(&encoded);
        let offset = packed.offsets[&0];
        verify_pattern_round_trip(0, &p, 0, &packed.bytes, offset, &dict).unwrap();
    }

    #[test]
    fn verify_pattern_round_trip_rejects_a_mismatched_dictionary() {
        let r = row(7);
        let other = row(8);
        let p = pattern_with(vec![r], 1);
        let dict = RowDictionary::build(vec![r]);
        let wrong_dict = RowDictionary::build(vec![other]);
        let bytes = encode_pattern(&p, 0, &dict);
        let err = verify_pattern_round_trip(0, &p, 0, &bytes, 0, &wrong_dict).unwrap_err();
        assert!(matches!(err, PackError::RoundTripMismatch { address: 0, row: 0 }));
    }
}
