//! Lays the compiled per-tune binary out at the fixed offsets the
//! playroutine expects, running a verifier after every sub-section so a
//! layout mistake is caught at the point it was introduced rather than as
//! a mysterious difference much later in the differential validator.

use crate::dictionary::RowDictionary;
use crate::instrument::{Instrument, INSTRUMENT_BYTES};
use crate::order::{DICT_WINDOW_DELTA, DICT_WINDOW_TRANSPOSE, MAX_ORDERS, NUM_CHANNELS};
use crate::tune::BANK_SIZE;
use std::error::Error;
use std::fmt;

pub const OFFSET_INSTRUMENTS: usize = 0x0000;
pub const MAX_INSTRUMENTS: usize = 32;
pub const INSTRUMENTS_LEN: usize = MAX_INSTRUMENTS * INSTRUMENT_BYTES; // 0x0200

pub const OFFSET_TRANSPOSE_TABLES: usize = 0x0200;
pub const TRANSPOSE_TABLES_LEN: usize = NUM_CHANNELS * MAX_ORDERS; // 0x0300

pub const OFFSET_PATTERN_INDEX_TABLES: usize = 0x0500;
pub const PATTERN_INDEX_TABLES_LEN: usize = NUM_CHANNELS * MAX_ORDERS; // 0x0300

pub const OFFSET_FILTER_TABLE: usize = 0x0800;
pub const OFFSET_WAVE_TABLE: usize = 0x08EA;
pub const OFFSET_ARP_TABLE: usize = 0x091D;
pub const OFFSET_DICTIONARY: usize = 0x09D9;
pub const OFFSET_PATTERN_OFFSETS: usize = 0x0EAD;
pub const OFFSET_PACKED_STREAM: usize = 0x0F63;

pub const FILTER_TABLE_LEN: usize = OFFSET_WAVE_TABLE - OFFSET_FILTER_TABLE;
pub const WAVE_TABLE_LEN: usize = OFFSET_ARP_TABLE - OFFSET_WAVE_TABLE;
pub const ARP_TABLE_LEN: usize = OFFSET_DICTIONARY - OFFSET_ARP_TABLE;
pub const DICTIONARY_BYTES_PER_ENTRY: usize = 3;
pub const DICTIONARY_LEN: usize = OFFSET_PATTERN_OFFSETS - OFFSET_DICTIONARY;
pub const MAX_DICTIONARY_ENTRIES: usize = DICTIONARY_LEN / DICTIONARY_BYTES_PER_ENTRY;
pub const PATTERN_OFFSET_BYTES_PER_ENTRY: usize = 2;
pub const PATTERN_OFFSETS_LEN: usize = OFFSET_PACKED_STREAM - OFFSET_PATTERN_OFFSETS;
pub const MAX_PATTERNS: usize = PATTERN_OFFSETS_LEN / PATTERN_OFFSET_BYTES_PER_ENTRY;

/// Every computed piece the serializer needs to assemble one tune's
/// compiled binary. Producing these values -- running the transformer,
/// packer, and global table lookups -- is `sidforge-ops`'s job; this type
/// is just the hand-off shape.
#[derive(Debug, Clone, Default)]
pub struct CompiledTuneSections {
    pub instruments: Vec<Instrument>,
    /// Per-channel, per-order index into the shared transposition table's
    /// tune-local window (`0..DICT_WINDOW_TRANSPOSE`).
    pub transpose_idx: [Vec<u8>; NUM_CHANNELS],
    /// Per-channel, per-order index into the shared distance table's
    /// tune-local window (`0..DICT_WINDOW_DELTA`).
    pub pattern_delta_idx: [Vec<u8>; NUM_CHANNELS],
    pub filter_table: Vec<u8>,
    pub wave_table: Vec<u8>,
    pub arp_table: Vec<u8>,
    pub dictionary: RowDictionary,
    /// Byte offset of each pattern's first command within `packed_stream`.
    pub pattern_offsets: Vec<u16>,
    pub packed_stream: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    TooManyInstruments(usize),
    OrderTableTooLong { channel: usize, len: usize },
    OrderTableLengthMismatch,
    TransposeIndexOutOfRange { channel: usize, order: usize, value: u8 },
    PatternDeltaIndexOutOfRange { channel: usize, order: usize, value: u8 },
    TableTooLong { name: &'static str, len: usize, max: usize },
    TooManyDictionaryEntries(usize),
    TooManyPatterns(usize),
    BankOverflow { total: usize, max: usize },
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::TooManyInstruments(n) => write!(f, "{n} instruments exceeds the {MAX_INSTRUMENTS} slot limit"),
            Self::OrderTableTooLong { channel, len } => {
                write!(f, "channel {channel} order table has {len} entries, max {MAX_ORDERS}")
            }
            Self::OrderTableLengthMismatch => write!(f, "per-channel order tables have differing lengths"),
            Self::TransposeIndexOutOfRange { channel, order, value } => write!(
                f,
                "channel {channel} order {order}: transpose index {value} >= {DICT_WINDOW_TRANSPOSE}"
            ),
            Self::PatternDeltaIndexOutOfRange { channel, order, value } => write!(
                f,
                "channel {channel} order {order}: pattern-delta index {value} >= {DICT_WINDOW_DELTA}"
            ),
            Self::TableTooLong { name, len, max } => write!(f, "{name} table has {len} bytes, max {max}"),
            Self::TooManyDictionaryEntries(n) => {
                write!(f, "dictionary has {n} entries, max {MAX_DICTIONARY_ENTRIES}")
            }
            Self::TooManyPatterns(n) => write!(f, "{n} patterns exceeds the {MAX_PATTERNS} slot limit"),
            Self::BankOverflow { total, max } => {
                write!(f, "serialized tune is {total} bytes, exceeds bank size {max}")
            }
        }
    }
}

impl Error for SerializeError {}

fn push_padded(out: &mut Vec<u8>, data: &[u8], len: usize) {
    out.extend_from_slice(data);
    out.resize(out.len() + (len - data.len()), 0);
}

/// Serializes one tune's compiled sections into the fixed-offset binary the
/// playroutine expects, verifying each sub-section as it is written.
pub fn serialize_tune(sections: &CompiledTuneSections) -> Result<Vec<u8>, SerializeError> {
    let mut out = Vec::with_capacity(OFFSET_PACKED_STREAM + sections.packed_stream.len());

    // -- instruments -------------------------------------------------
    if sections.instruments.len() > MAX_INSTRUMENTS {
        return Err(SerializeError::TooManyInstruments(sections.instruments.len()));
    }
    for instrument in &sections.instruments {
        out.extend_from_slice(&instrument.to_bytes());
    }
    out.resize(OFFSET_TRANSPOSE_TABLES, 0);
    debug_assert_eq!(out.len(), OFFSET_TRANSPOSE_TABLES);

    // -- order tables --------------------------------------------------
    let num_orders = sections.transpose_idx[0].len();
    for ch in 0..NUM_CHANNELS {
        if sections.transpose_idx[ch].len() != num_orders
            || sections.pattern_delta_idx[ch].len() != num_orders
        {
            return Err(SerializeError::OrderTableLengthMismatch);
        }
        if num_orders > MAX_ORDERS {
            return Err(SerializeError::OrderTableTooLong { channel: ch, len: num_orders });
        }
    }
    for ch in 0..NUM_CHANNELS {
        for (order, &value) in sections.transpose_idx[ch].iter().enumerate() {
            if value as usize >= DICT_WINDOW_TRANSPOSE {
                return Err(SerializeError::TransposeIndexOutOfRange { channel: ch, order, value });
            }
        }
        push_padded(&mut out, &sections.transpose_idx[ch], MAX_ORDERS);
    }
    debug_assert_eq!(out.len(), OFFSET_PATTERN_INDEX_TABLES);

    for ch in 0..NUM_CHANNELS {
        for (order, &value) in sections.pattern_delta_idx[ch].iter().enumerate() {
            if value as usize >= DICT_WINDOW_DELTA {
                return Err(SerializeError::PatternDeltaIndexOutOfRange { channel: ch, order, value });
            }
        }
        push_padded(&mut out, &sections.pattern_delta_idx[ch], MAX_ORDERS);
    }
    debug_assert_eq!(out.len(), OFFSET_FILTER_TABLE);

    // -- auxiliary tables -----------------------------------------------
    if sections.filter_table.len() > FILTER_TABLE_LEN {
        return Err(SerializeError::TableTooLong { name: "filter", len: sections.filter_table.len(), max: FILTER_TABLE_LEN });
    }
    push_padded(&mut out, &sections.filter_table, FILTER_TABLE_LEN);
    debug_assert_eq!(out.len(), OFFSET_WAVE_TABLE);

    if sections.wave_table.len() > WAVE_TABLE_LEN {
        return Err(SerializeError::TableTooLong { name: "wave", len: sections.wave_table.len(), max: WAVE_TABLE_LEN });
    }
    push_padded(&mut out, &sections.wave_table, WAVE_TABLE_LEN);
    debug_assert_eq!(out.len(), OFFSET_ARP_TABLE);

    if sections.arp_table.len() > ARP_TABLE_LEN {
        return Err(SerializeError::TableTooLong { name: "arpeggio", len: sections.arp_table.len(), max: ARP_TABLE_LEN });
    }
    push_padded(&mut out, &sections.arp_table, ARP_TABLE_LEN);
    debug_assert_eq!(out.len(), OFFSET_DICTIONARY);

    // -- row dictionary ---------------------------------------------------
    if sections.dictionary.len() > MAX_DICTIONARY_ENTRIES {
        return Err(SerializeError::TooManyDictionaryEntries(sections.dictionary.len()));
    }
    let mut dict_bytes = Vec::with_capacity(sections.dictionary.len() * DICTIONARY_BYTES_PER_ENTRY);
    for row in sections.dictionary.entries() {
        dict_bytes.extend_from_slice(&row.to_bytes());
    }
    push_padded(&mut out, &dict_bytes, DICTIONARY_LEN);
    debug_assert_eq!(out.len(), OFFSET_PATTERN_OFFSETS);

    // -- per-pattern offsets into the packed stream ------------------------
    if sections.pattern_offsets.len() > MAX_PATTERNS {
        return Err(SerializeError::TooManyPatterns(sections.pattern_offsets.len()));
    }
    let mut offset_bytes = Vec::with_capacity(sections.pattern_offsets.len() * PATTERN_OFFSET_BYTES_PER_ENTRY);
    for &offset in &sections.pattern_offsets {
        offset_bytes.extend_from_slice(&offset.to_le_bytes());
    }
    push_padded(&mut out, &offset_bytes, PATTERN_OFFSETS_LEN);
    debug_assert_eq!(out.len(), OFFSET_PACKED_STREAM);

    // -- packed pattern stream --------------------------------------------
    out.extend_from_slice(&sections.packed_stream);
    if out.len() > BANK_SIZE {
        return Err(SerializeError::BankOverflow { total: out.len(), max: BANK_SIZE });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::Row;

    fn minimal_sections() -> CompiledTuneSections {
        CompiledTuneSections {
            instruments: vec![Instrument::default()],
            transpose_idx: [vec![0], vec![0], vec![0]],
            pattern_delta_idx: [vec![0], vec![0], vec![0]],
            filter_table: vec![1, 2, 3],
            wave_table: vec![4, 5],
            arp_table: vec![6],
            dictionary: RowDictionary::build(vec![Row {
                note: 1,
                instrument: 0,
                effect: 0,
                param: 0,
            }]),
            pattern_offsets: vec![0],
            packed_stream: vec![0x01, 0xE0],
        }
    }

    #[test]
    fn offsets_line_up_with_the_spec() {
        let out = serialize_tune(&minimal_sections()).unwrap();
        assert_eq!(out.len(), OFFSET_PACKED_STREAM + 2);
        assert_eq!(&out[OFFSET_PACKED_STREAM..], &[0x01, 0xE0]);
    }

    #[test]
    fn rejects_out_of_range_lookup_indices() {
        let mut sections = minimal_sections();
        sections.transpose_idx[0][0] = DICT_WINDOW_TRANSPOSE as u8;
        assert!(matches!(
            serialize_tune(&sections),
            Err(SerializeError::TransposeIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_too_many_instruments() {
        let mut sections = minimal_sections();
        sections.instruments = vec![Instrument::default(); MAX_INSTRUMENTS + 1];
        assert!(matches!(serialize_tune(&sections), Err(SerializeError::TooManyInstruments(_))));
    }
}
