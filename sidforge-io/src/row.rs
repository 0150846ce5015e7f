//! The `Row` type: one channel-step of playback data, and its packed
//! three-octet on-disk representation.

use crate::SidforgeIoError;
use serde::{Deserialize, Serialize};

/// `note` value meaning "no note in this row".
pub const NOTE_REST: u8 = 0;
/// Highest playable pitch value (`1..=96` are pitches).
pub const NOTE_MAX_PITCH: u8 = 96;
/// `note` value meaning "stop the currently playing note".
pub const NOTE_KEY_OFF: u8 = 97;

/// Highest value an effect code (4 bits) can hold.
pub const EFFECT_MAX: u8 = 0b1111;
/// Highest value an instrument index (5 bits) can hold.
pub const INSTRUMENT_MAX: u8 = 0b1_1111;

/// One channel-step of playback data: a note/rest/key-off, an instrument
/// reference, an effect code and its parameter.
///
/// On disk a `Row` is three octets, `(note, inst_effect, param)`:
///
/// - `note` bits 0-6: note number (`0` = rest, `1..=96` = pitch, `97` =
///   key-off). Bit 7: the high bit of the 4-bit effect code.
/// - `inst_effect` bits 0-4: instrument index. Bits 5-7: the low 3 bits of
///   the effect code.
/// - `param`: effect-specific parameter byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Row {
    pub note: u8,
    pub instrument: u8,
    pub effect: u8,
    pub param: u8,
}

impl Default for Row {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Row {
    /// The all-zero row: rest, no instrument, no effect. Always dictionary
    /// slot 0.
    pub const ZERO: Row = Row {
        note: NOTE_REST,
        instrument: 0,
        effect: 0,
        param: 0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Validates that every field is within the range the on-disk bit
    /// layout can represent.
    pub fn validate(&self) -> Result<(), SidforgeIoError> {
        if self.note > NOTE_KEY_OFF {
            return Err(SidforgeIoError::RowOutOfRange {
                field: "note",
                value: self.note as i32,
            });
        }
        if self.instrument > INSTRUMENT_MAX {
            return Err(SidforgeIoError::RowOutOfRange {
                field: "instrument",
                value: self.instrument as i32,
            });
        }
        if self.effect > EFFECT_MAX {
            return Err(SidforgeIoError::RowOutOfRange {
                field: "effect",
                value: self.effect as i32,
            });
        }
        Ok(())
    }

    /// Packs this row into its three-octet on-disk form.
    ///
    /// Panics (via `debug_assert`) if any field is out of range; callers
    /// that parse untrusted data should call [`Row::validate`] first.
    pub fn to_bytes(self) -> [u8; 3] {
        debug_assert!(self.validate().is_ok());
        let note_byte = (self.note & 0x7F) | (((self.effect >> 3) & 1) << 7);
        let inst_effect_byte = (self.instrument & 0x1F) | ((self.effect & 0b111) << 5);
        [note_byte, inst_effect_byte, self.param]
    }

    /// Unpacks a row from its three-octet on-disk form.
    pub fn from_bytes(bytes: [u8; 3]) -> Row {
        let [note_byte, inst_effect_byte, param] = bytes;
        let effect_hi = (note_byte >> 7) & 1;
        let effect_lo = (inst_effect_byte >> 5) & 0b111;
        Row {
            note: note_byte & 0x7F,
            instrument: inst_effect_byte & 0x1F,
            effect: (effect_hi << 3) | effect_lo,
            param,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_row_roundtrips() {
        assert_eq!(Row::from_bytes(Row::ZERO.to_bytes()), Row::ZERO);
    }

    #[test]
    fn packing_matches_bit_layout() {
        let row = Row {
            note: 1,
            instrument: 0x01,
            effect: 0x9, // 0b1001: high bit 1, low 3 bits 001
            param: 0,
        };
        let bytes = row.to_bytes();
        // note byte: bit7 set (effect high bit), bits0-6 = 1
        assert_eq!(bytes[0], 0b1000_0001);
        // inst_effect byte: bits5-7 = 0b001, bits0-4 = 0x01
        assert_eq!(bytes[1], 0b0010_0001);
        assert_eq!(Row::from_bytes(bytes), row);
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        let mut row = Row::ZERO;
        row.note = NOTE_KEY_OFF + 1;
        assert!(row.validate().is_err());

        let mut row = Row::ZERO;
        row.instrument = INSTRUMENT_MAX + 1;
        assert!(row.validate().is_err());

        let mut row = Row::ZERO;
        row.effect = EFFECT_MAX + 1;
        assert!(row.validate().is_err());
    }

    #[test]
    fn all_valid_rows_roundtrip() {
        for note in [0u8, 1, 48, 96, 97] {
            for effect in 0u8..=EFFECT_MAX {
                let row = Row {
                    note,
                    instrument: 5,
                    effect,
                    param: 0x42,
                };
                assert_eq!(Row::from_bytes(row.to_bytes()), row);
            }
        }
    }
}
