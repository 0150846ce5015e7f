//! The pattern command stream alphabet (§3 "Pattern command stream"): the
//! byte-level encoding dictionary references and row repeats are packed
//! into.
//!
//! A stored zero row is always a two-byte token: `0x00` followed by a
//! mandatory count byte in `0..=15` giving the number of *additional* zero
//! rows folded into the same token (so the token alone represents
//! `1 + count` zero rows). Making the count byte mandatory -- rather than
//! "present only when there is something to extend" -- is what keeps the
//! stream unambiguous to decode: a reader never has to guess whether the
//! byte following a `0x00` is a continuation count or the start of the next
//! token.
use crate::dictionary::PRIMARY_SLOTS;
use std::error::Error;
use std::fmt;

/// Highest count of repeated zero rows a single zero-row token's extension
/// byte can add (on top of the one the token itself represents).
pub const ZERO_RUN_MAX_EXTRA: u8 = 15;
/// Highest count a previous-row repeat command can add in one token.
pub const REPEAT_MAX: u8 = 31;

const REPEAT_BASE: u8 = 0xE0;
const EXTENDED_MARKER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternCommand {
    /// A stored zero row, plus `extra` (0..=15) additional zero rows.
    ZeroRun { extra: u8 },
    /// A dictionary reference to a non-zero row at `index` (1..=479).
    DictRef { index: usize },
    /// `count` (1..=31) additional repetitions of the previously emitted
    /// non-zero row.
    RepeatPrev { count: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    Truncated,
    ZeroRunExtraOutOfRange(u8),
    RepeatCountOutOfRange(u8),
    DictRefOutOfRange(usize),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "pattern command stream truncated"),
            Self::ZeroRunExtraOutOfRange(v) => {
                write!(f, "zero-run extra count {v} out of range 0..=15")
            }
            Self::RepeatCountOutOfRange(v) => {
                write!(f, "repeat count {v} out of range 1..=31")
            }
            Self::DictRefOutOfRange(v) => write!(f, "dictionary index {v} out of range 1..=479"),
        }
    }
}

impl Error for CommandError {}

impl PatternCommand {
    pub fn encode(self, out: &mut Vec<u8>) -> Result<(), CommandError> {
        match self {
            PatternCommand::ZeroRun { extra } => {
                if extra > ZERO_RUN_MAX_EXTRA {
                    return Err(CommandError::ZeroRunExtraOutOfRange(extra));
                }
                out.push(0x00);
                out.push(extra);
            }
            PatternCommand::DictRef { index } => {
                if index == 0 || index >= crate::dictionary::MAX_SLOTS {
                    return Err(CommandError::DictRefOutOfRange(index));
                }
                if index < PRIMARY_SLOTS {
                    out.push(index as u8);
                } else {
                    out.push(EXTENDED_MARKER);
                    out.push((index - PRIMARY_SLOTS) as u8);
                }
            }
            PatternCommand::RepeatPrev { count } => {
                if count == 0 || count > REPEAT_MAX {
                    return Err(CommandError::RepeatCountOutOfRange(count));
                }
                out.push(REPEAT_BASE + (count - 1));
            }
        }
        Ok(())
    }

    /// Decodes the next command starting at `bytes[*pos]`, advancing `pos`
    /// past it.
    pub fn decode_next(bytes: &[u8], pos: &mut usize) -> Result<PatternCommand, CommandError> {
        let b = *bytes.get(*pos).ok_or(CommandError::Truncated)?;
        *pos += 1;
        if b == 0x00 {
            let extra = *bytes.get(*pos).ok_or(CommandError::Truncated)?;
            *pos += 1;
            if extra > ZERO_RUN_MAX_EXTRA {
                return Err(CommandError::ZeroRunExtraOutOfRange(extra));
            }
            Ok(PatternCommand::ZeroRun { extra })
        } else if b == EXTENDED_MARKER {
            let lo = *bytes.get(*pos).ok_or(CommandError::Truncated)?;
            *pos += 1;
            Ok(PatternCommand::DictRef {
                index: PRIMARY_SLOTS + lo as usize,
            })
        } else if b >= REPEAT_BASE {
            Ok(PatternCommand::RepeatPrev {
                count: b - REPEAT_BASE + 1,
            })
        } else {
            Ok(PatternCommand::DictRef { index: b as usize })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(cmd: PatternCommand) -> PatternCommand {
        let mut bytes = Vec::new();
        cmd.encode(&mut bytes).unwrap();
        let mut pos = 0;
        let decoded = PatternCommand::decode_next(&bytes, &mut pos).unwrap();
        assert_eq!(pos, bytes.len());
        decoded
    }

    #[test]
    fn zero_run_roundtrips() {
        assert_eq!(roundtrip(PatternCommand::ZeroRun { extra: 0 }), PatternCommand::ZeroRun { extra: 0 });
        assert_eq!(
            roundtrip(PatternCommand::ZeroRun { extra: 15 }),
            PatternCommand::ZeroRun { extra: 15 }
        );
    }

    #[test]
    fn primary_dict_ref_roundtrips() {
        assert_eq!(
            roundtrip(PatternCommand::DictRef { index: 1 }),
            PatternCommand::DictRef { index: 1 }
        );
        assert_eq!(
            roundtrip(PatternCommand::DictRef { index: 223 }),
            PatternCommand::DictRef { index: 223 }
        );
    }

    #[test]
    fn extended_dict_ref_roundtrips() {
        assert_eq!(
            roundtrip(PatternCommand::DictRef { index: 224 }),
            PatternCommand::DictRef { index: 224 }
        );
        assert_eq!(
            roundtrip(PatternCommand::DictRef { index: 479 }),
            PatternCommand::DictRef { index: 479 }
        );
    }

    #[test]
    fn repeat_prev_roundtrips() {
        assert_eq!(
            roundtrip(PatternCommand::RepeatPrev { count: 1 }),
            PatternCommand::RepeatPrev { count: 1 }
        );
        assert_eq!(
            roundtrip(PatternCommand::RepeatPrev { count: 31 }),
            PatternCommand::RepeatPrev { count: 31 }
        );
    }

    #[test]
    fn scenario_64_identical_rows_packs_to_four_bytes() {
        // Row (1, 0x21, 0) repeated 64 times: dict ref, RLE(31), RLE(31), RLE(1).
        let mut bytes = Vec::new();
        PatternCommand::DictRef { index: 1 }.encode(&mut bytes).unwrap();
        PatternCommand::RepeatPrev { count: 31 }.encode(&mut bytes).unwrap();
        PatternCommand::RepeatPrev { count: 31 }.encode(&mut bytes).unwrap();
        PatternCommand::RepeatPrev { count: 1 }.encode(&mut bytes).unwrap();
        assert_eq!(bytes, vec![0x01, 0xFE, 0xFE, 0xE0]);
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut pos = 0;
        assert_eq!(
            PatternCommand::decode_next(&[0x00], &mut pos),
            Err(CommandError::Truncated)
        );
        let mut pos = 0;
        assert_eq!(
            PatternCommand::decode_next(&[0xFF], &mut pos),
            Err(CommandError::Truncated)
        );
    }
}
