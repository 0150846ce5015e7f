//! # `sidforge-io`
//!
//! Data model, raw tune parser and fixed-offset binary serializer for the
//! sidforge tune compiler.
//!
//! This crate owns everything described by the specification's data model:
//! rows, patterns, orders, instruments, auxiliary tables and the row
//! dictionary, plus the two binary-format edges of the pipeline -- reading a
//! raw source tune blob ([`parser`]) and writing the fixed-layout per-song
//! binary the playroutine expects ([`serializer`]).
//!
//! It does not know how patterns get transformed, deduplicated or packed --
//! that pipeline lives in `sidforge-ops`, one layer up.

pub mod command;
pub mod dictionary;
pub mod instrument;
pub mod order;
pub mod parser;
pub mod pattern;
pub mod row;
pub mod serializer;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod tune;

use serde::{Deserialize, Serialize};
use std::array::from_fn;
use std::error::Error;
use std::fmt;

/// Shorthand for a `Result` with a boxed error, mirroring the rest of the
/// workspace's error handling style.
pub type RBoxErr<T> = Result<T, Box<dyn Error>>;

/// Errors raised by the data model layer itself (as opposed to the parser
/// or serializer, which have their own richer error types).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidforgeIoError {
    /// A `Row`'s note, instrument index or effect code is out of its valid
    /// range.
    RowOutOfRange { field: &'static str, value: i32 },
    /// A `Pattern`'s `truncate_at` is not in `[1, 64]`.
    InvalidTruncateAt(u8),
    /// An `OrderEntry`'s transpose is outside `[-15, 16]`.
    TransposeOutOfRange(i8),
    /// An order bitstream's byte length is not a multiple of 4.
    InvalidOrderBitstreamLength(usize),
}

impl fmt::Display for SidforgeIoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RowOutOfRange { field, value } => {
                write!(f, "row field `{field}` out of range: {value}")
            }
            Self::InvalidTruncateAt(v) => {
                write!(f, "truncate_at must be in [1, 64], got {v}")
            }
            Self::TransposeOutOfRange(v) => {
                write!(f, "transpose must be in [-15, 16], got {v}")
            }
            Self::InvalidOrderBitstreamLength(n) => {
                write!(f, "order bitstream length {n} is not a multiple of 4")
            }
        }
    }
}

impl Error for SidforgeIoError {}

/// Implemented by types that can be serialized with `bincode` for the
/// `ot-tools`-style `Encode`/`Decode` pair. Most of the fixed-size binary
/// structures in this crate derive it via `#[derive(Encodeable)]`.
pub trait Encode {
    fn encode(&self) -> RBoxErr<Vec<u8>>
    where
        Self: Serialize,
    {
        Ok(bincode::serialize(&self)?)
    }
}

pub trait Decode {
    fn decode(bytes: &[u8]) -> RBoxErr<Self>
    where
        Self: Sized,
        Self: for<'a> Deserialize<'a>,
    {
        let x: Self = bincode::deserialize(bytes)?;
        Ok(x)
    }
}

/// A collection of `N` default instances of `Self`, for types where
/// `Default` is reserved for a single instance (e.g. a default `Pattern`
/// is one thing; a default `[Pattern; 256]` is another).
pub trait DefaultsArray {
    fn defaults<const N: usize>() -> [Self; N]
    where
        Self: Default + Sized,
    {
        from_fn(|_| Self::default())
    }
}

/// As [`DefaultsArray`], but boxed (avoids blowing the stack for arrays of
/// rows/patterns).
pub trait DefaultsArrayBoxed {
    fn defaults<const N: usize>() -> Box<[Self; N]>
    where
        Self: Default + Sized,
    {
        Box::new(from_fn(|_| Self::default()))
    }
}
