//! # `sidforge-codec`
//!
//! The dual-bank memory model ([`memory`]) tunes decompress into on real
//! hardware, and the delta-LZ command codec ([`codec`]) that compresses and
//! decompresses against it.
//!
//! This crate knows nothing about tune data, patterns or instruments --
//! it operates purely on byte buffers and ring positions. `sidforge-ops`
//! is what hands it a serialized tune's bytes.

pub mod codec;
pub mod memory;

pub use codec::{decode, encode, finish_with_terminator, split_stream, Command, CodecError};
pub use memory::{DualBankMemory, Role, BANK_SIZE, RING_SIZE};
