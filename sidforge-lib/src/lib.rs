//! # `sidforge-lib`
//!
//! Single entry point over the whole compiler: re-exports the data model
//! and parser/serializer ([`io`]), the compilation pipeline ([`ops`]), the
//! dual-bank LZ codec ([`codec`]), the 6502 interpreter ([`vm`]) and the
//! bitstream primitives ([`bits`]) so a caller only needs this one crate on
//! its dependency line.

pub use sidforge_bits as bits;
pub use sidforge_codec as codec;
pub use sidforge_io as io;
pub use sidforge_ops as ops;
pub use sidforge_vm as vm;

pub use sidforge_ops::{compile, CompileError, CompileReport, CompiledTune};
