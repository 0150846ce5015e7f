//! # `sidforge-ops`
//!
//! The compilation pipeline proper: everything that turns a parsed, raw
//! [`sidforge_io::tune::Tune`] into the bytes `sidforge_io::serializer`
//! writes out, plus the differential validator that checks the result
//! against an interpreter run of the source data.
//!
//! - [`reachability`]: which orders, patterns and instruments a tune's
//!   playback can ever touch.
//! - [`transform`]: the global effect remap and row-equivalence
//!   substitution applied ahead of dictionary building.
//! - [`packer`]: gap-code selection, per-pattern command encoding, and the
//!   byte-identical/overlap optimizer that packs patterns into one stream.
//! - [`solver`]: fits every tune's distance-delta or transposition set into
//!   a single shared 256-byte table.
//! - [`validator`]: runs a tune's raw and compiled-plus-playroutine forms
//!   through two interpreters and diffs their chip-register writes.
//! - [`pipeline`]: the orchestrator wiring the above into one `compile`
//!   call per batch of tunes.

pub mod packer;
pub mod pipeline;
pub mod reachability;
pub mod solver;
pub mod transform;
pub mod validator;

pub use pipeline::{compile, render_table_include, CompileError, CompileReport, CompiledTune};
pub use reachability::{analyze, Reachability};
pub use solver::{search_start_constant, solve, verify, Infeasible, TableSolution};
pub use transform::{EffectRemap, RowEquivalence};
pub use validator::{bisect_equivalence_entries, compare, find_subsequence, run_capture, CapturedWrite, CapturingBus, Divergence};
