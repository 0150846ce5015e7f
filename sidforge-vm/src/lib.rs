//! # `sidforge-vm`
//!
//! A legal-instruction-set 6502 interpreter used two ways in the compiler
//! pipeline: as the engine the reachability/effect analysis phase drives
//! to discover which instrument and pattern-effect routines a tune
//! actually touches, and as the differential validator's reference oracle
//! for comparing the original source tune against the compiled output.
//!
//! Nothing here is SID-chip specific -- register writes are just memory
//! writes observed through the [`Bus`] hook. `sidforge-codec` and
//! `sidforge-ops` supply their own [`Bus`] implementations to watch for
//! the side effects they each care about.

pub mod bus;
pub mod cpu;
pub mod opcodes;

pub use bus::{Bus, FlatMemory};
pub use cpu::{Cpu, CpuError, StepOutcome, CALL_SENTINEL};
pub use opcodes::{AddrMode, Operation};
