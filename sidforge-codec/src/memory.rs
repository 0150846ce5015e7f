//! The dual-bank memory model the delta-LZ codec decompresses into and
//! reads back-references from.
//!
//! Two 24K banks form a 48K virtual ring. One bank (`self`) is the one
//! currently being decompressed into, written sequentially from a
//! monotonically increasing cursor; the other (`other`) still holds the
//! previous song's data, readable except where the playroutine's scratch
//! usage has since trashed it.

pub const BANK_SIZE: usize = 24 * 1024;
pub const RING_SIZE: usize = 2 * BANK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    SelfBank,
    OtherBank,
}

#[derive(Debug, Clone)]
struct Bank {
    data: Box<[u8; BANK_SIZE]>,
    initialized: Box<[bool; BANK_SIZE]>,
    scratch: Box<[bool; BANK_SIZE]>,
}

impl Bank {
    fn seeded(seed: &[u8]) -> Self {
        let mut data = Box::new([0u8; BANK_SIZE]);
        let mut initialized = Box::new([false; BANK_SIZE]);
        let n = seed.len().min(BANK_SIZE);
        data[..n].copy_from_slice(&seed[..n]);
        initialized[..n].fill(true);
        Bank {
            data,
            initialized,
            scratch: Box::new([false; BANK_SIZE]),
        }
    }
}

/// A ring position resolved to a concrete bank offset.
fn decompose(addr: usize) -> (Role, usize) {
    let addr = addr % RING_SIZE;
    if addr < BANK_SIZE {
        (Role::SelfBank, addr)
    } else {
        (Role::OtherBank, addr - BANK_SIZE)
    }
}

/// Implements the spec's readability policy over a 48K ring spanning two
/// 24K banks, one being written sequentially (`self`), one holding a
/// previous decompression's leftovers (`other`).
#[derive(Debug, Clone)]
pub struct DualBankMemory {
    self_bank: Bank,
    other_bank: Bank,
}

impl DualBankMemory {
    /// `self_seed`/`other_seed` are each up to [`BANK_SIZE`] bytes of
    /// whatever content that bank held before this decompression began
    /// (the previous song's decompressed output, typically).
    pub fn new(self_seed: &[u8], other_seed: &[u8]) -> Self {
        DualBankMemory {
            self_bank: Bank::seeded(self_seed),
            other_bank: Bank::seeded(other_seed),
        }
    }

    /// Marks a byte range of `bank` as scratch: trashed by playroutine
    /// execution since the seed was captured, and therefore unreadable
    /// regardless of its `initialized` state.
    pub fn protect_scratch(&mut self, bank: Role, range: std::ops::Range<usize>) {
        let b = match bank {
            Role::SelfBank => &mut self.self_bank,
            Role::OtherBank => &mut self.other_bank,
        };
        for i in range {
            if i < BANK_SIZE {
                b.scratch[i] = true;
            }
        }
    }

    /// Writes a decompressed byte into the self bank at `addr` (a self-bank
    /// offset, not a ring position) and marks it initialized and
    /// unprotected.
    pub fn write(&mut self, addr: usize, b: u8) {
        self.self_bank.data[addr] = b;
        self.self_bank.initialized[addr] = true;
        self.self_bank.scratch[addr] = false;
    }

    /// Whether ring position `addr` can currently be read, given the
    /// decompression write cursor is at self-bank offset `out_pos`.
    pub fn can_read_at(&self, addr: usize, out_pos: usize) -> bool {
        match decompose(addr) {
            (Role::SelfBank, offset) => {
                if offset >= out_pos {
                    self.self_bank.initialized[offset] && !self.self_bank.scratch[offset]
                } else {
                    true
                }
            }
            (Role::OtherBank, offset) => {
                self.other_bank.initialized[offset] && !self.other_bank.scratch[offset]
            }
        }
    }

    /// Reads the raw byte at a ring position regardless of whether it is
    /// currently readable. Used by the encoder to build candidate match
    /// indices cheaply; any candidate it turns up must still be confirmed
    /// through [`Self::match_length`] before being trusted.
    pub fn raw_ring_byte(&self, addr: usize) -> u8 {
        match decompose(addr) {
            (Role::SelfBank, offset) => self.self_bank.data[offset],
            (Role::OtherBank, offset) => self.other_bank.data[offset],
        }
    }

    pub fn read_at(&self, addr: usize, out_pos: usize) -> Option<u8> {
        if !self.can_read_at(addr, out_pos) {
            return None;
        }
        let (role, offset) = decompose(addr);
        Some(match role {
            Role::SelfBank => self.self_bank.data[offset],
            Role::OtherBank => self.other_bank.data[offset],
        })
    }

    /// Length of the run starting at ring position `addr` that matches
    /// `target[target_pos..]`, stopping at the first unreadable or
    /// mismatching byte, or when `target` is exhausted.
    pub fn match_length(&self, addr: usize, out_pos: usize, target: &[u8], target_pos: usize) -> usize {
        let mut len = 0usize;
        loop {
            let t = target_pos + len;
            if t >= target.len() {
                break;
            }
            let ring_addr = addr + len;
            match self.read_at(ring_addr, out_pos) {
                Some(byte) if byte == target[t] => len += 1,
                _ => break,
            }
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_bank_below_cursor_is_always_readable() {
        let mem = DualBankMemory::new(&[], &[]);
        assert!(mem.can_read_at(5, 10), "below out_pos counts as already rewritten");
    }

    #[test]
    fn self_bank_at_or_above_cursor_needs_seed_data() {
        let mem = DualBankMemory::new(&[1, 2, 3], &[]);
        assert!(mem.can_read_at(1, 0), "seeded and >= out_pos");
        assert!(!mem.can_read_at(5, 0), "uninitialized and >= out_pos");
    }

    #[test]
    fn other_bank_requires_initialized_and_unprotected() {
        let mut mem = DualBankMemory::new(&[], &[9, 9, 9]);
        let other_addr = BANK_SIZE + 1;
        assert!(mem.can_read_at(other_addr, 0));
        mem.protect_scratch(Role::OtherBank, 0..BANK_SIZE);
        assert!(!mem.can_read_at(other_addr, 0));
    }

    #[test]
    fn match_length_stops_at_unreadable_boundary() {
        let mem = DualBankMemory::new(&[1, 2, 3], &[]);
        let target = [1, 2, 3, 4];
        assert_eq!(mem.match_length(0, 0, &target, 0), 3);
    }

    #[test]
    fn write_makes_a_byte_current_below_the_cursor() {
        let mut mem = DualBankMemory::new(&[], &[]);
        mem.write(0, 0x42);
        assert!(mem.can_read_at(0, 1));
        assert_eq!(mem.read_at(0, 1), Some(0x42));
    }
}
