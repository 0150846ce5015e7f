//! The `Instrument` type: a 16-octet envelope/waveform/arpeggio/pulse/
//! vibrato/filter descriptor, and the cosmetic rewrites the pattern
//! transformer applies to align instruments with the playroutine's
//! expectations.

use serde::{Deserialize, Serialize};

pub const INSTRUMENT_BYTES: usize = 16;

/// Sentinel value for an "end" index meaning "table unused past this
/// point"; [`Instrument::bump_end_indices`] leaves it alone.
pub const END_INDEX_UNUSED: u8 = 0xFF;

/// A single instrument definition: ADSR envelope, three auxiliary-table
/// windows (wave, arpeggio, filter; each as a start/end/loop offset triple)
/// and pulse-width/vibrato parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Instrument {
    pub attack_decay: u8,
    pub sustain_release: u8,
    pub wave_start: u8,
    pub wave_end: u8,
    pub wave_loop: u8,
    pub arp_start: u8,
    pub arp_end: u8,
    pub arp_loop: u8,
    pub filter_start: u8,
    pub filter_end: u8,
    pub filter_loop: u8,
    pub pulse_width: u8,
    pub pulse_speed: u8,
    pub vibrato_depth: u8,
    pub vibrato_speed: u8,
    pub reserved: u8,
}

impl Instrument {
    pub fn to_bytes(self) -> [u8; INSTRUMENT_BYTES] {
        [
            self.attack_decay,
            self.sustain_release,
            self.wave_start,
            self.wave_end,
            self.wave_loop,
            self.arp_start,
            self.arp_end,
            self.arp_loop,
            self.filter_start,
            self.filter_end,
            self.filter_loop,
            self.pulse_width,
            self.pulse_speed,
            self.vibrato_depth,
            self.vibrato_speed,
            self.reserved,
        ]
    }

    pub fn from_bytes(b: [u8; INSTRUMENT_BYTES]) -> Instrument {
        Instrument {
            attack_decay: b[0],
            sustain_release: b[1],
            wave_start: b[2],
            wave_end: b[3],
            wave_loop: b[4],
            arp_start: b[5],
            arp_end: b[6],
            arp_loop: b[7],
            filter_start: b[8],
            filter_end: b[9],
            filter_loop: b[10],
            pulse_width: b[11],
            pulse_speed: b[12],
            vibrato_depth: b[13],
            vibrato_speed: b[14],
            reserved: b[15],
        }
    }

    /// Increments the three instrument-internal "end" indices by one,
    /// leaving an already-`0xFF` ("unused") index alone.
    pub fn bump_end_indices(&mut self) {
        for end in [&mut self.wave_end, &mut self.arp_end, &mut self.filter_end] {
            if *end != END_INDEX_UNUSED {
                *end = end.wrapping_add(1);
            }
        }
    }

    /// Swaps the nibbles of the pulse-width byte.
    pub fn swap_pulse_width_nibbles(&mut self) {
        self.pulse_width = (self.pulse_width << 4) | (self.pulse_width >> 4);
    }

    /// Remaps the vibrato-depth index through a fixed 16-entry permutation.
    pub fn remap_vibrato_depth(&mut self, permutation: &[u8; 16]) {
        self.vibrato_depth = permutation[(self.vibrato_depth & 0x0F) as usize];
    }

    /// Applies all three cosmetic rewrites the pattern transformer performs
    /// on every instrument before serialization.
    pub fn rewrite(mut self, vibrato_permutation: &[u8; 16]) -> Instrument {
        self.bump_end_indices();
        self.swap_pulse_width_nibbles();
        self.remap_vibrato_depth(vibrato_permutation);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_bytes() {
        let instr = Instrument {
            attack_decay: 0x12,
            sustain_release: 0x34,
            wave_start: 1,
            wave_end: 5,
            wave_loop: 2,
            arp_start: 0,
            arp_end: 3,
            arp_loop: 0,
            filter_start: 0,
            filter_end: 1,
            filter_loop: 0,
            pulse_width: 0xAB,
            pulse_speed: 1,
            vibrato_depth: 3,
            vibrato_speed: 2,
            reserved: 0,
        };
        assert_eq!(Instrument::from_bytes(instr.to_bytes()), instr);
    }

    #[test]
    fn bump_end_indices_leaves_sentinel_alone() {
        let mut instr = Instrument {
            wave_end: END_INDEX_UNUSED,
            arp_end: 4,
            filter_end: END_INDEX_UNUSED,
            ..Default::default()
        };
        instr.bump_end_indices();
        assert_eq!(instr.wave_end, END_INDEX_UNUSED);
        assert_eq!(instr.arp_end, 5);
        assert_eq!(instr.filter_end, END_INDEX_UNUSED);
    }

    #[test]
    fn pulse_width_nibbles_swap() {
        let mut instr = Instrument {
            pulse_width: 0x3A,
            ..Default::default()
        };
        instr.swap_pulse_width_nibbles();
        assert_eq!(instr.pulse_width, 0xA3);
    }

    #[test]
    fn vibrato_depth_goes_through_permutation() {
        let mut perm = [0u8; 16];
        for (i, slot) in perm.iter_mut().enumerate() {
            *slot = 15 - i as u8;
        }
        let mut instr = Instrument {
            vibrato_depth: 3,
            ..Default::default()
        };
        instr.remap_vibrato_depth(&perm);
        assert_eq!(instr.vibrato_depth, 12);
    }
}
