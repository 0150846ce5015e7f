//! Order entries (one pattern reference + transpose per channel) and the
//! packed order bitstream used to carry them between compilation stages.

use crate::SidforgeIoError;
use serde::{Deserialize, Serialize};

pub const NUM_CHANNELS: usize = 3;
pub const MAX_ORDERS: usize = 256;

pub const TRANSPOSE_MIN: i8 = -15;
pub const TRANSPOSE_MAX: i8 = 16;

/// Window width (number of distinct lookup slots) for pattern-index deltas.
pub const DICT_WINDOW_DELTA: usize = 32;
/// Window width for transposition deltas.
pub const DICT_WINDOW_TRANSPOSE: usize = 16;

/// A single channel's contribution to an order: which pattern plays, and by
/// how much its notes are transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub pattern_index: u8,
    pub transpose: i8,
}

impl OrderEntry {
    pub fn new(pattern_index: u8, transpose: i8) -> Result<Self, SidforgeIoError> {
        if !(TRANSPOSE_MIN..=TRANSPOSE_MAX).contains(&transpose) {
            return Err(SidforgeIoError::TransposeOutOfRange(transpose));
        }
        Ok(OrderEntry {
            pattern_index,
            transpose,
        })
    }
}

impl Default for OrderEntry {
    fn default() -> Self {
        OrderEntry {
            pattern_index: 0,
            transpose: 0,
        }
    }
}

/// The simultaneous triple of per-channel entries played at one time
/// position within a tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Order {
    pub channels: [OrderEntry; NUM_CHANNELS],
}

/// Computes, for one channel across a tune's order list, the sequence of
/// pattern-index deltas and transpose deltas relative to the previous order
/// on the same channel (the first order's delta is always zero).
///
/// This is the raw input to the global table solver (`sidforge-ops`): the
/// distinct values across every tune form the per-tune delta/transposition
/// sets the solver has to fit into a shared window.
pub fn channel_deltas(orders: &[Order], channel: usize) -> (Vec<i32>, Vec<i32>) {
    let mut pattern_deltas = Vec::with_capacity(orders.len());
    let mut transpose_deltas = Vec::with_capacity(orders.len());
    let mut prev: Option<OrderEntry> = None;
    for order in orders {
        let entry = order.channels[channel];
        match prev {
            None => {
                pattern_deltas.push(0);
                transpose_deltas.push(0);
            }
            Some(p) => {
                pattern_deltas.push(entry.pattern_index as i32 - p.pattern_index as i32);
                transpose_deltas.push(entry.transpose as i32 - p.transpose as i32);
            }
        }
        prev = Some(entry);
    }
    (pattern_deltas, transpose_deltas)
}

/// One order's packed representation: three 4-bit transpose-table indices,
/// three 5-bit pattern-index-table indices and a 3-bit hard-restart skip
/// mask, packed little-endian into 4 octets (30 bits used, top 2 unused).
///
/// A set skip-mask bit for a channel means that channel hard-restarts at
/// this order: its absolute pattern index resets to `0` and its transpose
/// resets to `0`, without consulting either lookup table. This is how the
/// format represents a channel falling silent/restarting without having to
/// special-case a delta value for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderBitstreamRecord {
    pub transpose_idx: [u8; NUM_CHANNELS],
    pub pattern_delta_idx: [u8; NUM_CHANNELS],
    pub skip_mask: u8,
}

impl OrderBitstreamRecord {
    pub fn pack(self) -> [u8; 4] {
        let mut bits: u32 = 0;
        let mut shift = 0u32;
        for &v in &self.transpose_idx {
            bits |= (v as u32 & 0xF) << shift;
            shift += 4;
        }
        for &v in &self.pattern_delta_idx {
            bits |= (v as u32 & 0x1F) << shift;
            shift += 5;
        }
        bits |= (self.skip_mask as u32 & 0b111) << shift;
        bits.to_le_bytes()
    }

    pub fn unpack(bytes: [u8; 4]) -> Self {
        let bits = u32::from_le_bytes(bytes);
        let mut shift = 0u32;
        let mut transpose_idx = [0u8; NUM_CHANNELS];
        for slot in &mut transpose_idx {
            *slot = ((bits >> shift) & 0xF) as u8;
            shift += 4;
        }
        let mut pattern_delta_idx = [0u8; NUM_CHANNELS];
        for slot in &mut pattern_delta_idx {
            *slot = ((bits >> shift) & 0x1F) as u8;
            shift += 5;
        }
        let skip_mask = ((bits >> shift) & 0b111) as u8;
        OrderBitstreamRecord {
            transpose_idx,
            pattern_delta_idx,
            skip_mask,
        }
    }
}

/// A whole tune's order bitstream: one packed record per order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBitstream(pub Vec<OrderBitstreamRecord>);

impl OrderBitstream {
    pub fn pack_bits(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 4);
        for record in &self.0 {
            out.extend_from_slice(&record.pack());
        }
        out
    }

    pub fn unpack_bits(bytes: &[u8]) -> Result<Self, SidforgeIoError> {
        if bytes.len() % 4 != 0 {
            return Err(SidforgeIoError::InvalidOrderBitstreamLength(bytes.len()));
        }
        let records = bytes
            .chunks_exact(4)
            .map(|chunk| OrderBitstreamRecord::unpack([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(OrderBitstream(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrips() {
        let record = OrderBitstreamRecord {
            transpose_idx: [1, 15, 0],
            pattern_delta_idx: [0, 31, 16],
            skip_mask: 0b101,
        };
        assert_eq!(OrderBitstreamRecord::unpack(record.pack()), record);
    }

    #[test]
    fn bitstream_roundtrips() {
        let stream = OrderBitstream(vec![
            OrderBitstreamRecord::default(),
            OrderBitstreamRecord {
                transpose_idx: [3, 3, 3],
                pattern_delta_idx: [2, 2, 2],
                skip_mask: 0b010,
            },
        ]);
        let packed = stream.pack_bits();
        assert_eq!(packed.len(), 8);
        assert_eq!(OrderBitstream::unpack_bits(&packed).unwrap(), stream);
    }

    #[test]
    fn channel_deltas_relative_to_previous_order() {
        // Scenario: pattern indices [10, 12, 14, 12] on channel 0.
        let orders: Vec<Order> = [10u8, 12, 14, 12]
            .into_iter()
            .map(|pi| Order {
                channels: [
                    OrderEntry::new(pi, 0).unwrap(),
                    OrderEntry::default(),
                    OrderEntry::default(),
                ],
            })
            .collect();
        let (pattern_deltas, _) = channel_deltas(&orders, 0);
        assert_eq!(pattern_deltas, vec![0, 2, 2, -2]);
    }
}
