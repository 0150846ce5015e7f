//! Test-only helpers shared across this crate's unit tests.

use crate::pattern::PATTERN_ROWS;
use crate::tune::Tune;

/// Writes the raw source-blob encoding [`crate::parser::parse_tune`] reads,
/// for exercising parser round trips in tests.
pub(crate) fn write_source_blob(tune: &Tune) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&tune.base_address.to_le_bytes());
    out.push(tune.start_order);
    out.extend_from_slice(&(tune.orders.len() as u16).to_le_bytes());
    out.push(tune.instruments.len() as u8);
    out.extend_from_slice(&(tune.patterns.len() as u16).to_le_bytes());
    out.extend_from_slice(&(tune.aux.wave.len() as u16).to_le_bytes());
    out.extend_from_slice(&(tune.aux.arp.len() as u16).to_le_bytes());
    out.extend_from_slice(&(tune.aux.filter.len() as u16).to_le_bytes());

    for order in &tune.orders {
        for entry in &order.channels {
            out.push(entry.pattern_index);
            out.push(entry.transpose as u8);
        }
    }

    for instrument in &tune.instruments {
        out.extend_from_slice(&instrument.to_bytes());
    }

    for (&offset, pattern) in &tune.patterns {
        let address = tune.base_address.wrapping_add(offset);
        out.extend_from_slice(&address.to_le_bytes());
        out.push(pattern.truncate_at);
        for i in 0..PATTERN_ROWS {
            out.extend_from_slice(&pattern.rows[i].to_bytes());
        }
    }

    out.extend_from_slice(&tune.aux.wave);
    out.extend_from_slice(&tune.aux.arp);
    out.extend_from_slice(&tune.aux.filter);
    out
}
