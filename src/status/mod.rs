// MIT License - Copyright (c) 2026 Peter Wright
// Status payload decoding

//! Turns a raw status payload into a [`PanelState`] snapshot.
//!
//! The two panel families lay their status out differently, so decoding is
//! selected by [`Protocol`]. Zone blocks are bit-packed, least significant
//! bit first, with bit 0 of the first byte being zone 1.

pub mod isecnet2;
pub mod legacy;

use crate::config::Protocol;
use crate::error::Result;
use crate::state::PanelState;

pub use legacy::LegacyLayout;

/// Decode a status payload with the profile for `protocol`.
pub fn decode_status(protocol: Protocol, payload: &[u8]) -> Result<PanelState> {
    match protocol {
        Protocol::Legacy => legacy::decode(payload),
        Protocol::IsecNet2 => isecnet2::decode(payload),
    }
}

/// Read one bit from a bit-packed block.
pub(crate) fn bit(block: &[u8], index: usize) -> bool {
    block
        .get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

/// Expand a bit-packed block into `count` flags.
pub(crate) fn bits(block: &[u8], count: usize) -> Vec<bool> {
    (0..count).map(|i| bit(block, i)).collect()
}
