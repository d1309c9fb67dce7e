// MIT License - Copyright (c) 2026 Peter Wright
// ISECNet2 packet codec

//! ISECNet2 packets are `[dst][src][len][command][payload][checksum]` with
//! 16-bit big-endian header fields. `len` covers the command word and the
//! payload. The checksum is computed the same way as for legacy frames.

use crate::constants::*;
use crate::frame::{checksum, DecodeError};

/// A decoded ISECNet2 packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub dst: u16,
    pub src: u16,
    pub command: u16,
    pub payload: Vec<u8>,
    /// The exact bytes of the packet, checksum included.
    pub raw: Vec<u8>,
}

/// Build an outbound packet addressed to the panel.
pub fn encode_packet(command: u16, payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() + 2) as u16;
    let mut out = Vec::with_capacity(ISEC_HEADER_LEN + 2 + payload.len() + 1);
    out.extend_from_slice(&ISEC_DST_PANEL.to_be_bytes());
    out.extend_from_slice(&ISEC_SRC_CLIENT.to_be_bytes());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&command.to_be_bytes());
    out.extend_from_slice(payload);
    out.push(checksum(&out));
    out
}

/// Decode one packet from the start of `bytes`.
pub fn decode_packet(bytes: &[u8]) -> Result<(Packet, usize), DecodeError> {
    if bytes.len() < ISEC_HEADER_LEN {
        return Err(DecodeError::Incomplete);
    }
    let word = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);

    let len = word(4) as usize;
    if !(2..=ISEC_MAX_BODY + 2).contains(&len) {
        return Err(DecodeError::Oversized(len));
    }

    let total = ISEC_HEADER_LEN + len + 1;
    if bytes.len() < total {
        return Err(DecodeError::Incomplete);
    }

    let expected = checksum(&bytes[..total - 1]);
    let actual = bytes[total - 1];
    if expected != actual {
        return Err(DecodeError::Checksum { expected, actual });
    }

    let packet = Packet {
        dst: word(0),
        src: word(2),
        command: word(6),
        payload: bytes[ISEC_HEADER_LEN + 2..total - 1].to_vec(),
        raw: bytes[..total].to_vec(),
    };
    Ok((packet, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_status_request() {
        assert_eq!(
            encode_packet(ISEC_STATUS, &[]),
            vec![0x00, 0x00, 0x8F, 0xFF, 0x00, 0x02, 0x0B, 0x4A, 0xCC]
        );
    }

    #[test]
    fn test_decode_reply() {
        let bytes = encode_packet(ISEC_ARM_DISARM, &[0xFF, 0x01]);
        let (packet, used) = decode_packet(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(packet.command, ISEC_ARM_DISARM);
        assert_eq!(packet.payload, vec![0xFF, 0x01]);
        assert_eq!(packet.src, ISEC_SRC_CLIENT);
        assert_eq!(packet.raw, bytes);
    }

    #[test]
    fn test_partial_and_corrupt() {
        let bytes = encode_packet(ISEC_PGM, &[0x03, 0x01]);
        assert_eq!(decode_packet(&bytes[..bytes.len() - 1]), Err(DecodeError::Incomplete));
        assert_eq!(decode_packet(&bytes[..3]), Err(DecodeError::Incomplete));

        let mut corrupt = bytes.clone();
        corrupt[7] ^= 0x40;
        assert!(matches!(decode_packet(&corrupt), Err(DecodeError::Checksum { .. })));
    }

    #[test]
    fn test_implausible_length() {
        assert_eq!(
            decode_packet(&[0, 0, 0, 0, 0xFF, 0xFF, 0, 0]),
            Err(DecodeError::Oversized(0xFFFF))
        );
        assert_eq!(decode_packet(&[0, 0, 0, 0, 0, 1, 0]), Err(DecodeError::Oversized(1)));
    }
}
