// MIT License - Copyright (c) 2026 Peter Wright
// Legacy AMT frame codec

//! Legacy frames have the shape `[length][body][checksum]`.
//!
//! Outbound commands carry the body `[0xE9][0x21][access code][command][0x21]`.
//! The length byte counts the body only, and the checksum is the XOR of every
//! preceding byte (length included) inverted with `0xFF`.

use crate::config::Credential;
use crate::constants::*;
use crate::error::{AmtError, NackCode};

/// Why a byte sequence could not be decoded as a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// More bytes are needed.
    #[error("incomplete frame")]
    Incomplete,
    /// The trailing checksum does not match.
    #[error("checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    Checksum { expected: u8, actual: u8 },
    /// The declared length cannot belong to a real frame.
    #[error("implausible frame length {0}")]
    Oversized(usize),
}

impl From<DecodeError> for AmtError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Incomplete => AmtError::IncompleteFrame,
            DecodeError::Checksum { expected, actual } => AmtError::Checksum { expected, actual },
            DecodeError::Oversized(len) => AmtError::malformed(format!("frame length {len}")),
        }
    }
}

/// What a decoded frame carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    /// A command frame: access code digits and the opcode bytes.
    Command { credential: String, command: Vec<u8> },
    /// Panel keepalive (`0xF7`).
    Heartbeat,
    /// Single-byte acknowledgement (`0xFE`).
    Ack,
    /// Single-byte rejection.
    Nack(NackCode),
    /// Connection info sent by the panel after dialing in (`0x94 ..`).
    ConnectionInfo(Vec<u8>),
    /// Full 54-byte status reply.
    Status(Vec<u8>),
    /// Anything else, kept verbatim.
    UnknownCommand(Vec<u8>),
}

/// A decoded legacy frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The exact bytes of the frame, length and checksum included.
    pub raw: Vec<u8>,
    pub payload: FramePayload,
}

impl Frame {
    /// The unframed keepalive: a lone `0xF7` on the wire.
    pub fn bare_heartbeat() -> Self {
        Self {
            raw: vec![FRAME_HEARTBEAT],
            payload: FramePayload::Heartbeat,
        }
    }

    /// The body between the length byte and the checksum. Empty for a bare
    /// heartbeat.
    pub fn body(&self) -> &[u8] {
        self.raw.get(1..self.raw.len().saturating_sub(1)).unwrap_or_default()
    }
}

/// XOR of all bytes, inverted.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b) ^ 0xFF
}

/// Wrap a body as `[len][body][checksum]`.
///
/// The body must be at most 255 bytes; the command encoder bounds it well
/// below that.
pub fn encode_body(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(body.len() as u8);
    out.extend_from_slice(body);
    out.push(checksum(&out));
    out
}

/// Build a command frame for the given access code.
pub fn encode(credential: &Credential, command: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(command.len() + credential.as_bytes().len() + 3);
    body.push(FRAME_START);
    body.push(FRAME_SEPARATOR);
    body.extend_from_slice(credential.as_bytes());
    body.extend_from_slice(command);
    body.push(FRAME_SEPARATOR);
    encode_body(&body)
}

/// Decode one frame from the start of `bytes`.
///
/// Returns the frame and the number of bytes it occupied.
pub fn decode(bytes: &[u8]) -> Result<(Frame, usize), DecodeError> {
    let Some(&len) = bytes.first() else {
        return Err(DecodeError::Incomplete);
    };
    let len = len as usize;
    if len == 0 || len > LEGACY_MAX_BODY {
        return Err(DecodeError::Oversized(len));
    }

    let total = len + 2;
    if bytes.len() < total {
        return Err(DecodeError::Incomplete);
    }

    let expected = checksum(&bytes[..total - 1]);
    let actual = bytes[total - 1];
    if expected != actual {
        return Err(DecodeError::Checksum { expected, actual });
    }

    let raw = bytes[..total].to_vec();
    let payload = classify(&raw[1..total - 1]);
    Ok((Frame { raw, payload }, total))
}

fn classify(body: &[u8]) -> FramePayload {
    match body {
        [FRAME_HEARTBEAT] => FramePayload::Heartbeat,
        [FRAME_ACK] => FramePayload::Ack,
        [code] if NackCode::is_legacy_nack(*code) => FramePayload::Nack(NackCode::from_code(*code)),
        [FRAME_START, FRAME_SEPARATOR, rest @ .., FRAME_SEPARATOR] => {
            let digits = rest.iter().take(6).take_while(|b| b.is_ascii_digit()).count();
            FramePayload::Command {
                credential: String::from_utf8_lossy(&rest[..digits]).into_owned(),
                command: rest[digits..].to_vec(),
            }
        }
        [CMD_CONNECTION_INFO, ..] => FramePayload::ConnectionInfo(body.to_vec()),
        _ if body.len() == LEGACY_STATUS_LEN => FramePayload::Status(body.to_vec()),
        _ => FramePayload::UnknownCommand(body.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred() -> Credential {
        Credential::new("1234").unwrap()
    }

    #[test]
    fn test_encode_arm() {
        let frame = encode(&cred(), &[OP_ARM]);
        assert_eq!(
            frame,
            vec![0x08, 0xE9, 0x21, 0x31, 0x32, 0x33, 0x34, 0x41, 0x21, 0x5B]
        );
    }

    #[test]
    fn test_heartbeat_ack_checksum() {
        assert_eq!(encode_body(&[FRAME_ACK]), vec![0x01, 0xFE, 0x00]);
    }

    #[test]
    fn test_decode_command_frame() {
        let bytes = encode(&cred(), &[OP_ARM, OP_STAY, 0x42]);
        let (frame, used) = decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(
            frame.payload,
            FramePayload::Command {
                credential: "1234".to_string(),
                command: vec![OP_ARM, OP_STAY, 0x42],
            }
        );
        assert_eq!(frame.body()[0], FRAME_START);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut bytes = encode_body(&[FRAME_HEARTBEAT]);
        bytes.extend_from_slice(&[0x05, 0x06]);
        let (frame, used) = decode(&bytes).unwrap();
        assert_eq!(frame.payload, FramePayload::Heartbeat);
        assert_eq!(used, 3);
    }

    #[test]
    fn test_any_bit_flip_is_detected() {
        let bytes = encode(&cred(), &[OP_STATUS]);
        for i in 1..bytes.len() {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[i] ^= 1 << bit;
                assert!(
                    matches!(decode(&corrupted), Err(DecodeError::Checksum { .. })),
                    "flip at byte {i} bit {bit} went unnoticed"
                );
            }
        }
    }

    #[test]
    fn test_short_input_is_incomplete() {
        let bytes = encode(&cred(), &[OP_STATUS]);
        for cut in 0..bytes.len() {
            assert_eq!(decode(&bytes[..cut]), Err(DecodeError::Incomplete));
        }
    }

    #[test]
    fn test_oversized_length() {
        assert_eq!(decode(&[0xF0, 0x00]), Err(DecodeError::Oversized(0xF0)));
        assert_eq!(decode(&[0x00, 0xFF]), Err(DecodeError::Oversized(0)));
    }

    #[test]
    fn test_classification() {
        let decode_body = |body: &[u8]| decode(&encode_body(body)).unwrap().0.payload;

        assert_eq!(decode_body(&[FRAME_ACK]), FramePayload::Ack);
        assert_eq!(decode_body(&[0xE1]), FramePayload::Nack(NackCode::WrongPassword));
        assert_eq!(
            decode_body(&[CMD_CONNECTION_INFO, 0x01, 0x02]),
            FramePayload::ConnectionInfo(vec![CMD_CONNECTION_INFO, 0x01, 0x02])
        );
        let status = vec![0u8; LEGACY_STATUS_LEN];
        assert_eq!(decode_body(&status), FramePayload::Status(status.clone()));
        assert_eq!(decode_body(&[0x10, 0x20]), FramePayload::UnknownCommand(vec![0x10, 0x20]));
    }
}
