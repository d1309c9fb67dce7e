// MIT License - Copyright (c) 2026 Peter Wright
// Command encoding and reply classification

use crate::config::{Credential, Protocol};
use crate::constants::*;
use crate::devices::PartitionId;
use crate::error::{AmtError, NackCode, Result};
use crate::frame::{self, FramePayload};
use crate::isecnet;
use crate::transport::buffer::Decoded;

/// Longest raw legacy command: the frame body also carries the start marker,
/// the separator, up to six code digits and the terminator.
const MAX_RAW_LEGACY: usize = LEGACY_MAX_BODY - 9;

/// Commands that can be sent to an AMT panel.
///
/// # Legacy framing
///
/// Every legacy command travels inside
/// `[len][0xE9][0x21][access code][command][0x21][checksum]`. The panel
/// answers a status request with the 54-byte status body and anything else
/// with a single `0xFE` (accepted) or a NACK code byte.
///
/// # ISECNet2
///
/// AMT-8000 panels take a 16-bit command word plus a binary payload, and only
/// after the session authenticated with `0xF0F0`. Control commands are
/// answered with `0xF0FE`; a status request may be answered with an ACK
/// first and the `0x0B4A` payload in the next packet.
///
/// # Partitions
///
/// `None` addresses the whole panel. Legacy partition commands append the
/// partition letter; ISECNet2 sends the partition number (A = 1) or `0xFF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Full status request.
    /// Legacy `[`, ISECNet2 `0x0B4A`.
    Status,
    /// Arm away.
    /// Legacy `A` / `A<p>`, ISECNet2 `0x401E [p, 1]`.
    Arm { partition: Option<PartitionId> },
    /// Disarm.
    /// Legacy `D` / `D<p>`, ISECNet2 `0x401E [p, 0]`.
    Disarm { partition: Option<PartitionId> },
    /// Arm stay (perimeter only).
    /// Legacy `AP` / `AP<p>`, ISECNet2 `0x401E [p, 2]`.
    Stay { partition: Option<PartitionId> },
    /// Siren on or off.
    /// Legacy `C` / `c`. ISECNet2 switches it on with an audible panic
    /// (`0x401A [1]`) and off with `0x4019 [0xFF]`.
    Siren { on: bool },
    /// PGM output 1-19 on or off.
    /// Legacy `PL<n>` / `PD<n>` with `n` sent as `'0' + n`, ISECNet2
    /// `0x401C [n, 1|0]`.
    Pgm { index: u8, on: bool },
    /// Bypass zone 1-64.
    /// Legacy `B` plus two ASCII digits of the zero-based zone index,
    /// ISECNet2 `0x401F [zone - 1, 1]`.
    Bypass { zone: u8 },
    /// Caller-supplied bytes. Legacy: the command part of a frame.
    /// ISECNet2: command word followed by the payload.
    Raw { bytes: Vec<u8> },
    /// ISECNet2 authentication with the access code as Contact-ID digits.
    Auth,
    /// ISECNet2 session close, sent best-effort on shutdown.
    Bye,
}

/// What a request was for, used in logs, timeouts and acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Status,
    Arm,
    Disarm,
    Stay,
    Siren,
    Pgm,
    Bypass,
    Raw,
    Auth,
    Bye,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Arm => "arm",
            Self::Disarm => "disarm",
            Self::Stay => "stay",
            Self::Siren => "siren",
            Self::Pgm => "pgm",
            Self::Bypass => "bypass",
            Self::Raw => "raw",
            Self::Auth => "auth",
            Self::Bye => "bye",
        }
    }

    /// Whether the command changes panel state.
    pub fn is_state_changing(&self) -> bool {
        matches!(self, Self::Arm | Self::Disarm | Self::Stay | Self::Siren | Self::Pgm | Self::Bypass)
    }
}

/// Successful reply to a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub command: CommandKind,
    /// Raw reply bytes as received
    pub reply: Vec<u8>,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Status => CommandKind::Status,
            Self::Arm { .. } => CommandKind::Arm,
            Self::Disarm { .. } => CommandKind::Disarm,
            Self::Stay { .. } => CommandKind::Stay,
            Self::Siren { .. } => CommandKind::Siren,
            Self::Pgm { .. } => CommandKind::Pgm,
            Self::Bypass { .. } => CommandKind::Bypass,
            Self::Raw { .. } => CommandKind::Raw,
            Self::Auth => CommandKind::Auth,
            Self::Bye => CommandKind::Bye,
        }
    }

    /// Check arguments before anything touches the wire.
    pub fn validate(&self, protocol: Protocol) -> Result<()> {
        match self {
            Self::Pgm { index, .. } if !(1..=MAX_PGMS).contains(index) => {
                Err(AmtError::invalid(format!("PGM {index} out of range 1-{MAX_PGMS}")))
            }
            Self::Bypass { zone } if !(1..=MAX_ZONES).contains(zone) => {
                Err(AmtError::invalid(format!("zone {zone} out of range 1-{MAX_ZONES}")))
            }
            Self::Raw { bytes } => {
                let (min, max) = match protocol {
                    Protocol::Legacy => (1, MAX_RAW_LEGACY),
                    Protocol::IsecNet2 => (2, ISEC_MAX_BODY + 2),
                };
                if (min..=max).contains(&bytes.len()) {
                    Ok(())
                } else {
                    Err(AmtError::invalid(format!(
                        "raw command must be {min}-{max} bytes, got {}",
                        bytes.len()
                    )))
                }
            }
            Self::Auth | Self::Bye if protocol == Protocol::Legacy => {
                Err(AmtError::invalid(format!("{} is an ISECNet2 command", self.kind().name())))
            }
            _ => Ok(()),
        }
    }

    /// Opcode bytes placed inside a legacy frame.
    pub fn legacy_bytes(&self) -> Result<Vec<u8>> {
        self.validate(Protocol::Legacy)?;
        let bytes = match self {
            Self::Status => vec![OP_STATUS],
            Self::Arm { partition } => with_partition(vec![OP_ARM], *partition),
            Self::Disarm { partition } => with_partition(vec![OP_DISARM], *partition),
            Self::Stay { partition } => with_partition(vec![OP_ARM, OP_STAY], *partition),
            Self::Siren { on: true } => vec![OP_SIREN_ON],
            Self::Siren { on: false } => vec![OP_SIREN_OFF],
            Self::Pgm { index, on } => {
                let action = if *on { OP_PGM_ON } else { OP_PGM_OFF };
                vec![OP_PGM, action, b'0' + index]
            }
            Self::Bypass { zone } => {
                let index = zone - 1;
                vec![OP_BYPASS, b'0' + index / 10, b'0' + index % 10]
            }
            Self::Raw { bytes } => bytes.clone(),
            Self::Auth | Self::Bye => {
                return Err(AmtError::invalid(format!("{} is an ISECNet2 command", self.kind().name())));
            }
        };
        Ok(bytes)
    }

    /// Command word and payload of the ISECNet2 packet.
    pub fn isecnet_parts(&self, credential: &Credential) -> Result<(u16, Vec<u8>)> {
        self.validate(Protocol::IsecNet2)?;
        let parts = match self {
            Self::Status => (ISEC_STATUS, Vec::new()),
            Self::Arm { partition } => (ISEC_ARM_DISARM, vec![partition_number(*partition), 0x01]),
            Self::Disarm { partition } => (ISEC_ARM_DISARM, vec![partition_number(*partition), 0x00]),
            Self::Stay { partition } => (ISEC_ARM_DISARM, vec![partition_number(*partition), 0x02]),
            Self::Siren { on: true } => (ISEC_PANIC, vec![0x01]),
            Self::Siren { on: false } => (ISEC_SIREN_OFF, vec![0xFF]),
            Self::Pgm { index, on } => (ISEC_PGM, vec![*index, u8::from(*on)]),
            Self::Bypass { zone } => (ISEC_BYPASS_ZONE, vec![zone - 1, 0x01]),
            Self::Raw { bytes } => (u16::from_be_bytes([bytes[0], bytes[1]]), bytes[2..].to_vec()),
            Self::Auth => {
                let mut payload = vec![ISEC_AUTH_SOFTWARE];
                payload.extend(credential.contact_id_digits());
                payload.push(ISEC_AUTH_TRAILER);
                (ISEC_AUTH, payload)
            }
            Self::Bye => (ISEC_BYE, Vec::new()),
        };
        Ok(parts)
    }

    /// Full wire bytes for this command.
    pub fn encode(&self, protocol: Protocol, credential: &Credential) -> Result<Vec<u8>> {
        match protocol {
            Protocol::Legacy => Ok(frame::encode(credential, &self.legacy_bytes()?)),
            Protocol::IsecNet2 => {
                let (command, payload) = self.isecnet_parts(credential)?;
                Ok(isecnet::encode_packet(command, &payload))
            }
        }
    }
}

fn with_partition(mut bytes: Vec<u8>, partition: Option<PartitionId>) -> Vec<u8> {
    if let Some(partition) = partition {
        bytes.push(partition.letter());
    }
    bytes
}

fn partition_number(partition: Option<PartitionId>) -> u8 {
    partition.map_or(0xFF, |p| p.index() as u8 + 1)
}

/// An inbound unit, classified for routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Legacy keepalive
    Heartbeat,
    /// Legacy connection info sent after the panel dials in
    ConnectionInfo(Vec<u8>),
    Ack,
    Nack(NackCode),
    /// ISECNet2 "panel busy"
    Busy,
    /// ISECNet2 auth reply; 0 means accepted
    AuthResult(u8),
    /// Status payload for the decoder
    Status(Vec<u8>),
    /// ISECNet2 reply echoing a command word
    Reply { command: u16, payload: Vec<u8> },
    /// Anything else
    Unknown(Vec<u8>),
}

impl Inbound {
    pub fn classify(decoded: &Decoded) -> Self {
        match decoded {
            Decoded::Frame(frame) => match &frame.payload {
                FramePayload::Heartbeat => Self::Heartbeat,
                FramePayload::Ack => Self::Ack,
                FramePayload::Nack(code) => Self::Nack(*code),
                FramePayload::ConnectionInfo(body) => Self::ConnectionInfo(body.clone()),
                FramePayload::Status(body) => Self::Status(body.clone()),
                FramePayload::Command { .. } | FramePayload::UnknownCommand(_) => {
                    Self::Unknown(frame.body().to_vec())
                }
            },
            Decoded::Packet(packet) => match packet.command {
                ISEC_ACK => Self::Ack,
                ISEC_NACK => Self::Nack(NackCode::from_code(packet.payload.first().copied().unwrap_or(0))),
                ISEC_BUSY => Self::Busy,
                ISEC_AUTH => Self::AuthResult(packet.payload.first().copied().unwrap_or(0xFF)),
                ISEC_STATUS => Self::Status(packet.payload.clone()),
                command => Self::Reply {
                    command,
                    payload: packet.payload.clone(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode_body;
    use crate::isecnet::{decode_packet, encode_packet};

    fn cred() -> Credential {
        Credential::new("1234").unwrap()
    }

    #[test]
    fn test_state_changing_kinds() {
        for kind in [CommandKind::Arm, CommandKind::Disarm, CommandKind::Stay, CommandKind::Siren, CommandKind::Pgm, CommandKind::Bypass] {
            assert!(kind.is_state_changing(), "{}", kind.name());
        }
        for kind in [CommandKind::Status, CommandKind::Raw, CommandKind::Auth, CommandKind::Bye] {
            assert!(!kind.is_state_changing(), "{}", kind.name());
        }
    }

    #[test]
    fn test_legacy_opcodes() {
        let cases: Vec<(Command, Vec<u8>)> = vec![
            (Command::Status, vec![0x5B]),
            (Command::Arm { partition: None }, vec![0x41]),
            (Command::Arm { partition: Some(PartitionId::C) }, vec![0x41, 0x43]),
            (Command::Disarm { partition: None }, vec![0x44]),
            (Command::Disarm { partition: Some(PartitionId::A) }, vec![0x44, 0x41]),
            (Command::Stay { partition: None }, vec![0x41, 0x50]),
            (Command::Stay { partition: Some(PartitionId::D) }, vec![0x41, 0x50, 0x44]),
            (Command::Siren { on: true }, vec![0x43]),
            (Command::Siren { on: false }, vec![0x63]),
            (Command::Pgm { index: 3, on: true }, vec![0x50, 0x4C, 0x33]),
            (Command::Pgm { index: 12, on: false }, vec![0x50, 0x44, 0x3C]),
            (Command::Bypass { zone: 1 }, vec![0x42, 0x30, 0x30]),
            (Command::Bypass { zone: 64 }, vec![0x42, 0x36, 0x33]),
        ];
        for (command, expected) in cases {
            assert_eq!(command.legacy_bytes().unwrap(), expected, "{command:?}");
        }
    }

    #[test]
    fn test_legacy_arm_frame() {
        let bytes = Command::Arm { partition: None }.encode(Protocol::Legacy, &cred()).unwrap();
        assert_eq!(bytes, vec![0x08, 0xE9, 0x21, 0x31, 0x32, 0x33, 0x34, 0x41, 0x21, 0x5B]);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Command::Pgm { index: 20, on: true }.legacy_bytes(),
            Err(AmtError::InvalidArgument { .. })
        ));
        assert!(Command::Pgm { index: 0, on: true }.validate(Protocol::IsecNet2).is_err());
        assert!(Command::Bypass { zone: 65 }.validate(Protocol::Legacy).is_err());
        assert!(Command::Bypass { zone: 0 }.validate(Protocol::Legacy).is_err());
        assert!(Command::Raw { bytes: vec![] }.validate(Protocol::Legacy).is_err());
        assert!(Command::Raw { bytes: vec![0u8; 56] }.validate(Protocol::Legacy).is_err());
        assert!(Command::Raw { bytes: vec![0x0B] }.validate(Protocol::IsecNet2).is_err());
        assert!(Command::Auth.validate(Protocol::Legacy).is_err());
        assert!(Command::Pgm { index: 19, on: false }.validate(Protocol::Legacy).is_ok());
    }

    #[test]
    fn test_longest_raw_fits_frame() {
        let cred = Credential::new("123456").unwrap();
        let raw = Command::Raw { bytes: vec![0x30; MAX_RAW_LEGACY] };
        let bytes = raw.encode(Protocol::Legacy, &cred).unwrap();
        assert!(frame::decode(&bytes).is_ok());
    }

    #[test]
    fn test_isecnet_parts() {
        let c = cred();
        assert_eq!(Command::Status.isecnet_parts(&c).unwrap(), (0x0B4A, vec![]));
        assert_eq!(
            Command::Arm { partition: None }.isecnet_parts(&c).unwrap(),
            (0x401E, vec![0xFF, 0x01])
        );
        assert_eq!(
            Command::Stay { partition: Some(PartitionId::B) }.isecnet_parts(&c).unwrap(),
            (0x401E, vec![0x02, 0x02])
        );
        assert_eq!(
            Command::Disarm { partition: Some(PartitionId::A) }.isecnet_parts(&c).unwrap(),
            (0x401E, vec![0x01, 0x00])
        );
        assert_eq!(Command::Siren { on: true }.isecnet_parts(&c).unwrap(), (0x401A, vec![0x01]));
        assert_eq!(Command::Siren { on: false }.isecnet_parts(&c).unwrap(), (0x4019, vec![0xFF]));
        assert_eq!(
            Command::Pgm { index: 2, on: true }.isecnet_parts(&c).unwrap(),
            (0x401C, vec![0x02, 0x01])
        );
        assert_eq!(
            Command::Bypass { zone: 5 }.isecnet_parts(&c).unwrap(),
            (0x401F, vec![0x04, 0x01])
        );
        assert_eq!(
            Command::Raw { bytes: vec![0x0B, 0x4A, 0x01] }.isecnet_parts(&c).unwrap(),
            (0x0B4A, vec![0x01])
        );
        assert_eq!(Command::Bye.isecnet_parts(&c).unwrap(), (0xF0F1, vec![]));
    }

    #[test]
    fn test_auth_payload() {
        let c = Credential::new("1020").unwrap();
        let (command, payload) = Command::Auth.isecnet_parts(&c).unwrap();
        assert_eq!(command, ISEC_AUTH);
        assert_eq!(payload, vec![0x02, 0x01, 0x0A, 0x02, 0x0A, 0x10]);
    }

    #[test]
    fn test_classify_legacy() {
        let classify = |body: &[u8]| {
            let (frame, _) = frame::decode(&encode_body(body)).unwrap();
            Inbound::classify(&Decoded::Frame(frame))
        };
        assert_eq!(classify(&[0xF7]), Inbound::Heartbeat);
        assert_eq!(classify(&[0xFE]), Inbound::Ack);
        assert_eq!(classify(&[0xE4]), Inbound::Nack(NackCode::ZonesOpen));
        assert_eq!(classify(&[0x11, 0x22]), Inbound::Unknown(vec![0x11, 0x22]));
    }

    #[test]
    fn test_classify_isecnet() {
        let classify = |command: u16, payload: &[u8]| {
            let (packet, _) = decode_packet(&encode_packet(command, payload)).unwrap();
            Inbound::classify(&Decoded::Packet(packet))
        };
        assert_eq!(classify(ISEC_ACK, &[]), Inbound::Ack);
        assert_eq!(classify(ISEC_NACK, &[0x27]), Inbound::Nack(NackCode::ZonesOpenIsecNet2));
        assert_eq!(classify(ISEC_BUSY, &[]), Inbound::Busy);
        assert_eq!(classify(ISEC_AUTH, &[0x00]), Inbound::AuthResult(0));
        assert_eq!(classify(ISEC_STATUS, &[1, 2]), Inbound::Status(vec![1, 2]));
        assert_eq!(
            classify(ISEC_PGM, &[3]),
            Inbound::Reply { command: ISEC_PGM, payload: vec![3] }
        );
    }
}
