// MIT License - Copyright (c) 2026 Peter Wright
// Wire constants for the legacy and ISECNet2 protocols

/// Legacy frame markers.
pub const FRAME_START: u8 = 0xE9;
pub const FRAME_SEPARATOR: u8 = 0x21; // Also the terminator
pub const FRAME_HEARTBEAT: u8 = 0xF7;
pub const FRAME_ACK: u8 = 0xFE;
pub const CMD_CONNECTION_INFO: u8 = 0x94; // Sent by the panel after it dials in

/// Largest body a legacy frame may carry. Anything longer is treated as
/// stream garbage by the receive buffer.
pub const LEGACY_MAX_BODY: usize = 64;

/// Legacy command opcodes (ASCII).
pub const OP_STATUS: u8 = 0x5B; // '['
pub const OP_ARM: u8 = 0x41; // 'A'
pub const OP_DISARM: u8 = 0x44; // 'D'
pub const OP_STAY: u8 = 0x50; // 'P', follows OP_ARM
pub const OP_SIREN_ON: u8 = 0x43; // 'C'
pub const OP_SIREN_OFF: u8 = 0x63; // 'c'
pub const OP_PGM: u8 = 0x50; // 'P'
pub const OP_PGM_ON: u8 = 0x4C; // 'L', follows OP_PGM
pub const OP_PGM_OFF: u8 = 0x44; // 'D', follows OP_PGM
pub const OP_BYPASS: u8 = 0x42; // 'B'

/// Size of the legacy full status reply.
pub const LEGACY_STATUS_LEN: usize = 54;

/// ISECNet2 header.
pub const ISEC_DST_PANEL: u16 = 0x0000;
pub const ISEC_SRC_CLIENT: u16 = 0x8FFF;
pub const ISEC_HEADER_LEN: usize = 6;
pub const ISEC_MAX_BODY: usize = 1024;

/// ISECNet2 commands.
pub const ISEC_AUTH: u16 = 0xF0F0;
pub const ISEC_BYE: u16 = 0xF0F1;
pub const ISEC_STATUS: u16 = 0x0B4A;
pub const ISEC_ARM_DISARM: u16 = 0x401E;
pub const ISEC_PANIC: u16 = 0x401A;
pub const ISEC_PGM: u16 = 0x401C;
pub const ISEC_SIREN_OFF: u16 = 0x4019;
pub const ISEC_BYPASS_ZONE: u16 = 0x401F;

/// ISECNet2 special replies.
pub const ISEC_ACK: u16 = 0xF0FE;
pub const ISEC_NACK: u16 = 0xF0FD;
pub const ISEC_BUSY: u16 = 0xF0F7;

/// ISECNet2 auth software type and terminator around the contact-id digits.
pub const ISEC_AUTH_SOFTWARE: u8 = 0x02;
pub const ISEC_AUTH_TRAILER: u8 = 0x10;

/// Number of PGM outputs addressable by command.
pub const MAX_PGMS: u8 = 19;

/// Number of zones covered by the bit-packed zone blocks.
pub const MAX_ZONES: u8 = 64;

/// Default TCP port for both connection modes.
pub const DEFAULT_PORT: u16 = 9009;

/// Human-readable reason for an ISECNet2 auth result byte.
pub fn auth_result_reason(code: u8) -> &'static str {
    match code {
        1 => "wrong password",
        2 => "wrong software version",
        3 => "panel requested callback",
        4 => "waiting for user permission",
        _ => "unknown auth result",
    }
}
