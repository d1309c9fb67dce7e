// MIT License - Copyright (c) 2026 Peter Wright
// Error taxonomy for the AMT protocol engine

use std::fmt;

/// Rejection codes returned by the panel in a NACK reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NackCode {
    /// 0xE0 - Invalid packet
    InvalidPacket,
    /// 0xE1 - Wrong password
    WrongPassword,
    /// 0xE2 - Invalid command
    InvalidCommand,
    /// 0xE3 - Panel is not partitioned
    NotPartitioned,
    /// 0xE4 - Open zones
    ZonesOpen,
    /// 0xE5 - Discontinued function
    Discontinued,
    /// 0xE6 - No permission to bypass
    NoBypassPermission,
    /// 0xE7 - No permission to disarm
    NoDisarmPermission,
    /// 0xE8 - Bypass not allowed
    BypassNotAllowed,
    /// 0xEA - No zones in partition
    NoZonesInPartition,
    /// 0x27 - Open zones (ISECNet2 firmware)
    ZonesOpenIsecNet2,
    /// Any other code
    Other(u8),
}

impl NackCode {
    /// Map a wire code to a known rejection reason.
    pub fn from_code(code: u8) -> Self {
        match code {
            0xE0 => Self::InvalidPacket,
            0xE1 => Self::WrongPassword,
            0xE2 => Self::InvalidCommand,
            0xE3 => Self::NotPartitioned,
            0xE4 => Self::ZonesOpen,
            0xE5 => Self::Discontinued,
            0xE6 => Self::NoBypassPermission,
            0xE7 => Self::NoDisarmPermission,
            0xE8 => Self::BypassNotAllowed,
            0xEA => Self::NoZonesInPartition,
            0x27 => Self::ZonesOpenIsecNet2,
            other => Self::Other(other),
        }
    }

    /// Whether a single legacy reply byte is a NACK code.
    pub fn is_legacy_nack(code: u8) -> bool {
        (0xE0..=0xEA).contains(&code) && code != 0xE9
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::InvalidPacket => 0xE0,
            Self::WrongPassword => 0xE1,
            Self::InvalidCommand => 0xE2,
            Self::NotPartitioned => 0xE3,
            Self::ZonesOpen => 0xE4,
            Self::Discontinued => 0xE5,
            Self::NoBypassPermission => 0xE6,
            Self::NoDisarmPermission => 0xE7,
            Self::BypassNotAllowed => 0xE8,
            Self::NoZonesInPartition => 0xEA,
            Self::ZonesOpenIsecNet2 => 0x27,
            Self::Other(code) => *code,
        }
    }

    /// Human-readable description of the rejection.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidPacket => "Invalid packet",
            Self::WrongPassword => "Wrong password",
            Self::InvalidCommand => "Invalid command",
            Self::NotPartitioned => "Panel is not partitioned",
            Self::ZonesOpen | Self::ZonesOpenIsecNet2 => "Open zones",
            Self::Discontinued => "Discontinued function",
            Self::NoBypassPermission => "No permission to bypass",
            Self::NoDisarmPermission => "No permission to disarm",
            Self::BypassNotAllowed => "Bypass not allowed",
            Self::NoZonesInPartition => "No zones in partition",
            Self::Other(_) => "Unknown rejection",
        }
    }
}

impl fmt::Display for NackCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}: {}", self.code(), self.description())
    }
}

/// All errors that can occur in the AMT protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum AmtError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch (expected 0x{expected:02X}, got 0x{actual:02X})")]
    Checksum { expected: u8, actual: u8 },

    #[error("Incomplete frame")]
    IncompleteFrame,

    #[error("Malformed status payload: {details}")]
    MalformedStatus { details: String },

    #[error("Invalid argument: {details}")]
    InvalidArgument { details: String },

    #[error("Connection lost")]
    ConnectionLost,

    #[error("No reply from panel for {command}")]
    Timeout { command: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Unknown command 0x{code:02X}")]
    UnknownCommand { code: u16 },

    #[error("Another request is in flight")]
    Busy,

    #[error("Panel rejected command: {0}")]
    Nack(NackCode),
}

impl AmtError {
    pub(crate) fn invalid(details: impl Into<String>) -> Self {
        AmtError::InvalidArgument {
            details: details.into(),
        }
    }

    pub(crate) fn malformed(details: impl Into<String>) -> Self {
        AmtError::MalformedStatus {
            details: details.into(),
        }
    }

    /// Whether the caller may retry after this error.
    ///
    /// State-changing commands that failed with `Timeout` may still have been
    /// applied by the panel; re-query status before retrying them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AmtError::Io(_)
                | AmtError::ConnectionLost
                | AmtError::Timeout { .. }
                | AmtError::Busy
                | AmtError::Checksum { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AmtError>;
