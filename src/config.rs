// MIT License - Copyright (c) 2026 Peter Wright
// Engine configuration

use std::fmt;
use std::time::Duration;

use crate::constants::DEFAULT_PORT;
use crate::devices::partition::PartitionId;
use crate::error::{AmtError, Result};

/// Who opens the TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// The engine listens and the panel dials in (legacy default).
    Server,
    /// The engine dials the panel (ISECNet2 default).
    Client,
}

impl ConnectionMode {
    /// Protocol normally spoken in this mode.
    pub fn default_protocol(&self) -> Protocol {
        match self {
            Self::Server => Protocol::Legacy,
            Self::Client => Protocol::IsecNet2,
        }
    }
}

/// Wire protocol family, which also selects the status decode profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// AMT 4010 / 2018 / 1016 ASCII frames with a 54-byte status reply.
    Legacy,
    /// AMT-8000 ISECNet2 packets.
    IsecNet2,
}

/// What to do when a command arrives while another is awaiting its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyPolicy {
    /// Fail immediately with `AmtError::Busy`.
    Reject,
    /// Wait in FIFO order for the in-flight request to finish.
    Queue,
}

/// Panel model as reported in the status payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelModel {
    Amt4010Smart,
    Amt2018,
    Amt1016,
    Amt8000,
    Unknown(u8),
}

impl PanelModel {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x41 => Self::Amt4010Smart,
            0x39 => Self::Amt2018,
            0x38 => Self::Amt1016,
            0x01 => Self::Amt8000,
            other => Self::Unknown(other),
        }
    }

    /// Whether the id maps to a known model.
    pub fn is_known_id(id: u8) -> bool {
        !matches!(Self::from_id(id), Self::Unknown(_))
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Amt4010Smart => 0x41,
            Self::Amt2018 => 0x39,
            Self::Amt1016 => 0x38,
            Self::Amt8000 => 0x01,
            Self::Unknown(id) => *id,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Amt4010Smart => "AMT 4010 SMART".to_string(),
            Self::Amt2018 => "AMT 2018".to_string(),
            Self::Amt1016 => "AMT 1016".to_string(),
            Self::Amt8000 => "AMT-8000".to_string(),
            Self::Unknown(id) => format!("Unknown (0x{id:02X})"),
        }
    }

    /// Number of zones the model exposes. Unknown models get the full block.
    pub fn max_zones(&self) -> usize {
        match self {
            Self::Amt2018 => 18,
            Self::Amt1016 => 16,
            Self::Amt4010Smart | Self::Amt8000 | Self::Unknown(_) => 64,
        }
    }
}

impl fmt::Display for PanelModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A panel access code: 4 to 6 ASCII digits.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        if !(4..=6).contains(&code.len()) || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmtError::invalid("access code must be 4 to 6 digits"));
        }
        Ok(Self(code))
    }

    /// ASCII bytes as carried in legacy frames.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Contact-ID digit encoding used by ISECNet2 auth (0 is sent as 0x0A).
    /// Five-digit codes are left-padded to six.
    pub fn contact_id_digits(&self) -> Vec<u8> {
        let padded = if self.0.len() == 5 {
            format!("0{}", self.0)
        } else {
            self.0.clone()
        };
        padded
            .bytes()
            .map(|b| match b - b'0' {
                0 => 0x0A,
                d => d,
            })
            .collect()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(****)")
    }
}

/// Configuration for the protocol engine.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Server (listen) or client (dial)
    pub mode: ConnectionMode,
    /// Wire protocol; defaults follow the mode
    pub protocol: Protocol,
    /// Panel address (client mode)
    pub panel_host: String,
    /// Bind address (server mode)
    pub listen_host: String,
    /// TCP port for both modes (default: 9009)
    pub port: u16,
    /// Default access code
    pub password: String,
    /// Optional per-partition access codes, indexed A-D
    pub partition_passwords: [Option<String>; 4],
    /// How long to wait for a reply before resolving a request as `Timeout`
    pub command_timeout_ms: u64,
    /// Outbound dial timeout (client mode)
    pub connect_timeout_ms: u64,
    /// First reconnect delay (client mode)
    pub reconnect_delay_ms: u64,
    /// Reconnect delay ceiling (client mode)
    pub max_reconnect_delay_ms: u64,
    /// A partial frame older than this is dropped byte-wise to resync
    pub frame_timeout_ms: u64,
    /// Close the session when nothing arrives for this long (disabled if None)
    pub idle_timeout_ms: Option<u64>,
    /// Delay before a lost connection marks the state unavailable
    pub unavailable_grace_ms: u64,
    /// Behaviour when a second request arrives while one is in flight
    pub busy_policy: BusyPolicy,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Server,
            protocol: Protocol::Legacy,
            panel_host: "192.168.1.100".to_string(),
            listen_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            partition_passwords: [None, None, None, None],
            command_timeout_ms: 8000,
            connect_timeout_ms: 5000,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 60_000,
            frame_timeout_ms: 2000,
            idle_timeout_ms: None,
            unavailable_grace_ms: 0,
            busy_policy: BusyPolicy::Reject,
        }
    }
}

impl PanelConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> PanelConfigBuilder {
        PanelConfigBuilder::default()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn unavailable_grace(&self) -> Duration {
        Duration::from_millis(self.unavailable_grace_ms)
    }

    /// `host:port` to dial or bind, depending on the mode.
    pub fn socket_addr(&self) -> String {
        match self.mode {
            ConnectionMode::Client => format!("{}:{}", self.panel_host, self.port),
            ConnectionMode::Server => format!("{}:{}", self.listen_host, self.port),
        }
    }

    /// The default access code, validated.
    pub fn credential(&self) -> Result<Credential> {
        Credential::new(self.password.clone())
    }

    /// Pick the access code for a command: explicit code, then the partition
    /// code, then the default code.
    pub fn resolve_credential(
        &self,
        code: Option<&str>,
        partition: Option<PartitionId>,
    ) -> Result<Credential> {
        if let Some(code) = code.filter(|c| !c.is_empty()) {
            return Credential::new(code);
        }
        if let Some(part) = partition
            && let Some(code) = &self.partition_passwords[part.index()]
        {
            return Credential::new(code.clone());
        }
        self.credential()
    }
}

/// Builder for PanelConfig.
#[derive(Debug, Clone, Default)]
pub struct PanelConfigBuilder {
    config: PanelConfig,
    protocol_set: bool,
}

impl PanelConfigBuilder {
    /// Set the mode. Unless a protocol is set explicitly, the mode's default
    /// protocol is used.
    pub fn mode(mut self, mode: ConnectionMode) -> Self {
        self.config.mode = mode;
        if !self.protocol_set {
            self.config.protocol = mode.default_protocol();
        }
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self.protocol_set = true;
        self
    }

    pub fn panel_host(mut self, host: impl Into<String>) -> Self {
        self.config.panel_host = host.into();
        self
    }

    pub fn listen_host(mut self, host: impl Into<String>) -> Self {
        self.config.listen_host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn partition_password(mut self, partition: PartitionId, password: impl Into<String>) -> Self {
        self.config.partition_passwords[partition.index()] = Some(password.into());
        self
    }

    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.config.command_timeout_ms = ms;
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn max_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.max_reconnect_delay_ms = ms;
        self
    }

    pub fn frame_timeout_ms(mut self, ms: u64) -> Self {
        self.config.frame_timeout_ms = ms;
        self
    }

    pub fn idle_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    pub fn unavailable_grace_ms(mut self, ms: u64) -> Self {
        self.config.unavailable_grace_ms = ms;
        self
    }

    pub fn busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.config.busy_policy = policy;
        self
    }

    pub fn build(self) -> PanelConfig {
        self.config
    }
}
