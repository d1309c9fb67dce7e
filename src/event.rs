// MIT License - Copyright (c) 2026 Peter Wright
// Engine events

use std::time::Duration;

use crate::devices::{
    partition::{PartitionId, PartitionStatusFlags},
    pgm::PgmEvent,
    system::ProblemFlags,
    zone::ZoneStatusFlags,
};
use crate::transport::session::SessionState;

/// All events that can be emitted by the engine.
///
/// Users subscribe via `panel.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<PanelEvent>`.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    /// A session with the panel was established
    Connected { peer: String },
    /// The active session ended
    Disconnected { reason: String },
    /// Session lifecycle transition
    SessionStateChanged(SessionState),
    /// Keepalive received and acknowledged
    Heartbeat,
    /// Client mode will dial again after `delay`
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The panel refused the access code
    AuthenticationFailed { reason: String },
    /// A new status snapshot was published
    StatusUpdated,
    /// The snapshot became available or unavailable
    AvailabilityChanged { available: bool },
    /// Zone status changed
    ZoneStatusChanged {
        zone_id: u8,
        old_status: ZoneStatusFlags,
        new_status: ZoneStatusFlags,
        changed: ZoneStatusFlags,
    },
    /// Partition status changed
    PartitionStatusChanged {
        partition_id: PartitionId,
        old_status: PartitionStatusFlags,
        new_status: PartitionStatusFlags,
        changed: PartitionStatusFlags,
    },
    /// PGM output switched
    PgmStatusChanged { pgm_id: u8, event: PgmEvent },
    /// Siren switched on or off
    SirenChanged { on: bool },
    /// Panel trouble conditions changed
    SystemStatusChanged {
        old_status: ProblemFlags,
        new_status: ProblemFlags,
        changed: ProblemFlags,
    },
    /// Frame the engine could not attribute to a request
    UnknownFrame(Vec<u8>),
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
