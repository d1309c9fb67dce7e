// MIT License - Copyright (c) 2026 Peter Wright
// Keepalive handling

use std::time::Duration;

use tokio::time::Instant;

use crate::config::Protocol;
use crate::constants::FRAME_ACK;
use crate::frame::encode_body;
use crate::protocol::Inbound;

/// The legacy acknowledgement frame `[0x01][0xFE][0x00]`.
pub fn ack_frame() -> Vec<u8> {
    encode_body(&[FRAME_ACK])
}

/// Frame to write back immediately for an inbound unit, if any.
///
/// Legacy panels expect every keepalive and the post-dial connection info
/// to be acknowledged. ISECNet2 needs no unsolicited replies.
pub fn immediate_reply(protocol: Protocol, inbound: &Inbound) -> Option<Vec<u8>> {
    match (protocol, inbound) {
        (Protocol::Legacy, Inbound::Heartbeat | Inbound::ConnectionInfo(_)) => Some(ack_frame()),
        _ => None,
    }
}

/// Tracks link activity for the optional idle timeout.
#[derive(Debug, Clone)]
pub struct IdleMonitor {
    last_activity: Instant,
    idle_timeout: Option<Duration>,
}

impl IdleMonitor {
    pub fn new(idle_timeout: Option<Duration>, now: Instant) -> Self {
        Self {
            last_activity: now,
            idle_timeout,
        }
    }

    /// Record that bytes arrived.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// When the link is declared dead if nothing else arrives.
    pub fn deadline(&self) -> Option<Instant> {
        self.idle_timeout.map(|timeout| self.last_activity + timeout)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NackCode;

    #[test]
    fn test_ack_frame_bytes() {
        assert_eq!(ack_frame(), vec![0x01, 0xFE, 0x00]);
    }

    #[test]
    fn test_immediate_reply() {
        assert_eq!(immediate_reply(Protocol::Legacy, &Inbound::Heartbeat), Some(ack_frame()));
        assert_eq!(
            immediate_reply(Protocol::Legacy, &Inbound::ConnectionInfo(vec![0x94])),
            Some(ack_frame())
        );
        assert_eq!(immediate_reply(Protocol::Legacy, &Inbound::Ack), None);
        assert_eq!(immediate_reply(Protocol::Legacy, &Inbound::Nack(NackCode::ZonesOpen)), None);
        assert_eq!(immediate_reply(Protocol::IsecNet2, &Inbound::Heartbeat), None);
    }

    #[test]
    fn test_idle_monitor() {
        let start = Instant::now();
        let mut monitor = IdleMonitor::new(Some(Duration::from_secs(30)), start);
        assert!(!monitor.is_expired(start + Duration::from_secs(29)));
        assert!(monitor.is_expired(start + Duration::from_secs(30)));

        monitor.touch(start + Duration::from_secs(20));
        assert!(!monitor.is_expired(start + Duration::from_secs(30)));

        let disabled = IdleMonitor::new(None, start);
        assert!(!disabled.is_expired(start + Duration::from_secs(3600)));
        assert_eq!(disabled.deadline(), None);
    }
}
