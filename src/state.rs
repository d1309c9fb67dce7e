// MIT License - Copyright (c) 2026 Peter Wright
// Panel state snapshot

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::PanelModel;
use crate::constants::MAX_PGMS;
use crate::devices::{
    Partition, PartitionId, PartitionStatusFlags, Pgm, PgmEvent, ProblemFlags, SystemStatus,
    Zone, ZoneStatusFlags,
};
use crate::event::PanelEvent;

/// Immutable snapshot of everything the engine knows about the panel.
///
/// The engine replaces the snapshot wholesale on every decoded status, so
/// readers never observe a half-applied update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelState {
    /// Zones 1..=N, where N is the model's zone count
    pub zones: Vec<Zone>,
    /// Partitions A-D
    pub partitions: [Partition; 4],
    pub system: SystemStatus,
    /// PGM 1..=19
    pub pgms: Vec<Pgm>,
    pub model: Option<PanelModel>,
    pub firmware_version: Option<String>,
    /// Clock reported by legacy panels
    pub panel_clock: Option<NaiveDateTime>,
    /// False until the first status arrives and after the link drops
    pub available: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            zones: Vec::new(),
            partitions: PartitionId::ALL.map(Partition::new),
            system: SystemStatus::default(),
            pgms: (1..=MAX_PGMS).map(Pgm::new).collect(),
            model: None,
            firmware_version: None,
            panel_clock: None,
            available: false,
            updated_at: None,
        }
    }
}

impl PanelState {
    pub fn zone(&self, id: u8) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn partition(&self, id: PartitionId) -> &Partition {
        &self.partitions[id.index()]
    }

    pub fn pgm(&self, id: u8) -> Option<&Pgm> {
        self.pgms.iter().find(|p| p.id == id)
    }

    /// Numbers of the zones currently open.
    pub fn open_zones(&self) -> Vec<u8> {
        self.zones.iter().filter(|z| z.open).map(|z| z.id).collect()
    }

    /// Whether any partition is armed.
    pub fn is_armed(&self) -> bool {
        self.partitions.iter().any(Partition::is_armed)
    }

    /// Whether any partition is in alarm.
    pub fn is_triggered(&self) -> bool {
        self.partitions.iter().any(|p| p.triggered)
    }

    /// Copy of this snapshot with a different availability.
    pub fn with_availability(&self, available: bool) -> Self {
        Self {
            available,
            ..self.clone()
        }
    }

    /// Events describing the transition from `old` to `self`.
    ///
    /// A snapshot following an unavailable one is a fresh baseline and
    /// produces no per-device events.
    pub fn changes_since(&self, old: &PanelState) -> Vec<PanelEvent> {
        let mut events = Vec::new();

        if old.available != self.available {
            events.push(PanelEvent::AvailabilityChanged { available: self.available });
        }
        if !old.available || !self.available {
            return events;
        }

        for zone in &self.zones {
            let old_status = old.zone(zone.id).map(Zone::flags).unwrap_or(ZoneStatusFlags::empty());
            let new_status = zone.flags();
            let changed = ZoneStatusFlags::changed(old_status, new_status);
            if !changed.is_empty() {
                events.push(PanelEvent::ZoneStatusChanged {
                    zone_id: zone.id,
                    old_status,
                    new_status,
                    changed,
                });
            }
        }

        for (old_part, new_part) in old.partitions.iter().zip(self.partitions.iter()) {
            let old_status = old_part.flags();
            let new_status = new_part.flags();
            let changed = PartitionStatusFlags::changed(old_status, new_status);
            if !changed.is_empty() {
                events.push(PanelEvent::PartitionStatusChanged {
                    partition_id: new_part.id,
                    old_status,
                    new_status,
                    changed,
                });
            }
        }

        for (old_pgm, new_pgm) in old.pgms.iter().zip(self.pgms.iter()) {
            if let Some(event) = PgmEvent::between(old_pgm.active, new_pgm.active) {
                events.push(PanelEvent::PgmStatusChanged { pgm_id: new_pgm.id, event });
            }
        }

        if old.system.siren_on != self.system.siren_on {
            events.push(PanelEvent::SirenChanged { on: self.system.siren_on });
        }

        let changed = ProblemFlags::changed(old.system.problems, self.system.problems);
        if !changed.is_empty() {
            events.push(PanelEvent::SystemStatusChanged {
                old_status: old.system.problems,
                new_status: self.system.problems,
                changed,
            });
        }

        events
    }
}
