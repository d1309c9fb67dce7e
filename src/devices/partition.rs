// MIT License - Copyright (c) 2026 Peter Wright
// Partition state

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::AmtError;

/// One of the four panel partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionId {
    A,
    B,
    C,
    D,
}

impl PartitionId {
    pub const ALL: [PartitionId; 4] = [Self::A, Self::B, Self::C, Self::D];

    /// Zero-based index (A = 0).
    pub fn index(&self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// ASCII letter used in legacy partition commands.
    pub fn letter(&self) -> u8 {
        b'A' + self.index() as u8
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter() as char)
    }
}

impl FromStr for PartitionId {
    type Err = AmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "1" => Ok(Self::A),
            "B" | "2" => Ok(Self::B),
            "C" | "3" => Ok(Self::C),
            "D" | "4" => Ok(Self::D),
            other => Err(AmtError::invalid(format!("unknown partition '{other}'"))),
        }
    }
}

bitflags! {
    /// Partition condition bits, used to diff consecutive snapshots.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartitionStatusFlags: u8 {
        const ARMED_AWAY   = 1 << 0;
        const ARMED_STAY   = 1 << 1;
        /// Alarm in progress (computed)
        const TRIGGERED    = 1 << 2;
        /// Alarm memory latched by the panel
        const ALARM_MEMORY = 1 << 3;
        /// Ready to arm
        const READY        = 1 << 4;
        const ENABLED      = 1 << 5;
    }
}

impl PartitionStatusFlags {
    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }

    /// Get human-readable event names for flags that became set.
    pub fn set_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_set = changed & new;
        let mut events = Vec::new();
        if became_set.contains(Self::ARMED_AWAY) { events.push("Armed"); }
        if became_set.contains(Self::ARMED_STAY) { events.push("HomeStay"); }
        if became_set.contains(Self::TRIGGERED) { events.push("Alarm"); }
        if became_set.contains(Self::ALARM_MEMORY) { events.push("MemoryEvent"); }
        if became_set.contains(Self::READY) { events.push("Ready"); }
        if became_set.contains(Self::ENABLED) { events.push("Enabled"); }
        events
    }

    /// Get human-readable event names for flags that became unset.
    pub fn unset_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_unset = changed & !new;
        let mut events = Vec::new();
        if became_unset.contains(Self::ARMED_AWAY) { events.push("Disarmed"); }
        if became_unset.contains(Self::ARMED_STAY) { events.push("HomeDisarmed"); }
        if became_unset.contains(Self::TRIGGERED) { events.push("StandBy"); }
        if became_unset.contains(Self::ALARM_MEMORY) { events.push("MemoryAck"); }
        if became_unset.contains(Self::READY) { events.push("NotReady"); }
        if became_unset.contains(Self::ENABLED) { events.push("Disabled"); }
        events
    }
}

/// A single alarm partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub id: PartitionId,
    pub armed_away: bool,
    pub armed_stay: bool,
    /// `siren_on || (armed && alarm_memory)`
    pub triggered: bool,
    pub alarm_memory: bool,
    pub ready: Option<bool>,
    pub enabled: Option<bool>,
}

impl Partition {
    pub fn new(id: PartitionId) -> Self {
        Self {
            id,
            armed_away: false,
            armed_stay: false,
            triggered: false,
            alarm_memory: false,
            ready: None,
            enabled: None,
        }
    }

    /// Build a partition from the raw armed/stay/memory bits.
    pub fn from_bits(id: PartitionId, armed: bool, stay: bool, alarm_memory: bool, siren_on: bool) -> Self {
        Self {
            id,
            armed_away: armed && !stay,
            armed_stay: armed && stay,
            triggered: siren_on || (armed && alarm_memory),
            alarm_memory,
            ready: None,
            enabled: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_away || self.armed_stay
    }

    pub fn flags(&self) -> PartitionStatusFlags {
        let mut flags = PartitionStatusFlags::empty();
        flags.set(PartitionStatusFlags::ARMED_AWAY, self.armed_away);
        flags.set(PartitionStatusFlags::ARMED_STAY, self.armed_stay);
        flags.set(PartitionStatusFlags::TRIGGERED, self.triggered);
        flags.set(PartitionStatusFlags::ALARM_MEMORY, self.alarm_memory);
        flags.set(PartitionStatusFlags::READY, self.ready == Some(true));
        flags.set(PartitionStatusFlags::ENABLED, self.enabled == Some(true));
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partition_id() {
        assert_eq!("a".parse::<PartitionId>().unwrap(), PartitionId::A);
        assert_eq!("4".parse::<PartitionId>().unwrap(), PartitionId::D);
        assert!("E".parse::<PartitionId>().is_err());
        assert_eq!(PartitionId::C.letter(), b'C');
        assert_eq!(PartitionId::from_index(1), Some(PartitionId::B));
        assert_eq!(PartitionId::from_index(4), None);
    }

    #[test]
    fn test_triggered_rule() {
        // memory alone on a disarmed partition is not an active alarm
        let p = Partition::from_bits(PartitionId::A, false, false, true, false);
        assert!(!p.triggered);

        let p = Partition::from_bits(PartitionId::A, true, false, true, false);
        assert!(p.triggered);
        assert!(p.armed_away);

        let p = Partition::from_bits(PartitionId::B, false, false, false, true);
        assert!(p.triggered);
    }

    #[test]
    fn test_stay_is_not_away() {
        let p = Partition::from_bits(PartitionId::A, true, true, false, false);
        assert!(p.armed_stay);
        assert!(!p.armed_away);
        assert!(p.is_armed());
        assert_eq!(
            p.flags(),
            PartitionStatusFlags::ARMED_STAY
        );
    }
}
