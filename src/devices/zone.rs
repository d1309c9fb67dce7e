// MIT License - Copyright (c) 2026 Peter Wright
// Zone state

use bitflags::bitflags;

bitflags! {
    /// Zone condition bits, used to diff consecutive snapshots.
    ///
    /// Conditions a panel family does not report are never set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ZoneStatusFlags: u8 {
        /// Zone is open (sensor not at rest)
        const OPEN          = 1 << 0;
        /// Zone fired while armed
        const VIOLATED      = 1 << 1;
        /// Zone is bypassed (excluded from arming)
        const BYPASSED      = 1 << 2;
        const TAMPER        = 1 << 3;
        const SHORT_CIRCUIT = 1 << 4;
        /// Wireless sensor battery low
        const LOW_BATTERY   = 1 << 5;
    }
}

impl ZoneStatusFlags {
    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }

    /// Get human-readable event names for flags that became set.
    pub fn set_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_set = changed & new;
        let mut events = Vec::new();
        if became_set.contains(Self::OPEN) { events.push("Open"); }
        if became_set.contains(Self::VIOLATED) { events.push("Violated"); }
        if became_set.contains(Self::BYPASSED) { events.push("Bypassed"); }
        if became_set.contains(Self::TAMPER) { events.push("Tamper"); }
        if became_set.contains(Self::SHORT_CIRCUIT) { events.push("ShortCircuit"); }
        if became_set.contains(Self::LOW_BATTERY) { events.push("LowBattery"); }
        events
    }

    /// Get human-readable event names for flags that became unset.
    pub fn unset_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_unset = changed & !new;
        let mut events = Vec::new();
        if became_unset.contains(Self::OPEN) { events.push("Closed"); }
        if became_unset.contains(Self::VIOLATED) { events.push("Restored"); }
        if became_unset.contains(Self::BYPASSED) { events.push("UnBypassed"); }
        if became_unset.contains(Self::TAMPER) { events.push("TamperOk"); }
        if became_unset.contains(Self::SHORT_CIRCUIT) { events.push("ShortCircuitOk"); }
        if became_unset.contains(Self::LOW_BATTERY) { events.push("BatteryOk"); }
        events
    }
}

/// A single alarm zone.
///
/// `open`, `violated` and `bypassed` are always decoded. The remaining
/// conditions are `None` when the panel family or zone number does not
/// report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// 1-based zone number
    pub id: u8,
    pub open: bool,
    pub violated: bool,
    pub bypassed: bool,
    pub tamper: Option<bool>,
    pub short_circuit: Option<bool>,
    pub low_battery: Option<bool>,
}

impl Zone {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            open: false,
            violated: false,
            bypassed: false,
            tamper: None,
            short_circuit: None,
            low_battery: None,
        }
    }

    pub fn flags(&self) -> ZoneStatusFlags {
        let mut flags = ZoneStatusFlags::empty();
        flags.set(ZoneStatusFlags::OPEN, self.open);
        flags.set(ZoneStatusFlags::VIOLATED, self.violated);
        flags.set(ZoneStatusFlags::BYPASSED, self.bypassed);
        flags.set(ZoneStatusFlags::TAMPER, self.tamper == Some(true));
        flags.set(ZoneStatusFlags::SHORT_CIRCUIT, self.short_circuit == Some(true));
        flags.set(ZoneStatusFlags::LOW_BATTERY, self.low_battery == Some(true));
        flags
    }

    /// Any trouble condition the panel reported for this zone.
    pub fn has_trouble(&self) -> bool {
        self.tamper == Some(true) || self.short_circuit == Some(true) || self.low_battery == Some(true)
    }
}
