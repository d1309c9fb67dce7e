// MIT License - Copyright (c) 2026 Peter Wright
// Panel-wide status

use bitflags::bitflags;

bitflags! {
    /// Panel trouble conditions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProblemFlags: u16 {
        const BATTERY_SHORT  = 1 << 0;
        const BATTERY_ABSENT = 1 << 1;
        const SIREN_WIRE_CUT = 1 << 2;
        const SIREN_SHORT    = 1 << 3;
        /// Auxiliary output overloaded
        const AUX_OVERLOAD   = 1 << 4;
        const PHONE_LINE_CUT = 1 << 5;
        /// Event reporting to the monitoring station failed
        const COMM_FAILURE   = 1 << 6;
        const BOX_TAMPER     = 1 << 7;
        const BATTERY_LOW    = 1 << 8;
    }
}

impl ProblemFlags {
    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }

    /// Get human-readable event names for flags that became set.
    pub fn set_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_set = changed & new;
        let mut events = Vec::new();
        if became_set.contains(Self::BATTERY_SHORT) { events.push("BatteryShort"); }
        if became_set.contains(Self::BATTERY_ABSENT) { events.push("BatteryAbsent"); }
        if became_set.contains(Self::SIREN_WIRE_CUT) { events.push("SirenWireCut"); }
        if became_set.contains(Self::SIREN_SHORT) { events.push("SirenShort"); }
        if became_set.contains(Self::AUX_OVERLOAD) { events.push("AuxOverload"); }
        if became_set.contains(Self::PHONE_LINE_CUT) { events.push("PhoneLineCut"); }
        if became_set.contains(Self::COMM_FAILURE) { events.push("CommFailure"); }
        if became_set.contains(Self::BOX_TAMPER) { events.push("BoxTamperOpen"); }
        if became_set.contains(Self::BATTERY_LOW) { events.push("LowBattery"); }
        events
    }

    /// Get human-readable event names for flags that became unset.
    pub fn unset_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_unset = changed & !new;
        let mut events = Vec::new();
        if became_unset.contains(Self::BATTERY_SHORT) { events.push("BatteryShortOk"); }
        if became_unset.contains(Self::BATTERY_ABSENT) { events.push("BatteryPresent"); }
        if became_unset.contains(Self::SIREN_WIRE_CUT) { events.push("SirenWireOk"); }
        if became_unset.contains(Self::SIREN_SHORT) { events.push("SirenShortOk"); }
        if became_unset.contains(Self::AUX_OVERLOAD) { events.push("AuxOk"); }
        if became_unset.contains(Self::PHONE_LINE_CUT) { events.push("PhoneLineOk"); }
        if became_unset.contains(Self::COMM_FAILURE) { events.push("CommOk"); }
        if became_unset.contains(Self::BOX_TAMPER) { events.push("BoxTamperClosed"); }
        if became_unset.contains(Self::BATTERY_LOW) { events.push("BatteryOk"); }
        events
    }
}

/// Panel-wide status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    pub siren_on: bool,
    pub ac_power_ok: Option<bool>,
    pub battery_connected: Option<bool>,
    pub battery_level_percent: Option<u8>,
    /// Active problems, restricted to `supported_problems`
    pub problems: ProblemFlags,
    /// Problems this panel family can report at all
    pub supported_problems: ProblemFlags,
    /// Summary trouble bit from the central status
    pub problem: bool,
    /// At least one zone is currently firing (ISECNet2 only)
    pub zones_firing: Option<bool>,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            siren_on: false,
            ac_power_ok: None,
            battery_connected: None,
            battery_level_percent: None,
            problems: ProblemFlags::empty(),
            supported_problems: ProblemFlags::empty(),
            problem: false,
            zones_firing: None,
        }
    }
}

impl SystemStatus {
    /// Whether a given problem is active. `None` if the panel cannot report it.
    pub fn problem_active(&self, flag: ProblemFlags) -> Option<bool> {
        self.supported_problems
            .contains(flag)
            .then(|| self.problems.contains(flag))
    }
}
