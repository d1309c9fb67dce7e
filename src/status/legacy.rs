// MIT License - Copyright (c) 2026 Peter Wright
// Legacy (AMT 4010 / 2018 / 1016) status decoding

use chrono::{NaiveDate, NaiveDateTime};

use crate::config::PanelModel;
use crate::constants::{LEGACY_STATUS_LEN, MAX_PGMS, MAX_ZONES};
use crate::devices::{Partition, PartitionId, Pgm, ProblemFlags, SystemStatus, Zone};
use crate::error::{AmtError, Result};
use crate::state::PanelState;

use super::{bit, bits};

// Central status byte
const CENTRAL_STAY: u8 = 0x04;
const CENTRAL_ARMED: u8 = 0x08;
const CENTRAL_PROBLEM: u8 = 0x10;

// Power byte
const POWER_AC_OK: u8 = 0x01;
const POWER_BATTERY_CONNECTED: u8 = 0x04;

// Partition nibble
const PART_ARMED: u8 = 0x1;
const PART_STAY: u8 = 0x2;
const PART_ALARM_MEMORY: u8 = 0x4;

const SIREN_ON: u8 = 0x01;

/// Battery percentage at or below which the battery counts as low.
const BATTERY_LOW_PERCENT: u8 = 25;

/// Byte offsets inside the 54-byte legacy status reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyLayout {
    pub zones_open: usize,
    pub zones_violated: usize,
    pub zones_bypassed: usize,
    pub model: usize,
    pub firmware: usize,
    pub partitions_ab: usize,
    pub partitions_cd: usize,
    pub central: usize,
    pub zones_low_battery: usize,
    pub power: usize,
    pub problems: usize,
    pub zones_tamper: usize,
    pub battery_level: usize,
    pub zones_short_circuit: usize,
    /// Siren in bit 0, PGM 1-7 in bits 1-7, PGM 8-19 in the next two bytes
    pub outputs: usize,
    /// day, month, year (2 digits), hour, minute
    pub clock: usize,
    /// Number of zones with a low-battery bit
    pub low_battery_zones: usize,
    /// Number of zones with a tamper bit
    pub tamper_zones: usize,
    /// Number of zones with a short-circuit bit
    pub short_circuit_zones: usize,
    /// Number of zones on the panel
    pub max_zones: usize,
}

impl LegacyLayout {
    pub const STANDARD: LegacyLayout = LegacyLayout {
        zones_open: 2,
        zones_violated: 10,
        zones_bypassed: 18,
        model: 26,
        firmware: 27,
        partitions_ab: 28,
        partitions_cd: 29,
        central: 30,
        zones_low_battery: 31,
        power: 36,
        problems: 37,
        zones_tamper: 38,
        battery_level: 41,
        zones_short_circuit: 42,
        outputs: 46,
        clock: 49,
        low_battery_zones: 40,
        tamper_zones: 18,
        short_circuit_zones: 18,
        max_zones: MAX_ZONES as usize,
    };

    /// Layout with zone counts limited to what `model` has.
    pub fn for_model(model: PanelModel) -> Self {
        let max_zones = model.max_zones();
        Self {
            low_battery_zones: Self::STANDARD.low_battery_zones.min(max_zones),
            tamper_zones: Self::STANDARD.tamper_zones.min(max_zones),
            short_circuit_zones: Self::STANDARD.short_circuit_zones.min(max_zones),
            max_zones,
            ..Self::STANDARD
        }
    }
}

/// Decode a legacy status reply. The payload must be exactly 54 bytes.
pub fn decode(payload: &[u8]) -> Result<PanelState> {
    if payload.len() != LEGACY_STATUS_LEN {
        return Err(AmtError::malformed(format!(
            "legacy status must be {} bytes, got {}",
            LEGACY_STATUS_LEN,
            payload.len()
        )));
    }

    let model = PanelModel::from_id(payload[LegacyLayout::STANDARD.model]);
    let layout = LegacyLayout::for_model(model);
    let block = |offset: usize| &payload[offset..offset + 8];

    let open = bits(block(layout.zones_open), layout.max_zones);
    let violated = bits(block(layout.zones_violated), layout.max_zones);
    let bypassed = bits(block(layout.zones_bypassed), layout.max_zones);
    let low_battery = &payload[layout.zones_low_battery..layout.power];
    let tamper = &payload[layout.zones_tamper..layout.battery_level];
    let short_circuit = &payload[layout.zones_short_circuit..layout.outputs];

    let zones = (0..layout.max_zones)
        .map(|i| Zone {
            id: (i + 1) as u8,
            open: open[i],
            violated: violated[i],
            bypassed: bypassed[i],
            tamper: (i < layout.tamper_zones).then(|| bit(tamper, i)),
            short_circuit: (i < layout.short_circuit_zones).then(|| bit(short_circuit, i)),
            low_battery: (i < layout.low_battery_zones).then(|| bit(low_battery, i)),
        })
        .collect();

    let outputs = &payload[layout.outputs..layout.clock];
    let siren_on = outputs[0] & SIREN_ON != 0;
    let pgms = (1..=MAX_PGMS)
        .map(|id| Pgm {
            id,
            active: Some(bit(outputs, id as usize)),
        })
        .collect();

    let central = payload[layout.central];
    let central_armed = central & CENTRAL_ARMED != 0;
    let central_stay = central & CENTRAL_STAY != 0;

    let nibbles = [
        payload[layout.partitions_ab] & 0x0F,
        payload[layout.partitions_ab] >> 4,
        payload[layout.partitions_cd] & 0x0F,
        payload[layout.partitions_cd] >> 4,
    ];
    let partitions = PartitionId::ALL.map(|id| {
        let nibble = nibbles[id.index()];
        let mut armed = nibble & PART_ARMED != 0;
        let mut stay = nibble & PART_STAY != 0;
        // Unpartitioned panels only report the central state
        if id == PartitionId::A && !armed && central_armed {
            armed = true;
            stay = central_stay;
        }
        Partition::from_bits(id, armed, stay, nibble & PART_ALARM_MEMORY != 0, siren_on)
    });

    let power = payload[layout.power];
    let battery_connected = power & POWER_BATTERY_CONNECTED != 0;
    let battery_level_percent = Some(payload[layout.battery_level]).filter(|p| *p <= 100);

    let mut problems = ProblemFlags::from_bits_truncate(payload[layout.problems] as u16);
    let battery_low = battery_connected && battery_level_percent.is_some_and(|p| p <= BATTERY_LOW_PERCENT);
    problems.set(ProblemFlags::BATTERY_LOW, battery_low);

    let system = SystemStatus {
        siren_on,
        ac_power_ok: Some(power & POWER_AC_OK != 0),
        battery_connected: Some(battery_connected),
        battery_level_percent,
        problems,
        supported_problems: ProblemFlags::all(),
        problem: central & CENTRAL_PROBLEM != 0 || !problems.is_empty(),
        zones_firing: None,
    };

    let fw = payload[layout.firmware];

    Ok(PanelState {
        zones,
        partitions,
        system,
        pgms,
        model: Some(model),
        firmware_version: Some(format!("{}.{}", fw >> 4, fw & 0x0F)),
        panel_clock: decode_clock(&payload[layout.clock..layout.clock + 5]),
        available: true,
        updated_at: None,
    })
}

fn decode_clock(raw: &[u8]) -> Option<NaiveDateTime> {
    let [day, month, year, hour, minute] = raw else {
        return None;
    };
    NaiveDate::from_ymd_opt(2000 + *year as i32, *month as u32, *day as u32)?
        .and_hms_opt(*hour as u32, *minute as u32, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(model: u8) -> Vec<u8> {
        let mut p = vec![0u8; LEGACY_STATUS_LEN];
        p[26] = model;
        p[27] = 0x52;
        p[36] = POWER_AC_OK | POWER_BATTERY_CONNECTED;
        p[41] = 80;
        p[49..54].copy_from_slice(&[15, 3, 26, 14, 30]);
        p
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        assert!(matches!(decode(&[0u8; 53]), Err(AmtError::MalformedStatus { .. })));
        assert!(matches!(decode(&[0u8; 55]), Err(AmtError::MalformedStatus { .. })));
    }

    #[test]
    fn test_basic_fields() {
        let state = decode(&status(0x41)).unwrap();
        assert_eq!(state.model, Some(PanelModel::Amt4010Smart));
        assert_eq!(state.firmware_version.as_deref(), Some("5.2"));
        assert_eq!(state.zones.len(), 64);
        assert_eq!(state.system.ac_power_ok, Some(true));
        assert_eq!(state.system.battery_connected, Some(true));
        assert_eq!(state.system.battery_level_percent, Some(80));
        assert!(state.system.problems.is_empty());
        assert!(!state.system.problem);
        assert_eq!(
            state.panel_clock,
            NaiveDate::from_ymd_opt(2026, 3, 15).unwrap().and_hms_opt(14, 30, 0)
        );
        assert!(state.available);
    }

    #[test]
    fn test_zone_bits_are_independent() {
        let mut p = status(0x41);
        p[2] = 0b0000_0001; // zone 1 open
        p[10 + 1] = 0b0000_0010; // zone 10 violated, not open
        p[18 + 7] = 0b1000_0000; // zone 64 bypassed
        let state = decode(&p).unwrap();

        let z1 = state.zone(1).unwrap();
        assert!(z1.open && !z1.violated && !z1.bypassed);
        let z10 = state.zone(10).unwrap();
        assert!(!z10.open && z10.violated);
        assert!(state.zone(64).unwrap().bypassed);
    }

    #[test]
    fn test_model_limits_zones() {
        let state = decode(&status(0x39)).unwrap();
        assert_eq!(state.zones.len(), 18);
        assert_eq!(state.zone(18).unwrap().tamper, Some(false));

        let state = decode(&status(0x38)).unwrap();
        assert_eq!(state.zones.len(), 16);

        let state = decode(&status(0x41)).unwrap();
        assert_eq!(state.zone(19).unwrap().tamper, None);
        assert_eq!(state.zone(40).unwrap().low_battery, Some(false));
        assert_eq!(state.zone(41).unwrap().low_battery, None);
    }

    #[test]
    fn test_unknown_model_uses_full_block() {
        let state = decode(&status(0x00)).unwrap();
        assert_eq!(state.model, Some(PanelModel::Unknown(0x00)));
        assert_eq!(state.zones.len(), 64);
    }

    #[test]
    fn test_partitions() {
        let mut p = status(0x41);
        p[28] = 0x31; // A armed, B armed + stay
        p[29] = 0x50; // D armed + alarm memory
        let state = decode(&p).unwrap();

        assert!(state.partition(PartitionId::A).armed_away);
        assert!(state.partition(PartitionId::B).armed_stay);
        assert!(!state.partition(PartitionId::C).is_armed());
        let d = state.partition(PartitionId::D);
        assert!(d.armed_away && d.alarm_memory && d.triggered);
    }

    #[test]
    fn test_partition_a_follows_central_state() {
        let mut p = status(0x41);
        p[30] = CENTRAL_ARMED | CENTRAL_STAY;
        let state = decode(&p).unwrap();
        assert!(state.partition(PartitionId::A).armed_stay);
        assert!(!state.partition(PartitionId::B).is_armed());
    }

    #[test]
    fn test_siren_triggers_every_partition() {
        let mut p = status(0x41);
        p[46] = SIREN_ON;
        let state = decode(&p).unwrap();
        assert!(state.system.siren_on);
        assert!(state.partitions.iter().all(|p| p.triggered));
    }

    #[test]
    fn test_outputs() {
        let mut p = status(0x41);
        p[46] = 0b0000_0110; // PGM 1, 2
        p[48] = 0b0000_1000; // bit 19 of the block: PGM 19
        let state = decode(&p).unwrap();
        assert!(!state.system.siren_on);
        assert_eq!(state.pgm(1).unwrap().active, Some(true));
        assert_eq!(state.pgm(2).unwrap().active, Some(true));
        assert_eq!(state.pgm(3).unwrap().active, Some(false));
        assert_eq!(state.pgm(19).unwrap().active, Some(true));
    }

    #[test]
    fn test_problems_and_battery() {
        let mut p = status(0x41);
        p[37] = 0b0010_0100; // siren wire cut, phone line cut
        p[41] = 20;
        let state = decode(&p).unwrap();
        let expected = ProblemFlags::SIREN_WIRE_CUT | ProblemFlags::PHONE_LINE_CUT | ProblemFlags::BATTERY_LOW;
        assert_eq!(state.system.problems, expected);
        assert!(state.system.problem);

        p[41] = 0xFF;
        let state = decode(&p).unwrap();
        assert_eq!(state.system.battery_level_percent, None);
    }

    #[test]
    fn test_bad_clock_is_none() {
        let mut p = status(0x41);
        p[50] = 13;
        assert_eq!(decode(&p).unwrap().panel_clock, None);
    }
}
