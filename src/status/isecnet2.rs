// MIT License - Copyright (c) 2026 Peter Wright
// ISECNet2 (AMT-8000) status decoding

use crate::config::PanelModel;
use crate::devices::{Partition, PartitionId, ProblemFlags, SystemStatus, Zone};
use crate::error::{AmtError, Result};
use crate::state::PanelState;

use super::bits;

const OFFSET_STATUS: usize = 20;
const OFFSET_PARTITIONS: usize = 21;
const OFFSET_ZONES_OPEN: usize = 38;
const OFFSET_ZONES_VIOLATED: usize = 46;
const OFFSET_ZONES_BYPASSED: usize = 54;
const OFFSET_TAMPER: usize = 71;
const OFFSET_BATTERY: usize = 134;

/// Shortest payload that reaches the battery byte.
pub const MIN_STATUS_LEN: usize = OFFSET_BATTERY + 1;

// Status byte
const STATUS_PROBLEM: u8 = 0x01;
const STATUS_SIREN: u8 = 0x02;
const STATUS_ZONES_FIRING: u8 = 0x08;
const ARM_STATE_PARTIAL: u8 = 0x01;
const ARM_STATE_ALL: u8 = 0x03;

// Partition byte
const PART_ENABLED: u8 = 0x80;
const PART_STAY_ALT: u8 = 0x40;
const PART_READY: u8 = 0x10;
const PART_ALARM_OCCURRED: u8 = 0x08;
const PART_TRIGGERED: u8 = 0x04;
const PART_STAY: u8 = 0x02;
const PART_ARMED: u8 = 0x01;

const TAMPER_BIT: u8 = 0x02;

/// Problems this profile can report.
const SUPPORTED_PROBLEMS: ProblemFlags = ProblemFlags::BATTERY_LOW.union(ProblemFlags::BOX_TAMPER);

/// Battery code to (percent, low).
fn battery_level(code: u8) -> Option<(u8, bool)> {
    match code {
        1 => Some((5, true)),
        2 => Some((25, true)),
        3 => Some((60, false)),
        4 => Some((100, false)),
        _ => None,
    }
}

/// Some firmware prepends one byte before the model id.
fn model_and_firmware(payload: &[u8]) -> (PanelModel, String) {
    let version = |start: usize| format!("{}.{}.{}", payload[start], payload[start + 1], payload[start + 2]);
    if PanelModel::is_known_id(payload[0]) {
        (PanelModel::from_id(payload[0]), version(1))
    } else if PanelModel::is_known_id(payload[1]) {
        (PanelModel::from_id(payload[1]), version(2))
    } else {
        (PanelModel::from_id(payload[0]), version(2))
    }
}

/// Decode the payload of a `0x0B4A` status reply.
pub fn decode(payload: &[u8]) -> Result<PanelState> {
    if payload.len() < MIN_STATUS_LEN {
        return Err(AmtError::malformed(format!(
            "status payload too short: {} bytes (need {})",
            payload.len(),
            MIN_STATUS_LEN
        )));
    }

    let (model, firmware) = model_and_firmware(payload);

    let status = payload[OFFSET_STATUS];
    let arm_state = (status >> 5) & 0x03;
    let central_armed = matches!(arm_state, ARM_STATE_PARTIAL | ARM_STATE_ALL);
    let central_stay = arm_state == ARM_STATE_PARTIAL;
    let zones_firing = status & STATUS_ZONES_FIRING != 0;
    let siren_on = status & STATUS_SIREN != 0;

    let partitions = PartitionId::ALL.map(|id| {
        let byte = payload[OFFSET_PARTITIONS + id.index()];
        if byte & PART_ENABLED == 0 {
            // A disabled partition A mirrors the central state
            let mut part = if id == PartitionId::A {
                Partition::from_bits(id, central_armed, central_stay, zones_firing, siren_on)
            } else {
                Partition::from_bits(id, false, false, false, siren_on)
            };
            part.enabled = Some(false);
            return part;
        }
        let mut part = Partition::from_bits(
            id,
            byte & PART_ARMED != 0,
            byte & (PART_STAY | PART_STAY_ALT) != 0,
            byte & (PART_TRIGGERED | PART_ALARM_OCCURRED) != 0,
            siren_on,
        );
        part.ready = Some(byte & PART_READY != 0);
        part.enabled = Some(true);
        part
    });

    let max_zones = model.max_zones();
    let block = |offset: usize| &payload[offset..offset + 8];
    let open = bits(block(OFFSET_ZONES_OPEN), max_zones);
    let violated = bits(block(OFFSET_ZONES_VIOLATED), max_zones);
    let bypassed = bits(block(OFFSET_ZONES_BYPASSED), max_zones);
    let zones = (0..max_zones)
        .map(|i| Zone {
            open: open[i],
            violated: violated[i],
            bypassed: bypassed[i],
            ..Zone::new((i + 1) as u8)
        })
        .collect();

    let battery_code = payload[OFFSET_BATTERY];
    let battery = battery_level(battery_code);
    let battery_low = battery.is_some_and(|(_, low)| low);
    let tamper = payload[OFFSET_TAMPER] & TAMPER_BIT != 0;

    let mut problems = ProblemFlags::empty();
    problems.set(ProblemFlags::BATTERY_LOW, battery_low);
    problems.set(ProblemFlags::BOX_TAMPER, tamper);

    let system = SystemStatus {
        siren_on,
        ac_power_ok: None,
        battery_connected: battery.map(|_| battery_code != 1),
        battery_level_percent: battery.map(|(percent, _)| percent),
        problems,
        supported_problems: SUPPORTED_PROBLEMS,
        problem: status & STATUS_PROBLEM != 0 || tamper || battery_low,
        zones_firing: Some(zones_firing),
    };

    Ok(PanelState {
        zones,
        partitions,
        system,
        model: Some(model),
        firmware_version: Some(firmware),
        available: true,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> Vec<u8> {
        let mut p = vec![0u8; MIN_STATUS_LEN];
        p[0] = 0x01;
        p[1..4].copy_from_slice(&[1, 4, 2]);
        p[OFFSET_BATTERY] = 4;
        p
    }

    #[test]
    fn test_short_payload_is_malformed() {
        assert!(matches!(decode(&[0u8; 134]), Err(AmtError::MalformedStatus { .. })));
        assert!(decode(&status()).is_ok());
    }

    #[test]
    fn test_model_and_firmware() {
        let state = decode(&status()).unwrap();
        assert_eq!(state.model, Some(PanelModel::Amt8000));
        assert_eq!(state.firmware_version.as_deref(), Some("1.4.2"));

        let mut p = status();
        p[0] = 0x7E;
        p[1] = 0x01;
        p[2..5].copy_from_slice(&[2, 0, 9]);
        let state = decode(&p).unwrap();
        assert_eq!(state.model, Some(PanelModel::Amt8000));
        assert_eq!(state.firmware_version.as_deref(), Some("2.0.9"));
    }

    #[test]
    fn test_central_state_drives_partition_a() {
        let mut p = status();
        p[OFFSET_STATUS] = 0x60; // armed all
        let state = decode(&p).unwrap();
        let a = state.partition(PartitionId::A);
        assert!(a.armed_away);
        assert_eq!(a.enabled, Some(false));
        assert!(!state.partition(PartitionId::B).is_armed());

        p[OFFSET_STATUS] = 0x20; // partial
        let state = decode(&p).unwrap();
        assert!(state.partition(PartitionId::A).armed_stay);
    }

    #[test]
    fn test_enabled_partition_bits() {
        let mut p = status();
        p[OFFSET_PARTITIONS + 1] = PART_ENABLED | PART_ARMED | PART_STAY_ALT | PART_READY;
        p[OFFSET_PARTITIONS + 2] = PART_ENABLED | PART_ARMED | PART_ALARM_OCCURRED;
        let state = decode(&p).unwrap();

        let b = state.partition(PartitionId::B);
        assert!(b.armed_stay);
        assert_eq!(b.ready, Some(true));
        let c = state.partition(PartitionId::C);
        assert!(c.armed_away && c.triggered);
    }

    #[test]
    fn test_zones_and_unsupported_fields() {
        let mut p = status();
        p[OFFSET_ZONES_OPEN] = 0x01;
        p[OFFSET_ZONES_VIOLATED + 7] = 0x80;
        let state = decode(&p).unwrap();

        assert_eq!(state.zones.len(), 64);
        let z1 = state.zone(1).unwrap();
        assert!(z1.open && !z1.violated);
        assert_eq!(z1.tamper, None);
        assert_eq!(z1.low_battery, None);
        assert!(state.zone(64).unwrap().violated);
        assert!(state.pgms.iter().all(|pgm| pgm.active.is_none()));
        assert_eq!(state.system.ac_power_ok, None);
        assert_eq!(state.system.problem_active(ProblemFlags::SIREN_SHORT), None);
    }

    #[test]
    fn test_battery_and_tamper() {
        let mut p = status();
        p[OFFSET_BATTERY] = 2;
        p[OFFSET_TAMPER] = TAMPER_BIT;
        let state = decode(&p).unwrap();
        assert_eq!(state.system.battery_level_percent, Some(25));
        assert_eq!(state.system.battery_connected, Some(true));
        assert_eq!(state.system.problem_active(ProblemFlags::BATTERY_LOW), Some(true));
        assert_eq!(state.system.problem_active(ProblemFlags::BOX_TAMPER), Some(true));
        assert!(state.system.problem);

        p[OFFSET_BATTERY] = 1;
        let state = decode(&p).unwrap();
        assert_eq!(state.system.battery_connected, Some(false));

        p[OFFSET_BATTERY] = 0;
        let state = decode(&p).unwrap();
        assert_eq!(state.system.battery_level_percent, None);
    }
}
