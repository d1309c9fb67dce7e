// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use intelbras_amt::{
    AmtError, AmtPanel, BusyPolicy, ConnectionMode, PanelConfig, PanelEvent, PanelState, PartitionId,
    PartitionStatusFlags, ProblemFlags, Protocol, ZoneStatusFlags,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "amt2mqtt")]
#[command(about = "Bridge between an Intelbras AMT alarm panel and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    panel: PanelToml,
    mqtt: MqttToml,
    #[serde(default, deserialize_with = "deserialize_zone_names")]
    zone_names: HashMap<u8, String>,
}

fn deserialize_zone_names<'de, D>(deserializer: D) -> Result<HashMap<u8, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let string_map: HashMap<String, String> = HashMap::deserialize(deserializer)?;
    string_map
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u8>()
                .map(|id| (id, v))
                .map_err(|_| serde::de::Error::custom(format!("invalid zone ID: {k}")))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct PanelToml {
    /// "server" (panel dials in) or "client" (bridge dials the panel)
    #[serde(default = "default_mode")]
    mode: String,
    /// "legacy" or "isecnet2"; defaults to the mode's usual protocol
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    host: String,
    #[serde(default = "default_listen_host")]
    listen_host: String,
    #[serde(default = "default_port")]
    port: u16,
    password: String,
    #[serde(default)]
    partition_passwords: HashMap<String, String>,
    #[serde(default = "default_command_timeout")]
    command_timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_max_reconnect_delay")]
    max_reconnect_delay_ms: u64,
    #[serde(default = "default_frame_timeout")]
    frame_timeout_ms: u64,
    #[serde(default)]
    idle_timeout_ms: Option<u64>,
    #[serde(default)]
    unavailable_grace_ms: u64,
    #[serde(default)]
    queue_commands: bool,
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
}

fn default_mode() -> String {
    "server".to_string()
}
fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    intelbras_amt::constants::DEFAULT_PORT
}
fn default_command_timeout() -> u64 {
    8000
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_reconnect_delay() -> u64 {
    1000
}
fn default_max_reconnect_delay() -> u64 {
    60000
}
fn default_frame_timeout() -> u64 {
    2000
}
fn default_poll_interval() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
}

fn default_client_id() -> String {
    "amt-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "amt/cmd".to_string()
}
fn default_publish_topic() -> String {
    "amt".to_string()
}

fn parse_mode(s: &str) -> Result<ConnectionMode> {
    match s.to_lowercase().as_str() {
        "server" => Ok(ConnectionMode::Server),
        "client" => Ok(ConnectionMode::Client),
        other => anyhow::bail!("Unknown connection mode: {other}"),
    }
}

fn parse_protocol(s: &str) -> Result<Protocol> {
    match s.to_lowercase().as_str() {
        "legacy" | "amt" => Ok(Protocol::Legacy),
        "isecnet2" | "isecnet" | "amt8000" => Ok(Protocol::IsecNet2),
        other => anyhow::bail!("Unknown protocol: {other}"),
    }
}

fn build_panel_config(toml: &PanelToml) -> Result<PanelConfig> {
    let mode = parse_mode(&toml.mode)?;
    if mode == ConnectionMode::Client && toml.host.is_empty() {
        anyhow::bail!("panel.host is required in client mode");
    }

    let mut builder = PanelConfig::builder()
        .mode(mode)
        .panel_host(&toml.host)
        .listen_host(&toml.listen_host)
        .port(toml.port)
        .password(&toml.password)
        .command_timeout_ms(toml.command_timeout_ms)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .reconnect_delay_ms(toml.reconnect_delay_ms)
        .max_reconnect_delay_ms(toml.max_reconnect_delay_ms)
        .frame_timeout_ms(toml.frame_timeout_ms)
        .idle_timeout_ms(toml.idle_timeout_ms)
        .unavailable_grace_ms(toml.unavailable_grace_ms)
        .busy_policy(if toml.queue_commands {
            BusyPolicy::Queue
        } else {
            BusyPolicy::Reject
        });
    if let Some(protocol) = &toml.protocol {
        builder = builder.protocol(parse_protocol(protocol)?);
    }
    for (partition, code) in &toml.partition_passwords {
        let partition: PartitionId = partition
            .parse()
            .with_context(|| format!("Invalid partition in partition_passwords: {partition}"))?;
        builder = builder.partition_password(partition, code);
    }
    Ok(builder.build())
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages share a flat {now, op, ...} structure

#[derive(Serialize)]
struct MqttSnapshot {
    now: u64,
    op: String,
    state: MqttSnapshotState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MqttSnapshotState {
    available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    panel_clock: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    siren: bool,
    ac_power: Option<bool>,
    battery_connected: Option<bool>,
    battery_percent: Option<u8>,
    problems: Vec<&'static str>,
    parts: Vec<MqttPartitionState>,
    zones: Vec<MqttZoneState>,
    pgms: Vec<MqttPgmState>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MqttZoneState {
    id: u8,
    name: String,
    open: bool,
    violated: bool,
    bypass: bool,
    tamper: Option<bool>,
    short_circuit: Option<bool>,
    low_battery: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MqttPartitionState {
    id: String,
    arm_away: bool,
    home_stay: bool,
    triggered: bool,
    alarm_memory: bool,
    ready: Option<bool>,
    enabled: Option<bool>,
}

#[derive(Serialize)]
struct MqttPgmState {
    id: u8,
    on: Option<bool>,
}

// Device events: {now, op, <device>, eventStr}
#[derive(Serialize)]
struct MqttZoneEvent {
    now: u64,
    op: String,
    zone: u8,
    #[serde(rename = "eventStr")]
    event_str: String,
}

#[derive(Serialize)]
struct MqttPartitionEvent {
    now: u64,
    op: String,
    partition: String,
    #[serde(rename = "eventStr")]
    event_str: String,
}

#[derive(Serialize)]
struct MqttSystemEvent {
    now: u64,
    op: String,
    #[serde(rename = "eventStr")]
    event_str: String,
}

#[derive(Serialize)]
struct MqttPgmEvent {
    now: u64,
    op: String,
    pgm: u8,
    #[serde(rename = "eventStr")]
    event_str: String,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

// Simple event with just {now, op}
#[derive(Serialize)]
struct MqttSimpleEvent {
    now: u64,
    op: String,
}

// Inbound command (subscribed)
#[derive(Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    #[allow(dead_code)]
    op_id: Option<String>,
    /// Partition letter or number
    #[serde(default)]
    partition: Option<serde_json::Value>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    pgm: Option<u8>,
    #[serde(default)]
    zones: Option<Vec<u8>>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn zone_label(zone_id: u8, overrides: &HashMap<u8, String>) -> String {
    overrides
        .get(&zone_id)
        .cloned()
        .unwrap_or_else(|| format!("Zone {zone_id}"))
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    outcome: std::result::Result<Option<serde_json::Value>, String>,
    src: Option<serde_json::Value>,
) {
    let (success, data, error) = match outcome {
        Ok(data) => (true, data, None),
        Err(e) => (false, None, Some(e)),
    };
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        error,
        src,
        data,
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_simple_event(client: &AsyncClient, topic: &str, op: &str) {
    let msg = MqttSimpleEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

fn build_snapshot(state: &PanelState, zone_names: &HashMap<u8, String>) -> MqttSnapshot {
    let system = &state.system;
    let problems = ProblemFlags::set_event_names(system.problems, system.problems);

    let zones = state
        .zones
        .iter()
        .map(|z| MqttZoneState {
            id: z.id,
            name: zone_label(z.id, zone_names),
            open: z.open,
            violated: z.violated,
            bypass: z.bypassed,
            tamper: z.tamper,
            short_circuit: z.short_circuit,
            low_battery: z.low_battery,
        })
        .collect();

    let parts = state
        .partitions
        .iter()
        .filter(|p| p.enabled != Some(false))
        .map(|p| MqttPartitionState {
            id: p.id.to_string(),
            arm_away: p.armed_away,
            home_stay: p.armed_stay,
            triggered: p.triggered,
            alarm_memory: p.alarm_memory,
            ready: p.ready,
            enabled: p.enabled,
        })
        .collect();

    let pgms = state
        .pgms
        .iter()
        .map(|p| MqttPgmState { id: p.id, on: p.active })
        .collect();

    MqttSnapshot {
        now: now_epoch_ms(),
        op: "SNAPSHOT".to_string(),
        state: MqttSnapshotState {
            available: state.available,
            model: state.model.map(|m| m.name()),
            firmware: state.firmware_version.clone(),
            panel_clock: state.panel_clock.map(|c| c.format("%Y-%m-%d %H:%M").to_string()),
            updated_at: state.updated_at,
            siren: system.siren_on,
            ac_power: system.ac_power_ok,
            battery_connected: system.battery_connected,
            battery_percent: system.battery_level_percent,
            problems,
            parts,
            zones,
            pgms,
        },
    }
}

async fn publish_snapshot(
    client: &AsyncClient,
    topic: &str,
    panel: &AmtPanel,
    zone_names: &HashMap<u8, String>,
) {
    let snapshot = build_snapshot(&panel.current_state(), zone_names);
    publish_json(client, topic, &snapshot, true).await;
}

// ---------------------------------------------------------------------------
// Panel event → MQTT
// ---------------------------------------------------------------------------

async fn handle_panel_event(
    event: PanelEvent,
    client: &AsyncClient,
    topic: &str,
    panel: &AmtPanel,
    zone_names: &HashMap<u8, String>,
) {
    match event {
        PanelEvent::ZoneStatusChanged {
            zone_id,
            new_status,
            changed,
            ..
        } => {
            info!("{} status changed", zone_label(zone_id, zone_names));
            let names = ZoneStatusFlags::set_event_names(changed, new_status)
                .into_iter()
                .chain(ZoneStatusFlags::unset_event_names(changed, new_status));
            for name in names {
                let msg = MqttZoneEvent {
                    now: now_epoch_ms(),
                    op: "ZONE_EVENT".to_string(),
                    zone: zone_id,
                    event_str: name.to_string(),
                };
                publish_json(client, topic, &msg, false).await;
            }
        }
        PanelEvent::PartitionStatusChanged {
            partition_id,
            new_status,
            changed,
            ..
        } => {
            info!("Partition {partition_id} status changed");
            let names = PartitionStatusFlags::set_event_names(changed, new_status)
                .into_iter()
                .chain(PartitionStatusFlags::unset_event_names(changed, new_status));
            for name in names {
                let msg = MqttPartitionEvent {
                    now: now_epoch_ms(),
                    op: "PART_EVENT".to_string(),
                    partition: partition_id.to_string(),
                    event_str: name.to_string(),
                };
                publish_json(client, topic, &msg, false).await;
            }
        }
        PanelEvent::SystemStatusChanged {
            new_status,
            changed,
            ..
        } => {
            let names = ProblemFlags::set_event_names(changed, new_status)
                .into_iter()
                .chain(ProblemFlags::unset_event_names(changed, new_status));
            for name in names {
                let msg = MqttSystemEvent {
                    now: now_epoch_ms(),
                    op: "SYSTEM_EVENT".to_string(),
                    event_str: name.to_string(),
                };
                publish_json(client, topic, &msg, false).await;
            }
        }
        PanelEvent::PgmStatusChanged { pgm_id, event } => {
            let msg = MqttPgmEvent {
                now: now_epoch_ms(),
                op: "PGM_EVENT".to_string(),
                pgm: pgm_id,
                event_str: event.name().to_string(),
            };
            publish_json(client, topic, &msg, false).await;
        }
        PanelEvent::SirenChanged { on } => {
            publish_simple_event(client, topic, if on { "SIREN_ON" } else { "SIREN_OFF" }).await;
        }
        PanelEvent::AvailabilityChanged { available } => {
            if available {
                info!("Panel status available");
            } else {
                warn!("Panel status unavailable");
            }
            publish_snapshot(client, topic, panel, zone_names).await;
        }
        PanelEvent::Connected { peer } => {
            info!("Panel connected ({peer})");
            publish_simple_event(client, topic, "PANEL_CONNECTED").await;
        }
        PanelEvent::Disconnected { reason } => {
            warn!("Panel disconnected: {reason}");
            publish_simple_event(client, topic, "PANEL_DISCONNECTED").await;
        }
        PanelEvent::AuthenticationFailed { reason } => {
            error!("Panel rejected the access code: {reason}");
            publish_simple_event(client, topic, "AUTH_FAILED").await;
        }
        PanelEvent::ReconnectScheduled { attempt, delay } => {
            debug!("Reconnect attempt {attempt} in {delay:?}");
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

/// Execute a panel command future and log the result.
async fn exec_panel_cmd<T>(
    op: &str,
    label: &str,
    fut: impl std::future::Future<Output = intelbras_amt::Result<T>>,
) -> std::result::Result<T, String> {
    match fut.await {
        Ok(value) => {
            info!("{op} {label}: success");
            Ok(value)
        }
        Err(AmtError::Nack(code)) => {
            warn!("{op} {label}: panel refused ({code})");
            Err(code.to_string())
        }
        Err(e) => {
            error!("{op} {label} failed: {e}");
            Err(e.to_string())
        }
    }
}

fn parse_partition(value: &Option<serde_json::Value>) -> std::result::Result<Option<PartitionId>, String> {
    let text = match value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => return Err(format!("invalid partition: {other}")),
    };
    text.parse::<PartitionId>().map(Some).map_err(|e| e.to_string())
}

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    panel: &AmtPanel,
    zone_names: &HashMap<u8, String>,
) {
    // Parse the raw payload as a JSON value for the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();
    let partition = match parse_partition(&cmd.partition) {
        Ok(p) => p,
        Err(e) => {
            warn!("{}: {e}", cmd.op);
            publish_cmd_ack(client, topic, Err(e), src_json).await;
            return;
        }
    };
    let code = cmd.code.as_deref();
    let label = partition.map_or_else(|| "all partitions".to_string(), |p| format!("partition {p}"));

    let outcome = match cmd.op.as_str() {
        "SNAPSHOT" => {
            debug!("Command: SNAPSHOT");
            let snapshot = build_snapshot(&panel.current_state(), zone_names);
            let snapshot_value = serde_json::to_value(&snapshot).ok();
            publish_json(client, topic, &snapshot, true).await;
            Ok(snapshot_value)
        }
        "PING" => {
            info!("Command: PING");
            Ok(None)
        }
        "STATUS" => exec_panel_cmd("STATUS", "panel", panel.request_status())
            .await
            .map(|state| serde_json::to_value(build_snapshot(&state, zone_names)).ok()),
        "ARM_AWAY" => {
            let result = match partition {
                Some(p) => exec_panel_cmd("ARM_AWAY", &label, panel.arm_partition(code, p)).await,
                None => exec_panel_cmd("ARM_AWAY", &label, panel.arm(code)).await,
            };
            result.map(|_| None)
        }
        "ARM_HOME_STAY" => exec_panel_cmd("ARM_HOME_STAY", &label, panel.arm_stay(code, partition))
            .await
            .map(|_| None),
        "DISARM" => {
            let result = match partition {
                Some(p) => exec_panel_cmd("DISARM", &label, panel.disarm_partition(code, p)).await,
                None => exec_panel_cmd("DISARM", &label, panel.disarm(code)).await,
            };
            result.map(|_| None)
        }
        "SIREN_ON" | "SIREN_OFF" => {
            let on = cmd.op == "SIREN_ON";
            exec_panel_cmd(&cmd.op, "siren", panel.set_siren(on)).await.map(|_| None)
        }
        "PGM_ON" | "PGM_OFF" => match cmd.pgm {
            Some(index) => {
                let on = cmd.op == "PGM_ON";
                let label = format!("pgm {index}");
                exec_panel_cmd(&cmd.op, &label, panel.set_pgm(index, on)).await.map(|_| None)
            }
            None => Err("missing pgm".to_string()),
        },
        "BYPASS_ZONES" => match &cmd.zones {
            Some(zones) => {
                let label = format!("zones {zones:?}");
                exec_panel_cmd("BYPASS_ZONES", &label, panel.bypass_zones(code, zones))
                    .await
                    .map(|bypassed| Some(serde_json::json!({ "bypassed": bypassed })))
            }
            None => Err("missing zones".to_string()),
        },
        "BYPASS_OPEN_ZONES" => exec_panel_cmd("BYPASS_OPEN_ZONES", "open zones", panel.bypass_open_zones(code))
            .await
            .map(|bypassed| Some(serde_json::json!({ "bypassed": bypassed }))),
        other => {
            warn!("Unknown command: {other}");
            Err(format!("unknown command: {other}"))
        }
    };

    publish_cmd_ack(client, topic, outcome, src_json).await;
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=intelbras_amt=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let mut panel_config = build_panel_config(&config.panel)?;
    let mut poll_interval_secs = config.panel.poll_interval_secs.max(1);
    let mut mqtt_client_id = config.mqtt.client_id;
    let mut publish_topic = config.mqtt.publish_topic;
    let mut subscribe_topic = config.mqtt.subscribe_topic;
    let mut zone_names = Arc::new(config.zone_names);
    let (mut mqtt_host, mut mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let panel = Arc::new(
            AmtPanel::start(panel_config.clone())
                .await
                .context("Failed to start panel engine")?,
        );
        match (panel_config.mode, panel.local_addr()) {
            (ConnectionMode::Server, Some(addr)) => info!("Waiting for the panel to connect on {addr}"),
            _ => info!("Connecting to the panel at {}", panel_config.socket_addr()),
        }

        let mut mqtt_opts = MqttOptions::new(&mqtt_client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        // Task 1: Panel event listener
        let panel_events = Arc::clone(&panel);
        let client_events = client.clone();
        let topic_events = publish_topic.clone();
        let zn_events = Arc::clone(&zone_names);
        let mut event_rx = panel.subscribe();
        let event_handle = tokio::spawn(async move {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        handle_panel_event(event, &client_events, &topic_events, &panel_events, &zn_events)
                            .await;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 2: MQTT event loop (receives messages, handles commands)
        let panel_cmds = Arc::clone(&panel);
        let client_cmds = client.clone();
        let topic_cmds = publish_topic.clone();
        let zn_cmds = Arc::clone(&zone_names);
        let sub_topic = subscribe_topic.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe after a broker reconnect
                        info!("MQTT: connected, subscribing to {sub_topic}");
                        if let Err(e) = client_cmds.subscribe(&sub_topic, QoS::AtLeastOnce).await {
                            error!("Failed to subscribe to {sub_topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic != sub_topic {
                            continue;
                        }
                        let payload = String::from_utf8_lossy(&msg.payload);
                        match serde_json::from_str::<MqttCommand>(&payload) {
                            Ok(cmd) => {
                                if cmd.op == "SNAPSHOT" {
                                    debug!("MQTT command received: {payload}");
                                } else {
                                    info!("MQTT command received: {payload}");
                                }
                                // Commands may wait on the panel; keep polling MQTT meanwhile
                                let panel = Arc::clone(&panel_cmds);
                                let client = client_cmds.clone();
                                let topic = topic_cmds.clone();
                                let zone_names = Arc::clone(&zn_cmds);
                                let payload = payload.into_owned();
                                tokio::spawn(async move {
                                    handle_command(&payload, cmd, &client, &topic, &panel, &zone_names).await;
                                });
                            }
                            Err(e) => {
                                warn!("Failed to parse MQTT command: {e}");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Task 3: Status poller; the engine never polls on its own
        let panel_poll = Arc::clone(&panel);
        let client_poll = client.clone();
        let topic_poll = publish_topic.clone();
        let zn_poll = Arc::clone(&zone_names);
        let poll_handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(poll_interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !panel_poll.is_connected() {
                    debug!("Panel not connected, skipping status poll");
                    continue;
                }
                match panel_poll.request_status().await {
                    Ok(state) => {
                        let snapshot = build_snapshot(&state, &zn_poll);
                        publish_json(&client_poll, &topic_poll, &snapshot, true).await;
                    }
                    Err(AmtError::Busy) => debug!("Status poll skipped, panel busy"),
                    Err(e) => warn!("Status poll failed: {e}"),
                }
            }
        });

        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        poll_handle.abort();
        mqtt_handle.abort();
        panel.shutdown().await;
        event_handle.abort();

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure
        info!("Reloading config from {}", cli.config);
        match load_config(&cli.config) {
            Ok(new_config) => match build_panel_config(&new_config.panel) {
                Ok(new_panel_config) => match parse_mqtt_url(&new_config.mqtt.url) {
                    Ok((new_host, new_port)) => {
                        panel_config = new_panel_config;
                        poll_interval_secs = new_config.panel.poll_interval_secs.max(1);
                        mqtt_host = new_host;
                        mqtt_port = new_port;
                        mqtt_client_id = new_config.mqtt.client_id;
                        publish_topic = new_config.mqtt.publish_topic;
                        subscribe_topic = new_config.mqtt.subscribe_topic;
                        zone_names = Arc::new(new_config.zone_names);
                        info!("Config reloaded successfully");
                    }
                    Err(e) => warn!("Invalid MQTT URL in new config, keeping previous: {e}"),
                },
                Err(e) => warn!("Invalid panel config in new config, keeping previous: {e}"),
            },
            Err(e) => warn!("Failed to reload config, keeping previous: {e}"),
        }

        info!("Restarting...");
    }

    info!("Shutdown complete");
    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);
    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;
    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel_toml(extra: &str) -> PanelToml {
        let text = format!("password = \"1234\"\n{extra}");
        toml::from_str(&text).expect("valid panel table")
    }

    #[test]
    fn test_parse_mqtt_url() {
        assert_eq!(parse_mqtt_url("mqtt://broker:1883").unwrap(), ("broker".to_string(), 1883));
        assert_eq!(parse_mqtt_url("tcp://10.0.0.2:1884").unwrap(), ("10.0.0.2".to_string(), 1884));
        assert!(parse_mqtt_url("mqtt://broker").is_err());
    }

    #[test]
    fn test_panel_defaults() {
        let config = build_panel_config(&panel_toml("")).unwrap();
        assert_eq!(config.mode, ConnectionMode::Server);
        assert_eq!(config.protocol, Protocol::Legacy);
        assert_eq!(config.port, 9009);
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
    }

    #[test]
    fn test_client_mode_needs_host() {
        assert!(build_panel_config(&panel_toml("mode = \"client\"")).is_err());
        let config = build_panel_config(&panel_toml("mode = \"client\"\nhost = \"10.0.0.9\"")).unwrap();
        assert_eq!(config.protocol, Protocol::IsecNet2);
        assert_eq!(config.socket_addr(), "10.0.0.9:9009");
    }

    #[test]
    fn test_partition_passwords() {
        let toml = panel_toml("[partition_passwords]\nB = \"5555\"\n3 = \"6666\"");
        let config = build_panel_config(&toml).unwrap();
        assert_eq!(config.partition_passwords[1].as_deref(), Some("5555"));
        assert_eq!(config.partition_passwords[2].as_deref(), Some("6666"));
        assert!(build_panel_config(&panel_toml("[partition_passwords]\nE = \"1\"")).is_err());
    }

    #[test]
    fn test_parse_partition() {
        assert_eq!(parse_partition(&None).unwrap(), None);
        assert_eq!(parse_partition(&Some(serde_json::json!(2))).unwrap(), Some(PartitionId::B));
        assert_eq!(parse_partition(&Some(serde_json::json!("c"))).unwrap(), Some(PartitionId::C));
        assert!(parse_partition(&Some(serde_json::json!(true))).is_err());
    }

    #[test]
    fn test_snapshot_hides_disabled_partitions() {
        let mut state = PanelState::default();
        state.partitions[3].enabled = Some(false);
        let snapshot = build_snapshot(&state, &HashMap::new());
        let ids: Vec<_> = snapshot.state.parts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }
}
