// Loopback tests for server mode with the legacy protocol
//
// The test plays the panel: it dials the engine's listener and answers the
// frames the engine writes.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use intelbras_amt::frame::encode_body;
use intelbras_amt::{
    AmtError, AmtPanel, ConnectionMode, NackCode, PanelConfig, PanelEvent, PanelState, PartitionId, SessionState,
};

const WAIT: Duration = Duration::from_secs(5);

fn server_config() -> PanelConfig {
    PanelConfig::builder()
        .mode(ConnectionMode::Server)
        .listen_host("127.0.0.1")
        .port(0)
        .password("1234")
        .command_timeout_ms(300)
        .build()
}

async fn start() -> AmtPanel {
    AmtPanel::start(server_config()).await.expect("engine starts")
}

/// Dial the engine and send a heartbeat so the session becomes ready.
async fn connect_panel(panel: &AmtPanel) -> TcpStream {
    let addr = panel.local_addr().expect("server mode binds");
    let mut stream = TcpStream::connect(addr).await.expect("connect to engine");
    stream.write_all(&encode_body(&[0xF7])).await.unwrap();
    assert_eq!(read_frame(&mut stream).await, vec![0x01, 0xFE, 0x00]);
    wait_ready(panel).await;
    stream
}

async fn wait_ready(panel: &AmtPanel) {
    let mut rx = panel.watch_session_state();
    timeout(WAIT, rx.wait_for(|s| *s == SessionState::Ready))
        .await
        .expect("session ready in time")
        .expect("engine alive");
}

/// Read one legacy frame and return it whole.
async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len = [0u8; 1];
    timeout(WAIT, stream.read_exact(&mut len)).await.expect("frame in time").unwrap();
    let mut rest = vec![0u8; len[0] as usize + 1];
    stream.read_exact(&mut rest).await.unwrap();
    let mut frame = len.to_vec();
    frame.extend(rest);
    frame
}

/// Body of a command frame sent with code "1234".
fn command_body(command: &[u8]) -> Vec<u8> {
    let mut body = vec![0xE9, 0x21, b'1', b'2', b'3', b'4'];
    body.extend_from_slice(command);
    body.push(0x21);
    body
}

fn body_of(frame: &[u8]) -> &[u8] {
    &frame[1..frame.len() - 1]
}

/// Status body with zones 1 and 3 open and partition A armed.
fn status_body() -> Vec<u8> {
    let mut body = vec![0u8; 54];
    body[2] = 0b0000_0101;
    body[26] = 0x39; // AMT 2018
    body[28] = 0x01;
    body[36] = 0x05;
    body[41] = 80;
    body
}

#[tokio::test]
async fn test_heartbeat_is_acknowledged() {
    let panel = start().await;
    let mut events = panel.subscribe();
    let mut stream = connect_panel(&panel).await;
    assert!(panel.is_connected());

    stream.write_all(&encode_body(&[0xF7])).await.unwrap();
    assert_eq!(read_frame(&mut stream).await, vec![0x01, 0xFE, 0x00]);

    let mut heartbeats = 0;
    while heartbeats < 2 {
        match timeout(WAIT, events.recv()).await.expect("event in time").unwrap() {
            PanelEvent::Heartbeat => heartbeats += 1,
            _ => {}
        }
    }
    panel.shutdown().await;
}

#[tokio::test]
async fn test_bare_heartbeat_is_acknowledged() {
    let panel = start().await;
    let addr = panel.local_addr().unwrap();
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Keepalives arrive as a single unframed 0xF7
    stream.write_all(&[0xF7]).await.unwrap();
    assert_eq!(read_frame(&mut stream).await, vec![0x01, 0xFE, 0x00]);
    wait_ready(&panel).await;

    stream.write_all(&[0xF7, 0xF7]).await.unwrap();
    assert_eq!(read_frame(&mut stream).await, vec![0x01, 0xFE, 0x00]);
    assert_eq!(read_frame(&mut stream).await, vec![0x01, 0xFE, 0x00]);
    assert!(panel.is_connected());
    panel.shutdown().await;
}

#[tokio::test]
async fn test_connection_info_is_acknowledged() {
    let panel = start().await;
    let addr = panel.local_addr().unwrap();
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&encode_body(&[0x94, 0x12, 0x34])).await.unwrap();
    assert_eq!(read_frame(&mut stream).await, vec![0x01, 0xFE, 0x00]);
    wait_ready(&panel).await;
    panel.shutdown().await;
}

#[tokio::test]
async fn test_request_status() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let request = tokio::spawn({
        let panel = panel.clone();
        async move { panel.request_status().await }
    });

    let frame = read_frame(&mut stream).await;
    assert_eq!(body_of(&frame), command_body(&[0x5B]).as_slice());
    stream.write_all(&encode_body(&status_body())).await.unwrap();

    let state = request.await.unwrap().expect("status decoded");
    assert!(state.available);
    assert_eq!(state.open_zones(), vec![1, 3]);
    assert_eq!(state.zones.len(), 18);
    assert!(state.partition(PartitionId::A).armed_away);
    assert_eq!(state.system.battery_level_percent, Some(80));
    assert_eq!(panel.current_state().open_zones(), vec![1, 3]);
    panel.shutdown().await;
}

#[tokio::test]
async fn test_arm_ack_and_nack() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let arm = tokio::spawn({
        let panel = panel.clone();
        async move { panel.arm_partition(None, PartitionId::B).await }
    });
    let frame = read_frame(&mut stream).await;
    assert_eq!(body_of(&frame), command_body(&[0x41, 0x42]).as_slice());
    stream.write_all(&encode_body(&[0xFE])).await.unwrap();
    let ack = arm.await.unwrap().expect("armed");
    assert_eq!(ack.reply, vec![0x01, 0xFE, 0x00]);

    let arm = tokio::spawn({
        let panel = panel.clone();
        async move { panel.arm(Some("9876")).await }
    });
    let frame = read_frame(&mut stream).await;
    assert_eq!(&body_of(&frame)[2..6], b"9876");
    stream.write_all(&encode_body(&[0xE4])).await.unwrap();
    match arm.await.unwrap() {
        Err(AmtError::Nack(NackCode::ZonesOpen)) => {}
        other => panic!("expected zones-open NACK, got {other:?}"),
    }
    panel.shutdown().await;
}

#[tokio::test]
async fn test_timeout_keeps_session() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let siren = tokio::spawn({
        let panel = panel.clone();
        async move { panel.set_siren(true).await }
    });
    read_frame(&mut stream).await;
    match siren.await.unwrap() {
        Err(AmtError::Timeout { command }) => assert_eq!(command, "siren"),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(panel.is_connected());

    let disarm = tokio::spawn({
        let panel = panel.clone();
        async move { panel.disarm(None).await }
    });
    let frame = read_frame(&mut stream).await;
    assert_eq!(body_of(&frame), command_body(&[0x44]).as_slice());
    stream.write_all(&encode_body(&[0xFE])).await.unwrap();
    assert!(disarm.await.unwrap().is_ok());
    panel.shutdown().await;
}

/// Turn the siren on, then read back a status that reports it sounding.
async fn siren_on_and_refresh(panel: &Arc<AmtPanel>, stream: &mut TcpStream) -> PanelState {
    let siren = tokio::spawn({
        let panel = panel.clone();
        async move { panel.set_siren(true).await }
    });
    let frame = read_frame(stream).await;
    assert_eq!(body_of(&frame), command_body(&[0x43]).as_slice());
    stream.write_all(&encode_body(&[0xFE])).await.unwrap();
    siren.await.unwrap().expect("siren acknowledged");

    let status = tokio::spawn({
        let panel = panel.clone();
        async move { panel.request_status().await }
    });
    let frame = read_frame(stream).await;
    assert_eq!(body_of(&frame), command_body(&[0x5B]).as_slice());
    let mut body = status_body();
    body[46] |= 0x01;
    stream.write_all(&encode_body(&body)).await.unwrap();

    let mut state = (*status.await.unwrap().expect("status decoded")).clone();
    state.updated_at = None;
    state
}

#[tokio::test]
async fn test_siren_on_twice_matches_once() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let once = siren_on_and_refresh(&panel, &mut stream).await;
    assert!(once.system.siren_on);
    assert!(once.partitions.iter().all(|p| p.triggered));

    let twice = siren_on_and_refresh(&panel, &mut stream).await;
    assert_eq!(once, twice);
    panel.shutdown().await;
}

#[tokio::test]
async fn test_busy_rejects_second_command() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let first = tokio::spawn({
        let panel = panel.clone();
        async move { panel.set_pgm(3, true).await }
    });
    let frame = read_frame(&mut stream).await;
    assert_eq!(body_of(&frame), command_body(&[0x50, 0x4C, b'3']).as_slice());

    assert!(matches!(panel.set_siren(false).await, Err(AmtError::Busy)));

    stream.write_all(&encode_body(&[0xFE])).await.unwrap();
    assert!(first.await.unwrap().is_ok());
    panel.shutdown().await;
}

#[tokio::test]
async fn test_new_connection_replaces_previous() {
    let panel = Arc::new(start().await);
    let mut first = connect_panel(&panel).await;
    let mut second = connect_panel(&panel).await;

    let mut buf = [0u8; 8];
    let n = timeout(WAIT, first.read(&mut buf)).await.expect("old session closed").unwrap_or(0);
    assert_eq!(n, 0);

    let request = tokio::spawn({
        let panel = panel.clone();
        async move { panel.request_status().await }
    });
    read_frame(&mut second).await;
    second.write_all(&encode_body(&status_body())).await.unwrap();
    assert!(request.await.unwrap().is_ok());
    assert!(panel.is_connected());
    panel.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_marks_unavailable() {
    let panel = Arc::new(start().await);
    let mut events = panel.subscribe();
    let mut stream = connect_panel(&panel).await;

    let request = tokio::spawn({
        let panel = panel.clone();
        async move { panel.request_status().await }
    });
    read_frame(&mut stream).await;
    stream.write_all(&encode_body(&status_body())).await.unwrap();
    assert!(request.await.unwrap().unwrap().available);

    drop(stream);
    loop {
        match timeout(WAIT, events.recv()).await.expect("event in time").unwrap() {
            PanelEvent::AvailabilityChanged { available: false } => break,
            _ => {}
        }
    }
    assert!(!panel.current_state().available);
    assert_eq!(panel.session_state(), SessionState::Listening);
    assert!(matches!(panel.request_status().await, Err(AmtError::ConnectionLost)));
    panel.shutdown().await;
}

#[tokio::test]
async fn test_pending_request_fails_when_panel_drops() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let arm = tokio::spawn({
        let panel = panel.clone();
        async move { panel.arm(None).await }
    });
    read_frame(&mut stream).await;
    drop(stream);
    assert!(matches!(arm.await.unwrap(), Err(AmtError::ConnectionLost)));
    panel.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_cancels_pending_request() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let arm = tokio::spawn({
        let panel = panel.clone();
        async move { panel.arm(None).await }
    });
    read_frame(&mut stream).await;
    panel.shutdown().await;
    assert!(matches!(arm.await.unwrap(), Err(AmtError::Cancelled)));
    assert_eq!(panel.session_state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_validation_precedes_connection() {
    let panel = start().await;
    assert!(matches!(panel.set_pgm(20, true).await, Err(AmtError::InvalidArgument { .. })));
    assert!(matches!(panel.bypass_zones(None, &[0]).await, Err(AmtError::InvalidArgument { .. })));
    assert!(matches!(panel.send_raw(&[], None).await, Err(AmtError::InvalidArgument { .. })));
    assert!(matches!(panel.request_status().await, Err(AmtError::ConnectionLost)));
    panel.shutdown().await;
}

#[tokio::test]
async fn test_bypass_open_zones() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let bypass = tokio::spawn({
        let panel = panel.clone();
        async move { panel.bypass_open_zones(None).await }
    });

    read_frame(&mut stream).await;
    stream.write_all(&encode_body(&status_body())).await.unwrap();

    // Zone 1 then zone 3, zero-based on the wire
    for expected in [b"00", b"02"] {
        let frame = read_frame(&mut stream).await;
        let mut command = vec![0x42];
        command.extend_from_slice(expected);
        assert_eq!(body_of(&frame), command_body(&command).as_slice());
        stream.write_all(&encode_body(&[0xFE])).await.unwrap();
    }
    assert_eq!(bypass.await.unwrap().unwrap(), vec![1, 3]);
    panel.shutdown().await;
}

#[tokio::test]
async fn test_garbage_before_frame_is_skipped() {
    let panel = Arc::new(start().await);
    let mut stream = connect_panel(&panel).await;

    let raw = tokio::spawn({
        let panel = panel.clone();
        async move { panel.send_raw(&[0x5A], None).await }
    });
    let frame = read_frame(&mut stream).await;
    assert_eq!(body_of(&frame), command_body(&[0x5A]).as_slice());

    let mut reply = vec![0x03, 0x99, 0x42];
    reply.extend(encode_body(&[0xFE]));
    stream.write_all(&reply).await.unwrap();
    assert_eq!(raw.await.unwrap().unwrap(), vec![0x01, 0xFE, 0x00]);
    panel.shutdown().await;
}
