// MIT License - Copyright (c) 2026 Peter Wright
// One logical connection to one panel

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::config::{BusyPolicy, Credential, Protocol};
use crate::constants::auth_result_reason;
use crate::error::{AmtError, Result};
use crate::event::PanelEvent;
use crate::heartbeat::{self, IdleMonitor};
use crate::protocol::{Command, CommandKind, Inbound};
use crate::status;
use crate::transport::buffer::FrameBuffer;
use crate::transport::Shared;

/// Lifecycle of a session, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No link, and none being established
    Disconnected,
    /// Client mode: dialing the panel
    Connecting,
    /// Server mode: waiting for the panel to dial in
    Listening,
    /// Link up, not yet usable for commands
    Authenticating,
    Ready,
    /// Closing; pending work is being failed
    Draining,
}

/// Why a session ended.
#[derive(Debug, Clone)]
pub(crate) enum CloseReason {
    PeerClosed,
    ReadError(String),
    IdleTimeout,
    Replaced,
    SetupFailed(String),
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "connection closed by panel"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::Replaced => write!(f, "replaced by a new connection"),
            Self::SetupFailed(e) => write!(f, "session setup failed: {e}"),
            Self::Shutdown => write!(f, "engine shutdown"),
        }
    }
}

/// Reply delivered to a waiting request.
#[derive(Debug, Clone)]
pub(crate) struct Response {
    pub inbound: Inbound,
    /// The reply frame exactly as received
    pub raw: Vec<u8>,
}

struct PendingRequest {
    kind: CommandKind,
    /// ISECNet2 command word the reply may echo
    opcode: Option<u16>,
    submitted_at: Instant,
    reply_tx: oneshot::Sender<Result<Response>>,
}

/// Whether `inbound` completes a request of `kind`, and how.
fn match_reply(kind: CommandKind, opcode: Option<u16>, inbound: &Inbound) -> Option<Result<()>> {
    match (kind, inbound) {
        (_, Inbound::Heartbeat | Inbound::ConnectionInfo(_)) => None,
        (CommandKind::Raw, _) => Some(Ok(())),
        (CommandKind::Auth, Inbound::Nack(code)) => Some(Err(AmtError::AuthenticationFailed {
            reason: code.description().to_string(),
        })),
        (_, Inbound::Nack(code)) => Some(Err(AmtError::Nack(*code))),
        (_, Inbound::Busy) => Some(Err(AmtError::Busy)),
        (CommandKind::Auth, Inbound::AuthResult(0)) => Some(Ok(())),
        (CommandKind::Auth, Inbound::AuthResult(code)) => Some(Err(AmtError::AuthenticationFailed {
            reason: auth_result_reason(*code).to_string(),
        })),
        (CommandKind::Status, Inbound::Status(_)) => Some(Ok(())),
        // ISECNet2 may ack a status request before sending the payload
        (CommandKind::Status, Inbound::Ack) => None,
        (_, Inbound::Ack) => Some(Ok(())),
        (_, Inbound::Reply { command, .. }) if opcode == Some(*command) => Some(Ok(())),
        _ => None,
    }
}

/// A live connection to the panel.
///
/// Sessions are never reused: every accepted or dialed socket gets a fresh
/// session with an empty receive buffer.
pub(crate) struct Session {
    id: u64,
    peer: String,
    protocol: Protocol,
    shared: Arc<Shared>,
    state_tx: watch::Sender<SessionState>,
    closed_tx: watch::Sender<bool>,
    writer: Mutex<OwnedWriteHalf>,
    /// At most one request awaiting its reply
    pending: Mutex<Option<PendingRequest>>,
    /// Serializes request/reply exchanges
    gate: Mutex<()>,
    /// Access code the ISECNet2 session authenticated with
    credential: Mutex<Option<Credential>>,
}

impl Session {
    /// Wrap a connected socket and start its reader task.
    pub(crate) fn start(stream: TcpStream, shared: Arc<Shared>) -> Arc<Self> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (reader, writer) = stream.into_split();

        let id = shared.allocate_session_id();
        shared.activate_session(id);
        shared.set_session_state(SessionState::Authenticating);

        let (state_tx, _) = watch::channel(SessionState::Authenticating);
        let (closed_tx, _) = watch::channel(false);
        let session = Arc::new(Self {
            id,
            peer,
            protocol: shared.config.protocol,
            shared,
            state_tx,
            closed_tx,
            writer: Mutex::new(writer),
            pending: Mutex::new(None),
            gate: Mutex::new(()),
            credential: Mutex::new(None),
        });

        debug!("Session {} started with {}", session.id, session.peer);
        tokio::spawn(session.clone().read_loop(reader));
        session
    }

    pub(crate) fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Wait until the session has been closed.
    pub(crate) async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
        if self.shared.is_active(self.id) {
            self.shared.set_session_state(state);
        }
    }

    /// Mark the session usable for commands.
    pub(crate) fn mark_ready(&self) {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == SessionState::Authenticating {
                *state = SessionState::Ready;
                true
            } else {
                false
            }
        });
        if changed {
            self.shared.session_ready(self.id, &self.peer);
        }
    }

    /// Run the ISECNet2 login and mark the session ready.
    pub(crate) async fn authenticate(&self, credential: &Credential) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.authenticate_locked(credential).await?;
        self.mark_ready();
        Ok(())
    }

    async fn authenticate_locked(&self, credential: &Credential) -> Result<()> {
        debug!("Authenticating session {}", self.id);
        self.exchange(&Command::Auth, credential).await?;
        *self.credential.lock().await = Some(credential.clone());
        Ok(())
    }

    /// Send a command and wait for the reply that completes it.
    pub(crate) async fn request(&self, command: &Command, credential: &Credential) -> Result<Response> {
        let _gate = match self.shared.config.busy_policy {
            BusyPolicy::Reject => self.gate.try_lock().map_err(|_| AmtError::Busy)?,
            BusyPolicy::Queue => self.gate.lock().await,
        };
        if self.state() != SessionState::Ready {
            return Err(AmtError::ConnectionLost);
        }

        // ISECNet2 authenticates per access code
        if self.protocol == Protocol::IsecNet2 && command.kind() != CommandKind::Auth {
            let current = self.credential.lock().await.clone();
            if current.as_ref() != Some(credential) {
                self.authenticate_locked(credential).await?;
            }
        }

        self.exchange(command, credential).await
    }

    async fn exchange(&self, command: &Command, credential: &Credential) -> Result<Response> {
        let kind = command.kind();
        let bytes = command.encode(self.protocol, credential)?;
        let opcode = match self.protocol {
            Protocol::IsecNet2 => Some(u16::from_be_bytes([bytes[6], bytes[7]])),
            Protocol::Legacy => None,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.is_some() {
                return Err(AmtError::Busy);
            }
            *pending = Some(PendingRequest {
                kind,
                opcode,
                submitted_at: Instant::now(),
                reply_tx,
            });
        }

        debug!("Sending {} command ({} bytes)", kind.name(), bytes.len());
        if let Err(e) = self.write_frame(&bytes).await {
            self.pending.lock().await.take();
            return Err(e);
        }

        let command_timeout = self.shared.config.command_timeout();
        match timeout(command_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AmtError::ConnectionLost),
            Err(_) => {
                self.pending.lock().await.take();
                if kind.is_state_changing() {
                    warn!(
                        "No reply to {} within {:?}; the panel may still have applied it, check its status before retrying",
                        kind.name(),
                        command_timeout
                    );
                } else {
                    warn!("No reply to {} within {:?}", kind.name(), command_timeout);
                }
                Err(AmtError::Timeout {
                    command: kind.name().to_string(),
                })
            }
        }
    }

    /// Write one complete frame under the writer lock.
    pub(crate) async fn write_frame(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(AmtError::ConnectionLost);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await.map_err(|e| {
            error!("Failed to write to panel: {}", e);
            AmtError::Io(e)
        })
    }

    /// Send the ISECNet2 goodbye without waiting for a reply.
    pub(crate) async fn say_goodbye(&self) {
        if self.protocol != Protocol::IsecNet2 {
            return;
        }
        let Some(credential) = self.credential.lock().await.clone() else {
            return;
        };
        if let Ok(bytes) = Command::Bye.encode(self.protocol, &credential) {
            if let Err(e) = self.write_frame(&bytes).await {
                debug!("Goodbye not delivered: {}", e);
            }
        }
    }

    /// Close the session. Idempotent.
    pub(crate) async fn close(&self, reason: CloseReason) {
        let first = self.closed_tx.send_if_modified(|closed| !std::mem::replace(closed, true));
        if !first {
            return;
        }
        self.set_state(SessionState::Draining);
        match reason {
            CloseReason::Shutdown | CloseReason::Replaced => info!("Session {} closed: {}", self.id, reason),
            _ => warn!("Session {} closed: {}", self.id, reason),
        }

        if let Some(request) = self.pending.lock().await.take() {
            let err = match reason {
                CloseReason::Shutdown => AmtError::Cancelled,
                _ => AmtError::ConnectionLost,
            };
            let _ = request.reply_tx.send(Err(err));
        }

        // A writer stuck on a full socket is released when the session drops
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }

        self.state_tx.send_replace(SessionState::Disconnected);
        self.shared.session_closed(self.id, &reason.to_string());
    }

    async fn read_loop(self: Arc<Self>, mut reader: OwnedReadHalf) {
        let config = &self.shared.config;
        let mut buffer = FrameBuffer::new(self.protocol, config.frame_timeout());
        let mut idle = IdleMonitor::new(config.idle_timeout(), Instant::now());
        let mut closed_rx = self.closed_tx.subscribe();
        let mut chunk = vec![0u8; 4096];

        let reason = loop {
            let frame_deadline = buffer.deadline();
            let idle_deadline = idle.deadline();

            tokio::select! {
                _ = async { let _ = closed_rx.wait_for(|closed| *closed).await; } => return,
                read = reader.read(&mut chunk) => match read {
                    Ok(0) => break CloseReason::PeerClosed,
                    Ok(n) => {
                        let now = Instant::now();
                        trace!("Received {} bytes: {:02X?}", n, &chunk[..n]);
                        idle.touch(now);
                        buffer.extend(&chunk[..n], now);
                        self.drain(&mut buffer, now).await;
                    }
                    Err(e) => break CloseReason::ReadError(e.to_string()),
                },
                _ = sleep_until(frame_deadline.unwrap_or_else(Instant::now)), if frame_deadline.is_some() => {
                    self.drain(&mut buffer, Instant::now()).await;
                }
                _ = sleep_until(idle_deadline.unwrap_or_else(Instant::now)), if idle_deadline.is_some() => {
                    break CloseReason::IdleTimeout;
                }
            }
        };

        if buffer.discarded() > 0 {
            debug!("Session {} discarded {} bytes while resyncing", self.id, buffer.discarded());
        }
        self.close(reason).await;
    }

    async fn drain(&self, buffer: &mut FrameBuffer, now: Instant) {
        while let Some(decoded) = buffer.next_frame(now) {
            let inbound = Inbound::classify(&decoded);
            self.handle_inbound(inbound, decoded.raw().to_vec()).await;
        }
    }

    async fn handle_inbound(&self, inbound: Inbound, raw: Vec<u8>) {
        // Legacy panels have no login; any valid frame proves the link
        if self.protocol == Protocol::Legacy {
            self.mark_ready();
        }

        if let Some(reply) = heartbeat::immediate_reply(self.protocol, &inbound) {
            if let Err(e) = self.write_frame(&reply).await {
                warn!("Failed to acknowledge panel: {}", e);
            }
        }

        let mut status_error = None;
        match &inbound {
            Inbound::Heartbeat => {
                trace!("Heartbeat from panel");
                self.shared.emit(PanelEvent::Heartbeat);
                return;
            }
            Inbound::ConnectionInfo(body) => {
                info!("Panel connection info: {:02X?}", body);
                return;
            }
            Inbound::Status(payload) => match status::decode_status(self.protocol, payload) {
                Ok(state) => {
                    self.shared.publish_state(state);
                }
                Err(e) => {
                    warn!("Discarding status payload: {}", e);
                    status_error = Some(e);
                }
            },
            _ => {}
        }

        if !self.resolve(&inbound, &raw, status_error).await {
            match inbound {
                Inbound::Unknown(_) | Inbound::Reply { .. } => {
                    debug!("Unsolicited frame: {:02X?}", raw);
                    self.shared.emit(PanelEvent::UnknownFrame(raw));
                }
                other => debug!("Unsolicited {:?}", other),
            }
        }
    }

    /// Complete the pending request if `inbound` answers it.
    async fn resolve(&self, inbound: &Inbound, raw: &[u8], status_error: Option<AmtError>) -> bool {
        let mut pending = self.pending.lock().await;
        let Some(outcome) = pending
            .as_ref()
            .and_then(|request| match_reply(request.kind, request.opcode, inbound))
        else {
            return false;
        };
        let Some(request) = pending.take() else {
            return false;
        };

        let result = match (outcome, status_error) {
            (Ok(()), Some(e)) if request.kind == CommandKind::Status => Err(e),
            (Ok(()), _) => Ok(Response {
                inbound: inbound.clone(),
                raw: raw.to_vec(),
            }),
            (Err(e), _) => Err(e),
        };
        debug!(
            "{} completed in {:?}: {}",
            request.kind.name(),
            request.submitted_at.elapsed(),
            if result.is_ok() { "ok" } else { "failed" }
        );
        let _ = request.reply_tx.send(result);
        true
    }
}
