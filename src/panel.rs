// MIT License - Copyright (c) 2026 Peter Wright
// Protocol engine facade

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConnectionMode, Credential, PanelConfig};
use crate::devices::PartitionId;
use crate::error::{AmtError, Result};
use crate::event::{event_channel, EventReceiver};
use crate::protocol::{Ack, Command};
use crate::state::PanelState;
use crate::transport::manager::{self, CurrentSession};
use crate::transport::session::{CloseReason, Response, Session, SessionState};
use crate::transport::Shared;

/// The public API for talking to an Intelbras AMT panel.
///
/// The engine owns the connection: in server mode it listens for the panel
/// to dial in, in client mode it dials the panel and reconnects on its own.
/// Status is only read when asked for; run [`AmtPanel::request_status`] on
/// an interval to keep [`AmtPanel::current_state`] fresh.
///
/// # Example
///
/// ```no_run
/// use intelbras_amt::{AmtPanel, ConnectionMode, PanelConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = PanelConfig::builder()
///         .mode(ConnectionMode::Client)
///         .panel_host("192.168.0.50")
///         .password("1234")
///         .build();
///
///     let panel = AmtPanel::start(config).await?;
///
///     let mut events = panel.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {:?}", event);
///         }
///     });
///
///     let state = panel.request_status().await?;
///     println!("Open zones: {:?}", state.open_zones());
///
///     panel.arm(None).await?;
///
///     tokio::signal::ctrl_c().await?;
///     panel.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct AmtPanel {
    shared: Arc<Shared>,
    current: CurrentSession,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Option<SocketAddr>,
}

impl AmtPanel {
    /// Start the engine.
    ///
    /// Server mode binds the listening socket before returning, so bind
    /// errors surface here. Client mode returns immediately and dials in
    /// the background.
    pub async fn start(config: PanelConfig) -> Result<Self> {
        config.credential()?;
        for code in config.partition_passwords.iter().flatten() {
            Credential::new(code.clone())?;
        }

        let (event_tx, _) = event_channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mode = config.mode;
        let addr = config.socket_addr();
        let shared = Shared::new(config, event_tx);
        let current: CurrentSession = Arc::new(RwLock::new(None));

        let (task, local_addr) = match mode {
            ConnectionMode::Server => {
                let listener = TcpListener::bind(&addr).await?;
                let local_addr = listener.local_addr()?;
                info!("Listening for the panel on {}", local_addr);
                let task = tokio::spawn(manager::run_server(
                    shared.clone(),
                    listener,
                    current.clone(),
                    shutdown_rx,
                ));
                (task, Some(local_addr))
            }
            ConnectionMode::Client => {
                let task = tokio::spawn(manager::run_client(shared.clone(), current.clone(), shutdown_rx));
                (task, None)
            }
        };

        Ok(Self {
            shared,
            current,
            shutdown_tx,
            task: Mutex::new(Some(task)),
            local_addr,
        })
    }

    /// Address the server-mode listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> &PanelConfig {
        &self.shared.config
    }

    /// Subscribe to panel events.
    pub fn subscribe(&self) -> EventReceiver {
        self.shared.event_tx.subscribe()
    }

    /// Latest snapshot. Never blocks on the network.
    pub fn current_state(&self) -> Arc<PanelState> {
        self.shared.current_state()
    }

    pub fn watch_state(&self) -> watch::Receiver<Arc<PanelState>> {
        self.shared.watch_state()
    }

    /// Call `f` with every new snapshot until the engine shuts down.
    pub fn on_state_changed<F>(&self, mut f: F) -> JoinHandle<()>
    where
        F: FnMut(Arc<PanelState>) + Send + 'static,
    {
        let mut rx = self.shared.watch_state();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = rx.borrow_and_update().clone();
                        f(state);
                    }
                    _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => break,
                }
            }
        })
    }

    pub fn session_state(&self) -> SessionState {
        self.shared.session_state()
    }

    pub fn watch_session_state(&self) -> watch::Receiver<SessionState> {
        self.shared.watch_session_state()
    }

    /// Whether a session is ready for commands.
    pub fn is_connected(&self) -> bool {
        self.session_state() == SessionState::Ready
    }

    async fn session(&self) -> Result<Arc<Session>> {
        match self.current.read().await.as_ref() {
            Some(session) if !session.is_closed() => Ok(session.clone()),
            _ => Err(AmtError::ConnectionLost),
        }
    }

    async fn send(&self, command: Command, credential: Credential) -> Result<Response> {
        command.validate(self.shared.config.protocol)?;
        if *self.shutdown_tx.borrow() {
            return Err(AmtError::Cancelled);
        }
        let session = self.session().await?;
        session.request(&command, &credential).await
    }

    async fn control(&self, command: Command, credential: Credential) -> Result<Ack> {
        let kind = command.kind();
        debug!("Sending {} to panel", kind.name());
        let response = self.send(command, credential).await?;
        Ok(Ack {
            command: kind,
            reply: response.raw,
        })
    }

    /// Ask the panel for a full status read and return the resulting
    /// snapshot.
    pub async fn request_status(&self) -> Result<Arc<PanelState>> {
        let credential = self.shared.config.credential()?;
        self.send(Command::Status, credential).await?;
        Ok(self.shared.current_state())
    }

    /// Arm away, all partitions.
    ///
    /// A state-changing command that ends in `Timeout` may still have been
    /// executed by the panel; call [`AmtPanel::request_status`] before
    /// retrying.
    pub async fn arm(&self, code: Option<&str>) -> Result<Ack> {
        let credential = self.shared.config.resolve_credential(code, None)?;
        self.control(Command::Arm { partition: None }, credential).await
    }

    pub async fn disarm(&self, code: Option<&str>) -> Result<Ack> {
        let credential = self.shared.config.resolve_credential(code, None)?;
        self.control(Command::Disarm { partition: None }, credential).await
    }

    /// Arm in stay (home) mode, optionally for one partition.
    pub async fn arm_stay(&self, code: Option<&str>, partition: Option<PartitionId>) -> Result<Ack> {
        let credential = self.shared.config.resolve_credential(code, partition)?;
        self.control(Command::Stay { partition }, credential).await
    }

    pub async fn arm_partition(&self, code: Option<&str>, partition: PartitionId) -> Result<Ack> {
        let credential = self.shared.config.resolve_credential(code, Some(partition))?;
        self.control(
            Command::Arm {
                partition: Some(partition),
            },
            credential,
        )
        .await
    }

    pub async fn disarm_partition(&self, code: Option<&str>, partition: PartitionId) -> Result<Ack> {
        let credential = self.shared.config.resolve_credential(code, Some(partition))?;
        self.control(
            Command::Disarm {
                partition: Some(partition),
            },
            credential,
        )
        .await
    }

    pub async fn set_siren(&self, on: bool) -> Result<Ack> {
        let credential = self.shared.config.credential()?;
        self.control(Command::Siren { on }, credential).await
    }

    /// Switch PGM output `index` (1..=19).
    pub async fn set_pgm(&self, index: u8, on: bool) -> Result<Ack> {
        let credential = self.shared.config.credential()?;
        self.control(Command::Pgm { index, on }, credential).await
    }

    /// Bypass each zone in turn. Returns the zones the panel accepted.
    ///
    /// Every zone is validated before the first command is sent. The first
    /// failure stops the loop and is returned.
    pub async fn bypass_zones(&self, code: Option<&str>, zones: &[u8]) -> Result<Vec<u8>> {
        let protocol = self.shared.config.protocol;
        for &zone in zones {
            Command::Bypass { zone }.validate(protocol)?;
        }
        let credential = self.shared.config.resolve_credential(code, None)?;

        let mut bypassed = Vec::with_capacity(zones.len());
        for &zone in zones {
            self.send(Command::Bypass { zone }, credential.clone()).await?;
            bypassed.push(zone);
        }
        Ok(bypassed)
    }

    /// Read status, then bypass every zone reported open.
    pub async fn bypass_open_zones(&self, code: Option<&str>) -> Result<Vec<u8>> {
        let state = self.request_status().await?;
        let open = state.open_zones();
        if open.is_empty() {
            debug!("No open zones to bypass");
            return Ok(open);
        }
        info!("Bypassing open zones {:?}", open);
        self.bypass_zones(code, &open).await
    }

    /// Send raw command bytes and return the reply frame as received.
    pub async fn send_raw(&self, bytes: &[u8], code: Option<&str>) -> Result<Vec<u8>> {
        let credential = self.shared.config.resolve_credential(code, None)?;
        let response = self
            .send(
                Command::Raw {
                    bytes: bytes.to_vec(),
                },
                credential,
            )
            .await?;
        Ok(response.raw)
    }

    /// Stop the engine: close the session, stop accepting or dialing, and
    /// cancel any pending request.
    pub async fn shutdown(&self) {
        info!("Shutting down panel engine");
        let _ = self.shutdown_tx.send(true);

        let session = self.current.write().await.take();
        if let Some(session) = session {
            session.say_goodbye().await;
            session.close(CloseReason::Shutdown).await;
        }

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Connection task ended abnormally: {}", e);
            }
        }
        self.shared.set_session_state(SessionState::Disconnected);
    }
}

impl Drop for AmtPanel {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}
