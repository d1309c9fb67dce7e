// MIT License - Copyright (c) 2026 Peter Wright
// Connection manager: accept loop for server mode, dial loop for client mode

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::Protocol;
use crate::error::{AmtError, Result};
use crate::event::PanelEvent;
use crate::transport::session::{CloseReason, Session, SessionState};
use crate::transport::{backoff_delay, Shared};

/// The session commands are currently routed to.
pub(crate) type CurrentSession = Arc<RwLock<Option<Arc<Session>>>>;

async fn wait_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Sleep for `delay`. Returns false if shutdown cut it short.
async fn pause(delay: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = wait_shutdown(shutdown_rx) => false,
        _ = sleep(delay) => true,
    }
}

/// Swap in `session` as the current one, closing whatever it replaces.
///
/// Returns false and closes `session` when shutdown has already begun.
/// Shutdown raises its flag before it takes the current session.
async fn install(current: &CurrentSession, session: Arc<Session>, shutdown_rx: &watch::Receiver<bool>) -> bool {
    let previous = {
        let mut slot = current.write().await;
        if *shutdown_rx.borrow() {
            None
        } else {
            Some(slot.replace(session.clone()))
        }
    };
    match previous {
        None => {
            debug!("Dropping session from {} opened during shutdown", session.peer());
            session.close(CloseReason::Shutdown).await;
            false
        }
        Some(Some(previous)) => {
            previous.close(CloseReason::Replaced).await;
            true
        }
        Some(None) => true,
    }
}

/// Bring a fresh session to `Ready`.
async fn establish(shared: &Shared, session: &Session) -> Result<()> {
    match shared.config.protocol {
        Protocol::Legacy => {
            session.mark_ready();
            Ok(())
        }
        Protocol::IsecNet2 => {
            let credential = shared.config.credential()?;
            session.authenticate(&credential).await
        }
    }
}

async fn fail_setup(shared: &Shared, session: &Session, err: AmtError) {
    error!("Session setup with {} failed: {}", session.peer(), err);
    if let AmtError::AuthenticationFailed { reason } = &err {
        shared.emit(PanelEvent::AuthenticationFailed { reason: reason.clone() });
    }
    session.close(CloseReason::SetupFailed(err.to_string())).await;
}

/// Accept panel connections until shutdown. A newer connection always
/// replaces the current one.
pub(crate) async fn run_server(
    shared: Arc<Shared>,
    listener: TcpListener,
    current: CurrentSession,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    shared.set_session_state(SessionState::Listening);
    match listener.local_addr() {
        Ok(addr) => info!("Waiting for the panel on {}", addr),
        Err(_) => info!("Waiting for the panel"),
    }

    loop {
        let accepted = tokio::select! {
            _ = wait_shutdown(&mut shutdown_rx) => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, addr) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Accept failed: {}", e);
                if !pause(shared.config.reconnect_delay(), &mut shutdown_rx).await {
                    break;
                }
                continue;
            }
        };
        info!("Panel connected from {}", addr);

        let session = Session::start(stream, shared.clone());
        if !install(&current, session.clone(), &shutdown_rx).await {
            break;
        }

        if shared.config.protocol == Protocol::IsecNet2 {
            let shared = shared.clone();
            tokio::spawn(async move {
                if let Err(e) = establish(&shared, &session).await {
                    fail_setup(&shared, &session, e).await;
                }
            });
        }
    }

    debug!("Accept loop stopped");
}

/// Dial the panel, keep the session alive and reconnect with exponential
/// backoff until shutdown.
pub(crate) async fn run_client(
    shared: Arc<Shared>,
    current: CurrentSession,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let addr = shared.config.socket_addr();
    let mut attempt: u32 = 0;

    loop {
        shared.set_session_state(SessionState::Connecting);
        info!("Connecting to panel at {}", addr);

        let connected = tokio::select! {
            _ = wait_shutdown(&mut shutdown_rx) => break,
            connected = timeout(shared.config.connect_timeout(), TcpStream::connect(&addr)) => connected,
        };

        match connected {
            Ok(Ok(stream)) => {
                let session = Session::start(stream, shared.clone());
                if !install(&current, session.clone(), &shutdown_rx).await {
                    break;
                }

                let established = tokio::select! {
                    _ = wait_shutdown(&mut shutdown_rx) => break,
                    established = establish(&shared, &session) => established,
                };
                match established {
                    Ok(()) => {
                        attempt = 0;
                        tokio::select! {
                            _ = wait_shutdown(&mut shutdown_rx) => break,
                            _ = session.closed() => {}
                        }
                    }
                    Err(e) => fail_setup(&shared, &session, e).await,
                }
            }
            Ok(Err(e)) => warn!("Connection to {} failed: {}", addr, e),
            Err(_) => warn!("Connection to {} timed out", addr),
        }

        attempt = attempt.saturating_add(1);
        let delay = backoff_delay(
            shared.config.reconnect_delay(),
            shared.config.max_reconnect_delay(),
            attempt,
        );
        shared.set_session_state(SessionState::Disconnected);
        info!("Reconnecting in {:.1}s (attempt {})", delay.as_secs_f64(), attempt);
        shared.emit(PanelEvent::ReconnectScheduled { attempt, delay });

        if !pause(delay, &mut shutdown_rx).await {
            break;
        }
    }

    debug!("Dial loop stopped");
}
