// MIT License - Copyright (c) 2026 Peter Wright
// TCP transport: sessions, reassembly and the connection manager

pub mod buffer;
pub(crate) mod manager;
pub mod session;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{ConnectionMode, PanelConfig};
use crate::event::{EventSender, PanelEvent};
use crate::state::PanelState;
use session::SessionState;

/// Reconnect delay for the given attempt (1-based): `base * 2^(attempt-1)`,
/// capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}

/// State shared between the engine facade, the manager and the sessions.
pub(crate) struct Shared {
    pub config: PanelConfig,
    pub event_tx: EventSender,
    state_tx: watch::Sender<Arc<PanelState>>,
    session_state_tx: watch::Sender<SessionState>,
    /// Id of the session the engine currently talks through
    active_session: AtomicU64,
    /// Bumped every time a session becomes ready
    ready_generation: AtomicU64,
    next_session_id: AtomicU64,
}

impl Shared {
    pub fn new(config: PanelConfig, event_tx: EventSender) -> Arc<Self> {
        let (state_tx, _) = watch::channel(Arc::new(PanelState::default()));
        let (session_state_tx, _) = watch::channel(SessionState::Disconnected);
        Arc::new(Self {
            config,
            event_tx,
            state_tx,
            session_state_tx,
            active_session: AtomicU64::new(0),
            ready_generation: AtomicU64::new(0),
            next_session_id: AtomicU64::new(1),
        })
    }

    pub fn emit(&self, event: PanelEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    pub fn current_state(&self) -> Arc<PanelState> {
        self.state_tx.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<Arc<PanelState>> {
        self.state_tx.subscribe()
    }

    pub fn session_state(&self) -> SessionState {
        *self.session_state_tx.borrow()
    }

    pub fn watch_session_state(&self) -> watch::Receiver<SessionState> {
        self.session_state_tx.subscribe()
    }

    pub fn allocate_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn activate_session(&self, id: u64) {
        self.active_session.store(id, Ordering::SeqCst);
    }

    pub fn is_active(&self, id: u64) -> bool {
        self.active_session.load(Ordering::SeqCst) == id
    }

    /// Engine-level session state, set by the manager between sessions and
    /// by the active session otherwise.
    pub fn set_session_state(&self, state: SessionState) {
        let changed = self.session_state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!("Session state -> {:?}", state);
            self.emit(PanelEvent::SessionStateChanged(state));
        }
    }

    /// Record that a session reached `Ready`.
    pub fn session_ready(&self, id: u64, peer: &str) {
        if !self.is_active(id) {
            return;
        }
        self.ready_generation.fetch_add(1, Ordering::SeqCst);
        self.set_session_state(SessionState::Ready);
        info!("Panel session ready ({})", peer);
        self.emit(PanelEvent::Connected { peer: peer.to_string() });
    }

    /// Publish a freshly decoded snapshot and the events it implies.
    pub fn publish_state(&self, mut state: PanelState) -> Arc<PanelState> {
        state.updated_at = Some(Utc::now());
        let new = Arc::new(state);
        let old = self.state_tx.send_replace(new.clone());
        let events = new.changes_since(&old);
        self.emit(PanelEvent::StatusUpdated);
        for event in events {
            self.emit(event);
        }
        new
    }

    fn mark_unavailable(&self) {
        let old = self.current_state();
        if !old.available {
            return;
        }
        let new = Arc::new(old.with_availability(false));
        self.state_tx.send_replace(new.clone());
        for event in new.changes_since(&old) {
            self.emit(event);
        }
    }

    /// Handle the end of a session: report it and mark the state
    /// unavailable, after the grace window if one is configured.
    pub fn session_closed(self: &Arc<Self>, id: u64, reason: &str) {
        if !self.is_active(id) {
            debug!("Replaced session {} closed: {}", id, reason);
            return;
        }
        // A server keeps accepting after losing its panel
        self.set_session_state(match self.config.mode {
            ConnectionMode::Server => SessionState::Listening,
            ConnectionMode::Client => SessionState::Disconnected,
        });
        self.emit(PanelEvent::Disconnected { reason: reason.to_string() });

        let grace = self.config.unavailable_grace();
        if grace.is_zero() {
            self.mark_unavailable();
            return;
        }
        let generation = self.ready_generation.load(Ordering::SeqCst);
        let shared = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if shared.ready_generation.load(Ordering::SeqCst) == generation {
                shared.mark_unavailable();
            }
        });
    }
}
