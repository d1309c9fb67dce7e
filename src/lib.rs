// MIT License - Copyright (c) 2026 Peter Wright
//
//! # intelbras-amt
//!
//! Protocol engine for Intelbras AMT alarm panels over TCP/IP: the legacy
//! ASCII protocol of the AMT 4010 / 2018 / 1016 family and the ISECNet2
//! protocol of the AMT-8000.
//!
//! The engine keeps one session with the panel, either listening for the
//! panel to dial in (server mode) or dialing it (client mode), decodes the
//! panel's status reply into an immutable [`PanelState`] snapshot and sends
//! arm, disarm, siren, PGM and bypass commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use intelbras_amt::{AmtPanel, ConnectionMode, PanelConfig, PartitionId};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PanelConfig::builder()
//!         .mode(ConnectionMode::Server)
//!         .port(9009)
//!         .password("1234")
//!         .build();
//!
//!     let panel = AmtPanel::start(config).await?;
//!
//!     let mut events = panel.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     panel.arm_partition(None, PartitionId::A).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     panel.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod constants;
pub mod devices;
pub mod error;
pub mod event;
pub mod frame;
pub mod heartbeat;
pub mod isecnet;
pub mod panel;
pub mod protocol;
pub mod state;
pub mod status;
pub mod transport;

// Re-exports for convenience
pub use config::{BusyPolicy, ConnectionMode, Credential, PanelConfig, PanelConfigBuilder, PanelModel, Protocol};
pub use devices::partition::{Partition, PartitionId, PartitionStatusFlags};
pub use devices::pgm::{Pgm, PgmEvent};
pub use devices::system::{ProblemFlags, SystemStatus};
pub use devices::zone::{Zone, ZoneStatusFlags};
pub use error::{AmtError, NackCode, Result};
pub use event::{EventReceiver, PanelEvent};
pub use panel::AmtPanel;
pub use protocol::{Ack, Command, CommandKind};
pub use state::PanelState;
pub use transport::backoff_delay;
pub use transport::session::SessionState;
