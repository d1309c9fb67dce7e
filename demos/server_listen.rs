//! Example: Wait for a legacy AMT panel to dial in and print zone and
//! partition changes.

use intelbras_amt::{AmtPanel, ConnectionMode, PanelConfig, PanelEvent, PartitionStatusFlags, ZoneStatusFlags};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PanelConfig::builder()
        .mode(ConnectionMode::Server)
        .port(9009)
        .password("1234")
        .build();

    let panel = AmtPanel::start(config).await?;
    if let Some(addr) = panel.local_addr() {
        println!("Waiting for the panel on {} (Ctrl+C to stop)...\n", addr);
    }

    let mut events = panel.subscribe();
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if panel.is_connected() {
                    if let Err(e) = panel.request_status().await {
                        println!("Status poll failed: {}", e);
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(PanelEvent::ZoneStatusChanged { zone_id, new_status, changed, .. }) => {
                        println!("Zone {} status changed:", zone_id);
                        for e in ZoneStatusFlags::set_event_names(changed, new_status) {
                            println!("  + {}", e);
                        }
                        for e in ZoneStatusFlags::unset_event_names(changed, new_status) {
                            println!("  - {}", e);
                        }
                    }
                    Ok(PanelEvent::PartitionStatusChanged { partition_id, new_status, changed, .. }) => {
                        println!("Partition {} status changed:", partition_id);
                        for e in PartitionStatusFlags::set_event_names(changed, new_status) {
                            println!("  + {}", e);
                        }
                        for e in PartitionStatusFlags::unset_event_names(changed, new_status) {
                            println!("  - {}", e);
                        }
                    }
                    Ok(PanelEvent::Connected { peer }) => println!("Panel connected from {}", peer),
                    Ok(PanelEvent::Disconnected { reason }) => println!("Panel disconnected: {}", reason),
                    Ok(PanelEvent::Heartbeat | PanelEvent::StatusUpdated) => {}
                    Ok(event) => println!("Event: {:?}", event),
                    Err(e) => {
                        println!("Event channel error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\nShutting down...");
                break;
            }
        }
    }

    panel.shutdown().await;
    Ok(())
}
