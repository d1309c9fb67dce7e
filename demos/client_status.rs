//! Example: Dial an AMT-8000, read its status and print it.

use intelbras_amt::{AmtPanel, ConnectionMode, PanelConfig, PanelEvent, SessionState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = PanelConfig::builder()
        .mode(ConnectionMode::Client)
        .panel_host("192.168.0.50")
        .port(9009)
        .password("1234")
        .build();

    println!("Connecting to panel...");
    let panel = AmtPanel::start(config).await?;
    let mut session = panel.watch_session_state();
    session.wait_for(|s| *s == SessionState::Ready).await?;

    let state = panel.request_status().await?;

    if let Some(model) = state.model {
        println!("Model: {} (firmware {})", model, state.firmware_version.as_deref().unwrap_or("?"));
    }

    println!("\n--- Zones ({}) ---", state.zones.len());
    for zone in state.zones.iter().filter(|z| z.open || z.violated || z.bypassed) {
        println!(
            "  Zone {:2}: open={} violated={} bypassed={}",
            zone.id, zone.open, zone.violated, zone.bypassed
        );
    }

    println!("\n--- Partitions ---");
    for part in state.partitions.iter().filter(|p| p.enabled != Some(false)) {
        println!(
            "  Partition {}: away={} stay={} triggered={} ready={:?}",
            part.id, part.armed_away, part.armed_stay, part.triggered, part.ready
        );
    }

    println!("\n--- System ---");
    println!("  Siren: {}", state.system.siren_on);
    println!("  Battery: {:?}%", state.system.battery_level_percent);
    println!("  Problems: {:?}", state.system.problems);

    let mut events = panel.subscribe();
    println!("\nWatching for changes, polling every 10s (Ctrl+C to stop)...");
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(10));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = panel.request_status().await {
                    println!("Status poll failed: {}", e);
                }
            }
            event = events.recv() => match event {
                Ok(PanelEvent::StatusUpdated | PanelEvent::Heartbeat) => {}
                Ok(event) => println!("Event: {:?}", event),
                Err(e) => println!("Event channel error: {}", e),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    panel.shutdown().await;
    println!("Disconnected.");
    Ok(())
}
