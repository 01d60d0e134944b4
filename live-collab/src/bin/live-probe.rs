//! Joins a live room and logs everything that happens in it.
//!
//! ```text
//! LIVE_SOCKET_URL=ws://localhost:4000/socket LIVE_TOKEN=... live-probe <room-id>
//! ```

use live_collab::{LiveConfig, LiveEvent, LiveTransport, WsChannel};

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut config = LiveConfig::default();
    if let Ok(url) = std::env::var("LIVE_SOCKET_URL") {
        config.socket_url = url;
    }
    let token = std::env::var("LIVE_TOKEN").unwrap_or_default();
    let Some(room_id) = std::env::args().nth(1) else {
        log::error!("usage: live-probe <room-id>");
        std::process::exit(2);
    };

    log::info!("Starting live probe for room {room_id}...");

    let (channel, mut inbound) = match WsChannel::connect(&config, &token).await {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let mut transport = LiveTransport::new(config);
    let Some(mut events) = transport.take_event_rx() else {
        return;
    };
    transport.connect(channel);
    if let Err(e) = transport.join(&room_id) {
        log::error!("join failed: {e}");
        std::process::exit(1);
    }

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = transport.handle_frame(&frame) {
                    log::warn!("{e}");
                }
            }
            Some(event) = events.recv() => {
                match &event {
                    LiveEvent::ApplyOperation { module_id, operation } => {
                        log::info!("{module_id}: {}", operation.to_json());
                    }
                    LiveEvent::ConnectionLoss => {
                        log::warn!("connection lost");
                        break;
                    }
                    other => log::info!("{other:?}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    transport.disconnect();
}
