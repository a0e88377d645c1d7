use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use ticker::irc::{Connection, ConnectionError, EventStream, Sender};
use ticker::stream::{PayloadStream, StreamConfig, Supervisor};
use ticker::ticker::{MarketMessage, PriceTracker};
use ticker::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("ticker: market feed relay");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("error loading config: {e}");
            return Err(e.into());
        }
    };

    let (conn, sender, events) = Connection::new(config.irc_server.clone(), config.identity());
    // Held in the queue until the server accepts registration.
    sender.join_channel(&config.irc_channel).await?;
    tokio::spawn(log_events(events));

    let (supervisor, payloads) = Supervisor::new(config.stream.clone(), StreamConfig::default());
    supervisor.spawn();

    let session = tokio::spawn(conn.run());

    tokio::select! {
        joined = session => {
            match joined? {
                Ok(()) => info!("irc: session ended"),
                Err(e) => {
                    error!("irc: session failed: {e}");
                    return Err(e.into());
                }
            }
        }
        relayed = relay(payloads, sender, config.irc_channel.clone()) => relayed?,
    }
    Ok(())
}

/// Log every event no auto-responder consumed.
async fn log_events(mut events: EventStream) {
    while let Some(event) = events.next().await {
        debug!(command = %event.command, source = ?event.source, "ev  {}", event.raw);
    }
}

/// Turn each push payload into a channel message.
async fn relay(
    mut payloads: PayloadStream,
    sender: Sender,
    channel: String,
) -> Result<(), ConnectionError> {
    let mut tracker = PriceTracker::new();
    while let Some(payload) = payloads.next().await {
        let msg = match MarketMessage::from_payload(&payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("error: {e} ({})", String::from_utf8_lossy(&payload));
                continue;
            }
        };
        debug!(id = msg.id, channel = %msg.channel, "stream: market message");

        if let Some(summary) = tracker.summary(&msg) {
            sender.send_message(&channel, &summary).await?;
        }
    }
    Ok(())
}
