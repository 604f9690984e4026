//! One downstream client connection.

use axum::extract::ws::{Message, WebSocket};
use feedy_ingestion::{ClientRegistration, Feed};
use feedy_telemetry::Metrics;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

/// Register the client, then forward queued messages to the socket until
/// either side goes away.
///
/// Inbound frames are read only to notice closes; their content is ignored.
pub(crate) async fn run(socket: WebSocket, feed: Feed, metrics: Metrics, wants_snapshot: bool) {
    // The feed never leaves the live phase, so this only fails on a
    // snapshot serialization error.
    let ClientRegistration { id, mut messages, .. } = match feed.register(wants_snapshot) {
        Ok(registration) => registration,
        Err(e) => {
            warn!(full = wants_snapshot, "Failed to register client: {}", e);
            return;
        }
    };
    info!(client = id, full = wants_snapshot, "Client connected");
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            outbound = messages.recv() => {
                // `None` means the feed already dropped this client.
                let Some(message) = outbound else { break };
                if let Err(e) = sink.send(Message::Text(message.to_string())).await {
                    warn!(client = id, "Send failed, dropping client: {}", e);
                    metrics.inc_client_send_failures();
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(client = id, "Client transport error: {}", e);
                    break;
                }
            },
        }
    }

    feed.deregister(id);
    info!(client = id, "Client disconnected");
}
