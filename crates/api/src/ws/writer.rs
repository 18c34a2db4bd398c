use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, stream::SplitSink};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use winechat_translation::{ServerEvent, UserId};

/// Drains a connection's outbound queue into its socket. Each event is
/// serialized here, once per recipient socket; the queue itself holds shared
/// payloads. Ends when every sender is gone or the socket rejects a write.
pub async fn run(
    user_id: UserId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<ServerEvent>>,
) {
    while let Some(event) = outbound.recv().await {
        let text = match serde_json::to_string(event.as_ref()) {
            Ok(t) => t,
            Err(e) => {
                warn!(%user_id, %e, "Failed to serialize outbound event");
                continue;
            }
        };
        if let Err(e) = sink.send(Message::text(text)).await {
            debug!(%user_id, %e, "Socket closed while writing");
            break;
        }
    }
    let _ = sink.close().await;
    debug!(%user_id, "Writer finished");
}
