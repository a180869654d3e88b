//! WebSocket egress (spec §4.5): `{type ∈ {sources, content, done, error}, ...}`.

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;

use super::StreamEvent;

/// Forward every broker event to `socket` as a JSON text frame, stopping on
/// the first send failure (client disconnected). Borrows the socket so the
/// caller can keep reading further inbound frames on the same connection.
pub async fn forward(socket: &mut WebSocket, mut rx: mpsc::Receiver<StreamEvent>) {
    while let Some(event) = rx.recv().await {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }
}
