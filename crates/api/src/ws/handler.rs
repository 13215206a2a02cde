use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use vigil_core::types::DbId;

use crate::state::AppState;
use crate::ws::manager::WsManager;
use crate::ws::connected_payload;

/// HTTP handler that upgrades `GET /scans/{id}/feed` to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` under
/// the requested job id and managed by two tasks (sender + receiver).
pub async fn feed_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<DbId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, job_id))
}

/// Manage a single observer feed connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Sends the `connected` handshake acknowledgement.
///   3. Spawns a sender task that forwards messages from the manager channel.
///   4. Drains inbound frames on the current task (the feed is one-way; only
///      Close matters).
///   5. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, job_id: DbId) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, job_id, "Observer feed connected");

    // Register and get the receiver for outbound messages.
    let mut rx = ws_manager.add(conn_id.clone(), job_id).await;

    let (mut sink, mut stream) = socket.split();

    // Handshake acknowledgement before any progress flows.
    if sink
        .send(Message::Text(connected_payload().to_string().into()))
        .await
        .is_err()
    {
        ws_manager.remove(&conn_id).await;
        return;
    }

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "Feed sink closed");
                break;
            }
        }
    });

    // Receiver loop: the feed is one-way, so inbound frames are drained and
    // only Close ends the session.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_msg) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "Feed receive error");
                break;
            }
        }
    }

    // Clean up: remove connection and abort sender task.
    ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, job_id, "Observer feed disconnected");
}
