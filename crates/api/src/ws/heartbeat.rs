use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;

use crate::ws::heartbeat_payload;
use crate::ws::manager::WsManager;

/// Spawn a background task that sends periodic `heartbeat` messages to all
/// connected observers.
///
/// Observer clients treat a silent feed as dead after their heartbeat
/// timeout, so the interval here must stay comfortably below it. The
/// returned `JoinHandle` can be used to abort the task during shutdown.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        let payload = heartbeat_payload().to_string();

        loop {
            interval.tick().await;
            let count = ws_manager.connection_count().await;
            if count > 0 {
                tracing::debug!(count, "Feed heartbeat");
                ws_manager
                    .broadcast(Message::Text(payload.clone().into()))
                    .await;
            }
        }
    })
}
