//! WebSocket client for the scan engine's event stream.
//!
//! [`ScanEngineClient`] holds the connection configuration for the engine.
//! Call [`ScanEngineClient::connect`] to establish a live
//! [`ScanEngineConnection`] over WebSocket.

use tokio_tungstenite::{connect_async, MaybeTlsStream};

/// Configuration handle for the scan engine's WebSocket endpoint.
pub struct ScanEngineClient {
    ws_url: String,
}

/// A live WebSocket connection to the scan engine.
pub struct ScanEngineConnection {
    /// Unique client ID sent during the WebSocket handshake.
    pub client_id: String,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ScanEngineClient {
    /// Create a new client targeting the engine's WebSocket base URL.
    ///
    /// * `ws_url` - e.g. `ws://engine:8080`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    /// WebSocket base URL (e.g. `ws://engine:8080`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to the engine's WebSocket endpoint.
    ///
    /// Generates a unique `client_id` (UUID v4) and appends it as a query
    /// parameter so the engine can address messages back to this specific
    /// client.
    pub async fn connect(&self) -> Result<ScanEngineConnection, ScanEngineClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ScanEngineClientError::Connection(format!(
                "Failed to connect to scan engine at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to scan engine at {}",
            self.ws_url,
        );

        Ok(ScanEngineConnection {
            client_id,
            ws_stream,
        })
    }
}

/// Errors that can occur when working with the engine WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ScanEngineClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an already-established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
