//! REST API client for the scan engine's HTTP endpoints.
//!
//! Wraps the engine's HTTP API (scan submission, cancellation, report
//! retrieval) using [`reqwest`].

use serde::Deserialize;
use vigil_core::types::DbId;

/// HTTP client for one scan engine.
pub struct ScanEngineApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the engine's `/scans` endpoint after successfully
/// queuing a scan.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Engine-assigned identifier for the queued scan.
    pub scan_id: String,
    /// Position in the engine's execution queue.
    pub queue_position: i32,
}

/// Errors from the engine REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ScanEngineApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Scan engine API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ScanEngineApi {
    /// Create a new API client for a scan engine.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://engine:8080`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Submit an image for scanning.
    ///
    /// Sends a `POST /scans` request carrying the canonical image reference
    /// and the platform job id for correlation. Returns the engine-assigned
    /// `scan_id` and queue position.
    pub async fn submit_scan(
        &self,
        image_ref: &str,
        job_id: DbId,
        client_id: &str,
    ) -> Result<SubmitResponse, ScanEngineApiError> {
        let body = serde_json::json!({
            "image": image_ref,
            "request_id": job_id,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/scans", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Cancel a queued or running scan.
    ///
    /// Sends a `DELETE /scans/{scan_id}` request.
    pub async fn cancel_scan(&self, scan_id: &str) -> Result<(), ScanEngineApiError> {
        let response = self
            .client
            .delete(format!("{}/scans/{}", self.api_url, scan_id))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Retrieve the full findings report for a finished scan.
    ///
    /// Sends a `GET /scans/{scan_id}/report` request. The returned JSON
    /// contains per-advisory details beyond the summary broadcast.
    pub async fn get_report(
        &self,
        scan_id: &str,
    ) -> Result<serde_json::Value, ScanEngineApiError> {
        let response = self
            .client
            .get(format!("{}/scans/{}/report", self.api_url, scan_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or [`ScanEngineApiError::ApiError`] containing
    /// the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ScanEngineApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ScanEngineApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ScanEngineApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ScanEngineApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
