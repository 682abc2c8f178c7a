//! # Sync Transport
//!
//! The HTTP seam between the synchronizers and the cloud. The trait exists
//! so tests (and the desktop shell's diagnostics screen) can run the full
//! push/pull machinery against an in-process server; [`HttpTransport`] is
//! the production implementation on reqwest.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::protocol::{AuthRequest, AuthResponse, PullResponse, PushRequest, PushResponse};

/// Request timeout for every sync call. A stuck call blocks its synchronizer
/// invocation until this fires; there is no cancellation.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

// =============================================================================
// Transport contract
// =============================================================================

/// Transport over the three sync endpoints.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// `POST {server}/api/sync/auth`
    async fn authenticate(
        &self,
        server_url: &str,
        request: &AuthRequest,
    ) -> SyncResult<AuthResponse>;

    /// `GET {server}/api/sync[?lastSyncAt=...]` — `None` requests the full
    /// snapshot (first-sync path).
    async fn pull(
        &self,
        server_url: &str,
        token: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<PullResponse>;

    /// `POST {server}/api/sync`
    async fn push(
        &self,
        server_url: &str,
        token: &str,
        request: &PushRequest,
    ) -> SyncResult<PushResponse>;
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// reqwest-backed transport with bearer auth.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SyncError::Transient(e.to_string()))?;
        Ok(HttpTransport { client })
    }

    /// Reads the body as `T`, classifying HTTP-level failures first.
    async fn read_response<T>(&self, response: reqwest::Response) -> SyncResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| SyncError::Protocol(e.to_string()));
        }

        let message = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "sync request failed");
        Err(classify_status(status, message))
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn authenticate(
        &self,
        server_url: &str,
        request: &AuthRequest,
    ) -> SyncResult<AuthResponse> {
        let url = format!("{server_url}/api/sync/auth");
        debug!(%url, "authenticating with sync server");
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        self.read_response(response).await
    }

    async fn pull(
        &self,
        server_url: &str,
        token: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<PullResponse> {
        let url = format!("{server_url}/api/sync");
        let mut request = self.client.get(&url).bearer_auth(token);
        if let Some(since) = since {
            request = request.query(&[(
                "lastSyncAt",
                since.to_rfc3339_opts(SecondsFormat::Millis, true),
            )]);
        }
        debug!(%url, delta = since.is_some(), "pulling from sync server");
        let response = request.send().await.map_err(classify_reqwest_error)?;
        self.read_response(response).await
    }

    async fn push(
        &self,
        server_url: &str,
        token: &str,
        request: &PushRequest,
    ) -> SyncResult<PushResponse> {
        let url = format!("{server_url}/api/sync");
        debug!(%url, records = request.record_count(), "pushing to sync server");
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        self.read_response(response).await
    }
}

// =============================================================================
// Error classification
// =============================================================================

/// Network-level failures (DNS, refused, timeout) are all transient: retry
/// on the next trigger, nothing was mutated.
fn classify_reqwest_error(err: reqwest::Error) -> SyncError {
    SyncError::Transient(err.to_string())
}

/// HTTP status classification: auth statuses pause sync for
/// re-authentication, 5xx retries later, any other 4xx needs intervention.
fn classify_status(status: StatusCode, message: String) -> SyncError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return SyncError::Unauthenticated;
    }
    if status.is_server_error() {
        return SyncError::Transient(format!("HTTP {}: {message}", status.as_u16()));
    }
    SyncError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            SyncError::Unauthenticated
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, String::new()),
            SyncError::Unauthenticated
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            SyncError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()),
            SyncError::Rejected { status: 422, .. }
        ));
    }
}
