//! # Sync Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Server              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Unconfigured   │  │  Transient      │  │  Unauthenticated        │ │
//! │  │  InvalidUrl     │  │  (offline/5xx)  │  │  Rejected (other 4xx)   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐ │
//! │  │    Local        │  │  Protocol                                   │ │
//! │  │                 │  │                                             │ │
//! │  │  Database       │  │  Malformed response / record shape          │ │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Push failures never lose data: rows stay PENDING. Per-record pull
//! failures never abort the batch: they are logged and counted.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all replication failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration
    // =========================================================================
    /// No sync server configured; sync is simply off.
    #[error("no sync server configured")]
    Unconfigured,

    /// Server URL failed to parse.
    #[error("invalid sync server URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Authentication
    // =========================================================================
    /// No stored token, or the server rejected the token. Sync pauses until
    /// the operator re-authenticates.
    #[error("not authenticated with sync server")]
    Unauthenticated,

    /// Login attempt rejected (wrong credentials, disabled account).
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    // =========================================================================
    // Transport / Server
    // =========================================================================
    /// Offline, unreachable, timeout, or a 5xx. Retry later; no local state
    /// was mutated.
    #[error("sync server unreachable: {0}")]
    Transient(String),

    /// A non-auth 4xx. Not retryable without intervention; affected outbox
    /// rows stay PENDING so nothing is silently lost.
    #[error("sync request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not match the protocol shape.
    #[error("malformed sync response: {0}")]
    Protocol(String),

    // =========================================================================
    // Local
    // =========================================================================
    /// Local storage failure underneath the sync engine.
    #[error(transparent)]
    Database(#[from] apothek_db::DbError),

    /// Snapshot (de)serialization failure.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// True when a plain retry (next timer tick, next manual trigger) can
    /// succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transient(_) => true,
            SyncError::Database(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// True when the operator must re-authenticate before sync can resume.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, SyncError::Unauthenticated | SyncError::AuthRejected(_))
    }
}
