//! # Sync Agent
//!
//! The orchestrator the shell talks to: connectivity/auth status, pending
//! counts, manual push-then-pull, credential handling.
//!
//! ## Mutual Exclusion
//! The whole sync cycle runs under a real `tokio::sync::Mutex` (not an
//! advisory flag), so two triggers cannot interleave push and pull against
//! the same aggregates. `status()` reports the lock state as `is_syncing`.

use std::sync::Arc;

use apothek_db::Database;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{SyncError, SyncResult};
use crate::progress::ProgressSender;
use crate::protocol::AuthRequest;
use crate::pull::{PullReport, PullSynchronizer};
use crate::push::{PushReport, PushSynchronizer};
use crate::settings::SyncSettings;
use crate::transport::SyncTransport;

// =============================================================================
// Status
// =============================================================================

/// Snapshot of sync state for the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    /// A server URL is stored.
    pub configured: bool,
    /// An auth token is stored.
    pub authenticated: bool,
    /// A sync cycle currently holds the lock.
    pub is_syncing: bool,
    /// Watermark of the last completed pull.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Outbox rows awaiting upload ("N changes pending").
    pub pending_changes: i64,
    /// Message from the last failed cycle, cleared by the next success.
    pub last_error: Option<String>,
}

/// Combined outcome of one manual sync cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub push: PushReport,
    pub pull: PullReport,
}

// =============================================================================
// Agent
// =============================================================================

/// Coordinates push and pull over one database handle and one transport.
pub struct SyncAgent {
    db: Arc<Database>,
    transport: Box<dyn SyncTransport>,
    /// Real mutual exclusion around the push/pull critical section.
    cycle_lock: Mutex<()>,
    last_error: std::sync::RwLock<Option<String>>,
}

impl SyncAgent {
    pub fn new(db: Arc<Database>, transport: Box<dyn SyncTransport>) -> Self {
        SyncAgent {
            db,
            transport,
            cycle_lock: Mutex::new(()),
            last_error: std::sync::RwLock::new(None),
        }
    }

    /// Stores (and normalizes) the sync server URL.
    pub async fn configure(&self, server_url: &str) -> SyncResult<()> {
        SyncSettings::new(&self.db).set_server_url(server_url).await
    }

    /// Authenticates against the configured server and stores the token.
    pub async fn authenticate(&self, email: &str, password: &str) -> SyncResult<()> {
        let settings = SyncSettings::new(&self.db);
        let state = settings.load().await?;
        let server_url = state.require_server_url()?.to_string();

        let response = self
            .transport
            .authenticate(
                &server_url,
                &AuthRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;

        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "credentials rejected".to_string());
            return Err(SyncError::AuthRejected(message));
        }
        let token = response
            .token
            .ok_or_else(|| SyncError::Protocol("auth response carried no token".to_string()))?;

        settings.set_auth_token(&token).await?;
        info!("authenticated with sync server");
        Ok(())
    }

    /// Drops the stored token; sync pauses until re-authentication.
    pub async fn sign_out(&self) -> SyncResult<()> {
        SyncSettings::new(&self.db).clear_auth_token().await
    }

    /// Current status for the UI ("N changes pending", "syncing…").
    pub async fn status(&self) -> SyncResult<SyncStatus> {
        let state = SyncSettings::new(&self.db).load().await?;
        let pending_changes = self.db.outbox().count_pending().await?;
        Ok(SyncStatus {
            configured: state.is_configured(),
            authenticated: state.is_authenticated(),
            is_syncing: self.cycle_lock.try_lock().is_err(),
            last_sync_at: state.last_sync_at,
            pending_changes,
            last_error: self.last_error.read().expect("status lock").clone(),
        })
    }

    /// Runs one push-then-pull cycle under the mutual-exclusion lock.
    ///
    /// An expired token surfaces as [`SyncError::Unauthenticated`] and also
    /// clears the stored token so the UI prompts for credentials.
    pub async fn sync_now(&self, progress: Option<ProgressSender>) -> SyncResult<SyncReport> {
        let _guard = self.cycle_lock.lock().await;
        info!("sync cycle starting");

        let result = self.run_cycle(progress).await;
        match &result {
            Ok(report) => {
                *self.last_error.write().expect("status lock") = None;
                info!(
                    pushed = report.push.uploaded,
                    pulled = report.pull.applied,
                    "sync cycle complete"
                );
            }
            Err(err) => {
                *self.last_error.write().expect("status lock") = Some(err.to_string());
                error!(error = %err, "sync cycle failed");
                if matches!(err, SyncError::Unauthenticated) {
                    // Token no longer valid; require a fresh login.
                    let _ = SyncSettings::new(&self.db).clear_auth_token().await;
                }
            }
        }
        result
    }

    async fn run_cycle(&self, progress: Option<ProgressSender>) -> SyncResult<SyncReport> {
        let push = PushSynchronizer::new(&self.db, self.transport.as_ref())
            .run()
            .await?;
        let mut pull_sync = PullSynchronizer::new(&self.db, self.transport.as_ref());
        if let Some(progress) = progress {
            pull_sync = pull_sync.with_progress(progress);
        }
        let pull = pull_sync.run().await?;
        Ok(SyncReport { push, pull })
    }
}
