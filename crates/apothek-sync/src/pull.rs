//! # Pull Synchronizer
//!
//! Fetches entity deltas (or the full first-sync snapshot) from the cloud,
//! merges them record by record, then advances the watermark.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. read watermark                                                      │
//! │       absent → request FULL snapshot (first sync)                       │
//! │       present → request records changed since                           │
//! │  2. per entity type, upsert each record via its merge rule              │
//! │       one malformed record: log, count, CONTINUE — the batch survives   │
//! │  3. only after the whole batch: advance watermark to server syncedAt    │
//! │       crash mid-pull → next pull re-fetches and re-applies; merges are  │
//! │       idempotent upserts so replays are harmless                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Documented decision: the watermark advances even when individual records
//! failed to merge (the errors are data-shape problems a blind retry would
//! hit again every cycle, wedging the delta window). The error count is
//! surfaced in [`PullReport`] so the operator sees "N sync errors".

use apothek_core::EntityKind;
use apothek_db::Database;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::merge::{
    merge_branch, merge_customer, merge_medicine, merge_supplier, merge_user, parse_record,
    MergeAction,
};
use crate::progress::{emit, ProgressSender, SyncStage};
use crate::settings::SyncSettings;
use crate::transport::SyncTransport;

/// Outcome of one pull run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// True when no watermark existed and the full snapshot was requested.
    pub full_snapshot: bool,
    /// Records in the batch across all entity types.
    pub total: usize,
    /// Records merged (inserted or updated).
    pub applied: usize,
    /// Records deliberately not applied (unknown users).
    pub skipped: usize,
    /// Records that failed to parse or merge; batch continued past them.
    pub errors: usize,
    /// Server clock value the watermark advanced to.
    pub synced_at: DateTime<Utc>,
}

/// The pull half of the sync cycle.
pub struct PullSynchronizer<'a> {
    db: &'a Database,
    transport: &'a dyn SyncTransport,
    progress: Option<ProgressSender>,
}

impl<'a> PullSynchronizer<'a> {
    pub fn new(db: &'a Database, transport: &'a dyn SyncTransport) -> Self {
        PullSynchronizer {
            db,
            transport,
            progress: None,
        }
    }

    /// Attaches a fire-and-forget progress stream for the UI.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(&self) -> SyncResult<PullReport> {
        let settings = SyncSettings::new(self.db);
        let state = settings.load().await?;
        let server_url = state.require_server_url()?.to_string();
        let token = state.require_auth_token()?.to_string();
        let watermark = state.last_sync_at;

        emit(self.progress.as_ref(), SyncStage::Downloading);
        let response = self
            .transport
            .pull(&server_url, &token, watermark)
            .await?;
        if !response.success {
            return Err(SyncError::Rejected {
                status: 200,
                message: "server reported pull failure".to_string(),
            });
        }

        emit(self.progress.as_ref(), SyncStage::Processing);
        let data = response.data;
        let mut report = PullReport {
            full_snapshot: watermark.is_none(),
            total: data.record_count(),
            applied: 0,
            skipped: 0,
            errors: 0,
            synced_at: response.synced_at,
        };
        info!(
            records = report.total,
            full = report.full_snapshot,
            "applying pull batch"
        );

        emit(self.progress.as_ref(), SyncStage::Applying(EntityKind::Branch));
        for raw in data.branches {
            let merged = match parse_record(raw) {
                Ok(record) => merge_branch(self.db, record).await,
                Err(e) => Err(e),
            };
            tally(&mut report, EntityKind::Branch, merged);
        }

        emit(self.progress.as_ref(), SyncStage::Applying(EntityKind::User));
        for raw in data.users {
            let merged = match parse_record(raw) {
                Ok(record) => merge_user(self.db, record).await,
                Err(e) => Err(e),
            };
            tally(&mut report, EntityKind::User, merged);
        }

        emit(
            self.progress.as_ref(),
            SyncStage::Applying(EntityKind::Medicine),
        );
        for raw in data.medicines {
            let merged = match parse_record(raw) {
                Ok(record) => merge_medicine(self.db, record).await,
                Err(e) => Err(e),
            };
            tally(&mut report, EntityKind::Medicine, merged);
        }

        emit(
            self.progress.as_ref(),
            SyncStage::Applying(EntityKind::Customer),
        );
        for raw in data.customers {
            let merged = match parse_record(raw) {
                Ok(record) => merge_customer(self.db, record).await,
                Err(e) => Err(e),
            };
            tally(&mut report, EntityKind::Customer, merged);
        }

        emit(
            self.progress.as_ref(),
            SyncStage::Applying(EntityKind::Supplier),
        );
        for raw in data.suppliers {
            let merged = match parse_record(raw) {
                Ok(record) => merge_supplier(self.db, record).await,
                Err(e) => Err(e),
            };
            tally(&mut report, EntityKind::Supplier, merged);
        }

        // Whole batch done: advance the watermark (errors included — see
        // module docs).
        settings.set_last_sync_at(response.synced_at).await?;
        emit(self.progress.as_ref(), SyncStage::Complete);
        info!(
            applied = report.applied,
            skipped = report.skipped,
            errors = report.errors,
            synced_at = %report.synced_at,
            "pull complete"
        );
        Ok(report)
    }
}

/// Books one record's outcome; merge errors never abort the batch.
fn tally(report: &mut PullReport, kind: EntityKind, merged: SyncResult<MergeAction>) {
    match merged {
        Ok(MergeAction::Inserted) | Ok(MergeAction::Updated) => report.applied += 1,
        Ok(MergeAction::Skipped) => report.skipped += 1,
        Err(e) => {
            warn!(entity_type = %kind, error = %e, "record failed to merge; continuing batch");
            report.errors += 1;
        }
    }
}
