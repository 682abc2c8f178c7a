//! # Sync Outbox Repository
//!
//! The durable queue behind the outbox pattern. Enqueue happens inside the
//! same transaction as the triggering write (via [`enqueue_in`]), so a local
//! write never commits without its outbox row — and an outbox insert failure
//! fails the whole write instead of silently dropping the change from future
//! sync.

use apothek_core::{EntityKind, Operation, OutboxEntry, OutboxStatus};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::adapter::{Database, Transaction};
use crate::error::{DbError, DbResult};
use crate::query::{Aggregate, Delete, Filter, Insert, OrderDir, Select, Update};
use crate::row::Row;

/// Repository for the sync_outbox table.
pub struct OutboxRepository<'a> {
    db: &'a Database,
}

impl<'a> OutboxRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        OutboxRepository { db }
    }

    /// Appends a PENDING entry outside any caller transaction.
    ///
    /// Prefer [`enqueue_in`] from mutating repositories; this standalone form
    /// exists for callers whose write already committed (e.g. a bulk import
    /// tool backfilling sync state).
    pub async fn enqueue(
        &self,
        entity_kind: EntityKind,
        entity_id: &str,
        operation: Operation,
        payload: Option<String>,
    ) -> DbResult<OutboxEntry> {
        let entry = OutboxEntry::new(entity_kind, entity_id, operation, payload);
        self.db.insert(&insert_query(&entry)).await?;
        debug!(
            entity_type = %entry.entity_kind,
            entity_id = %entry.entity_id,
            operation = %entry.operation,
            "queued for sync"
        );
        Ok(entry)
    }

    /// All PENDING entries, oldest first.
    ///
    /// Ordering is only meaningful per entity: rows for the same entity come
    /// out in `created_at` order; no cross-entity ordering is promised.
    pub async fn pending(&self) -> DbResult<Vec<OutboxEntry>> {
        self.db
            .fetch(
                &Select::from("sync_outbox")
                    .filter(Filter::eq("status", OutboxStatus::Pending.as_str()))
                    .order_by("created_at", OrderDir::Asc),
            )
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let rows = self
            .db
            .aggregate(
                &Aggregate::over("sync_outbox")
                    .count("n")
                    .filter(Filter::eq("status", OutboxStatus::Pending.as_str())),
            )
            .await?;
        rows.first()
            .ok_or_else(|| DbError::Internal("count returned no rows".into()))?
            .i64("n")
    }

    /// Marks a whole batch SYNCED after server acknowledgment.
    pub async fn mark_synced(&self, ids: &[String], synced_at: DateTime<Utc>) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.db
            .update(
                &Update::table("sync_outbox")
                    .set("status", OutboxStatus::Synced.as_str())
                    .set("synced_at", synced_at)
                    .set("updated_at", synced_at)
                    .filter(Filter::is_in("id", ids.iter().cloned())),
            )
            .await
    }

    /// Records a failed attempt for a whole batch: attempts + 1, error kept
    /// for the operator-facing sync-errors counter, rows left PENDING.
    pub async fn record_failure(&self, ids: &[String], error: &str) -> DbResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        self.db
            .update(
                &Update::table("sync_outbox")
                    .increment("attempts", 1i64)
                    .set("error_message", error)
                    .set("last_attempt_at", now)
                    .set("updated_at", now)
                    .filter(Filter::is_in("id", ids.iter().cloned())),
            )
            .await
    }

    /// Garbage-collects SYNCED rows older than the cutoff.
    pub async fn delete_synced_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        self.db
            .delete(
                &Delete::from("sync_outbox")
                    .filter(Filter::eq("status", OutboxStatus::Synced.as_str()))
                    .filter(Filter::lt("synced_at", cutoff)),
            )
            .await
    }
}

/// Appends a PENDING entry inside the caller's transaction.
pub async fn enqueue_in(
    tx: &mut Transaction,
    entity_kind: EntityKind,
    entity_id: &str,
    operation: Operation,
    payload: Option<String>,
) -> DbResult<OutboxEntry> {
    let entry = OutboxEntry::new(entity_kind, entity_id, operation, payload);
    tx.insert(&insert_query(&entry)).await?;
    Ok(entry)
}

// =============================================================================
// Row mapping
// =============================================================================

fn insert_query(entry: &OutboxEntry) -> Insert {
    Insert::into("sync_outbox")
        .value("id", entry.id.clone())
        .value("entity_type", entry.entity_kind.as_str())
        .value("entity_id", entry.entity_id.clone())
        .value("operation", entry.operation.as_str())
        .value("payload", entry.payload.clone())
        .value("status", entry.status.as_str())
        .value("attempts", entry.attempts)
        .value("last_attempt_at", entry.last_attempt_at)
        .value("error_message", entry.error_message.clone())
        .value("created_at", entry.created_at)
        .value("updated_at", entry.updated_at)
        .value("synced_at", entry.synced_at)
}

pub(crate) fn from_row(row: &Row) -> DbResult<OutboxEntry> {
    let kind_raw = row.str("entity_type")?;
    let entity_kind = EntityKind::parse(&kind_raw).ok_or_else(|| DbError::CorruptValue {
        column: "entity_type".into(),
        value: kind_raw,
    })?;
    let op_raw = row.str("operation")?;
    let operation = Operation::parse(&op_raw).ok_or_else(|| DbError::CorruptValue {
        column: "operation".into(),
        value: op_raw,
    })?;
    let status_raw = row.str("status")?;
    let status = OutboxStatus::parse(&status_raw).ok_or_else(|| DbError::CorruptValue {
        column: "status".into(),
        value: status_raw,
    })?;

    Ok(OutboxEntry {
        id: row.str("id")?,
        entity_kind,
        entity_id: row.str("entity_id")?,
        operation,
        payload: row.opt_str("payload")?,
        status,
        attempts: row.i64("attempts")?,
        last_attempt_at: row.opt_datetime("last_attempt_at")?,
        error_message: row.opt_str("error_message")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
        synced_at: row.opt_datetime("synced_at")?,
    })
}
