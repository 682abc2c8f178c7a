//! # Push Synchronizer
//!
//! Drains the outbox: uploads fresh snapshots of every pending entity in one
//! batch, then marks the whole batch SYNCED on acknowledgment.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. read all PENDING rows, oldest first                                 │
//! │  2. fold rows per (entity_type, entity_id) → one final operation        │
//! │       DELETE supersedes earlier CREATE/UPDATE rows for that entity      │
//! │  3. fetch CURRENT snapshots from local storage                          │
//! │       (the enqueue-time payload is a hint, not the upload)              │
//! │  4. POST one batch with bearer auth                                     │
//! │  5. success → mark every included row SYNCED                            │
//! │     failure → every row stays PENDING, attempts + 1                     │
//! │       (no per-row partial commit; server upserts make retry safe)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Supersede policy (documented choice): an entity whose final pending
//! operation is DELETE uploads only a tombstone carrying the last payload
//! hint; its earlier rows are marked synced without uploading. An entity
//! whose current row vanished locally with no DELETE recorded is skipped
//! with a warning and marked synced — there is nothing left to upload.

use std::collections::HashMap;

use apothek_core::{EntityKind, Operation, OutboxEntry};
use apothek_db::Database;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    CloudBranch, CloudCustomer, CloudGrn, CloudMedicine, CloudPurchaseOrder, CloudSale,
    CloudSupplier, CloudUser, DeleteRecord, PushRequest,
};
use crate::settings::SyncSettings;
use crate::transport::SyncTransport;

/// Outcome of one push run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Snapshots (or tombstones) uploaded.
    pub uploaded: usize,
    /// Rows folded away because a later DELETE superseded them.
    pub superseded: usize,
    /// Entities skipped because no local row and no DELETE existed.
    pub skipped: usize,
    /// Outbox rows marked SYNCED.
    pub marked_synced: usize,
}

/// Per-entity fold of its pending rows.
struct EntityPlan {
    row_ids: Vec<String>,
    final_operation: Operation,
    payload_hint: Option<String>,
}

/// The push half of the sync cycle.
pub struct PushSynchronizer<'a> {
    db: &'a Database,
    transport: &'a dyn SyncTransport,
}

impl<'a> PushSynchronizer<'a> {
    pub fn new(db: &'a Database, transport: &'a dyn SyncTransport) -> Self {
        PushSynchronizer { db, transport }
    }

    pub async fn run(&self) -> SyncResult<PushReport> {
        let state = SyncSettings::new(self.db).load().await?;
        let server_url = state.require_server_url()?.to_string();
        let token = state.require_auth_token()?.to_string();

        let pending = self.db.outbox().pending().await?;
        if pending.is_empty() {
            debug!("outbox empty, nothing to push");
            return Ok(PushReport::default());
        }
        info!(rows = pending.len(), "pushing outbox");

        let (order, plans) = fold_pending(&pending);
        let mut report = PushReport::default();
        let mut request = PushRequest::default();

        for key in &order {
            let plan = &plans[key];
            report.superseded += plan.row_ids.len().saturating_sub(1);
            if plan.final_operation == Operation::Delete {
                request.deletes.push(DeleteRecord {
                    entity_type: key.0.as_str().to_string(),
                    entity_id: key.1.clone(),
                    payload: plan
                        .payload_hint
                        .as_deref()
                        .and_then(|raw| serde_json::from_str(raw).ok()),
                });
                report.uploaded += 1;
                continue;
            }
            if self.add_snapshot(&mut request, key.0, &key.1).await? {
                report.uploaded += 1;
            } else {
                warn!(
                    entity_type = %key.0,
                    entity_id = %key.1,
                    "entity missing locally with no DELETE recorded; skipping upload"
                );
                report.skipped += 1;
            }
        }

        let all_ids: Vec<String> = pending.iter().map(|e| e.id.clone()).collect();

        // Everything folded away or missing: nothing to send, nothing the
        // server needs to hear about.
        if !request.is_empty() {
            match self.transport.push(&server_url, &token, &request).await {
                Ok(response) if response.success => {}
                Ok(response) => {
                    let message = response
                        .message
                        .unwrap_or_else(|| "server reported failure".to_string());
                    self.db.outbox().record_failure(&all_ids, &message).await?;
                    return Err(SyncError::Rejected {
                        status: 200,
                        message,
                    });
                }
                Err(err) => {
                    self.db
                        .outbox()
                        .record_failure(&all_ids, &err.to_string())
                        .await?;
                    return Err(err);
                }
            }
        }

        let synced_at = Utc::now();
        report.marked_synced = self.db.outbox().mark_synced(&all_ids, synced_at).await? as usize;
        info!(
            uploaded = report.uploaded,
            superseded = report.superseded,
            skipped = report.skipped,
            "push complete"
        );
        Ok(report)
    }

    /// Fetches the current local row for an entity and appends its snapshot
    /// to the batch. Returns false when the row no longer exists.
    async fn add_snapshot(
        &self,
        request: &mut PushRequest,
        kind: EntityKind,
        id: &str,
    ) -> SyncResult<bool> {
        match kind {
            EntityKind::Branch => {
                let Some(branch) = self.db.branches().get(id).await? else {
                    return Ok(false);
                };
                request.branches.push(CloudBranch::from(&branch));
            }
            EntityKind::User => {
                let Some(user) = self.db.users().get(id).await? else {
                    return Ok(false);
                };
                request.users.push(CloudUser::from(&user));
            }
            EntityKind::Medicine => {
                let Some(medicine) = self.db.medicines().get(id).await? else {
                    return Ok(false);
                };
                request.medicines.push(CloudMedicine::from(&medicine));
            }
            EntityKind::Customer => {
                let Some(customer) = self.db.customers().get(id).await? else {
                    return Ok(false);
                };
                request.customers.push(CloudCustomer::from(&customer));
            }
            EntityKind::Supplier => {
                let Some(supplier) = self.db.suppliers().get(id).await? else {
                    return Ok(false);
                };
                request.suppliers.push(CloudSupplier::from(&supplier));
            }
            EntityKind::Sale => {
                let Some(sale) = self.db.sales().get(id).await? else {
                    return Ok(false);
                };
                let items = self.db.sales().items(id).await?;
                request.sales.push(CloudSale::from_sale(&sale, &items));
            }
            EntityKind::PurchaseOrder => {
                let Some(order) = self.db.purchase_orders().get(id).await? else {
                    return Ok(false);
                };
                let items = self.db.purchase_orders().items(id).await?;
                request
                    .purchase_orders
                    .push(CloudPurchaseOrder::from_order(&order, &items));
            }
            EntityKind::Grn => {
                let Some(note) = self.db.goods_received().get(id).await? else {
                    return Ok(false);
                };
                let items = self.db.goods_received().items(id).await?;
                request.grns.push(CloudGrn::from_note(&note, &items));
            }
        }
        Ok(true)
    }
}

/// Folds pending rows into one plan per entity, preserving first-seen order.
///
/// The last row's operation wins (rows come in `created_at` order per
/// entity); the latest captured payload is kept as the tombstone hint.
fn fold_pending(
    pending: &[OutboxEntry],
) -> (
    Vec<(EntityKind, String)>,
    HashMap<(EntityKind, String), EntityPlan>,
) {
    let mut order = Vec::new();
    let mut plans: HashMap<(EntityKind, String), EntityPlan> = HashMap::new();
    for entry in pending {
        let key = (entry.entity_kind, entry.entity_id.clone());
        let plan = plans.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            EntityPlan {
                row_ids: Vec::new(),
                final_operation: entry.operation,
                payload_hint: None,
            }
        });
        plan.row_ids.push(entry.id.clone());
        plan.final_operation = entry.operation;
        if entry.payload.is_some() {
            plan.payload_hint = entry.payload.clone();
        }
    }
    (order, plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: EntityKind, id: &str, op: Operation, payload: Option<&str>) -> OutboxEntry {
        OutboxEntry::new(kind, id, op, payload.map(str::to_string))
    }

    #[test]
    fn fold_keeps_last_operation_and_latest_payload() {
        let pending = vec![
            entry(EntityKind::Medicine, "m1", Operation::Create, Some("{\"v\":1}")),
            entry(EntityKind::Customer, "c1", Operation::Create, None),
            entry(EntityKind::Medicine, "m1", Operation::Update, Some("{\"v\":2}")),
            entry(EntityKind::Medicine, "m1", Operation::Delete, None),
        ];
        let (order, plans) = fold_pending(&pending);

        assert_eq!(order.len(), 2);
        assert_eq!(order[0], (EntityKind::Medicine, "m1".to_string()));

        let m1 = &plans[&(EntityKind::Medicine, "m1".to_string())];
        assert_eq!(m1.row_ids.len(), 3);
        assert_eq!(m1.final_operation, Operation::Delete);
        assert_eq!(m1.payload_hint.as_deref(), Some("{\"v\":2}"));

        let c1 = &plans[&(EntityKind::Customer, "c1".to_string())];
        assert_eq!(c1.final_operation, Operation::Create);
    }
}
