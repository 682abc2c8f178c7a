//! # Goods Received Note Repository
//!
//! Receiving stock mirrors the sale write in the other direction: the note,
//! its lines, the stock increments, the supplier balance, and the outbox
//! entry commit as one unit.

use apothek_core::{EntityKind, GoodsReceivedNote, GrnItem, Operation, PurchaseOrderStatus};
use chrono::Utc;
use tracing::debug;

use crate::adapter::Database;
use crate::error::{DbError, DbResult};
use crate::query::{Filter, Insert, OrderDir, Select, Update};
use crate::repository::{medicine, outbox};
use crate::row::Row;

/// Repository for goods received notes.
pub struct GrnRepository<'a> {
    db: &'a Database,
}

impl<'a> GrnRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        GrnRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<GoodsReceivedNote>> {
        self.db
            .fetch_optional(&Select::from("goods_received_notes").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn items(&self, grn_id: &str) -> DbResult<Vec<GrnItem>> {
        self.db
            .fetch(&Select::from("grn_items").filter(Filter::eq("grn_id", grn_id)))
            .await?
            .iter()
            .map(item_from_row)
            .collect()
    }

    pub async fn list_recent(&self, limit: u64) -> DbResult<Vec<GoodsReceivedNote>> {
        self.db
            .fetch(
                &Select::from("goods_received_notes")
                    .order_by("received_at", OrderDir::Desc)
                    .limit(limit),
            )
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    /// Receives stock: note + lines + stock increments + supplier balance +
    /// outbox entry in one transaction. A linked purchase order is marked
    /// RECEIVED in the same unit.
    pub async fn receive(&self, note: &GoodsReceivedNote, items: &[GrnItem]) -> DbResult<()> {
        debug!(id = %note.id, grn_number = %note.grn_number, lines = items.len(), "receiving stock");

        let note = note.clone();
        let items = items.to_vec();
        let payload = serde_json::to_string(&note)
            .map_err(|e| DbError::Internal(format!("serialize GRN snapshot: {e}")))?;

        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    tx.insert(&insert_query(&note)).await?;
                    for item in &items {
                        tx.insert(&item_insert_query(item)).await?;
                        medicine::adjust_stock_in(tx, &item.medicine_id, item.quantity).await?;
                    }

                    // Received stock increases what we owe the supplier.
                    tx.update(
                        &Update::table("suppliers")
                            .increment("outstanding_balance", note.total)
                            .set("updated_at", Utc::now())
                            .filter(Filter::eq("id", note.supplier_id.clone())),
                    )
                    .await?;

                    if let Some(po_id) = &note.purchase_order_id {
                        tx.update(
                            &Update::table("purchase_orders")
                                .set("status", PurchaseOrderStatus::Received.as_str())
                                .set("updated_at", Utc::now())
                                .filter(Filter::eq("id", po_id.clone())),
                        )
                        .await?;
                    }

                    outbox::enqueue_in(
                        tx,
                        EntityKind::Grn,
                        &note.id,
                        Operation::Create,
                        Some(payload),
                    )
                    .await?;
                    Ok(())
                })
            })
            .await
    }
}

// =============================================================================
// Row mapping
// =============================================================================

pub(crate) fn from_row(row: &Row) -> DbResult<GoodsReceivedNote> {
    Ok(GoodsReceivedNote {
        id: row.str("id")?,
        supplier_id: row.str("supplier_id")?,
        purchase_order_id: row.opt_str("purchase_order_id")?,
        grn_number: row.str("grn_number")?,
        received_at: row.datetime("received_at")?,
        total: row.f64("total")?,
        notes: row.opt_str("notes")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}

fn item_from_row(row: &Row) -> DbResult<GrnItem> {
    Ok(GrnItem {
        id: row.str("id")?,
        grn_id: row.str("grn_id")?,
        medicine_id: row.str("medicine_id")?,
        quantity: row.i64("quantity")?,
        unit_cost: row.f64("unit_cost")?,
        batch_number: row.opt_str("batch_number")?,
        expiry_date: row.opt_datetime("expiry_date")?,
    })
}

fn insert_query(note: &GoodsReceivedNote) -> Insert {
    Insert::into("goods_received_notes")
        .value("id", note.id.clone())
        .value("supplier_id", note.supplier_id.clone())
        .value("purchase_order_id", note.purchase_order_id.clone())
        .value("grn_number", note.grn_number.clone())
        .value("received_at", note.received_at)
        .value("total", note.total)
        .value("notes", note.notes.clone())
        .value("created_at", note.created_at)
        .value("updated_at", note.updated_at)
}

fn item_insert_query(item: &GrnItem) -> Insert {
    Insert::into("grn_items")
        .value("id", item.id.clone())
        .value("grn_id", item.grn_id.clone())
        .value("medicine_id", item.medicine_id.clone())
        .value("quantity", item.quantity)
        .value("unit_cost", item.unit_cost)
        .value("batch_number", item.batch_number.clone())
        .value("expiry_date", item.expiry_date)
}
