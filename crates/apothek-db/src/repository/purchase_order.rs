//! # Purchase Order Repository

use apothek_core::{EntityKind, Operation, PurchaseOrder, PurchaseOrderItem, PurchaseOrderStatus};
use chrono::Utc;
use tracing::debug;

use crate::adapter::Database;
use crate::error::{DbError, DbResult};
use crate::query::{Filter, Insert, OrderDir, Select, Update};
use crate::repository::outbox;
use crate::row::Row;

/// Repository for purchase orders and their lines.
pub struct PurchaseOrderRepository<'a> {
    db: &'a Database,
}

impl<'a> PurchaseOrderRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        PurchaseOrderRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<PurchaseOrder>> {
        self.db
            .fetch_optional(&Select::from("purchase_orders").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn items(&self, purchase_order_id: &str) -> DbResult<Vec<PurchaseOrderItem>> {
        self.db
            .fetch(
                &Select::from("purchase_order_items")
                    .filter(Filter::eq("purchase_order_id", purchase_order_id)),
            )
            .await?
            .iter()
            .map(item_from_row)
            .collect()
    }

    pub async fn list_open(&self) -> DbResult<Vec<PurchaseOrder>> {
        self.db
            .fetch(
                &Select::from("purchase_orders")
                    .filter(Filter::is_in(
                        "status",
                        [
                            PurchaseOrderStatus::Draft.as_str(),
                            PurchaseOrderStatus::Ordered.as_str(),
                        ],
                    ))
                    .order_by("created_at", OrderDir::Desc),
            )
            .await?
            .iter()
            .map(from_row)
            .collect()
    }

    /// Creates the order, its lines, and the outbox entry in one transaction.
    pub async fn create(
        &self,
        order: &PurchaseOrder,
        items: &[PurchaseOrderItem],
    ) -> DbResult<()> {
        debug!(id = %order.id, order_number = %order.order_number, "creating purchase order");

        let order = order.clone();
        let items = items.to_vec();
        let payload = serde_json::to_string(&order)
            .map_err(|e| DbError::Internal(format!("serialize order snapshot: {e}")))?;

        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    tx.insert(&insert_query(&order)).await?;
                    for item in &items {
                        tx.insert(&item_insert_query(item)).await?;
                    }
                    outbox::enqueue_in(
                        tx,
                        EntityKind::PurchaseOrder,
                        &order.id,
                        Operation::Create,
                        Some(payload),
                    )
                    .await?;
                    Ok(())
                })
            })
            .await
    }

    /// Status transition plus its outbox entry, in one transaction.
    pub async fn set_status(&self, id: &str, status: PurchaseOrderStatus) -> DbResult<()> {
        let id = id.to_string();
        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    let affected = tx
                        .update(
                            &Update::table("purchase_orders")
                                .set("status", status.as_str())
                                .set("updated_at", Utc::now())
                                .filter(Filter::eq("id", id.clone())),
                        )
                        .await?;
                    if affected == 0 {
                        return Err(DbError::not_found("purchase order", &id));
                    }
                    outbox::enqueue_in(
                        tx,
                        EntityKind::PurchaseOrder,
                        &id,
                        Operation::Update,
                        None,
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

pub(crate) fn from_row(row: &Row) -> DbResult<PurchaseOrder> {
    let status_raw = row.str("status")?;
    let status = PurchaseOrderStatus::parse(&status_raw).ok_or_else(|| DbError::CorruptValue {
        column: "status".into(),
        value: status_raw,
    })?;
    Ok(PurchaseOrder {
        id: row.str("id")?,
        branch_id: row.str("branch_id")?,
        supplier_id: row.str("supplier_id")?,
        order_number: row.str("order_number")?,
        status,
        total: row.f64("total")?,
        expected_at: row.opt_datetime("expected_at")?,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}

fn item_from_row(row: &Row) -> DbResult<PurchaseOrderItem> {
    Ok(PurchaseOrderItem {
        id: row.str("id")?,
        purchase_order_id: row.str("purchase_order_id")?,
        medicine_id: row.str("medicine_id")?,
        quantity: row.i64("quantity")?,
        unit_cost: row.f64("unit_cost")?,
        line_total: row.f64("line_total")?,
    })
}

fn insert_query(order: &PurchaseOrder) -> Insert {
    Insert::into("purchase_orders")
        .value("id", order.id.clone())
        .value("branch_id", order.branch_id.clone())
        .value("supplier_id", order.supplier_id.clone())
        .value("order_number", order.order_number.clone())
        .value("status", order.status.as_str())
        .value("total", order.total)
        .value("expected_at", order.expected_at)
        .value("created_at", order.created_at)
        .value("updated_at", order.updated_at)
}

fn item_insert_query(item: &PurchaseOrderItem) -> Insert {
    Insert::into("purchase_order_items")
        .value("id", item.id.clone())
        .value("purchase_order_id", item.purchase_order_id.clone())
        .value("medicine_id", item.medicine_id.clone())
        .value("quantity", item.quantity)
        .value("unit_cost", item.unit_cost)
        .value("line_total", item.line_total)
}
