//! # Sale Repository
//!
//! Recording a sale is the reference multi-row write of the system:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   record() — SINGLE TRANSACTION                         │
//! │                                                                         │
//! │  1. INSERT INTO sales ...                                               │
//! │  2. INSERT INTO sale_items ...            (one per line)                │
//! │  3. UPDATE medicines                                                    │
//! │       SET quantity = quantity - ?         (atomic, per line)            │
//! │  4. loyalty / credit ledger + customer counters (when applicable)       │
//! │  5. INSERT INTO sync_outbox (SALE, CREATE, <snapshot>)                  │
//! │                                                                         │
//! │  COMMIT — all five land, or none do                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use apothek_core::{
    new_id, EntityKind, LoyaltyKind, LoyaltyTransaction, Operation, PaymentMethod, Sale,
    SaleItem, SaleStatus,
};
use chrono::Utc;
use tracing::{debug, info};

use crate::adapter::Database;
use crate::error::{DbError, DbResult};
use crate::query::{Filter, Insert, OrderDir, Select, Update};
use crate::repository::{customer, medicine, outbox};
use crate::row::Row;

/// Repository for sales and their lines.
pub struct SaleRepository<'a> {
    db: &'a Database,
}

impl<'a> SaleRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        SaleRepository { db }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Sale>> {
        self.db
            .fetch_optional(&Select::from("sales").filter(Filter::eq("id", id)))
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn get_by_invoice(&self, invoice_number: &str) -> DbResult<Option<Sale>> {
        self.db
            .fetch_optional(
                &Select::from("sales").filter(Filter::eq("invoice_number", invoice_number)),
            )
            .await?
            .map(|row| from_row(&row))
            .transpose()
    }

    pub async fn items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        self.db
            .fetch(
                &Select::from("sale_items")
                    .filter(Filter::eq("sale_id", sale_id))
                    .order_by("created_at", OrderDir::Asc),
            )
            .await?
            .iter()
            .map(item_from_row)
            .collect()
    }

    /// Records a completed sale: header, lines, stock decrements, loyalty or
    /// credit movement, and the outbox entry — in one transaction.
    pub async fn record(&self, sale: &Sale, items: &[SaleItem]) -> DbResult<()> {
        debug!(id = %sale.id, invoice = %sale.invoice_number, lines = items.len(), "recording sale");

        let sale = sale.clone();
        let sale_id = sale.id.clone();
        let items = items.to_vec();
        let payload = serde_json::to_string(&sale)
            .map_err(|e| DbError::Internal(format!("serialize sale snapshot: {e}")))?;

        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    tx.insert(&insert_query(&sale)).await?;
                    for item in &items {
                        tx.insert(&item_insert_query(item)).await?;
                        medicine::adjust_stock_in(tx, &item.medicine_id, -item.quantity).await?;
                    }

                    if let Some(customer_id) = &sale.customer_id {
                        apply_customer_movement(tx, &sale, customer_id).await?;
                    }

                    outbox::enqueue_in(
                        tx,
                        EntityKind::Sale,
                        &sale.id,
                        Operation::Create,
                        Some(payload),
                    )
                    .await?;
                    Ok(())
                })
            })
            .await?;

        info!(id = %sale_id, "sale recorded");
        Ok(())
    }

    /// Voids a completed sale and restores stock, again with its outbox row
    /// in the same transaction.
    pub async fn void(&self, sale_id: &str) -> DbResult<()> {
        let Some(sale) = self.get(sale_id).await? else {
            return Err(DbError::not_found("sale", sale_id));
        };
        if sale.status == SaleStatus::Voided {
            return Ok(());
        }
        let items = self.items(sale_id).await?;
        let sale_id = sale_id.to_string();

        self.db
            .transaction(move |tx| {
                Box::pin(async move {
                    let affected = tx
                        .update(
                            &Update::table("sales")
                                .set("status", SaleStatus::Voided.as_str())
                                .set("updated_at", Utc::now())
                                .filter(Filter::eq("id", sale_id.clone()))
                                .filter(Filter::eq("status", SaleStatus::Completed.as_str())),
                        )
                        .await?;
                    if affected == 0 {
                        return Err(DbError::not_found("sale (completed)", &sale_id));
                    }
                    for item in &items {
                        medicine::adjust_stock_in(tx, &item.medicine_id, item.quantity).await?;
                    }
                    outbox::enqueue_in(tx, EntityKind::Sale, &sale_id, Operation::Update, None)
                        .await?;
                    Ok(())
                })
            })
            .await
    }
}

/// Loyalty accrual for cash/card sales; credit charge for credit sales.
/// One point per whole currency unit of the total.
async fn apply_customer_movement(
    tx: &mut crate::adapter::Transaction,
    sale: &Sale,
    customer_id: &str,
) -> DbResult<()> {
    let (kind, points_delta, credit_delta) = match sale.payment_method {
        PaymentMethod::Credit => (LoyaltyKind::CreditCharge, 0, sale.total),
        PaymentMethod::Cash | PaymentMethod::Card => {
            (LoyaltyKind::Earned, sale.total.floor() as i64, 0.0)
        }
    };

    let ledger = LoyaltyTransaction {
        id: new_id(),
        customer_id: customer_id.to_string(),
        sale_id: Some(sale.id.clone()),
        kind,
        points_delta,
        amount_delta: credit_delta,
        note: None,
        created_at: Utc::now(),
    };
    tx.insert(
        &Insert::into("loyalty_transactions")
            .value("id", ledger.id.clone())
            .value("customer_id", ledger.customer_id.clone())
            .value("sale_id", ledger.sale_id.clone())
            .value("kind", ledger.kind.as_str())
            .value("points_delta", ledger.points_delta)
            .value("amount_delta", ledger.amount_delta)
            .value("note", ledger.note.clone())
            .value("created_at", ledger.created_at),
    )
    .await?;
    customer::adjust_balances_in(tx, customer_id, points_delta, credit_delta).await
}

// =============================================================================
// Row mapping
// =============================================================================

pub(crate) fn from_row(row: &Row) -> DbResult<Sale> {
    let method_raw = row.str("payment_method")?;
    let payment_method =
        PaymentMethod::parse(&method_raw).ok_or_else(|| DbError::CorruptValue {
            column: "payment_method".into(),
            value: method_raw,
        })?;
    let status_raw = row.str("status")?;
    let status = SaleStatus::parse(&status_raw).ok_or_else(|| DbError::CorruptValue {
        column: "status".into(),
        value: status_raw,
    })?;

    Ok(Sale {
        id: row.str("id")?,
        branch_id: row.str("branch_id")?,
        user_id: row.str("user_id")?,
        customer_id: row.opt_str("customer_id")?,
        invoice_number: row.str("invoice_number")?,
        subtotal: row.f64("subtotal")?,
        discount: row.f64("discount")?,
        tax: row.f64("tax")?,
        total: row.f64("total")?,
        payment_method,
        status,
        created_at: row.datetime("created_at")?,
        updated_at: row.datetime("updated_at")?,
    })
}

fn item_from_row(row: &Row) -> DbResult<SaleItem> {
    Ok(SaleItem {
        id: row.str("id")?,
        sale_id: row.str("sale_id")?,
        medicine_id: row.str("medicine_id")?,
        name_snapshot: row.str("name_snapshot")?,
        quantity: row.i64("quantity")?,
        unit_price: row.f64("unit_price")?,
        line_total: row.f64("line_total")?,
        created_at: row.datetime("created_at")?,
    })
}

fn insert_query(sale: &Sale) -> Insert {
    Insert::into("sales")
        .value("id", sale.id.clone())
        .value("branch_id", sale.branch_id.clone())
        .value("user_id", sale.user_id.clone())
        .value("customer_id", sale.customer_id.clone())
        .value("invoice_number", sale.invoice_number.clone())
        .value("subtotal", sale.subtotal)
        .value("discount", sale.discount)
        .value("tax", sale.tax)
        .value("total", sale.total)
        .value("payment_method", sale.payment_method.as_str())
        .value("status", sale.status.as_str())
        .value("created_at", sale.created_at)
        .value("updated_at", sale.updated_at)
}

fn item_insert_query(item: &SaleItem) -> Insert {
    Insert::into("sale_items")
        .value("id", item.id.clone())
        .value("sale_id", item.sale_id.clone())
        .value("medicine_id", item.medicine_id.clone())
        .value("name_snapshot", item.name_snapshot.clone())
        .value("quantity", item.quantity)
        .value("unit_price", item.unit_price)
        .value("line_total", item.line_total)
        .value("created_at", item.created_at)
}
