//! # Cloud Sync Protocol
//!
//! Wire DTOs for the JSON-over-HTTPS sync API. The cloud speaks camelCase;
//! everything here renames accordingly so field mapping is explicit and in
//! one place.
//!
//! ## Endpoints
//! ```text
//! POST {server}/api/sync/auth   {email, password} → {success, token, user}
//! GET  {server}/api/sync[?lastSyncAt=<ISO8601>]
//!                               → {success, syncedAt, data: {branches[],
//!                                  users[], medicines[], customers[],
//!                                  suppliers[]}}
//! POST {server}/api/sync        {sales[], customers[], ...} → {success,
//!                                  results}
//! ```
//!
//! Pulled collections deserialize as raw JSON values and are parsed one
//! record at a time during merge, so a single malformed record cannot fail
//! the whole batch.

use apothek_core::{
    Branch, Customer, GoodsReceivedNote, GrnItem, Medicine, PurchaseOrder, PurchaseOrderItem,
    Sale, SaleItem, Supplier, User,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

// =============================================================================
// Authentication
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
    #[serde(default)]
    pub message: Option<String>,
}

// =============================================================================
// Pull
// =============================================================================

/// One pull batch. `synced_at` is the server clock value the watermark
/// advances to after the whole batch has been applied.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub success: bool,
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub data: PullData,
}

/// Raw per-type collections; records stay untyped until merge.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullData {
    #[serde(default)]
    pub branches: Vec<Value>,
    #[serde(default)]
    pub users: Vec<Value>,
    #[serde(default)]
    pub medicines: Vec<Value>,
    #[serde(default)]
    pub customers: Vec<Value>,
    #[serde(default)]
    pub suppliers: Vec<Value>,
}

impl PullData {
    pub fn record_count(&self) -> usize {
        self.branches.len()
            + self.users.len()
            + self.medicines.len()
            + self.customers.len()
            + self.suppliers.len()
    }
}

// =============================================================================
// Cloud record shapes
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudBranch {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Branch> for CloudBranch {
    fn from(b: &Branch) -> Self {
        CloudBranch {
            id: b.id.clone(),
            name: b.name.clone(),
            code: b.code.clone(),
            address: b.address.clone(),
            phone: b.phone.clone(),
            is_active: b.is_active,
            created_at: Some(b.created_at),
            updated_at: Some(b.updated_at),
        }
    }
}

/// User profile as exchanged with the cloud. Deliberately has no password
/// field in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudUser {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&User> for CloudUser {
    fn from(u: &User) -> Self {
        CloudUser {
            id: u.id.clone(),
            name: u.name.clone(),
            email: u.email.clone(),
            role: Some(u.role.as_str().to_string()),
            branch_id: u.branch_id.clone(),
            is_active: u.is_active,
            updated_at: Some(u.updated_at),
        }
    }
}

/// Cloud medicine record. The cloud names the selling price `unitPrice` and
/// may omit the batch number; the merge layer maps both explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudMedicine {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub generic_name: Option<String>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub cost_price: f64,
    /// Cloud name for the local `selling_price`.
    #[serde(default)]
    pub unit_price: f64,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Medicine> for CloudMedicine {
    fn from(m: &Medicine) -> Self {
        CloudMedicine {
            id: m.id.clone(),
            name: m.name.clone(),
            generic_name: m.generic_name.clone(),
            batch_number: Some(m.batch_number.clone()),
            barcode: m.barcode.clone(),
            category: m.category.clone(),
            manufacturer: m.manufacturer.clone(),
            quantity: m.quantity,
            reorder_level: m.reorder_level,
            cost_price: m.cost_price,
            unit_price: m.selling_price,
            expiry_date: m.expiry_date,
            created_at: Some(m.created_at),
            updated_at: Some(m.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCustomer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub loyalty_points: i64,
    #[serde(default)]
    pub credit_balance: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Customer> for CloudCustomer {
    fn from(c: &Customer) -> Self {
        CloudCustomer {
            id: c.id.clone(),
            name: c.name.clone(),
            phone: c.phone.clone(),
            email: c.email.clone(),
            address: c.address.clone(),
            loyalty_points: c.loyalty_points,
            credit_balance: c.credit_balance,
            created_at: Some(c.created_at),
            updated_at: Some(c.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSupplier {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub outstanding_balance: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Supplier> for CloudSupplier {
    fn from(s: &Supplier) -> Self {
        CloudSupplier {
            id: s.id.clone(),
            name: s.name.clone(),
            contact_person: s.contact_person.clone(),
            phone: s.phone.clone(),
            email: s.email.clone(),
            address: s.address.clone(),
            outstanding_balance: s.outstanding_balance,
            created_at: Some(s.created_at),
            updated_at: Some(s.updated_at),
        }
    }
}

// =============================================================================
// Push-only shapes
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSaleItem {
    pub id: String,
    pub medicine_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub line_total: f64,
}

impl From<&SaleItem> for CloudSaleItem {
    fn from(i: &SaleItem) -> Self {
        CloudSaleItem {
            id: i.id.clone(),
            medicine_id: i.medicine_id.clone(),
            name: i.name_snapshot.clone(),
            quantity: i.quantity,
            unit_price: i.unit_price,
            line_total: i.line_total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSale {
    pub id: String,
    pub invoice_number: String,
    pub branch_id: String,
    pub user_id: String,
    pub customer_id: Option<String>,
    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,
    pub payment_method: String,
    pub status: String,
    pub items: Vec<CloudSaleItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CloudSale {
    pub fn from_sale(sale: &Sale, items: &[SaleItem]) -> Self {
        CloudSale {
            id: sale.id.clone(),
            invoice_number: sale.invoice_number.clone(),
            branch_id: sale.branch_id.clone(),
            user_id: sale.user_id.clone(),
            customer_id: sale.customer_id.clone(),
            subtotal: sale.subtotal,
            discount: sale.discount,
            tax: sale.tax,
            total: sale.total,
            payment_method: sale.payment_method.as_str().to_string(),
            status: sale.status.as_str().to_string(),
            items: items.iter().map(CloudSaleItem::from).collect(),
            created_at: sale.created_at,
            updated_at: sale.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPurchaseOrderItem {
    pub id: String,
    pub medicine_id: String,
    pub quantity: i64,
    pub unit_cost: f64,
    pub line_total: f64,
}

impl From<&PurchaseOrderItem> for CloudPurchaseOrderItem {
    fn from(i: &PurchaseOrderItem) -> Self {
        CloudPurchaseOrderItem {
            id: i.id.clone(),
            medicine_id: i.medicine_id.clone(),
            quantity: i.quantity,
            unit_cost: i.unit_cost,
            line_total: i.line_total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudPurchaseOrder {
    pub id: String,
    pub order_number: String,
    pub branch_id: String,
    pub supplier_id: String,
    pub status: String,
    pub total: f64,
    pub expected_at: Option<DateTime<Utc>>,
    pub items: Vec<CloudPurchaseOrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CloudPurchaseOrder {
    pub fn from_order(order: &PurchaseOrder, items: &[PurchaseOrderItem]) -> Self {
        CloudPurchaseOrder {
            id: order.id.clone(),
            order_number: order.order_number.clone(),
            branch_id: order.branch_id.clone(),
            supplier_id: order.supplier_id.clone(),
            status: order.status.as_str().to_string(),
            total: order.total,
            expected_at: order.expected_at,
            items: items.iter().map(CloudPurchaseOrderItem::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudGrnItem {
    pub id: String,
    pub medicine_id: String,
    pub quantity: i64,
    pub unit_cost: f64,
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

impl From<&GrnItem> for CloudGrnItem {
    fn from(i: &GrnItem) -> Self {
        CloudGrnItem {
            id: i.id.clone(),
            medicine_id: i.medicine_id.clone(),
            quantity: i.quantity,
            unit_cost: i.unit_cost,
            batch_number: i.batch_number.clone(),
            expiry_date: i.expiry_date,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudGrn {
    pub id: String,
    pub grn_number: String,
    pub supplier_id: String,
    pub purchase_order_id: Option<String>,
    pub received_at: DateTime<Utc>,
    pub total: f64,
    pub items: Vec<CloudGrnItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CloudGrn {
    pub fn from_note(note: &GoodsReceivedNote, items: &[GrnItem]) -> Self {
        CloudGrn {
            id: note.id.clone(),
            grn_number: note.grn_number.clone(),
            supplier_id: note.supplier_id.clone(),
            purchase_order_id: note.purchase_order_id.clone(),
            received_at: note.received_at,
            total: note.total,
            items: items.iter().map(CloudGrnItem::from).collect(),
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

/// Tombstone for an entity deleted locally after its last upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecord {
    pub entity_type: String,
    pub entity_id: String,
    /// Last-known snapshot hint from the outbox row, when one was captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

// =============================================================================
// Push request/response
// =============================================================================

/// One upload batch, grouped by entity type. Uploads are idempotent upserts
/// server-side, which is what makes whole-batch retry safe.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<CloudBranch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<CloudUser>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub medicines: Vec<CloudMedicine>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub customers: Vec<CloudCustomer>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suppliers: Vec<CloudSupplier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sales: Vec<CloudSale>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub purchase_orders: Vec<CloudPurchaseOrder>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grns: Vec<CloudGrn>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deletes: Vec<DeleteRecord>,
}

impl PushRequest {
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn record_count(&self) -> usize {
        self.branches.len()
            + self.users.len()
            + self.medicines.len()
            + self.customers.len()
            + self.suppliers.len()
            + self.sales.len()
            + self.purchase_orders.len()
            + self.grns.len()
            + self.deletes.len()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pull_response_tolerates_missing_collections() {
        let raw = json!({
            "success": true,
            "syncedAt": "2026-08-01T10:00:00Z",
            "data": { "medicines": [{"id": "m1", "name": "Panadol"}] }
        });
        let parsed: PullResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.success);
        assert_eq!(parsed.data.medicines.len(), 1);
        assert!(parsed.data.branches.is_empty());
        assert_eq!(parsed.data.record_count(), 1);
    }

    #[test]
    fn cloud_medicine_maps_unit_price() {
        let raw = json!({
            "id": "m1",
            "name": "Panadol",
            "unitPrice": 3.25,
            "quantity": 40
        });
        let m: CloudMedicine = serde_json::from_value(raw).unwrap();
        assert_eq!(m.unit_price, 3.25);
        assert_eq!(m.quantity, 40);
        assert_eq!(m.batch_number, None);
    }

    #[test]
    fn push_request_skips_empty_collections() {
        let mut req = PushRequest::default();
        req.customers.push(CloudCustomer {
            id: "c1".into(),
            name: "Walk-in".into(),
            phone: None,
            email: None,
            address: None,
            loyalty_points: 5,
            credit_balance: 0.0,
            created_at: None,
            updated_at: None,
        });
        let raw = serde_json::to_value(&req).unwrap();
        let obj = raw.as_object().unwrap();
        assert!(obj.contains_key("customers"));
        assert!(!obj.contains_key("sales"));
        assert_eq!(obj["customers"][0]["loyaltyPoints"], 5);
    }

    #[test]
    fn cloud_user_has_no_password_field() {
        let raw = serde_json::to_string(&CloudUser {
            id: "u1".into(),
            name: "Till".into(),
            email: "till@apothek.local".into(),
            role: Some("CASHIER".into()),
            branch_id: None,
            is_active: true,
            updated_at: None,
        })
        .unwrap();
        assert!(!raw.contains("password"));
    }
}
