//! # Domain Entities
//!
//! The replicated aggregates of the Apothek pharmacy POS.
//!
//! ## Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 string - immutable, shared between the local store and the
//!   cloud copy of the record
//! - Business key where one exists (`code`, `email`, `invoice_number`, ...) -
//!   human-readable, enforced unique locally
//!
//! ## Replication Notes
//! Branch, User, Medicine, Customer and Supplier are pulled from the cloud;
//! Sale, PurchaseOrder and GoodsReceivedNote only flow outward through the
//! outbox. Fields that must never be overwritten by a pull (a user's
//! `password_hash`) are documented on the field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Branch
// =============================================================================

/// A pharmacy branch (store location).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, e.g. "City Centre Pharmacy".
    pub name: String,

    /// Business key, unique across branches even when `id` differs between
    /// the local and cloud copies (renamed / re-created branch).
    pub code: String,

    /// Street address.
    pub address: Option<String>,

    /// Contact phone number.
    pub phone: Option<String>,

    /// Whether the branch is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// User
// =============================================================================

/// Role of a local user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Pharmacist,
    Cashier,
}

impl UserRole {
    /// Stable string form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Pharmacist => "PHARMACIST",
            UserRole::Cashier => "CASHIER",
        }
    }

    /// Parses the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(UserRole::Admin),
            "PHARMACIST" => Some(UserRole::Pharmacist),
            "CASHIER" => Some(UserRole::Cashier),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staff account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Branch the user works at.
    pub branch_id: Option<String>,

    /// Full name.
    pub name: String,

    /// Login email, unique locally.
    pub email: String,

    /// Argon2 password hash. Local-only: the cloud payload intentionally
    /// omits it, which is why a pull never creates a user row.
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: UserRole,

    /// Whether the account can log in.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Medicine
// =============================================================================

/// A stocked medicine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Trade name shown at the till.
    pub name: String,

    /// Generic (INN) name.
    pub generic_name: Option<String>,

    /// Batch number. Required locally; a cloud record arriving without one
    /// gets a synthetic batch number during merge.
    pub batch_number: String,

    /// Barcode (EAN-13 etc.).
    pub barcode: Option<String>,

    pub category: Option<String>,
    pub manufacturer: Option<String>,

    /// Units currently on the shelf.
    pub quantity: i64,

    /// Reorder threshold for the low-stock report.
    pub reorder_level: i64,

    /// Purchase cost per unit.
    pub cost_price: f64,

    /// Selling price per unit. The cloud schema calls this `unitPrice`;
    /// the merge layer maps the field explicitly.
    pub selling_price: f64,

    pub expiry_date: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Medicine {
    /// True when the shelf quantity has fallen to the reorder threshold.
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A retail customer with loyalty and credit balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,

    /// Loyalty points accrued at the till. Overwritten by a pull under the
    /// current last-write-wins policy (known limitation).
    pub loyalty_points: i64,

    /// Outstanding store credit. Same last-write-wins caveat as
    /// `loyalty_points`.
    pub credit_balance: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Supplier
// =============================================================================

/// A wholesale supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,

    /// Amount owed to the supplier.
    pub outstanding_balance: f64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sale
// =============================================================================

/// How a sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    /// Charged against the customer's store credit.
    Credit,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Credit => "CREDIT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CASH" => Some(PaymentMethod::Cash),
            "CARD" => Some(PaymentMethod::Card),
            "CREDIT" => Some(PaymentMethod::Credit),
            _ => None,
        }
    }
}

/// Lifecycle state of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Completed,
    Voided,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Completed => "COMPLETED",
            SaleStatus::Voided => "VOIDED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLETED" => Some(SaleStatus::Completed),
            "VOIDED" => Some(SaleStatus::Voided),
            _ => None,
        }
    }
}

/// A completed till transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sale {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub branch_id: String,

    /// Cashier who rang the sale.
    pub user_id: String,

    /// Optional loyalty customer.
    pub customer_id: Option<String>,

    /// Business key, unique locally.
    pub invoice_number: String,

    pub subtotal: f64,
    pub discount: f64,
    pub tax: f64,
    pub total: f64,

    pub payment_method: PaymentMethod,
    pub status: SaleStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line on a sale.
///
/// Name and price are snapshotted so the sale history survives later
/// medicine edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub medicine_id: String,

    /// Medicine name at the time of sale.
    pub name_snapshot: String,

    pub quantity: i64,
    pub unit_price: f64,
    pub line_total: f64,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase Order
// =============================================================================

/// Lifecycle state of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    Draft,
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "DRAFT",
            PurchaseOrderStatus::Ordered => "ORDERED",
            PurchaseOrderStatus::Received => "RECEIVED",
            PurchaseOrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(PurchaseOrderStatus::Draft),
            "ORDERED" => Some(PurchaseOrderStatus::Ordered),
            "RECEIVED" => Some(PurchaseOrderStatus::Received),
            "CANCELLED" => Some(PurchaseOrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// An order placed with a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: String,
    pub branch_id: String,
    pub supplier_id: String,

    /// Business key, unique locally.
    pub order_number: String,

    pub status: PurchaseOrderStatus,
    pub total: f64,
    pub expected_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line on a purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: String,
    pub purchase_order_id: String,
    pub medicine_id: String,
    pub quantity: i64,
    pub unit_cost: f64,
    pub line_total: f64,
}

// =============================================================================
// Goods Received Note
// =============================================================================

/// Receipt of stock from a supplier, optionally against a purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoodsReceivedNote {
    pub id: String,
    pub supplier_id: String,
    pub purchase_order_id: Option<String>,

    /// Business key, unique locally.
    pub grn_number: String,

    pub received_at: DateTime<Utc>,
    pub total: f64,
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line on a goods received note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrnItem {
    pub id: String,
    pub grn_id: String,
    pub medicine_id: String,
    pub quantity: i64,
    pub unit_cost: f64,

    /// Supplier batch number for the received stock.
    pub batch_number: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
}

// =============================================================================
// Loyalty / Credit Ledger
// =============================================================================

/// Kind of loyalty/credit ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoyaltyKind {
    /// Points earned on a sale.
    Earned,
    /// Points redeemed against a sale.
    Redeemed,
    /// Store credit charged (credit sale).
    CreditCharge,
    /// Store credit paid down.
    CreditPayment,
}

impl LoyaltyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoyaltyKind::Earned => "EARNED",
            LoyaltyKind::Redeemed => "REDEEMED",
            LoyaltyKind::CreditCharge => "CREDIT_CHARGE",
            LoyaltyKind::CreditPayment => "CREDIT_PAYMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "EARNED" => Some(LoyaltyKind::Earned),
            "REDEEMED" => Some(LoyaltyKind::Redeemed),
            "CREDIT_CHARGE" => Some(LoyaltyKind::CreditCharge),
            "CREDIT_PAYMENT" => Some(LoyaltyKind::CreditPayment),
            _ => None,
        }
    }
}

/// One movement on a customer's loyalty/credit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyTransaction {
    pub id: String,
    pub customer_id: String,
    pub sale_id: Option<String>,
    pub kind: LoyaltyKind,

    /// Signed points movement.
    pub points_delta: i64,

    /// Signed credit movement.
    pub amount_delta: f64,

    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Setting
// =============================================================================

/// A persisted key/value setting row.
///
/// Sync configuration (server URL, auth token, watermark) lives here so it
/// replicates with backups and survives backend swaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [UserRole::Admin, UserRole::Pharmacist, UserRole::Cashier] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("JANITOR"), None);
    }

    #[test]
    fn payment_method_round_trip() {
        for m in [PaymentMethod::Cash, PaymentMethod::Card, PaymentMethod::Credit] {
            assert_eq!(PaymentMethod::parse(m.as_str()), Some(m));
        }
    }

    #[test]
    fn reorder_threshold_is_inclusive() {
        let now = chrono::Utc::now();
        let mut medicine = Medicine {
            id: "m1".into(),
            name: "Paracetamol 500mg".into(),
            generic_name: Some("Paracetamol".into()),
            batch_number: "B-100".into(),
            barcode: None,
            category: Some("Analgesic".into()),
            manufacturer: None,
            quantity: 10,
            reorder_level: 10,
            cost_price: 1.2,
            selling_price: 2.5,
            expiry_date: None,
            created_at: now,
            updated_at: now,
        };
        assert!(medicine.needs_reorder());
        medicine.quantity = 11;
        assert!(!medicine.needs_reorder());
    }
}
