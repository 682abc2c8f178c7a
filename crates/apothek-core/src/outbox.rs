//! # Outbox Queue Model
//!
//! The durable record of local mutations awaiting upload.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g., record_sale)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. INSERT INTO sales ...                                       │   │
//! │  │  2. UPDATE medicines SET quantity = quantity - ?                │   │
//! │  │  3. INSERT INTO sync_outbox (entity_type, entity_id, ...)       │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← the write never lands without its outbox row                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PUSH SYNCHRONIZER (later, possibly much later)                        │
//! │    reads PENDING rows ──► uploads fresh snapshots ──► marks SYNCED     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rows are append-only: after creation only `status`, `attempts`,
//! `last_attempt_at`, `error_message` and `synced_at` ever change, and a
//! SYNCED row is immutable (eligible for garbage collection).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Entity Kind
// =============================================================================

/// Which aggregate an outbox entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Branch,
    User,
    Medicine,
    Customer,
    Supplier,
    Sale,
    PurchaseOrder,
    Grn,
}

impl EntityKind {
    /// Stable string form stored in the database and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Branch => "BRANCH",
            EntityKind::User => "USER",
            EntityKind::Medicine => "MEDICINE",
            EntityKind::Customer => "CUSTOMER",
            EntityKind::Supplier => "SUPPLIER",
            EntityKind::Sale => "SALE",
            EntityKind::PurchaseOrder => "PURCHASE_ORDER",
            EntityKind::Grn => "GRN",
        }
    }

    /// Parses the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BRANCH" => Some(EntityKind::Branch),
            "USER" => Some(EntityKind::User),
            "MEDICINE" => Some(EntityKind::Medicine),
            "CUSTOMER" => Some(EntityKind::Customer),
            "SUPPLIER" => Some(EntityKind::Supplier),
            "SALE" => Some(EntityKind::Sale),
            "PURCHASE_ORDER" => Some(EntityKind::PurchaseOrder),
            "GRN" => Some(EntityKind::Grn),
            _ => None,
        }
    }

    /// All kinds, in the order pull batches are applied.
    pub fn all() -> [EntityKind; 8] {
        [
            EntityKind::Branch,
            EntityKind::User,
            EntityKind::Medicine,
            EntityKind::Customer,
            EntityKind::Supplier,
            EntityKind::Sale,
            EntityKind::PurchaseOrder,
            EntityKind::Grn,
        ]
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Operation
// =============================================================================

/// The mutation an outbox entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(Operation::Create),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Status
// =============================================================================

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    /// Awaiting upload (or awaiting retry after a failed upload).
    Pending,
    /// Acknowledged by the server. Immutable from here on.
    Synced,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Synced => "SYNCED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OutboxStatus::Pending),
            "SYNCED" => Some(OutboxStatus::Synced),
            _ => None,
        }
    }
}

// =============================================================================
// Outbox Entry
// =============================================================================

/// One durable intent-to-sync row, appended per committed local mutation.
///
/// `payload` is a snapshot captured at enqueue time and may be stale by the
/// time the push runs; the push synchronizer re-reads the current row and
/// treats the payload as a hint (it is only uploaded as-is for DELETE
/// tombstones, where no current row exists).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub entity_kind: EntityKind,

    /// Primary key of the referenced entity.
    pub entity_id: String,

    pub operation: Operation,

    /// JSON snapshot hint captured at enqueue time.
    pub payload: Option<String>,

    pub status: OutboxStatus,

    /// Number of failed upload attempts.
    pub attempts: i64,

    pub last_attempt_at: Option<DateTime<Utc>>,

    /// Last upload error, for the operator-facing "N sync errors" counter.
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Builds a fresh PENDING entry for a mutation.
    pub fn new(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        operation: Operation,
        payload: Option<String>,
    ) -> Self {
        let now = Utc::now();
        OutboxEntry {
            id: crate::new_id(),
            entity_kind,
            entity_id: entity_id.into(),
            operation,
            payload,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            synced_at: None,
        }
    }
}
