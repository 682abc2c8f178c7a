//! # Merge Policy
//!
//! Per-entity-type rules for reconciling pulled cloud records with local
//! storage. Every rule is an idempotent upsert variant, which is what makes
//! re-applying a batch after a mid-pull crash safe.
//!
//! ## Rules
//! ```text
//! ┌────────────┬────────────────────────────────────────────────────────────┐
//! │ Branch     │ match by id, then by unique code (identity changed but    │
//! │            │ business key didn't), else insert. LWW on other fields.   │
//! │ User       │ update-only: the cloud payload has no password hash, so   │
//! │            │ a pull-created account could never log in. Never insert.  │
//! │ Medicine   │ field-mapped (unitPrice → selling_price); synthesize a    │
//! │            │ batch number when the cloud record lacks one.             │
//! │ Customer / │ plain upsert by id, LWW on all fields — balances          │
//! │ Supplier   │ included. Known limitation: local accrual between syncs   │
//! │            │ is clobbered; needs server-side authority or field-level  │
//! │            │ merge, pending product sign-off.                          │
//! └────────────┴────────────────────────────────────────────────────────────┘
//! ```

use apothek_core::{Branch, Customer, Medicine, Supplier, UserRole};
use apothek_db::Database;
use chrono::Utc;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::protocol::{CloudBranch, CloudCustomer, CloudMedicine, CloudSupplier, CloudUser};

/// What a merge did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Inserted,
    Updated,
    /// Deliberately not applied (e.g. a user with no local account).
    Skipped,
}

// =============================================================================
// Branch
// =============================================================================

pub(crate) async fn merge_branch(db: &Database, record: CloudBranch) -> SyncResult<MergeAction> {
    let repo = db.branches();
    let now = Utc::now();
    let incoming = Branch {
        id: record.id.clone(),
        name: record.name,
        code: record.code,
        address: record.address,
        phone: record.phone,
        is_active: record.is_active,
        created_at: record.created_at.unwrap_or(now),
        updated_at: record.updated_at.unwrap_or(now),
    };

    // Precedence: id match first.
    if repo.get(&incoming.id).await?.is_some() {
        repo.update(&incoming).await?;
        return Ok(MergeAction::Updated);
    }

    // Unseen id but known code: the branch was renamed/re-created on the
    // cloud side. Update the existing row in place, keeping the local id, so
    // the unique code never duplicates.
    if let Some(existing) = repo.get_by_code(&incoming.code).await? {
        debug!(
            cloud_id = %incoming.id,
            local_id = %existing.id,
            code = %incoming.code,
            "branch matched by code, keeping local id"
        );
        let mut keyed = incoming;
        keyed.id = existing.id.clone();
        repo.update_keyed(&existing.id, &keyed).await?;
        return Ok(MergeAction::Updated);
    }

    repo.insert(&incoming).await?;
    Ok(MergeAction::Inserted)
}

// =============================================================================
// User
// =============================================================================

pub(crate) async fn merge_user(db: &Database, record: CloudUser) -> SyncResult<MergeAction> {
    let role = record
        .role
        .as_deref()
        .and_then(UserRole::parse)
        .unwrap_or(UserRole::Cashier);

    // Update-only by design: no local row means no password hash, and a
    // password-less account would be unusable.
    let affected = db
        .users()
        .update_profile(
            &record.id,
            &record.name,
            &record.email,
            role,
            record.branch_id.as_deref(),
            record.is_active,
            record.updated_at.unwrap_or_else(Utc::now),
        )
        .await?;

    if affected == 0 {
        debug!(user_id = %record.id, "pull skipped unknown user (never created locally)");
        return Ok(MergeAction::Skipped);
    }
    Ok(MergeAction::Updated)
}

// =============================================================================
// Medicine
// =============================================================================

/// Synthetic batch number for cloud records that lack one, satisfying the
/// local required-field invariant. Deterministic per id, so re-pulls don't
/// churn the field.
fn synthetic_batch_number(id: &str) -> String {
    let prefix: String = id.chars().filter(|c| *c != '-').take(8).collect();
    format!("SYNC-{}", prefix.to_ascii_uppercase())
}

pub(crate) async fn merge_medicine(db: &Database, record: CloudMedicine) -> SyncResult<MergeAction> {
    let now = Utc::now();
    let existed = db.medicines().get(&record.id).await?.is_some();

    let batch_number = match record.batch_number {
        Some(batch) if !batch.trim().is_empty() => batch,
        _ => synthetic_batch_number(&record.id),
    };

    let incoming = Medicine {
        id: record.id,
        name: record.name,
        generic_name: record.generic_name,
        batch_number,
        barcode: record.barcode,
        category: record.category,
        manufacturer: record.manufacturer,
        quantity: record.quantity,
        reorder_level: record.reorder_level,
        cost_price: record.cost_price,
        // Cloud field name diverges from the local schema.
        selling_price: record.unit_price,
        expiry_date: record.expiry_date,
        created_at: record.created_at.unwrap_or(now),
        updated_at: record.updated_at.unwrap_or(now),
    };

    db.medicines().upsert(&incoming).await?;
    Ok(if existed {
        MergeAction::Updated
    } else {
        MergeAction::Inserted
    })
}

// =============================================================================
// Customer / Supplier
// =============================================================================

pub(crate) async fn merge_customer(db: &Database, record: CloudCustomer) -> SyncResult<MergeAction> {
    let now = Utc::now();
    let existed = db.customers().get(&record.id).await?.is_some();
    let incoming = Customer {
        id: record.id,
        name: record.name,
        phone: record.phone,
        email: record.email,
        address: record.address,
        // LWW clobber of locally-accrued balances — see module docs.
        loyalty_points: record.loyalty_points,
        credit_balance: record.credit_balance,
        created_at: record.created_at.unwrap_or(now),
        updated_at: record.updated_at.unwrap_or(now),
    };
    db.customers().upsert(&incoming).await?;
    Ok(if existed {
        MergeAction::Updated
    } else {
        MergeAction::Inserted
    })
}

pub(crate) async fn merge_supplier(db: &Database, record: CloudSupplier) -> SyncResult<MergeAction> {
    let now = Utc::now();
    let existed = db.suppliers().get(&record.id).await?.is_some();
    let incoming = Supplier {
        id: record.id,
        name: record.name,
        contact_person: record.contact_person,
        phone: record.phone,
        email: record.email,
        address: record.address,
        outstanding_balance: record.outstanding_balance,
        created_at: record.created_at.unwrap_or(now),
        updated_at: record.updated_at.unwrap_or(now),
    };
    db.suppliers().upsert(&incoming).await?;
    Ok(if existed {
        MergeAction::Updated
    } else {
        MergeAction::Inserted
    })
}

/// Parses one raw pulled record into its DTO; a shape mismatch is a
/// per-record [`SyncError::Protocol`], not a batch failure.
pub(crate) fn parse_record<T>(raw: serde_json::Value) -> SyncResult<T>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(raw).map_err(|e| SyncError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_batch_numbers_are_stable_and_readable() {
        let a = synthetic_batch_number("3f8a2b9c-aaaa-bbbb-cccc-000000000000");
        assert_eq!(a, "SYNC-3F8A2B9C");
        assert_eq!(a, synthetic_batch_number("3f8a2b9c-aaaa-bbbb-cccc-000000000000"));
        // Short ids still produce a usable value.
        assert_eq!(synthetic_batch_number("m1"), "SYNC-M1");
    }
}
