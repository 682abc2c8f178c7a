//! # apothek-core: Pure Domain Types for Apothek
//!
//! This crate is the foundation of the Apothek pharmacy POS. It contains the
//! domain model shared by the storage layer and the sync engine, with zero
//! I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Apothek Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Desktop Shell (out of scope)                 │   │
//! │  │      CRUD handlers ──► enqueue outbox ──► consume adapter       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ apothek-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌──────────────┐               │   │
//! │  │   │ entities  │  │  outbox   │  │  validation  │               │   │
//! │  │   │ Medicine  │  │ EntityKind│  │    rules     │               │   │
//! │  │   │ Customer  │  │ Operation │  │   checks     │               │   │
//! │  │   └───────────┘  └───────────┘  └──────────────┘               │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          apothek-db (adapter, translator, repositories)         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`entities`] - Domain types (Branch, Medicine, Customer, Sale, ...)
//! - [`outbox`] - The durable outbox queue model
//! - [`validation`] - Field-level validation rules
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod entities;
pub mod error;
pub mod outbox;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use entities::*;
pub use error::ValidationError;
pub use outbox::{EntityKind, Operation, OutboxEntry, OutboxStatus};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Role string stored for administrator accounts.
///
/// The seeder creates the default administrator only when no row with this
/// role exists, so the constant is shared between core and db layers.
pub const ADMIN_ROLE: &str = "ADMIN";

/// Default code for the seeded main branch.
pub const MAIN_BRANCH_CODE: &str = "MAIN";

/// Generates a new entity id (UUID v4, string form).
///
/// Ids are generated client-side so offline-created records keep the same
/// primary key once they reach the cloud.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
