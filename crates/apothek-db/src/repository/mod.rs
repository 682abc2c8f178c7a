//! # Typed Repositories
//!
//! One small repository per entity, each built exclusively on the
//! declarative query model, so every statement is parameterized and runs
//! unmodified on both backends.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CRUD handler / sync engine                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  db.medicines().adjust_stock("m1", -3)                                  │
//! │       │             │                                                   │
//! │       │             └── Update::table("medicines")                      │
//! │       │                    .increment("quantity", -3) ...               │
//! │       ▼                                                                 │
//! │  Database handle ──► translator ──► backend                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories borrow the [`Database`] handle; construct them transiently
//! (`db.sales()`) rather than storing them.

pub mod branch;
pub mod customer;
pub mod grn;
pub mod medicine;
pub mod outbox;
pub mod purchase_order;
pub mod sale;
pub mod settings;
pub mod supplier;
pub mod user;

pub use branch::BranchRepository;
pub use customer::CustomerRepository;
pub use grn::GrnRepository;
pub use medicine::MedicineRepository;
pub use outbox::OutboxRepository;
pub use purchase_order::PurchaseOrderRepository;
pub use sale::SaleRepository;
pub use settings::SettingsRepository;
pub use supplier::SupplierRepository;
pub use user::UserRepository;

use crate::adapter::Database;

impl Database {
    pub fn branches(&self) -> BranchRepository<'_> {
        BranchRepository::new(self)
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(self)
    }

    pub fn medicines(&self) -> MedicineRepository<'_> {
        MedicineRepository::new(self)
    }

    pub fn customers(&self) -> CustomerRepository<'_> {
        CustomerRepository::new(self)
    }

    pub fn suppliers(&self) -> SupplierRepository<'_> {
        SupplierRepository::new(self)
    }

    pub fn sales(&self) -> SaleRepository<'_> {
        SaleRepository::new(self)
    }

    pub fn purchase_orders(&self) -> PurchaseOrderRepository<'_> {
        PurchaseOrderRepository::new(self)
    }

    pub fn goods_received(&self) -> GrnRepository<'_> {
        GrnRepository::new(self)
    }

    pub fn settings(&self) -> SettingsRepository<'_> {
        SettingsRepository::new(self)
    }

    pub fn outbox(&self) -> OutboxRepository<'_> {
        OutboxRepository::new(self)
    }
}
