//! # apothek-sync: Offline-First Sync Engine
//!
//! Replication between the local store and the Apothek cloud backend:
//! the outbox push, the watermark pull with per-entity merge rules, and the
//! agent that orchestrates both under a real mutual-exclusion lock.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CRUD handler ──► Database (local write + outbox row, one txn)         │
//! │                        │                                                │
//! │                        ▼                         cloud                  │
//! │  PushSynchronizer: drain PENDING ──────────────► POST /api/sync         │
//! │                    mark SYNCED   ◄────────────── ack                    │
//! │                                                                         │
//! │  PullSynchronizer: GET /api/sync?lastSyncAt=… ◄─ deltas                 │
//! │                    merge per entity rule ──► Database                   │
//! │                    advance watermark                                    │
//! │                                                                         │
//! │  SyncAgent: status / authenticate / sync_now (push → pull, one mutex)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod error;
pub mod merge;
pub mod progress;
pub mod protocol;
pub mod pull;
pub mod push;
pub mod settings;
pub mod transport;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use agent::{SyncAgent, SyncReport, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use merge::MergeAction;
pub use progress::{progress_channel, ProgressSender, SyncStage};
pub use protocol::{AuthRequest, AuthResponse, PullResponse, PushRequest, PushResponse};
pub use pull::{PullReport, PullSynchronizer};
pub use push::{PushReport, PushSynchronizer};
pub use settings::{SyncSettings, SyncState};
pub use transport::{HttpTransport, SyncTransport};
