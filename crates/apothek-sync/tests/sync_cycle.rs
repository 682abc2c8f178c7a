//! End-to-end sync tests against an in-process transport: the full push and
//! pull machinery runs over a real embedded database, only the HTTP hop is
//! replaced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use apothek_core::{new_id, EntityKind, Medicine, Operation, PaymentMethod, Sale, SaleItem,
    SaleStatus};
use apothek_db::{Database, DatabaseConfig};
use apothek_sync::{
    progress_channel, AuthRequest, AuthResponse, PullResponse, PullSynchronizer, PushRequest,
    PushResponse, PushSynchronizer, SyncAgent, SyncError, SyncResult, SyncSettings,
    SyncStage, SyncTransport,
};

// =============================================================================
// Mock transport
// =============================================================================

const TEST_TOKEN: &str = "token-123";
const TEST_EMAIL: &str = "admin@apothek.local";
const TEST_PASSWORD: &str = "hunter2";

struct MockState {
    /// The `data` object returned on every pull.
    data: Mutex<Value>,
    synced_at: Mutex<Option<DateTime<Utc>>>,
    /// `lastSyncAt` parameter of every pull, in call order.
    pull_since: Mutex<Vec<Option<DateTime<Utc>>>>,
    /// Every push request body, in call order.
    pushes: Mutex<Vec<Value>>,
    fail_push: AtomicBool,
}

impl Default for MockState {
    fn default() -> Self {
        MockState {
            data: Mutex::new(json!({})),
            synced_at: Mutex::new(None),
            pull_since: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            fail_push: AtomicBool::new(false),
        }
    }
}

#[derive(Clone, Default)]
struct MockTransport(Arc<MockState>);

impl MockTransport {
    fn set_data(&self, data: Value) {
        *self.0.data.lock().unwrap() = data;
    }

    fn set_synced_at(&self, at: DateTime<Utc>) {
        *self.0.synced_at.lock().unwrap() = Some(at);
    }

    fn fail_next_pushes(&self, fail: bool) {
        self.0.fail_push.store(fail, Ordering::SeqCst);
    }

    fn pushes(&self) -> Vec<Value> {
        self.0.pushes.lock().unwrap().clone()
    }

    fn pull_since(&self) -> Vec<Option<DateTime<Utc>>> {
        self.0.pull_since.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn authenticate(
        &self,
        _server_url: &str,
        request: &AuthRequest,
    ) -> SyncResult<AuthResponse> {
        let body = if request.email == TEST_EMAIL && request.password == TEST_PASSWORD {
            json!({"success": true, "token": TEST_TOKEN, "user": {"id": "cloud-admin"}})
        } else {
            json!({"success": false, "message": "invalid credentials"})
        };
        Ok(serde_json::from_value(body).unwrap())
    }

    async fn pull(
        &self,
        _server_url: &str,
        token: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<PullResponse> {
        if token != TEST_TOKEN {
            return Err(SyncError::Unauthenticated);
        }
        self.0.pull_since.lock().unwrap().push(since);
        let synced_at = self.0.synced_at.lock().unwrap().unwrap_or_else(Utc::now);
        let body = json!({
            "success": true,
            "syncedAt": synced_at.to_rfc3339(),
            "data": self.0.data.lock().unwrap().clone(),
        });
        serde_json::from_value(body).map_err(|e| SyncError::Protocol(e.to_string()))
    }

    async fn push(
        &self,
        _server_url: &str,
        token: &str,
        request: &PushRequest,
    ) -> SyncResult<PushResponse> {
        if token != TEST_TOKEN {
            return Err(SyncError::Unauthenticated);
        }
        if self.0.fail_push.load(Ordering::SeqCst) {
            return Err(SyncError::Transient("connection reset by peer".into()));
        }
        self.0
            .pushes
            .lock()
            .unwrap()
            .push(serde_json::to_value(request).unwrap());
        Ok(serde_json::from_value(json!({"success": true, "results": {}})).unwrap())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

async fn fresh_db() -> Database {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .try_init();
    let db = Database::connect(&DatabaseConfig::embedded(":memory:"))
        .await
        .unwrap();
    db.initialize().await.unwrap();
    db
}

/// Database with sync server + token already stored.
async fn configured_db() -> Database {
    let db = fresh_db().await;
    let settings = SyncSettings::new(&db);
    settings
        .set_server_url("https://cloud.apothek.dev")
        .await
        .unwrap();
    settings.set_auth_token(TEST_TOKEN).await.unwrap();
    db
}

fn medicine(id: &str, name: &str, quantity: i64) -> Medicine {
    let now = Utc::now();
    Medicine {
        id: id.to_string(),
        name: name.to_string(),
        generic_name: None,
        batch_number: format!("B-{id}"),
        barcode: None,
        category: None,
        manufacturer: None,
        quantity,
        reorder_level: 5,
        cost_price: 1.0,
        selling_price: 2.0,
        expiry_date: None,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Pull behavior
// =============================================================================

#[tokio::test]
async fn first_pull_is_full_snapshot_then_delta() {
    let db = configured_db().await;
    let transport = MockTransport::default();
    let server_now = Utc::now() - Duration::minutes(1);
    transport.set_synced_at(server_now);
    transport.set_data(json!({
        "customers": [{"id": "c1", "name": "Walk-in", "loyaltyPoints": 3}]
    }));

    let sync = PullSynchronizer::new(&db, &transport);
    let report = sync.run().await.unwrap();
    assert!(report.full_snapshot);
    assert_eq!(report.applied, 1);
    assert_eq!(report.synced_at, server_now);

    // Watermark stored; the second pull requests only the delta.
    let report = sync.run().await.unwrap();
    assert!(!report.full_snapshot);

    let since = transport.pull_since();
    assert_eq!(since.len(), 2);
    assert_eq!(since[0], None);
    assert_eq!(since[1].unwrap().timestamp(), server_now.timestamp());
}

#[tokio::test]
async fn applying_the_same_batch_twice_is_idempotent() {
    let db = configured_db().await;
    let transport = MockTransport::default();
    transport.set_data(json!({
        "branches": [{"id": "b2", "name": "North", "code": "NORTH"}],
        "medicines": [{"id": "m1", "name": "Panadol", "unitPrice": 3.5, "quantity": 40}],
        "customers": [{"id": "c1", "name": "Hamid", "loyaltyPoints": 12, "creditBalance": 5.5}],
    }));

    let sync = PullSynchronizer::new(&db, &transport);
    sync.run().await.unwrap();
    sync.run().await.unwrap();

    // Seeded MAIN + pulled NORTH, no duplicates.
    assert_eq!(db.branches().list().await.unwrap().len(), 2);

    // Counters equal the cloud value, not doubled.
    let c = db.customers().get("c1").await.unwrap().unwrap();
    assert_eq!(c.loyalty_points, 12);
    assert!((c.credit_balance - 5.5).abs() < f64::EPSILON);

    let m = db.medicines().get("m1").await.unwrap().unwrap();
    assert_eq!(m.quantity, 40);
}

#[tokio::test]
async fn branch_with_known_code_updates_in_place() {
    let db = configured_db().await;
    let local = db.branches().get_by_code("MAIN").await.unwrap().unwrap();

    let transport = MockTransport::default();
    transport.set_data(json!({
        "branches": [{"id": "cloud-77", "name": "Main (renamed)", "code": "MAIN"}]
    }));
    PullSynchronizer::new(&db, &transport).run().await.unwrap();

    let branches = db.branches().list().await.unwrap();
    assert_eq!(branches.len(), 1, "no duplicate for the same code");
    assert_eq!(branches[0].id, local.id, "local id wins");
    assert_eq!(branches[0].name, "Main (renamed)");
}

#[tokio::test]
async fn pull_never_creates_users() {
    let db = configured_db().await;
    let before = db.users().list().await.unwrap();
    let admin = &before[0];

    let transport = MockTransport::default();
    transport.set_data(json!({
        "users": [
            {"id": "u-cloud", "name": "Ghost", "email": "ghost@apothek.local"},
            {"id": admin.id, "name": "Renamed Admin", "email": admin.email, "role": "ADMIN"},
        ]
    }));
    let report = PullSynchronizer::new(&db, &transport).run().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);

    let after = db.users().list().await.unwrap();
    assert_eq!(after.len(), before.len(), "no user created from pull");
    let merged = db.users().get(&admin.id).await.unwrap().unwrap();
    assert_eq!(merged.name, "Renamed Admin");
    // Local credential untouched by the pull.
    assert_eq!(merged.password_hash, admin.password_hash);
}

#[tokio::test]
async fn malformed_record_does_not_block_the_batch() {
    let db = configured_db().await;
    let transport = MockTransport::default();
    let server_now = Utc::now();
    transport.set_synced_at(server_now);
    transport.set_data(json!({
        "medicines": [
            {"name": "no id at all"},
            {"id": "m-ok", "name": "Amoxil", "unitPrice": 4.0},
        ],
        "customers": [{"id": "c-ok", "name": "Nadia"}],
        "suppliers": [{"id": "s-ok", "name": "PharmaDist"}],
    }));

    let report = PullSynchronizer::new(&db, &transport).run().await.unwrap();
    assert_eq!(report.errors, 1);
    assert_eq!(report.applied, 3);

    assert!(db.medicines().get("m-ok").await.unwrap().is_some());
    assert!(db.customers().get("c-ok").await.unwrap().is_some());
    assert!(db.suppliers().get("s-ok").await.unwrap().is_some());

    // Watermark advanced despite the bad record.
    let state = SyncSettings::new(&db).load().await.unwrap();
    assert_eq!(state.last_sync_at.unwrap().timestamp(), server_now.timestamp());
}

#[tokio::test]
async fn medicine_merge_maps_fields_and_synthesizes_batch() {
    let db = configured_db().await;
    let transport = MockTransport::default();
    transport.set_data(json!({
        "medicines": [{
            "id": "m-42",
            "name": "Augmentin 625",
            "unitPrice": 9.5,
            "costPrice": 6.25,
            "quantity": 18
        }]
    }));
    PullSynchronizer::new(&db, &transport).run().await.unwrap();

    let m = db.medicines().get("m-42").await.unwrap().unwrap();
    assert_eq!(m.selling_price, 9.5);
    assert_eq!(m.cost_price, 6.25);
    assert!(m.batch_number.starts_with("SYNC-"), "{}", m.batch_number);
}

#[tokio::test]
async fn progress_stages_arrive_in_order() {
    let db = configured_db().await;
    let transport = MockTransport::default();
    transport.set_data(json!({}));

    let (tx, mut rx) = progress_channel();
    PullSynchronizer::new(&db, &transport)
        .with_progress(tx)
        .run()
        .await
        .unwrap();

    let mut stages = Vec::new();
    while let Ok(stage) = rx.try_recv() {
        stages.push(stage);
    }
    assert_eq!(stages.first(), Some(&SyncStage::Downloading));
    assert_eq!(stages.get(1), Some(&SyncStage::Processing));
    assert_eq!(stages.last(), Some(&SyncStage::Complete));
    assert!(stages.contains(&SyncStage::Applying(EntityKind::Medicine)));
}

// =============================================================================
// Push behavior
// =============================================================================

#[tokio::test]
async fn push_uploads_fresh_snapshot_and_marks_synced() {
    let db = configured_db().await;
    db.medicines().insert(&medicine("m1", "Panadol", 10)).await.unwrap();
    db.outbox()
        .enqueue(
            EntityKind::Medicine,
            "m1",
            Operation::Create,
            Some("{\"stale\": true}".into()),
        )
        .await
        .unwrap();

    // The row changed after enqueue; the upload must carry the current state.
    db.medicines().adjust_stock("m1", 5).await.unwrap();

    let transport = MockTransport::default();
    let report = PushSynchronizer::new(&db, &transport).run().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.marked_synced, 1);
    assert_eq!(db.outbox().count_pending().await.unwrap(), 0);

    let pushes = transport.pushes();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0]["medicines"][0]["id"], "m1");
    assert_eq!(pushes[0]["medicines"][0]["quantity"], 15);
    assert_eq!(pushes[0]["medicines"][0]["unitPrice"], 2.0);

    // A later pull with a newer cloud quantity wins over the local value
    // (last-write-wins).
    transport.set_data(json!({
        "medicines": [{"id": "m1", "name": "Panadol", "unitPrice": 2.0, "quantity": 99,
                        "batchNumber": "B-m1"}]
    }));
    PullSynchronizer::new(&db, &transport).run().await.unwrap();
    let m = db.medicines().get("m1").await.unwrap().unwrap();
    assert_eq!(m.quantity, 99);
}

#[tokio::test]
async fn failed_push_keeps_rows_pending_and_counts_attempts() {
    let db = configured_db().await;
    db.medicines().insert(&medicine("m1", "Brufen", 10)).await.unwrap();
    db.outbox()
        .enqueue(EntityKind::Medicine, "m1", Operation::Create, None)
        .await
        .unwrap();

    let transport = MockTransport::default();
    transport.fail_next_pushes(true);

    let err = PushSynchronizer::new(&db, &transport).run().await.unwrap_err();
    assert!(err.is_retryable());

    let pending = db.outbox().pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);
    assert!(pending[0].error_message.is_some());

    // Next trigger retries the same batch as a unit and drains it.
    transport.fail_next_pushes(false);
    let report = PushSynchronizer::new(&db, &transport).run().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn delete_supersedes_earlier_rows_for_the_same_entity() {
    let db = configured_db().await;
    let outbox = db.outbox();

    // Customer created, edited, then deleted before any push ran: only the
    // tombstone goes out.
    outbox
        .enqueue(
            EntityKind::Customer,
            "c9",
            Operation::Create,
            Some("{\"id\":\"c9\",\"name\":\"Temp\"}".into()),
        )
        .await
        .unwrap();
    outbox
        .enqueue(
            EntityKind::Customer,
            "c9",
            Operation::Update,
            Some("{\"id\":\"c9\",\"name\":\"Temp 2\"}".into()),
        )
        .await
        .unwrap();
    outbox
        .enqueue(EntityKind::Customer, "c9", Operation::Delete, None)
        .await
        .unwrap();

    let transport = MockTransport::default();
    let report = PushSynchronizer::new(&db, &transport).run().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.superseded, 2);
    assert_eq!(report.marked_synced, 3);

    let pushes = transport.pushes();
    let body = &pushes[0];
    assert!(body.get("customers").is_none(), "no snapshot for deleted row");
    assert_eq!(body["deletes"][0]["entityType"], "CUSTOMER");
    assert_eq!(body["deletes"][0]["entityId"], "c9");
    assert_eq!(body["deletes"][0]["payload"]["name"], "Temp 2");
}

#[tokio::test]
async fn vanished_entity_without_delete_is_skipped() {
    let db = configured_db().await;
    db.medicines().insert(&medicine("m1", "Panadol", 10)).await.unwrap();
    db.outbox()
        .enqueue(EntityKind::Medicine, "m1", Operation::Create, None)
        .await
        .unwrap();
    db.outbox()
        .enqueue(EntityKind::Medicine, "ghost", Operation::Update, None)
        .await
        .unwrap();

    let transport = MockTransport::default();
    let report = PushSynchronizer::new(&db, &transport).run().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(db.outbox().count_pending().await.unwrap(), 0);

    let body = &transport.pushes()[0];
    assert_eq!(body["medicines"].as_array().unwrap().len(), 1);
    assert_eq!(body["medicines"][0]["id"], "m1");
}

#[tokio::test]
async fn push_requires_configuration_then_authentication() {
    let db = fresh_db().await;
    let transport = MockTransport::default();

    let err = PushSynchronizer::new(&db, &transport).run().await.unwrap_err();
    assert!(matches!(err, SyncError::Unconfigured));

    SyncSettings::new(&db)
        .set_server_url("https://cloud.apothek.dev")
        .await
        .unwrap();
    let err = PushSynchronizer::new(&db, &transport).run().await.unwrap_err();
    assert!(matches!(err, SyncError::Unauthenticated));
}

// =============================================================================
// Agent
// =============================================================================

#[tokio::test]
async fn agent_runs_full_cycle_and_reports_status() {
    let db = Arc::new(configured_db().await);
    let transport = MockTransport::default();
    transport.set_data(json!({
        "suppliers": [{"id": "s1", "name": "PharmaDist", "outstandingBalance": 120.0}]
    }));
    let agent = SyncAgent::new(db.clone(), Box::new(transport.clone()));

    // A real local mutation: sale + stock + outbox in one transaction.
    db.medicines().insert(&medicine("m1", "Panadol", 20)).await.unwrap();
    let branch = db.branches().get_by_code("MAIN").await.unwrap().unwrap();
    let users = db.users().list().await.unwrap();
    let user = &users[0];
    let now = Utc::now();
    let sale = Sale {
        id: "s1".into(),
        branch_id: branch.id,
        user_id: user.id.clone(),
        customer_id: None,
        invoice_number: "INV-0001".into(),
        subtotal: 10.0,
        discount: 0.0,
        tax: 0.0,
        total: 10.0,
        payment_method: PaymentMethod::Cash,
        status: SaleStatus::Completed,
        created_at: now,
        updated_at: now,
    };
    let items = vec![SaleItem {
        id: new_id(),
        sale_id: "s1".into(),
        medicine_id: "m1".into(),
        name_snapshot: "Panadol".into(),
        quantity: 5,
        unit_price: 2.0,
        line_total: 10.0,
        created_at: now,
    }];
    db.sales().record(&sale, &items).await.unwrap();

    let status = agent.status().await.unwrap();
    assert!(status.configured && status.authenticated);
    assert_eq!(status.pending_changes, 1);
    assert!(!status.is_syncing);
    assert_eq!(status.last_sync_at, None);

    let report = agent.sync_now(None).await.unwrap();
    assert_eq!(report.push.uploaded, 1);
    assert_eq!(report.pull.applied, 1);

    let status = agent.status().await.unwrap();
    assert_eq!(status.pending_changes, 0);
    assert!(status.last_sync_at.is_some());
    assert_eq!(status.last_error, None);

    // The uploaded sale carried its lines.
    let body = &transport.pushes()[0];
    assert_eq!(body["sales"][0]["invoiceNumber"], "INV-0001");
    assert_eq!(body["sales"][0]["items"].as_array().unwrap().len(), 1);
    // And the pulled supplier landed.
    assert!(db.suppliers().get("s1").await.unwrap().is_some());
}

#[tokio::test]
async fn agent_authentication_stores_or_rejects() {
    let db = Arc::new(fresh_db().await);
    let transport = MockTransport::default();
    let agent = SyncAgent::new(db.clone(), Box::new(transport));

    // Must configure a server first.
    let err = agent.authenticate(TEST_EMAIL, TEST_PASSWORD).await.unwrap_err();
    assert!(matches!(err, SyncError::Unconfigured));

    agent.configure("https://cloud.apothek.dev/").await.unwrap();

    let err = agent.authenticate(TEST_EMAIL, "wrong").await.unwrap_err();
    assert!(matches!(err, SyncError::AuthRejected(_)));
    assert!(!SyncSettings::new(&db).load().await.unwrap().is_authenticated());

    agent.authenticate(TEST_EMAIL, TEST_PASSWORD).await.unwrap();
    let state = SyncSettings::new(&db).load().await.unwrap();
    assert_eq!(state.auth_token.as_deref(), Some(TEST_TOKEN));

    agent.sign_out().await.unwrap();
    assert!(!SyncSettings::new(&db).load().await.unwrap().is_authenticated());
}

#[tokio::test]
async fn failed_cycle_surfaces_last_error_in_status() {
    let db = Arc::new(configured_db().await);
    db.medicines().insert(&medicine("m1", "Panadol", 3)).await.unwrap();
    db.outbox()
        .enqueue(EntityKind::Medicine, "m1", Operation::Create, None)
        .await
        .unwrap();

    let transport = MockTransport::default();
    transport.fail_next_pushes(true);
    let agent = SyncAgent::new(db.clone(), Box::new(transport.clone()));

    assert!(agent.sync_now(None).await.is_err());
    let status = agent.status().await.unwrap();
    assert!(status.last_error.is_some());
    assert_eq!(status.pending_changes, 1);

    // Recovery clears the error.
    transport.fail_next_pushes(false);
    agent.sync_now(None).await.unwrap();
    let status = agent.status().await.unwrap();
    assert_eq!(status.last_error, None);
    assert_eq!(status.pending_changes, 0);
}
