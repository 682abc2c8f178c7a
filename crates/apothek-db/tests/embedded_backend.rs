//! Integration tests for the embedded backend: bootstrap, the declarative
//! query surface, transactions, and the outbox lifecycle — everything the
//! sync engine depends on from below.

use apothek_core::{
    new_id, Customer, EntityKind, Medicine, Operation, PaymentMethod, Sale, SaleItem, SaleStatus,
};
use apothek_db::{Database, DatabaseConfig, DbError, Filter, Select};
use chrono::Utc;

async fn test_db() -> Database {
    let config = DatabaseConfig::embedded(":memory:");
    let db = Database::connect(&config).await.expect("connect in-memory");
    db.initialize().await.expect("initialize");
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

fn customer(id: &str, name: &str) -> Customer {
    let now = Utc::now();
    Customer {
        id: id.to_string(),
        name: name.to_string(),
        phone: None,
        email: None,
        address: None,
        loyalty_points: 0,
        credit_balance: 0.0,
        created_at: now,
        updated_at: now,
    }
}

/// A one-line sale against the seeded branch and administrator.
async fn sale_fixture(
    db: &Database,
    sale_id: &str,
    medicine_id: &str,
    customer_id: Option<&str>,
    payment_method: PaymentMethod,
) -> (Sale, Vec<SaleItem>) {
    let branch = db.branches().get_by_code("MAIN").await.unwrap().unwrap();
    let admin = db
        .users()
        .get_by_email("admin@apothek.local")
        .await
        .unwrap()
        .unwrap();
    let now = Utc::now();
    let sale = Sale {
        id: sale_id.to_string(),
        branch_id: branch.id,
        user_id: admin.id,
        customer_id: customer_id.map(str::to_string),
        invoice_number: format!("INV-{sale_id}"),
        subtotal: 20.0,
        discount: 0.0,
        tax: 0.0,
        total: 20.0,
        payment_method,
        status: SaleStatus::Completed,
        created_at: now,
        updated_at: now,
    };
    let items = vec![SaleItem {
        id: new_id(),
        sale_id: sale_id.to_string(),
        medicine_id: medicine_id.to_string(),
        name_snapshot: "Test medicine".to_string(),
        quantity: 4,
        unit_price: 5.0,
        line_total: 20.0,
        created_at: now,
    }];
    (sale, items)
}

#[tokio::test]
async fn recording_a_sale_is_atomic_with_its_outbox_row() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Paracetamol", 50)).await.unwrap();

    let (sale, items) = sale_fixture(&db, "s1", "m1", None, PaymentMethod::Cash).await;
    db.sales().record(&sale, &items).await.unwrap();

    // Stock decremented atomically.
    let m = db.medicines().get("m1").await.unwrap().unwrap();
    assert_eq!(m.quantity, 46);

    // Exactly one PENDING outbox row for the sale.
    let pending = db.outbox().pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity_kind, EntityKind::Sale);
    assert_eq!(pending[0].entity_id, "s1");
    assert_eq!(pending[0].operation, Operation::Create);
    assert_eq!(db.outbox().count_pending().await.unwrap(), 1);
}

#[tokio::test]
async fn failed_transaction_leaves_no_partial_rows() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Ibuprofen", 10)).await.unwrap();

    // Second line references a missing medicine: the whole sale must vanish,
    // outbox row included.
    let (sale, mut items) = sale_fixture(&db, "s1", "m1", None, PaymentMethod::Cash).await;
    items.push(SaleItem {
        id: new_id(),
        sale_id: "s1".to_string(),
        medicine_id: "missing".to_string(),
        name_snapshot: "ghost".to_string(),
        quantity: 1,
        unit_price: 1.0,
        line_total: 1.0,
        created_at: Utc::now(),
    });

    let err = db.sales().record(&sale, &items).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. } | DbError::ForeignKeyViolation(_)));

    assert!(db.sales().get("s1").await.unwrap().is_none());
    assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    // First line's stock decrement rolled back too.
    let m = db.medicines().get("m1").await.unwrap().unwrap();
    assert_eq!(m.quantity, 10);
}

#[tokio::test]
async fn credit_sale_moves_credit_not_points() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Amoxicillin", 30)).await.unwrap();
    db.customers().insert(&customer("c1", "Hamid")).await.unwrap();

    let (sale, items) = sale_fixture(&db, "s1", "m1", Some("c1"), PaymentMethod::Credit).await;
    db.sales().record(&sale, &items).await.unwrap();

    let c = db.customers().get("c1").await.unwrap().unwrap();
    assert_eq!(c.loyalty_points, 0);
    assert!((c.credit_balance - 20.0).abs() < f64::EPSILON);

    let ledger = db
        .fetch(&Select::from("loyalty_transactions").filter(Filter::eq("customer_id", "c1")))
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].str("kind").unwrap(), "CREDIT_CHARGE");
}

#[tokio::test]
async fn cash_sale_accrues_loyalty_points() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Cetirizine", 30)).await.unwrap();
    db.customers().insert(&customer("c1", "Nadia")).await.unwrap();

    let (sale, items) = sale_fixture(&db, "s1", "m1", Some("c1"), PaymentMethod::Cash).await;
    db.sales().record(&sale, &items).await.unwrap();

    let c = db.customers().get("c1").await.unwrap().unwrap();
    assert_eq!(c.loyalty_points, 20);
    assert_eq!(c.credit_balance, 0.0);
}

#[tokio::test]
async fn voiding_a_sale_restores_stock_and_enqueues_update() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Omeprazole", 12)).await.unwrap();

    let (sale, items) = sale_fixture(&db, "s1", "m1", None, PaymentMethod::Card).await;
    db.sales().record(&sale, &items).await.unwrap();
    db.sales().void("s1").await.unwrap();

    let m = db.medicines().get("m1").await.unwrap().unwrap();
    assert_eq!(m.quantity, 12);
    let s = db.sales().get("s1").await.unwrap().unwrap();
    assert_eq!(s.status, SaleStatus::Voided);

    let pending = db.outbox().pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[1].operation, Operation::Update);

    // Voiding twice is a no-op, not an error.
    db.sales().void("s1").await.unwrap();
    assert_eq!(db.outbox().count_pending().await.unwrap(), 2);
}

#[tokio::test]
async fn repeated_stock_adjustments_accumulate() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Insulin", 100)).await.unwrap();

    for _ in 0..10 {
        db.medicines().adjust_stock("m1", -3).await.unwrap();
    }
    db.medicines().adjust_stock("m1", 5).await.unwrap();

    let m = db.medicines().get("m1").await.unwrap().unwrap();
    assert_eq!(m.quantity, 75);
}

#[tokio::test]
async fn low_stock_uses_column_comparison() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Atorvastatin", 3)).await.unwrap();
    db.medicines().insert(&medicine("m2", "Metformin", 5)).await.unwrap();
    db.medicines().insert(&medicine("m3", "Losartan", 80)).await.unwrap();

    let low = db.medicines().low_stock().await.unwrap();
    let ids: Vec<_> = low.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[tokio::test]
async fn duplicate_branch_code_is_a_unique_violation() {
    let db = test_db().await;
    let mut dup = db.branches().get_by_code("MAIN").await.unwrap().unwrap();
    dup.id = new_id();
    let err = db.branches().insert(&dup).await.unwrap_err();
    assert!(matches!(err, DbError::UniqueViolation { .. }), "{err:?}");
}

#[tokio::test]
async fn outbox_lifecycle_pending_synced_gc() {
    let db = test_db().await;
    let outbox = db.outbox();

    let a = outbox
        .enqueue(EntityKind::Customer, "c1", Operation::Create, None)
        .await
        .unwrap();
    let b = outbox
        .enqueue(EntityKind::Customer, "c1", Operation::Update, None)
        .await
        .unwrap();
    assert_eq!(outbox.count_pending().await.unwrap(), 2);

    // Failure: attempts incremented, rows stay PENDING, error recorded.
    outbox
        .record_failure(&[a.id.clone(), b.id.clone()], "server unreachable")
        .await
        .unwrap();
    let pending = outbox.pending().await.unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|e| e.attempts == 1));
    assert_eq!(
        pending[0].error_message.as_deref(),
        Some("server unreachable")
    );

    // Success: whole batch marked SYNCED, nothing pending.
    let synced_at = Utc::now();
    outbox
        .mark_synced(&[a.id.clone(), b.id.clone()], synced_at)
        .await
        .unwrap();
    assert_eq!(outbox.count_pending().await.unwrap(), 0);

    // GC removes SYNCED rows older than the cutoff.
    let removed = outbox
        .delete_synced_before(synced_at + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn same_entity_pending_rows_come_out_in_append_order() {
    let db = test_db().await;
    let outbox = db.outbox();

    for op in [Operation::Create, Operation::Update, Operation::Delete] {
        outbox
            .enqueue(EntityKind::Medicine, "m9", op, None)
            .await
            .unwrap();
        // Distinct created_at values even on a fast machine.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let ops: Vec<_> = outbox
        .pending()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.operation)
        .collect();
    assert_eq!(ops, vec![Operation::Create, Operation::Update, Operation::Delete]);
}

#[tokio::test]
async fn settings_upsert_round_trip() {
    let db = test_db().await;
    let settings = db.settings();

    assert_eq!(settings.get("sync.server_url").await.unwrap(), None);
    settings.set("sync.server_url", "https://cloud.apothek.dev").await.unwrap();
    settings.set("sync.server_url", "https://cloud2.apothek.dev").await.unwrap();
    assert_eq!(
        settings.get("sync.server_url").await.unwrap().as_deref(),
        Some("https://cloud2.apothek.dev")
    );

    settings.unset("sync.server_url").await.unwrap();
    assert_eq!(settings.get("sync.server_url").await.unwrap(), None);
}

#[tokio::test]
async fn customer_upsert_is_idempotent() {
    let db = test_db().await;
    let mut c = customer("c1", "Walk-in");
    db.customers().upsert(&c).await.unwrap();
    c.name = "Named".to_string();
    db.customers().upsert(&c).await.unwrap();

    let all = db.customers().list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "Named");
}

#[tokio::test]
async fn generic_fetch_reads_stored_medicine() {
    let db = test_db().await;
    db.medicines().insert(&medicine("m1", "Azithromycin", 5)).await.unwrap();

    // Read back through the generic surface to confirm what was stored.
    let row = db
        .fetch_optional(&Select::from("medicines").filter(Filter::eq("id", "m1")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.str("batch_number").unwrap(), "B-m1");
    assert_eq!(row.i64("quantity").unwrap(), 5);
    assert_eq!(row.f64("selling_price").unwrap(), 2.0);
}
