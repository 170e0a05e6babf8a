//! Consistency coordinator integration tests.

use clinic_inventory_core::coordinator::{Coordinator, DISPENSE_REASON, REVERSAL_REASON};
use clinic_inventory_core::db::{Database, DbError, Inventory, TransactionLog, VisitLedger};
use clinic_inventory_core::models::{
    ClinicVisit, DispensedItem, InventoryItem, ItemKey, ItemType, TransactionFilter,
    TransactionType,
};

fn stock_item(db: &mut Database, name: &str, item_type: ItemType, stock: i64) -> i64 {
    let mut item = InventoryItem::new(name, item_type);
    item.stock = stock;
    Coordinator::new(db)
        .save_item(&item, "pharmacist")
        .unwrap()
        .id
        .unwrap()
}

fn stock_of(db: &Database, id: i64) -> i64 {
    Inventory::new(db.conn()).get(id).unwrap().unwrap().stock
}

fn record_count(db: &Database) -> usize {
    TransactionLog::new(db.conn())
        .list(&TransactionFilter::default())
        .unwrap()
        .len()
}

fn count_rows(db: &Database, table: &str) -> i64 {
    db.conn()
        .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

fn visit_with(lines: Vec<DispensedItem>) -> ClinicVisit {
    let mut visit = ClinicVisit::new("Maria Santos", "nurse.ana");
    visit.dispensed = lines;
    visit
}

#[test]
fn test_dispense_and_retract_restores_stock() {
    let mut db = Database::open_in_memory().unwrap();
    let id = stock_item(&mut db, "Paracetamol", ItemType::Medicine, 10);

    let visit = visit_with(vec![DispensedItem::new("Paracetamol", ItemType::Medicine, 4)]);
    let saved = Coordinator::new(&mut db)
        .create_visit(&visit, "nurse.ana")
        .unwrap();
    assert_eq!(stock_of(&db, id), 6);

    let out = TransactionLog::new(db.conn()).latest_for_item(id).unwrap().unwrap();
    assert_eq!(out.transaction_type, TransactionType::StockOut);
    assert_eq!(out.quantity, 4);
    assert_eq!(out.previous_stock, 10);
    assert_eq!(out.new_stock, 6);
    assert_eq!(out.reason, DISPENSE_REASON);
    assert_eq!(out.actor, "nurse.ana");

    let visit_id = saved.id.unwrap();
    Coordinator::new(&mut db)
        .delete_visit(visit_id, "nurse.ana")
        .unwrap();
    assert_eq!(stock_of(&db, id), 10);

    let back = TransactionLog::new(db.conn()).latest_for_item(id).unwrap().unwrap();
    assert_eq!(back.transaction_type, TransactionType::StockIn);
    assert_eq!(back.quantity, 4);
    assert_eq!(back.previous_stock, 6);
    assert_eq!(back.new_stock, 10);
    assert_eq!(back.reason, REVERSAL_REASON);

    assert!(VisitLedger::new(db.conn()).lines(visit_id).unwrap().is_empty());
    assert_eq!(count_rows(&db, "dispensed_items"), 0);
}

#[test]
fn test_round_trip_leaves_ledger_empty() {
    let mut db = Database::open_in_memory().unwrap();
    let items = [
        stock_item(&mut db, "Paracetamol", ItemType::Medicine, 20),
        stock_item(&mut db, "Amoxicillin", ItemType::Medicine, 8),
        stock_item(&mut db, "Gauze", ItemType::Supply, 15),
        stock_item(&mut db, "Syringe 5mL", ItemType::Supply, 3),
    ];
    let before: Vec<i64> = items.iter().map(|&id| stock_of(&db, id)).collect();

    let visit = visit_with(vec![
        DispensedItem::new("Gauze", ItemType::Supply, 5),
        DispensedItem::new("Paracetamol", ItemType::Medicine, 6),
        DispensedItem::new("Syringe 5mL", ItemType::Supply, 3),
        DispensedItem::new("Amoxicillin", ItemType::Medicine, 1),
        // Same item twice on one visit
        DispensedItem::new("Paracetamol", ItemType::Medicine, 2),
    ]);

    let mut coordinator = Coordinator::new(&mut db);
    let saved = coordinator.create_visit(&visit, "nurse.ana").unwrap();
    let outcome = coordinator
        .delete_visit(saved.id.unwrap(), "nurse.ana")
        .unwrap();
    assert_eq!(outcome.restored.len(), 5);
    assert!(outcome.skipped.is_empty());

    let after: Vec<i64> = items.iter().map(|&id| stock_of(&db, id)).collect();
    assert_eq!(before, after);
    assert!(VisitLedger::new(db.conn()).list().unwrap().is_empty());
    assert_eq!(count_rows(&db, "dispensed_items"), 0);
}

#[test]
fn test_failing_line_rolls_back_whole_visit() {
    let mut db = Database::open_in_memory().unwrap();
    let first = stock_item(&mut db, "Paracetamol", ItemType::Medicine, 10);
    let second = stock_item(&mut db, "Amoxicillin", ItemType::Medicine, 10);
    let scarce = stock_item(&mut db, "Ibuprofen", ItemType::Medicine, 1);
    let records_before = record_count(&db);

    // The third line asks for more than is on hand.
    let visit = visit_with(vec![
        DispensedItem::new("Paracetamol", ItemType::Medicine, 3),
        DispensedItem::new("Amoxicillin", ItemType::Medicine, 2),
        DispensedItem::new("Ibuprofen", ItemType::Medicine, 5),
    ]);
    let err = Coordinator::new(&mut db)
        .create_visit(&visit, "nurse.ana")
        .unwrap_err();

    match err {
        DbError::InsufficientStock {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, 1);
            assert_eq!(requested, 5);
        }
        other => panic!("expected InsufficientStock, got {:?}", other),
    }

    assert_eq!(stock_of(&db, first), 10);
    assert_eq!(stock_of(&db, second), 10);
    assert_eq!(stock_of(&db, scarce), 1);
    assert_eq!(count_rows(&db, "clinic_visits"), 0);
    assert_eq!(count_rows(&db, "dispensed_items"), 0);
    assert_eq!(record_count(&db), records_before);
}

#[test]
fn test_missing_item_mid_visit_rolls_back() {
    let mut db = Database::open_in_memory().unwrap();
    let gauze = stock_item(&mut db, "Gauze", ItemType::Supply, 10);

    let visit = visit_with(vec![
        DispensedItem::new("Gauze", ItemType::Supply, 2),
        // Exists only as a medicine name, never as a supply
        DispensedItem::new("Paracetamol", ItemType::Supply, 1),
    ]);
    let err = Coordinator::new(&mut db)
        .create_visit(&visit, "nurse.ana")
        .unwrap_err();

    assert!(matches!(err, DbError::Validation(_)));
    assert_eq!(stock_of(&db, gauze), 10);
    assert_eq!(count_rows(&db, "clinic_visits"), 0);
}

#[test]
fn test_delete_missing_visit_changes_nothing() {
    let mut db = Database::open_in_memory().unwrap();
    let id = stock_item(&mut db, "Gauze", ItemType::Supply, 10);
    let records_before = record_count(&db);

    let err = Coordinator::new(&mut db)
        .delete_visit(999, "nurse.ana")
        .unwrap_err();

    assert!(matches!(err, DbError::NotFound(_)));
    assert_eq!(err.kind().status(), 404);
    assert_eq!(stock_of(&db, id), 10);
    assert_eq!(record_count(&db), records_before);
}

#[test]
fn test_restoration_skips_removed_item() {
    let mut db = Database::open_in_memory().unwrap();
    let kept = stock_item(&mut db, "Paracetamol", ItemType::Medicine, 10);
    let removed = stock_item(&mut db, "Bandage", ItemType::Supply, 4);

    let visit = visit_with(vec![
        DispensedItem::new("Paracetamol", ItemType::Medicine, 2),
        DispensedItem::new("Bandage", ItemType::Supply, 1),
    ]);
    let saved = Coordinator::new(&mut db)
        .create_visit(&visit, "nurse.ana")
        .unwrap();

    Coordinator::new(&mut db).delete_item(removed).unwrap();

    let outcome = Coordinator::new(&mut db)
        .delete_visit(saved.id.unwrap(), "nurse.ana")
        .unwrap();
    assert_eq!(outcome.restored.len(), 1);
    assert_eq!(outcome.restored[0].item_id, kept);
    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].item_name, "Bandage");

    assert_eq!(stock_of(&db, kept), 10);
    assert!(VisitLedger::new(db.conn())
        .get(saved.id.unwrap())
        .unwrap()
        .is_none());
}

#[test]
fn test_restoration_follows_snapshot_name() {
    let mut db = Database::open_in_memory().unwrap();
    let original = stock_item(&mut db, "Gauze", ItemType::Supply, 10);

    let visit = visit_with(vec![DispensedItem::new("Gauze", ItemType::Supply, 3)]);
    let saved = Coordinator::new(&mut db)
        .create_visit(&visit, "nurse.ana")
        .unwrap();

    // Rename the original and stock a new item under the old name.
    let mut item = Inventory::new(db.conn()).get(original).unwrap().unwrap();
    item.name = "Gauze (old stock)".into();
    Coordinator::new(&mut db).update_item_details(&item).unwrap();
    let replacement = stock_item(&mut db, "Gauze", ItemType::Supply, 5);

    // The stored line still reads "Gauze".
    let stored = VisitLedger::new(db.conn())
        .get(saved.id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(stored.dispensed[0].item_name, "Gauze");

    Coordinator::new(&mut db)
        .delete_visit(saved.id.unwrap(), "nurse.ana")
        .unwrap();
    assert_eq!(stock_of(&db, original), 7);
    assert_eq!(stock_of(&db, replacement), 8);
}

#[test]
fn test_audit_trail_stays_consistent() {
    let mut db = Database::open_in_memory().unwrap();
    let med = stock_item(&mut db, "Paracetamol", ItemType::Medicine, 30);
    let sup = stock_item(&mut db, "Gauze", ItemType::Supply, 12);
    stock_item(&mut db, "Never stocked", ItemType::Supply, 0);

    let mut coordinator = Coordinator::new(&mut db);
    let first = coordinator
        .create_visit(
            &visit_with(vec![
                DispensedItem::new("Paracetamol", ItemType::Medicine, 5),
                DispensedItem::new("Gauze", ItemType::Supply, 2),
            ]),
            "nurse.ana",
        )
        .unwrap();
    coordinator
        .create_visit(
            &visit_with(vec![DispensedItem::new("Gauze", ItemType::Supply, 20)]),
            "nurse.ana",
        )
        .unwrap_err();
    coordinator
        .apply_delta(&ItemKey::Id(sup), 24, "delivery", "pharmacist")
        .unwrap();
    coordinator
        .adjust_stock(&ItemKey::Id(med), -1, "broken blister", "pharmacist")
        .unwrap();
    coordinator
        .delete_visit(first.id.unwrap(), "nurse.ana")
        .unwrap();

    assert!(coordinator.reconcile().unwrap().is_empty());
    drop(coordinator);

    assert_eq!(stock_of(&db, med), 29);
    assert_eq!(stock_of(&db, sup), 36);

    let log = TransactionLog::new(db.conn());
    let report = log.verify_chain().unwrap();
    assert!(report.is_intact());
    // 2 opening balances, 2 dispensed, 1 delivery, 1 adjustment, 2 reversals
    assert_eq!(report.checked, 8);

    let adjustments = log
        .list(&TransactionFilter {
            transaction_type: Some(TransactionType::Adjustment),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].new_stock, 29);
}
