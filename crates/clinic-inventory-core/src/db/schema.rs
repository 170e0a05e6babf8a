//! SQLite schema definition.

/// Complete database schema for the clinic inventory engine.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Reference Data
-- ============================================================================

CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_type TEXT NOT NULL CHECK (item_type IN ('medicine', 'supply')),
    name TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_categories_type ON categories(item_type);

CREATE TABLE IF NOT EXISTS suppliers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    contact TEXT
);

-- ============================================================================
-- Inventory Items
-- ============================================================================

CREATE TABLE IF NOT EXISTS inventory_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    item_type TEXT NOT NULL CHECK (item_type IN ('medicine', 'supply')),
    category_id INTEGER REFERENCES categories(id),
    supplier_id INTEGER REFERENCES suppliers(id),
    stock INTEGER NOT NULL DEFAULT 0 CHECK (stock >= 0),
    unit TEXT NOT NULL DEFAULT 'unit',
    reorder_level INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (name, item_type)
);

CREATE INDEX IF NOT EXISTS idx_items_category ON inventory_items(category_id);
CREATE INDEX IF NOT EXISTS idx_items_supplier ON inventory_items(supplier_id);

-- ============================================================================
-- Clinic Visits
-- ============================================================================

CREATE TABLE IF NOT EXISTS clinic_visits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subject TEXT NOT NULL,
    visited_at TEXT NOT NULL,
    notes TEXT,
    recorded_by TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_visits_subject ON clinic_visits(subject);

-- Name/type snapshot, deliberately not a foreign key to inventory_items
CREATE TABLE IF NOT EXISTS dispensed_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    visit_id INTEGER NOT NULL REFERENCES clinic_visits(id),
    item_name TEXT NOT NULL,
    item_type TEXT NOT NULL CHECK (item_type IN ('medicine', 'supply')),
    quantity INTEGER NOT NULL CHECK (quantity > 0)
);

CREATE INDEX IF NOT EXISTS idx_dispensed_visit ON dispensed_items(visit_id);

-- ============================================================================
-- Stock Transactions (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock_transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transaction_type TEXT NOT NULL CHECK (transaction_type IN ('stock_in', 'stock_out', 'adjustment')),
    item_type TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    item_name TEXT NOT NULL,
    quantity INTEGER NOT NULL CHECK (quantity >= 0),
    previous_stock INTEGER NOT NULL,
    new_stock INTEGER NOT NULL CHECK (new_stock >= 0),
    reason TEXT NOT NULL,
    actor TEXT NOT NULL,
    created_at TEXT NOT NULL,
    prev_hash TEXT NOT NULL,
    hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_transactions_item ON stock_transactions(item_id);

CREATE TRIGGER IF NOT EXISTS stock_transactions_no_update BEFORE UPDATE ON stock_transactions
BEGIN
    SELECT RAISE(ABORT, 'Stock transactions are append-only');
END;

CREATE TRIGGER IF NOT EXISTS stock_transactions_no_delete BEFORE DELETE ON stock_transactions
BEGIN
    SELECT RAISE(ABORT, 'Stock transactions are append-only');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_negative_stock_rejected_by_check() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO inventory_items (name, item_type, stock) VALUES ('Gauze', 'supply', -1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_transactions_append_only() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            r#"
            INSERT INTO stock_transactions (
                transaction_type, item_type, item_id, item_name, quantity,
                previous_stock, new_stock, reason, actor, created_at, prev_hash, hash
            ) VALUES ('stock_in', 'supply', 1, 'Gauze', 5, 0, 5, 'restock', 'nurse', 'now', '', 'h1')
            "#,
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE stock_transactions SET quantity = 1", [])
            .is_err());
        assert!(conn.execute("DELETE FROM stock_transactions", []).is_err());
    }

    #[test]
    fn test_dispensed_requires_visit() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO dispensed_items (visit_id, item_name, item_type, quantity) VALUES (42, 'Gauze', 'supply', 1)",
            [],
        );
        assert!(result.is_err());
    }
}
