//! Inventory item database operations.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::transactions::TransactionLog;
use super::{DbError, DbResult};
use crate::models::{InventoryItem, ItemKey, ItemType, NewTransaction, TransactionRecord, TransactionType};

const ITEM_COLUMNS: &str = "id, name, item_type, category_id, supplier_id, stock, unit, \
                            reorder_level, created_at, updated_at";

/// Outcome of a stock mutation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockChange {
    pub item_id: i64,
    pub item_name: String,
    pub item_type: ItemType,
    pub previous_stock: i64,
    pub new_stock: i64,
    /// Audit record written for the change (`None` for a zero delta)
    pub record: Option<TransactionRecord>,
}

/// Inventory store: the only place stock is written.
pub struct Inventory<'a> {
    conn: &'a Connection,
}

impl<'a> Inventory<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Get an item by id.
    pub fn get(&self, id: i64) -> DbResult<Option<InventoryItem>> {
        self.get_by_key(&ItemKey::Id(id))
    }

    /// Get an item by id or by (name, type).
    pub fn get_by_key(&self, key: &ItemKey) -> DbResult<Option<InventoryItem>> {
        let row = match key {
            ItemKey::Id(id) => self
                .conn
                .query_row(
                    &format!("SELECT {} FROM inventory_items WHERE id = ?", ITEM_COLUMNS),
                    [id],
                    item_row,
                )
                .optional()?,
            ItemKey::Name { name, item_type } => self
                .conn
                .query_row(
                    &format!(
                        "SELECT {} FROM inventory_items WHERE name = ? AND item_type = ?",
                        ITEM_COLUMNS
                    ),
                    params![name, item_type.as_str()],
                    item_row,
                )
                .optional()?,
        };
        row.map(|r| r.try_into()).transpose()
    }

    /// Search items whose name contains `query` (so prefixes match too).
    pub fn search(&self, query: &str, item_type: Option<ItemType>) -> DbResult<Vec<InventoryItem>> {
        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM inventory_items
            WHERE name LIKE ?1 ESCAPE '\'
            AND (?2 IS NULL OR item_type = ?2)
            ORDER BY name
            "#,
            ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern, item_type.map(|t| t.as_str())], item_row)?;
        collect_items(rows)
    }

    /// List all items, optionally of one type.
    pub fn list(&self, item_type: Option<ItemType>) -> DbResult<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM inventory_items WHERE (?1 IS NULL OR item_type = ?1) ORDER BY name",
            ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![item_type.map(|t| t.as_str())], item_row)?;
        collect_items(rows)
    }

    /// Items at or below their reorder level.
    pub fn low_stock(&self, item_type: Option<ItemType>) -> DbResult<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM inventory_items
            WHERE stock <= reorder_level
            AND (?1 IS NULL OR item_type = ?1)
            ORDER BY stock, name
            "#,
            ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![item_type.map(|t| t.as_str())], item_row)?;
        collect_items(rows)
    }

    /// Create (no id) or fully update (id) an item's descriptive fields.
    ///
    /// Stock is never written here: new rows start at zero and updates leave
    /// the stored value alone. Stock moves only through [`Inventory::apply_change`].
    pub fn upsert(&self, item: &InventoryItem) -> DbResult<InventoryItem> {
        let name = item.name.trim();
        if name.is_empty() {
            return Err(DbError::Validation("name is required".into()));
        }
        if item.reorder_level < 0 {
            return Err(DbError::Validation("reorderLevel must not be negative".into()));
        }
        self.check_references(item)?;

        let taken: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM inventory_items WHERE name = ? AND item_type = ? AND id IS NOT ?",
                params![name, item.item_type.as_str(), item.id],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(DbError::Validation(format!(
                "{} '{}' already exists",
                item.item_type.as_str(),
                name
            )));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let id = match item.id {
            None => {
                self.conn.execute(
                    r#"
                    INSERT INTO inventory_items (
                        name, item_type, category_id, supplier_id, stock,
                        unit, reorder_level, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7, ?7)
                    "#,
                    params![
                        name,
                        item.item_type.as_str(),
                        item.category_id,
                        item.supplier_id,
                        item.unit,
                        item.reorder_level,
                        now,
                    ],
                )?;
                self.conn.last_insert_rowid()
            }
            Some(id) => {
                let rows_affected = self.conn.execute(
                    r#"
                    UPDATE inventory_items SET
                        name = ?2,
                        item_type = ?3,
                        category_id = ?4,
                        supplier_id = ?5,
                        unit = ?6,
                        reorder_level = ?7,
                        updated_at = ?8
                    WHERE id = ?1
                    "#,
                    params![
                        id,
                        name,
                        item.item_type.as_str(),
                        item.category_id,
                        item.supplier_id,
                        item.unit,
                        item.reorder_level,
                        now,
                    ],
                )?;
                if rows_affected == 0 {
                    return Err(DbError::NotFound(format!("item #{}", id)));
                }
                id
            }
        };

        self.get(id)?
            .ok_or_else(|| DbError::NotFound(format!("item #{}", id)))
    }

    /// Delete an item.
    ///
    /// Dispensed lines and audit records keep name snapshots rather than
    /// references, so no usage guard applies to items themselves.
    pub fn delete(&self, id: i64) -> DbResult<()> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM inventory_items WHERE id = ?", [id])?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("item #{}", id)));
        }
        Ok(())
    }

    /// Apply `delta` to an item's stock and append the matching audit record.
    ///
    /// The stock write is a single conditional `UPDATE`, so the check and the
    /// write cannot be separated by another writer. When the delta would make
    /// stock negative nothing is written and `InsufficientStock` is returned.
    ///
    /// Must run inside a [`super::TxScope`]: the update and the audit append
    /// become visible together only when the scope commits.
    pub(crate) fn apply_change(
        &self,
        key: &ItemKey,
        delta: i64,
        transaction_type: TransactionType,
        reason: &str,
        actor: &str,
    ) -> DbResult<StockChange> {
        let Some(requested) = delta.checked_neg() else {
            return Err(DbError::Validation(format!("stock delta {} is out of range", delta)));
        };
        if delta == 0 {
            let item = self
                .get_by_key(key)?
                .ok_or_else(|| DbError::NotFound(key.to_string()))?;
            return Ok(StockChange {
                item_id: item.id.unwrap_or_default(),
                item_name: item.name,
                item_type: item.item_type,
                previous_stock: item.stock,
                new_stock: item.stock,
                record: None,
            });
        }

        let now = chrono::Utc::now().to_rfc3339();
        let updated = match key {
            ItemKey::Id(id) => self
                .conn
                .query_row(
                    r#"
                    UPDATE inventory_items
                    SET stock = stock + ?1, updated_at = ?2
                    WHERE id = ?3 AND stock + ?1 >= 0
                    AND (?1 <= 0 OR stock <= 9223372036854775807 - ?1)
                    RETURNING id, name, item_type, stock
                    "#,
                    params![delta, now, id],
                    updated_row,
                )
                .optional()?,
            ItemKey::Name { name, item_type } => self
                .conn
                .query_row(
                    r#"
                    UPDATE inventory_items
                    SET stock = stock + ?1, updated_at = ?2
                    WHERE name = ?3 AND item_type = ?4 AND stock + ?1 >= 0
                    AND (?1 <= 0 OR stock <= 9223372036854775807 - ?1)
                    RETURNING id, name, item_type, stock
                    "#,
                    params![delta, now, name, item_type.as_str()],
                    updated_row,
                )
                .optional()?,
        };

        let Some((item_id, item_name, item_type, new_stock)) = updated else {
            // Nothing changed: tell a missing item apart from a rejected delta.
            return match self.get_by_key(key)? {
                None => Err(DbError::NotFound(key.to_string())),
                Some(item) if delta > 0 => Err(DbError::Validation(format!(
                    "adding {} to '{}' exceeds the largest storable stock",
                    delta, item.name
                ))),
                Some(item) => Err(DbError::InsufficientStock {
                    item: item.name,
                    available: item.stock,
                    requested,
                }),
            };
        };
        let item_type = ItemType::parse(&item_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown item type: {}", item_type)))?;

        let record = TransactionLog::new(self.conn).append(&NewTransaction {
            transaction_type,
            item_type,
            item_id,
            item_name: item_name.clone(),
            quantity: delta.abs(),
            previous_stock: new_stock - delta,
            new_stock,
            reason: reason.to_string(),
            actor: actor.to_string(),
            created_at: now,
        })?;

        Ok(StockChange {
            item_id,
            item_name,
            item_type,
            previous_stock: new_stock - delta,
            new_stock,
            record: Some(record),
        })
    }

    fn check_references(&self, item: &InventoryItem) -> DbResult<()> {
        if let Some(category_id) = item.category_id {
            let category_type: Option<String> = self
                .conn
                .query_row(
                    "SELECT item_type FROM categories WHERE id = ?",
                    [category_id],
                    |row| row.get(0),
                )
                .optional()?;
            match category_type {
                None => {
                    return Err(DbError::Validation(format!(
                        "category #{} does not exist",
                        category_id
                    )))
                }
                Some(t) if t != item.item_type.as_str() => {
                    return Err(DbError::Validation(format!(
                        "category #{} is a {} category",
                        category_id, t
                    )))
                }
                Some(_) => {}
            }
        }

        if let Some(supplier_id) = item.supplier_id {
            let exists: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM suppliers WHERE id = ?)",
                [supplier_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(DbError::Validation(format!(
                    "supplier #{} does not exist",
                    supplier_id
                )));
            }
        }
        Ok(())
    }
}

/// Build a `LIKE` pattern matching `query` anywhere, with wildcards escaped.
pub(crate) fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Intermediate row struct for database mapping.
struct ItemRow {
    id: i64,
    name: String,
    item_type: String,
    category_id: Option<i64>,
    supplier_id: Option<i64>,
    stock: i64,
    unit: String,
    reorder_level: i64,
    created_at: String,
    updated_at: String,
}

fn item_row(row: &Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        id: row.get(0)?,
        name: row.get(1)?,
        item_type: row.get(2)?,
        category_id: row.get(3)?,
        supplier_id: row.get(4)?,
        stock: row.get(5)?,
        unit: row.get(6)?,
        reorder_level: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn updated_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn collect_items(
    rows: impl Iterator<Item = rusqlite::Result<ItemRow>>,
) -> DbResult<Vec<InventoryItem>> {
    let mut items = Vec::new();
    for row in rows {
        items.push(row?.try_into()?);
    }
    Ok(items)
}

impl TryFrom<ItemRow> for InventoryItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let item_type = ItemType::parse(&row.item_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown item type: {}", row.item_type)))?;
        Ok(InventoryItem {
            id: Some(row.id),
            name: row.name,
            item_type,
            category_id: row.category_id,
            supplier_id: row.supplier_id,
            stock: row.stock,
            unit: row.unit,
            reorder_level: row.reorder_level,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
