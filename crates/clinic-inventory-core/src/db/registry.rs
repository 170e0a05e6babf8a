//! Category and supplier database operations.

use rusqlite::{params, Connection, OptionalExtension};

use super::inventory::like_pattern;
use super::{DbError, DbResult};
use crate::models::{Category, ItemType, Supplier};

/// Reference tables that inventory items point at.
///
/// Both share the same usage-guarded delete; the variant picks the table and
/// the referencing column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    Category,
    Supplier,
}

impl RegistryKind {
    pub fn entity(&self) -> &'static str {
        match self {
            RegistryKind::Category => "category",
            RegistryKind::Supplier => "supplier",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            RegistryKind::Category => "categories",
            RegistryKind::Supplier => "suppliers",
        }
    }

    fn usage_column(&self) -> &'static str {
        match self {
            RegistryKind::Category => "category_id",
            RegistryKind::Supplier => "supplier_id",
        }
    }

    /// Number of inventory items referencing `id`.
    pub fn usage_count(&self, conn: &Connection, id: i64) -> DbResult<i64> {
        let count = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM inventory_items WHERE {} = ?",
                self.usage_column()
            ),
            [id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete row `id` unless an inventory item still references it.
    pub fn delete(&self, conn: &Connection, id: i64) -> DbResult<()> {
        let exists: bool = conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", self.table()),
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::NotFound(format!("{} #{}", self.entity(), id)));
        }

        let count = self.usage_count(conn, id)?;
        if count > 0 {
            return Err(DbError::UsageConflict {
                entity: self.entity(),
                id,
                count,
            });
        }

        conn.execute(&format!("DELETE FROM {} WHERE id = ?", self.table()), [id])?;
        Ok(())
    }
}

/// Category registry.
pub struct Categories<'a> {
    conn: &'a Connection,
}

impl<'a> Categories<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: i64) -> DbResult<Option<Category>> {
        let row: Option<(i64, String, String)> = self
            .conn
            .query_row(
                "SELECT id, item_type, name FROM categories WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(category_from_row).transpose()
    }

    /// List categories, optionally of one item type.
    pub fn list(&self, item_type: Option<ItemType>) -> DbResult<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, item_type, name FROM categories WHERE (?1 IS NULL OR item_type = ?1) ORDER BY name",
        )?;
        let rows = stmt.query_map(params![item_type.map(|t| t.as_str())], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(category_from_row(row?)?);
        }
        Ok(categories)
    }

    pub fn search(&self, query: &str) -> DbResult<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, item_type, name FROM categories
            WHERE name LIKE ? ESCAPE '\'
            ORDER BY name
            "#,
        )?;
        let rows = stmt.query_map([like_pattern(query)], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(category_from_row(row?)?);
        }
        Ok(categories)
    }

    /// Create (no id) or rename/retype (id) a category.
    pub fn upsert(&self, category: &Category) -> DbResult<Category> {
        let name = category.name.trim();
        if name.is_empty() {
            return Err(DbError::Validation("name is required".into()));
        }

        let id = match category.id {
            None => {
                self.conn.execute(
                    "INSERT INTO categories (item_type, name) VALUES (?, ?)",
                    params![category.item_type.as_str(), name],
                )?;
                self.conn.last_insert_rowid()
            }
            Some(id) => {
                // Renames are free; changing the type would orphan items of the old type.
                let current = self
                    .get(id)?
                    .ok_or_else(|| DbError::NotFound(format!("category #{}", id)))?;
                if current.item_type != category.item_type
                    && RegistryKind::Category.usage_count(self.conn, id)? > 0
                {
                    return Err(DbError::Validation(format!(
                        "category #{} is in use and cannot change item type",
                        id
                    )));
                }
                let rows_affected = self.conn.execute(
                    "UPDATE categories SET item_type = ?2, name = ?3 WHERE id = ?1",
                    params![id, category.item_type.as_str(), name],
                )?;
                if rows_affected == 0 {
                    return Err(DbError::NotFound(format!("category #{}", id)));
                }
                id
            }
        };

        self.get(id)?
            .ok_or_else(|| DbError::NotFound(format!("category #{}", id)))
    }

    pub fn delete(&self, id: i64) -> DbResult<()> {
        RegistryKind::Category.delete(self.conn, id)
    }
}

fn category_from_row((id, item_type, name): (i64, String, String)) -> DbResult<Category> {
    let item_type = ItemType::parse(&item_type)
        .ok_or_else(|| DbError::Constraint(format!("Unknown item type: {}", item_type)))?;
    Ok(Category {
        id: Some(id),
        item_type,
        name,
    })
}

/// Supplier registry.
pub struct Suppliers<'a> {
    conn: &'a Connection,
}

impl<'a> Suppliers<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: i64) -> DbResult<Option<Supplier>> {
        self.conn
            .query_row(
                "SELECT id, name, contact FROM suppliers WHERE id = ?",
                [id],
                |row| {
                    Ok(Supplier {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        contact: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn list(&self) -> DbResult<Vec<Supplier>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, contact FROM suppliers ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Supplier {
                id: row.get(0)?,
                name: row.get(1)?,
                contact: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn search(&self, query: &str) -> DbResult<Vec<Supplier>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, contact FROM suppliers
            WHERE name LIKE ? ESCAPE '\'
            ORDER BY name
            "#,
        )?;
        let rows = stmt.query_map([like_pattern(query)], |row| {
            Ok(Supplier {
                id: row.get(0)?,
                name: row.get(1)?,
                contact: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Create (no id) or update (id) a supplier.
    pub fn upsert(&self, supplier: &Supplier) -> DbResult<Supplier> {
        let name = supplier.name.trim();
        if name.is_empty() {
            return Err(DbError::Validation("name is required".into()));
        }

        let id = match supplier.id {
            None => {
                self.conn.execute(
                    "INSERT INTO suppliers (name, contact) VALUES (?, ?)",
                    params![name, supplier.contact],
                )?;
                self.conn.last_insert_rowid()
            }
            Some(id) => {
                let rows_affected = self.conn.execute(
                    "UPDATE suppliers SET name = ?2, contact = ?3 WHERE id = ?1",
                    params![id, name, supplier.contact],
                )?;
                if rows_affected == 0 {
                    return Err(DbError::NotFound(format!("supplier #{}", id)));
                }
                id
            }
        };

        self.get(id)?
            .ok_or_else(|| DbError::NotFound(format!("supplier #{}", id)))
    }

    pub fn delete(&self, id: i64) -> DbResult<()> {
        RegistryKind::Supplier.delete(self.conn, id)
    }
}
