//! Clinic visit ledger database operations.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::inventory::like_pattern;
use super::{DbError, DbResult};
use crate::models::{ClinicVisit, DispensedItem, ItemType};

const VISIT_COLUMNS: &str = "id, subject, visited_at, notes, recorded_by, created_at";

/// Ledger of clinic visits and the items they dispensed.
///
/// Writes here never touch stock; the coordinator pairs them with
/// inventory changes inside one transaction scope.
pub struct VisitLedger<'a> {
    conn: &'a Connection,
}

impl<'a> VisitLedger<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert the visit row (without its lines) and return its id.
    pub(crate) fn insert_visit(&self, visit: &ClinicVisit) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO clinic_visits (subject, visited_at, notes, recorded_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                visit.subject,
                visit.visited_at,
                visit.notes,
                visit.recorded_by,
                visit.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn insert_line(&self, visit_id: i64, line: &DispensedItem) -> DbResult<i64> {
        self.conn.execute(
            "INSERT INTO dispensed_items (visit_id, item_name, item_type, quantity) VALUES (?, ?, ?, ?)",
            params![visit_id, line.item_name, line.item_type.as_str(), line.quantity],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Update subject, date and notes. Dispensed lines are not editable.
    pub(crate) fn update_visit(&self, visit: &ClinicVisit) -> DbResult<bool> {
        let id = visit
            .id
            .ok_or_else(|| DbError::Validation("visit id is required".into()))?;
        let rows_affected = self.conn.execute(
            "UPDATE clinic_visits SET subject = ?2, visited_at = ?3, notes = ?4 WHERE id = ?1",
            params![id, visit.subject, visit.visited_at, visit.notes],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a visit with its dispensed lines.
    pub fn get(&self, id: i64) -> DbResult<Option<ClinicVisit>> {
        let visit = self
            .conn
            .query_row(
                &format!("SELECT {} FROM clinic_visits WHERE id = ?", VISIT_COLUMNS),
                [id],
                visit_row,
            )
            .optional()?;

        match visit {
            Some(mut visit) => {
                visit.dispensed = self.lines(id)?;
                Ok(Some(visit))
            }
            None => Ok(None),
        }
    }

    /// Dispensed lines for a visit: medicines first, then entry order.
    pub fn lines(&self, visit_id: i64) -> DbResult<Vec<DispensedItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, visit_id, item_name, item_type, quantity
            FROM dispensed_items
            WHERE visit_id = ?
            ORDER BY CASE item_type WHEN 'medicine' THEN 0 ELSE 1 END, id
            "#,
        )?;
        let rows = stmt.query_map([visit_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut lines = Vec::new();
        for row in rows {
            let (id, visit_id, item_name, item_type, quantity) = row?;
            let item_type = ItemType::parse(&item_type)
                .ok_or_else(|| DbError::Constraint(format!("Unknown item type: {}", item_type)))?;
            lines.push(DispensedItem {
                id: Some(id),
                visit_id: Some(visit_id),
                item_name,
                item_type,
                quantity,
            });
        }
        Ok(lines)
    }

    /// All visits, most recent first.
    pub fn list(&self) -> DbResult<Vec<ClinicVisit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM clinic_visits ORDER BY visited_at DESC, id DESC",
            VISIT_COLUMNS
        ))?;
        let rows = stmt.query_map([], visit_row)?;
        self.with_lines(rows)
    }

    /// Visits whose subject contains `query`.
    pub fn search(&self, query: &str) -> DbResult<Vec<ClinicVisit>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM clinic_visits
            WHERE subject LIKE ? ESCAPE '\'
            ORDER BY visited_at DESC, id DESC
            "#,
            VISIT_COLUMNS
        ))?;
        let rows = stmt.query_map([like_pattern(query)], visit_row)?;
        self.with_lines(rows)
    }

    pub(crate) fn delete_lines(&self, visit_id: i64) -> DbResult<usize> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM dispensed_items WHERE visit_id = ?", [visit_id])?;
        Ok(rows_affected)
    }

    pub(crate) fn delete_visit(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM clinic_visits WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    fn with_lines(
        &self,
        rows: impl Iterator<Item = rusqlite::Result<ClinicVisit>>,
    ) -> DbResult<Vec<ClinicVisit>> {
        let mut visits = Vec::new();
        for row in rows {
            let mut visit = row?;
            if let Some(id) = visit.id {
                visit.dispensed = self.lines(id)?;
            }
            visits.push(visit);
        }
        Ok(visits)
    }
}

fn visit_row(row: &Row<'_>) -> rusqlite::Result<ClinicVisit> {
    Ok(ClinicVisit {
        id: row.get(0)?,
        subject: row.get(1)?,
        visited_at: row.get(2)?,
        notes: row.get(3)?,
        recorded_by: row.get(4)?,
        dispensed: Vec::new(),
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get_visit() {
        let db = setup_db();
        let ledger = VisitLedger::new(db.conn());

        let mut visit = ClinicVisit::new("Juan Dela Cruz", "nurse.ana");
        visit.notes = Some("Fever, 38.5C".into());
        let id = ledger.insert_visit(&visit).unwrap();
        ledger
            .insert_line(id, &DispensedItem::new("Gauze", ItemType::Supply, 2))
            .unwrap();
        ledger
            .insert_line(id, &DispensedItem::new("Paracetamol", ItemType::Medicine, 4))
            .unwrap();

        let retrieved = ledger.get(id).unwrap().unwrap();
        assert_eq!(retrieved.subject, "Juan Dela Cruz");
        assert_eq!(retrieved.notes, Some("Fever, 38.5C".into()));
        assert_eq!(retrieved.dispensed.len(), 2);
        // Medicines listed first regardless of entry order
        assert_eq!(retrieved.dispensed[0].item_name, "Paracetamol");
        assert_eq!(retrieved.dispensed[1].item_name, "Gauze");
        assert_eq!(retrieved.dispensed[0].visit_id, Some(id));
    }

    #[test]
    fn test_get_missing() {
        let db = setup_db();
        assert!(VisitLedger::new(db.conn()).get(999).unwrap().is_none());
    }

    #[test]
    fn test_update_visit() {
        let db = setup_db();
        let ledger = VisitLedger::new(db.conn());

        let mut visit = ClinicVisit::new("Maria", "nurse.ana");
        visit.id = Some(ledger.insert_visit(&visit).unwrap());
        visit.subject = "Maria Santos".into();
        assert!(ledger.update_visit(&visit).unwrap());

        let retrieved = ledger.get(visit.id.unwrap()).unwrap().unwrap();
        assert_eq!(retrieved.subject, "Maria Santos");

        visit.id = Some(500);
        assert!(!ledger.update_visit(&visit).unwrap());
    }

    #[test]
    fn test_search_and_list() {
        let db = setup_db();
        let ledger = VisitLedger::new(db.conn());

        ledger.insert_visit(&ClinicVisit::new("Maria Santos", "a")).unwrap();
        ledger.insert_visit(&ClinicVisit::new("Mario Reyes", "a")).unwrap();
        ledger.insert_visit(&ClinicVisit::new("Luz Garcia", "a")).unwrap();

        assert_eq!(ledger.list().unwrap().len(), 3);
        assert_eq!(ledger.search("Mari").unwrap().len(), 2);
        assert_eq!(ledger.search("garcia").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_lines_then_visit() {
        let db = setup_db();
        let ledger = VisitLedger::new(db.conn());

        let id = ledger.insert_visit(&ClinicVisit::new("Maria", "a")).unwrap();
        ledger
            .insert_line(id, &DispensedItem::new("Gauze", ItemType::Supply, 1))
            .unwrap();

        assert_eq!(ledger.delete_lines(id).unwrap(), 1);
        assert!(ledger.delete_visit(id).unwrap());
        assert!(ledger.get(id).unwrap().is_none());
        assert!(!ledger.delete_visit(id).unwrap());
    }
}
