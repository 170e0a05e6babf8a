//! Consistency coordinator.
//!
//! Every multi-step mutation runs here inside one [`TxScope`]: the visit
//! rows, the stock changes they imply, and the audit records for those
//! changes commit together or not at all.
//!
//! ```text
//!  create_visit                          delete_visit
//!  ────────────                          ────────────
//!  BEGIN IMMEDIATE                       BEGIN IMMEDIATE
//!  insert visit                          load visit ── absent ──► NotFound
//!  for line (medicines, then supplies):  for line:
//!     insert line                           stock += qty (stock_in)
//!     stock -= qty (stock_out)              └─ item gone ──► skip line
//!     └─ would go negative ──► ROLLBACK  delete lines, delete visit
//!  COMMIT                                COMMIT
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{
    Categories, Database, DbError, DbResult, Inventory, StockChange, Suppliers, TransactionLog,
    TxScope, VisitLedger,
};
use crate::models::{
    sort_dispensed, Category, ClinicVisit, DispensedItem, InventoryItem, ItemKey, Supplier,
    TransactionType,
};

/// Reason recorded on stock_out entries written by a visit.
pub const DISPENSE_REASON: &str = "dispensed";
/// Reason recorded on stock_in entries written when a visit is retracted.
pub const REVERSAL_REASON: &str = "log deletion reversal";
/// Reason recorded for the opening balance of a new item.
pub const INITIAL_STOCK_REASON: &str = "initial stock";
/// Reason recorded when an item update sets a different stock level.
pub const MANUAL_ADJUSTMENT_REASON: &str = "manual adjustment";

/// What a visit deletion did to inventory.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVisitOutcome {
    pub visit_id: i64,
    /// Stock restored per dispensed line
    pub restored: Vec<StockChange>,
    /// Lines whose item no longer exists under the dispensed name
    pub skipped: Vec<DispensedItem>,
}

/// An item whose live stock differs from its latest audit record.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockDivergence {
    pub item_id: i64,
    pub item_name: String,
    pub stock: i64,
    /// `newStock` of the latest record (`None` if the item has no records)
    pub ledger_stock: Option<i64>,
}

/// Orchestrates atomic operations across inventory, visits and the audit log.
pub struct Coordinator<'a> {
    db: &'a mut Database,
}

impl<'a> Coordinator<'a> {
    pub fn new(db: &'a mut Database) -> Self {
        Self { db }
    }

    /// Run `f` in a fresh scope: commit on `Ok`, roll back on `Err`.
    fn in_scope<T>(&mut self, f: impl FnOnce(&TxScope<'_>) -> DbResult<T>) -> DbResult<T> {
        let tx = self.db.begin()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.abort() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    // =========================================================================
    // Visits
    // =========================================================================

    /// Record a visit and dispense its lines.
    ///
    /// If any line cannot be dispensed, nothing is persisted: no visit row,
    /// no lines, no stock change and no audit record.
    pub fn create_visit(&mut self, visit: &ClinicVisit, actor: &str) -> DbResult<ClinicVisit> {
        validate_visit(visit)?;
        for line in &visit.dispensed {
            validate_line(line)?;
        }

        let mut lines = visit.dispensed.clone();
        sort_dispensed(&mut lines);

        let saved = self.in_scope(|tx| {
            let ledger = VisitLedger::new(tx.conn());
            let inventory = Inventory::new(tx.conn());

            let visit_id = ledger.insert_visit(visit)?;
            for line in &lines {
                ledger.insert_line(visit_id, line)?;
                let change = inventory
                    .apply_change(
                        &line.item_key(),
                        -line.quantity,
                        TransactionType::StockOut,
                        DISPENSE_REASON,
                        actor,
                    )
                    .map_err(|err| match err {
                        // The visit names an item that is not stocked: a bad
                        // request, not a missing visit.
                        DbError::NotFound(key) => {
                            DbError::Validation(format!("{} is not in inventory", key))
                        }
                        other => other,
                    })?;
                debug!(
                    item_id = change.item_id,
                    previous = change.previous_stock,
                    new = change.new_stock,
                    "dispensed"
                );
            }

            ledger
                .get(visit_id)?
                .ok_or_else(|| DbError::NotFound(format!("visit #{}", visit_id)))
        })?;

        info!(
            visit_id = saved.id,
            lines = saved.dispensed.len(),
            actor,
            "visit recorded"
        );
        Ok(saved)
    }

    /// Retract a visit, restoring the stock it dispensed.
    ///
    /// Restoration finds items by the line's name/type snapshot. A line whose
    /// item no longer exists under that name is skipped (and reported in the
    /// outcome) rather than blocking the deletion.
    pub fn delete_visit(&mut self, visit_id: i64, actor: &str) -> DbResult<DeleteVisitOutcome> {
        let outcome = self.in_scope(|tx| {
            let ledger = VisitLedger::new(tx.conn());
            let inventory = Inventory::new(tx.conn());

            let visit = ledger
                .get(visit_id)?
                .ok_or_else(|| DbError::NotFound(format!("visit #{}", visit_id)))?;

            let mut restored = Vec::new();
            let mut skipped = Vec::new();
            for line in visit.dispensed {
                match inventory.apply_change(
                    &line.item_key(),
                    line.quantity,
                    TransactionType::StockIn,
                    REVERSAL_REASON,
                    actor,
                ) {
                    Ok(change) => restored.push(change),
                    Err(DbError::NotFound(_)) => {
                        warn!(
                            visit_id,
                            item = %line.item_name,
                            item_type = line.item_type.as_str(),
                            quantity = line.quantity,
                            "no matching inventory item, restoration skipped"
                        );
                        skipped.push(line);
                    }
                    Err(err) => return Err(err),
                }
            }

            ledger.delete_lines(visit_id)?;
            if !ledger.delete_visit(visit_id)? {
                return Err(DbError::NotFound(format!("visit #{}", visit_id)));
            }

            Ok(DeleteVisitOutcome {
                visit_id,
                restored,
                skipped,
            })
        })?;

        info!(
            visit_id,
            restored = outcome.restored.len(),
            skipped = outcome.skipped.len(),
            actor,
            "visit deleted"
        );
        Ok(outcome)
    }

    /// Update a visit's subject, date and notes. Dispensed lines are left
    /// untouched.
    pub fn update_visit(&mut self, visit: &ClinicVisit) -> DbResult<ClinicVisit> {
        validate_visit(visit)?;
        let id = visit
            .id
            .ok_or_else(|| DbError::Validation("visit id is required".into()))?;

        self.in_scope(|tx| {
            let ledger = VisitLedger::new(tx.conn());
            if !ledger.update_visit(visit)? {
                return Err(DbError::NotFound(format!("visit #{}", id)));
            }
            ledger
                .get(id)?
                .ok_or_else(|| DbError::NotFound(format!("visit #{}", id)))
        })
    }

    // =========================================================================
    // Stock
    // =========================================================================

    /// Apply a stock delta, recorded as stock_in or stock_out by sign.
    pub fn apply_delta(
        &mut self,
        key: &ItemKey,
        delta: i64,
        reason: &str,
        actor: &str,
    ) -> DbResult<StockChange> {
        self.change_stock(key, delta, TransactionType::for_delta(delta), reason, actor)
    }

    /// Apply a stock correction, recorded as an adjustment.
    pub fn adjust_stock(
        &mut self,
        key: &ItemKey,
        delta: i64,
        reason: &str,
        actor: &str,
    ) -> DbResult<StockChange> {
        self.change_stock(key, delta, TransactionType::Adjustment, reason, actor)
    }

    fn change_stock(
        &mut self,
        key: &ItemKey,
        delta: i64,
        transaction_type: TransactionType,
        reason: &str,
        actor: &str,
    ) -> DbResult<StockChange> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DbError::Validation("reason is required".into()));
        }

        let change = self.in_scope(|tx| {
            Inventory::new(tx.conn()).apply_change(key, delta, transaction_type, reason, actor)
        })?;
        debug!(
            item_id = change.item_id,
            delta,
            new = change.new_stock,
            kind = transaction_type.as_str(),
            "stock changed"
        );
        Ok(change)
    }

    // =========================================================================
    // Items & reference data
    // =========================================================================

    /// Create or update an item.
    ///
    /// A new item's `stock` becomes its opening balance (stock_in). On update,
    /// a `stock` different from the stored value is applied as an adjustment
    /// in the same scope as the field changes.
    pub fn save_item(&mut self, item: &InventoryItem, actor: &str) -> DbResult<InventoryItem> {
        if item.stock < 0 {
            return Err(DbError::Validation("stock must not be negative".into()));
        }

        self.in_scope(|tx| {
            let inventory = Inventory::new(tx.conn());
            let (saved, change, reason) = match item.id {
                None => {
                    let saved = inventory.upsert(item)?;
                    (saved, item.stock, INITIAL_STOCK_REASON)
                }
                Some(id) => {
                    let current = inventory
                        .get(id)?
                        .ok_or_else(|| DbError::NotFound(format!("item #{}", id)))?;
                    let saved = inventory.upsert(item)?;
                    (saved, item.stock - current.stock, MANUAL_ADJUSTMENT_REASON)
                }
            };

            if change == 0 {
                return Ok(saved);
            }
            let key = saved.key();
            let transaction_type = if item.id.is_none() {
                TransactionType::StockIn
            } else {
                TransactionType::Adjustment
            };
            inventory.apply_change(&key, change, transaction_type, reason, actor)?;
            inventory
                .get_by_key(&key)?
                .ok_or_else(|| DbError::NotFound(key.to_string()))
        })
    }

    /// Update an item's descriptive fields, leaving stock as stored.
    pub fn update_item_details(&mut self, item: &InventoryItem) -> DbResult<InventoryItem> {
        if item.id.is_none() {
            return Err(DbError::Validation("item id is required".into()));
        }
        self.in_scope(|tx| Inventory::new(tx.conn()).upsert(item))
    }

    pub fn delete_item(&mut self, id: i64) -> DbResult<()> {
        self.in_scope(|tx| Inventory::new(tx.conn()).delete(id))
    }

    pub fn save_category(&mut self, category: &Category) -> DbResult<Category> {
        self.in_scope(|tx| Categories::new(tx.conn()).upsert(category))
    }

    /// Delete a category unless an item still uses it.
    pub fn delete_category(&mut self, id: i64) -> DbResult<()> {
        self.in_scope(|tx| Categories::new(tx.conn()).delete(id))
    }

    pub fn save_supplier(&mut self, supplier: &Supplier) -> DbResult<Supplier> {
        self.in_scope(|tx| Suppliers::new(tx.conn()).upsert(supplier))
    }

    /// Delete a supplier unless an item still uses it.
    pub fn delete_supplier(&mut self, id: i64) -> DbResult<()> {
        self.in_scope(|tx| Suppliers::new(tx.conn()).delete(id))
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Items whose live stock disagrees with their latest audit record.
    ///
    /// Runs in one scope so the stock values and the ledger are read from the
    /// same snapshot.
    pub fn reconcile(&mut self) -> DbResult<Vec<StockDivergence>> {
        self.in_scope(|tx| {
            let log = TransactionLog::new(tx.conn());
            let mut divergent = Vec::new();
            for item in Inventory::new(tx.conn()).list(None)? {
                let item_id = item.id.unwrap_or_default();
                let ledger_stock = log.latest_for_item(item_id)?.map(|r| r.new_stock);
                if ledger_stock.unwrap_or(0) != item.stock {
                    divergent.push(StockDivergence {
                        item_id,
                        item_name: item.name,
                        stock: item.stock,
                        ledger_stock,
                    });
                }
            }
            Ok(divergent)
        })
    }
}

fn validate_visit(visit: &ClinicVisit) -> DbResult<()> {
    if visit.subject.trim().is_empty() {
        return Err(DbError::Validation("name is required".into()));
    }
    if chrono::DateTime::parse_from_rfc3339(&visit.visited_at).is_err() {
        return Err(DbError::Validation(format!(
            "visitedAt is not an RFC 3339 timestamp: {}",
            visit.visited_at
        )));
    }
    Ok(())
}

fn validate_line(line: &DispensedItem) -> DbResult<()> {
    if line.item_name.trim().is_empty() {
        return Err(DbError::Validation("dispensed item name is required".into()));
    }
    if line.quantity <= 0 {
        return Err(DbError::Validation(format!(
            "quantity for '{}' must be positive",
            line.item_name
        )));
    }
    Ok(())
}
