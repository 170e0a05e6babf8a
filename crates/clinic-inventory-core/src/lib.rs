//! Clinic Inventory Core
//!
//! Inventory consistency engine for a clinic: keeps medicine and supply stock
//! correct and auditable as clinic visits are recorded and retracted.
//!
//! # Architecture
//!
//! ```text
//!   desktop shell / clinicd / FFI
//!              │  Request { method, resource, id, query, body }
//!              ▼
//!        api::Handler ── validate ──► 400 / 405 (no storage access)
//!              │
//!              ▼
//!   ┌──────── Coordinator ─────────┐   one TxScope per operation
//!   │                              │   (BEGIN IMMEDIATE … COMMIT)
//!   ▼              ▼               ▼
//! VisitLedger   Inventory ──► TransactionLog
//!               (stock ≥ 0)    (append-only, hash-chained)
//!                   │
//!            Categories / Suppliers (usage-guarded delete)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite storage, transaction scopes, one repository per table
//! - [`models`]: Domain types (InventoryItem, ClinicVisit, TransactionRecord, ...)
//! - [`coordinator`]: Atomic multi-step operations (create/delete visit, deltas)
//! - [`api`]: Request/response boundary with status mapping
//! - [`config`]: Environment-driven settings
//! - [`telemetry`]: Tracing subscriber setup

pub mod api;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use api::{Envelope, Handler, Request, Response};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, DeleteVisitOutcome, StockDivergence};
pub use db::{ChainReport, Database, DbError, ErrorKind, StockChange};
pub use models::{
    Category, ClinicVisit, DispensedItem, InventoryItem, ItemKey, ItemType, Supplier,
    TransactionRecord, TransactionType,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use tracing::error;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Usage conflict: {0}")]
    UsageConflict(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DbError> for ClinicError {
    fn from(e: DbError) -> Self {
        match e.kind() {
            ErrorKind::Validation => ClinicError::Validation(e.to_string()),
            ErrorKind::NotFound => ClinicError::NotFound(e.to_string()),
            ErrorKind::UsageConflict => ClinicError::UsageConflict(e.to_string()),
            ErrorKind::InsufficientStock => ClinicError::InsufficientStock(e.to_string()),
            ErrorKind::Internal => {
                error!(error = %e, "engine call failed");
                ClinicError::Internal(api::INTERNAL_ERROR_MESSAGE.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::Internal(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::Internal(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create an engine backed by the database file at `path`.
#[uniffi::export]
pub fn open_engine(path: String) -> Result<Arc<ClinicInventoryCore>, ClinicError> {
    let config = EngineConfig {
        database_path: path.into(),
        ..EngineConfig::default()
    };
    let db = Database::open_with_config(&config)?;
    Ok(Arc::new(ClinicInventoryCore::new(db, config.default_actor)))
}

/// Create an engine over an in-memory database (for testing).
#[uniffi::export]
pub fn open_engine_in_memory() -> Result<Arc<ClinicInventoryCore>, ClinicError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(ClinicInventoryCore::new(
        db,
        EngineConfig::default().default_actor,
    )))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe engine wrapper for FFI.
#[derive(uniffi::Object)]
pub struct ClinicInventoryCore {
    db: Arc<Mutex<Database>>,
    default_actor: String,
}

impl ClinicInventoryCore {
    pub fn new(db: Database, default_actor: String) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            default_actor,
        }
    }

    fn actor(&self, actor: Option<String>) -> String {
        actor
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| self.default_actor.clone())
    }
}

#[uniffi::export]
impl ClinicInventoryCore {
    /// Handle a JSON-encoded [`Request`] and return the JSON-encoded
    /// [`Response`]. Malformed requests produce a 400 response, not an error.
    pub fn handle_request_json(&self, request_json: String) -> Result<String, ClinicError> {
        let response = match serde_json::from_str::<Request>(&request_json) {
            Ok(request) => {
                let mut db = self.db.lock()?;
                Handler::new(&mut db, self.default_actor.clone()).handle(request)
            }
            Err(e) => Response::failure(400, "validation_error", format!("malformed request: {}", e)),
        };
        Ok(serde_json::to_string(&response)?)
    }

    /// Record a visit and dispense its lines atomically.
    pub fn create_visit(&self, visit: FfiVisitInput) -> Result<FfiVisit, ClinicError> {
        let actor = self.actor(visit.actor.clone());
        let visit = visit.into_visit(&actor)?;
        let mut db = self.db.lock()?;
        let saved = Coordinator::new(&mut db).create_visit(&visit, &actor)?;
        Ok(saved.into())
    }

    /// Retract a visit and restore the stock it dispensed.
    pub fn delete_visit(
        &self,
        visit_id: i64,
        actor: Option<String>,
    ) -> Result<FfiDeleteVisitOutcome, ClinicError> {
        let actor = self.actor(actor);
        let mut db = self.db.lock()?;
        let outcome = Coordinator::new(&mut db).delete_visit(visit_id, &actor)?;
        Ok(outcome.into())
    }

    /// Apply a stock delta to an item (restock when positive, issue when negative).
    pub fn apply_delta(
        &self,
        item_id: i64,
        delta: i64,
        reason: String,
        actor: Option<String>,
    ) -> Result<FfiStockChange, ClinicError> {
        let actor = self.actor(actor);
        let mut db = self.db.lock()?;
        let change =
            Coordinator::new(&mut db).apply_delta(&ItemKey::Id(item_id), delta, &reason, &actor)?;
        Ok(change.into())
    }

    /// Recompute the audit hash chain.
    pub fn verify_audit_chain(&self) -> Result<FfiChainReport, ClinicError> {
        let guard = self.db.lock()?;
        let report = db::TransactionLog::new(guard.conn()).verify_chain()?;
        Ok(report.into())
    }

    /// Items whose stock disagrees with their latest audit record.
    pub fn reconcile_stock(&self) -> Result<Vec<FfiStockDivergence>, ClinicError> {
        let mut db = self.db.lock()?;
        let divergent = Coordinator::new(&mut db).reconcile()?;
        Ok(divergent.into_iter().map(|d| d.into()).collect())
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe dispensed line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDispensedLine {
    pub item_name: String,
    /// "medicine" or "supply"
    pub item_type: String,
    pub quantity: i64,
}

impl From<DispensedItem> for FfiDispensedLine {
    fn from(line: DispensedItem) -> Self {
        Self {
            item_name: line.item_name,
            item_type: line.item_type.as_str().to_string(),
            quantity: line.quantity,
        }
    }
}

/// FFI-safe visit to record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisitInput {
    pub subject: String,
    pub visited_at: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<FfiDispensedLine>,
    pub actor: Option<String>,
}

impl FfiVisitInput {
    fn into_visit(self, recorded_by: &str) -> Result<ClinicVisit, ClinicError> {
        let mut visit = ClinicVisit::new(self.subject, recorded_by);
        if let Some(at) = self.visited_at {
            visit.visited_at = at;
        }
        visit.notes = self.notes;
        for line in self.lines {
            let item_type = ItemType::parse(&line.item_type).ok_or_else(|| {
                ClinicError::Validation(format!("unknown item type '{}'", line.item_type))
            })?;
            visit
                .dispensed
                .push(DispensedItem::new(line.item_name, item_type, line.quantity));
        }
        Ok(visit)
    }
}

/// FFI-safe recorded visit.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVisit {
    pub id: i64,
    pub subject: String,
    pub visited_at: String,
    pub notes: Option<String>,
    pub recorded_by: String,
    pub lines: Vec<FfiDispensedLine>,
}

impl From<ClinicVisit> for FfiVisit {
    fn from(visit: ClinicVisit) -> Self {
        Self {
            id: visit.id.unwrap_or_default(),
            subject: visit.subject,
            visited_at: visit.visited_at,
            notes: visit.notes,
            recorded_by: visit.recorded_by,
            lines: visit.dispensed.into_iter().map(|l| l.into()).collect(),
        }
    }
}

/// FFI-safe stock change.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockChange {
    pub item_id: i64,
    pub item_name: String,
    pub previous_stock: i64,
    pub new_stock: i64,
    /// Audit record id; `None` for a zero delta
    pub transaction_id: Option<i64>,
}

impl From<StockChange> for FfiStockChange {
    fn from(change: StockChange) -> Self {
        Self {
            item_id: change.item_id,
            item_name: change.item_name,
            previous_stock: change.previous_stock,
            new_stock: change.new_stock,
            transaction_id: change.record.map(|r| r.id),
        }
    }
}

/// FFI-safe visit deletion result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDeleteVisitOutcome {
    pub visit_id: i64,
    pub restored: Vec<FfiStockChange>,
    pub skipped: Vec<FfiDispensedLine>,
}

impl From<DeleteVisitOutcome> for FfiDeleteVisitOutcome {
    fn from(outcome: DeleteVisitOutcome) -> Self {
        Self {
            visit_id: outcome.visit_id,
            restored: outcome.restored.into_iter().map(|c| c.into()).collect(),
            skipped: outcome.skipped.into_iter().map(|l| l.into()).collect(),
        }
    }
}

/// FFI-safe audit chain report.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiChainReport {
    pub checked: u64,
    pub broken_at: Option<i64>,
}

impl From<ChainReport> for FfiChainReport {
    fn from(report: ChainReport) -> Self {
        Self {
            checked: report.checked as u64,
            broken_at: report.broken_at,
        }
    }
}

/// FFI-safe reconciliation finding.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockDivergence {
    pub item_id: i64,
    pub item_name: String,
    pub stock: i64,
    pub ledger_stock: Option<i64>,
}

impl From<StockDivergence> for FfiStockDivergence {
    fn from(d: StockDivergence) -> Self {
        Self {
            item_id: d.item_id,
            item_name: d.item_name,
            stock: d.stock,
            ledger_stock: d.ledger_stock,
        }
    }
}
