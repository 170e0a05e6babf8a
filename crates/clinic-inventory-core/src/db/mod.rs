//! Database layer for the clinic inventory engine.

mod inventory;
mod registry;
mod schema;
mod transactions;
mod visits;

pub use inventory::*;
pub use registry::*;
pub use schema::*;
pub use transactions::*;
pub use visits::*;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::config::EngineConfig;

/// Busy timeout used when no configuration is supplied.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("{entity} #{id} is still used by {count} inventory item(s)")]
    UsageConflict {
        entity: &'static str,
        id: i64,
        count: i64,
    },

    #[error("Insufficient stock for {item}: {available} on hand, {requested} requested")]
    InsufficientStock {
        item: String,
        available: i64,
        requested: i64,
    },

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Caller-facing classification of a [`DbError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    UsageConflict,
    InsufficientStock,
    Internal,
}

impl ErrorKind {
    /// HTTP-style status code reported at the request boundary.
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::Validation | ErrorKind::UsageConflict | ErrorKind::InsufficientStock => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Internal => 500,
        }
    }
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Validation(_) => ErrorKind::Validation,
            DbError::NotFound(_) => ErrorKind::NotFound,
            DbError::UsageConflict { .. } => ErrorKind::UsageConflict,
            DbError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            DbError::Sqlite(_) | DbError::Json(_) | DbError::Constraint(_) => ErrorKind::Internal,
        }
    }
}

/// Database connection wrapper.
///
/// One `Database` is one SQLite connection. Concurrent units of work each
/// open their own `Database` on the same file; SQLite's writer lock plus the
/// busy timeout serialize them.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open the database described by `config`.
    pub fn open_with_config(config: &EngineConfig) -> DbResult<Self> {
        Self::open_with_timeout(&config.database_path, config.busy_timeout())
    }

    /// Open database at path with an explicit lock wait limit.
    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // Readers never block the single writer in WAL mode.
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for reads outside a transaction scope).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open a write transaction scope.
    ///
    /// The scope takes SQLite's writer lock immediately, so no other
    /// connection can interleave a stock update between our reads and writes.
    pub fn begin(&mut self) -> DbResult<TxScope<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(TxScope { tx })
    }
}

/// A unit of atomic, multi-step mutation.
///
/// Nothing written through the scope is visible to other connections until
/// [`TxScope::commit`]. Dropping the scope without committing rolls it back,
/// so an abandoned or cancelled request never leaves partial writes.
pub struct TxScope<'a> {
    tx: Transaction<'a>,
}

impl<'a> TxScope<'a> {
    /// Connection bound to this scope.
    pub fn conn(&self) -> &Connection {
        &self.tx
    }

    pub fn commit(self) -> DbResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn abort(self) -> DbResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}
