//! Stock transaction ledger (append-only, hash-chained).

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::{DbError, DbResult};
use crate::models::{ItemType, NewTransaction, TransactionFilter, TransactionRecord, TransactionType};

const RECORD_COLUMNS: &str = "id, transaction_type, item_type, item_id, item_name, quantity, \
                              previous_stock, new_stock, reason, actor, created_at, prev_hash, hash";

/// Result of re-walking the audit chain.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainReport {
    /// Records checked before stopping
    pub checked: usize,
    /// First record whose stored hash does not match its content
    pub broken_at: Option<i64>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// Audit ledger of every stock mutation.
pub struct TransactionLog<'a> {
    conn: &'a Connection,
}

impl<'a> TransactionLog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append a record, chaining it to the previous one.
    ///
    /// Callers hold the writer lock (see [`super::Database::begin`]), so the
    /// tail read here cannot race another append.
    pub(crate) fn append(&self, entry: &NewTransaction) -> DbResult<TransactionRecord> {
        let prev_hash: String = self
            .conn
            .query_row(
                "SELECT hash FROM stock_transactions ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or_default();
        let hash = chain_hash(&prev_hash, entry)?;

        self.conn.execute(
            r#"
            INSERT INTO stock_transactions (
                transaction_type, item_type, item_id, item_name, quantity,
                previous_stock, new_stock, reason, actor, created_at, prev_hash, hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                entry.transaction_type.as_str(),
                entry.item_type.as_str(),
                entry.item_id,
                entry.item_name,
                entry.quantity,
                entry.previous_stock,
                entry.new_stock,
                entry.reason,
                entry.actor,
                entry.created_at,
                prev_hash,
                hash,
            ],
        )?;

        Ok(TransactionRecord {
            id: self.conn.last_insert_rowid(),
            transaction_type: entry.transaction_type,
            item_type: entry.item_type,
            item_id: entry.item_id,
            item_name: entry.item_name.clone(),
            quantity: entry.quantity,
            previous_stock: entry.previous_stock,
            new_stock: entry.new_stock,
            reason: entry.reason.clone(),
            actor: entry.actor.clone(),
            created_at: entry.created_at.clone(),
            prev_hash,
            hash,
        })
    }

    pub fn get(&self, id: i64) -> DbResult<Option<TransactionRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM stock_transactions WHERE id = ?", RECORD_COLUMNS),
                [id],
                record_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Records matching `filter`, newest first.
    pub fn list(&self, filter: &TransactionFilter) -> DbResult<Vec<TransactionRecord>> {
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM stock_transactions
            WHERE (?1 IS NULL OR item_id = ?1)
            AND (?2 IS NULL OR transaction_type = ?2)
            ORDER BY id DESC
            LIMIT ?3
            "#,
            RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                filter.item_id,
                filter.transaction_type.map(|t| t.as_str()),
                limit
            ],
            record_row,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.try_into()?);
        }
        Ok(records)
    }

    /// Newest record for an item, if any.
    pub fn latest_for_item(&self, item_id: i64) -> DbResult<Option<TransactionRecord>> {
        let filter = TransactionFilter {
            item_id: Some(item_id),
            limit: Some(1),
            ..Default::default()
        };
        Ok(self.list(&filter)?.into_iter().next())
    }

    /// Recompute every hash from the first record and report the first
    /// mismatch.
    pub fn verify_chain(&self) -> DbResult<ChainReport> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM stock_transactions ORDER BY id",
            RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map([], record_row)?;

        let mut expected_prev = String::new();
        let mut checked = 0;
        for row in rows {
            let record: TransactionRecord = row?.try_into()?;
            checked += 1;

            let entry = NewTransaction {
                transaction_type: record.transaction_type,
                item_type: record.item_type,
                item_id: record.item_id,
                item_name: record.item_name.clone(),
                quantity: record.quantity,
                previous_stock: record.previous_stock,
                new_stock: record.new_stock,
                reason: record.reason.clone(),
                actor: record.actor.clone(),
                created_at: record.created_at.clone(),
            };
            if record.prev_hash != expected_prev
                || chain_hash(&record.prev_hash, &entry)? != record.hash
            {
                return Ok(ChainReport {
                    checked,
                    broken_at: Some(record.id),
                });
            }
            expected_prev = record.hash;
        }

        Ok(ChainReport {
            checked,
            broken_at: None,
        })
    }
}

/// Hash of a record's canonical JSON chained onto the previous hash.
pub fn chain_hash(prev_hash: &str, entry: &NewTransaction) -> DbResult<String> {
    let payload = serde_json::to_string(entry)?;
    let mut hasher = Sha256::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(payload.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Intermediate row struct for database mapping.
struct RecordRow {
    id: i64,
    transaction_type: String,
    item_type: String,
    item_id: i64,
    item_name: String,
    quantity: i64,
    previous_stock: i64,
    new_stock: i64,
    reason: String,
    actor: String,
    created_at: String,
    prev_hash: String,
    hash: String,
}

fn record_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        transaction_type: row.get(1)?,
        item_type: row.get(2)?,
        item_id: row.get(3)?,
        item_name: row.get(4)?,
        quantity: row.get(5)?,
        previous_stock: row.get(6)?,
        new_stock: row.get(7)?,
        reason: row.get(8)?,
        actor: row.get(9)?,
        created_at: row.get(10)?,
        prev_hash: row.get(11)?,
        hash: row.get(12)?,
    })
}

impl TryFrom<RecordRow> for TransactionRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let transaction_type = TransactionType::parse(&row.transaction_type).ok_or_else(|| {
            DbError::Constraint(format!("Unknown transaction type: {}", row.transaction_type))
        })?;
        let item_type = ItemType::parse(&row.item_type)
            .ok_or_else(|| DbError::Constraint(format!("Unknown item type: {}", row.item_type)))?;

        Ok(TransactionRecord {
            id: row.id,
            transaction_type,
            item_type,
            item_id: row.item_id,
            item_name: row.item_name,
            quantity: row.quantity,
            previous_stock: row.previous_stock,
            new_stock: row.new_stock,
            reason: row.reason,
            actor: row.actor,
            created_at: row.created_at,
            prev_hash: row.prev_hash,
            hash: row.hash,
        })
    }
}
