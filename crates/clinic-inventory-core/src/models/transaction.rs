//! Stock transaction (audit) models.

use serde::{Deserialize, Serialize};

use super::item::ItemType;

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    StockIn,
    StockOut,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::StockIn => "stock_in",
            TransactionType::StockOut => "stock_out",
            TransactionType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stock_in" => Some(TransactionType::StockIn),
            "stock_out" => Some(TransactionType::StockOut),
            "adjustment" => Some(TransactionType::Adjustment),
            _ => None,
        }
    }

    /// Type recorded for a plain delta, by sign.
    pub fn for_delta(delta: i64) -> Self {
        if delta < 0 {
            TransactionType::StockOut
        } else {
            TransactionType::StockIn
        }
    }
}

/// One immutable entry in the stock audit ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: i64,
    pub transaction_type: TransactionType,
    pub item_type: ItemType,
    pub item_id: i64,
    /// Item name at the time of the movement
    pub item_name: String,
    /// Absolute number of units moved
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: String,
    pub actor: String,
    pub created_at: String,
    /// Hash of the preceding record ("" for the first)
    pub prev_hash: String,
    pub hash: String,
}

/// Fields of a record before it is appended.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub item_type: ItemType,
    pub item_id: i64,
    pub item_name: String,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: String,
    pub actor: String,
    pub created_at: String,
}

/// Query filter for the audit ledger.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub item_id: Option<i64>,
    pub transaction_type: Option<TransactionType>,
    pub limit: Option<usize>,
}
