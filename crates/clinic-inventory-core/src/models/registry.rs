//! Reference data: categories and suppliers.

use serde::{Deserialize, Serialize};

use super::item::ItemType;

/// Grouping for inventory items of one type (e.g. "Antibiotics").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Option<i64>,
    pub item_type: ItemType,
    pub name: String,
}

impl Category {
    pub fn new(name: impl Into<String>, item_type: ItemType) -> Self {
        Self {
            id: None,
            item_type,
            name: name.into(),
        }
    }
}

/// Vendor an item is sourced from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: Option<i64>,
    pub name: String,
    pub contact: Option<String>,
}

impl Supplier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            contact: None,
        }
    }
}
