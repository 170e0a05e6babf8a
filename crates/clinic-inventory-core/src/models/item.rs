//! Inventory item models.

use serde::{Deserialize, Serialize};

/// Kind of stocked item. Medicines and supplies share one store but are
/// listed, categorized and dispensed separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Medicine,
    Supply,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Medicine => "medicine",
            ItemType::Supply => "supply",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "medicine" => Some(ItemType::Medicine),
            "supply" => Some(ItemType::Supply),
            _ => None,
        }
    }
}

/// A stocked medicine or supply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Row id; `None` until first persisted
    pub id: Option<i64>,
    /// Display name, unique per item type
    pub name: String,
    pub item_type: ItemType,
    pub category_id: Option<i64>,
    pub supplier_id: Option<i64>,
    /// Units currently on hand (never negative)
    pub stock: i64,
    /// Unit of measure (e.g. "tablet", "box", "mL")
    pub unit: String,
    /// Stock level at or below which the item is reported for reordering
    pub reorder_level: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl InventoryItem {
    /// Create an unsaved item with no stock.
    pub fn new(name: impl Into<String>, item_type: ItemType) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: None,
            name: name.into(),
            item_type,
            category_id: None,
            supplier_id: None,
            stock: 0,
            unit: "unit".into(),
            reorder_level: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Key for stock changes: the row id once persisted, else name and type.
    pub fn key(&self) -> ItemKey {
        match self.id {
            Some(id) => ItemKey::Id(id),
            None => ItemKey::Name {
                name: self.name.clone(),
                item_type: self.item_type,
            },
        }
    }
}

/// Identifies an item either by row id or by its (name, type) pair.
///
/// Dispensed lines only carry the name/type snapshot, so restoration goes
/// through the `Name` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKey {
    Id(i64),
    Name { name: String, item_type: ItemType },
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKey::Id(id) => write!(f, "item #{}", id),
            ItemKey::Name { name, item_type } => write!(f, "{} '{}'", item_type.as_str(), name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_round_trip_names() {
        assert_eq!(ItemType::parse("medicine"), Some(ItemType::Medicine));
        assert_eq!(ItemType::parse("supply"), Some(ItemType::Supply));
        assert_eq!(ItemType::parse("Medicine"), None);
        assert_eq!(ItemType::Supply.as_str(), "supply");
    }

    #[test]
    fn test_medicines_sort_before_supplies() {
        assert!(ItemType::Medicine < ItemType::Supply);
    }

    #[test]
    fn test_key_prefers_id() {
        let mut item = InventoryItem::new("Gauze", ItemType::Supply);
        assert_eq!(
            item.key(),
            ItemKey::Name {
                name: "Gauze".into(),
                item_type: ItemType::Supply
            }
        );

        item.id = Some(7);
        assert_eq!(item.key(), ItemKey::Id(7));
    }

    #[test]
    fn test_serializes_camel_case() {
        let item = InventoryItem::new("Gauze", ItemType::Supply);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["itemType"], "supply");
        assert!(json.get("reorderLevel").is_some());
    }
}
