//! Clinic visit models.

use serde::{Deserialize, Serialize};

use super::item::{ItemKey, ItemType};

/// A recorded clinical encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClinicVisit {
    pub id: Option<i64>,
    /// Who was seen (patient name or external patient reference)
    pub subject: String,
    /// When the visit took place (RFC 3339)
    pub visited_at: String,
    pub notes: Option<String>,
    /// Staff member who recorded the visit
    pub recorded_by: String,
    /// Dispensed lines, medicines first, then entry order
    #[serde(default)]
    pub dispensed: Vec<DispensedItem>,
    pub created_at: String,
}

impl ClinicVisit {
    /// Create an unsaved visit happening now.
    pub fn new(subject: impl Into<String>, recorded_by: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: None,
            subject: subject.into(),
            visited_at: now.clone(),
            notes: None,
            recorded_by: recorded_by.into(),
            dispensed: Vec::new(),
            created_at: now,
        }
    }
}

/// A dispensed line on a visit.
///
/// Holds a snapshot of the item name and type rather than a row id, so the
/// visit record stays accurate after the item is renamed or removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispensedItem {
    pub id: Option<i64>,
    pub visit_id: Option<i64>,
    pub item_name: String,
    pub item_type: ItemType,
    pub quantity: i64,
}

impl DispensedItem {
    pub fn new(item_name: impl Into<String>, item_type: ItemType, quantity: i64) -> Self {
        Self {
            id: None,
            visit_id: None,
            item_name: item_name.into(),
            item_type,
            quantity,
        }
    }

    /// Key used to find the live inventory item for this line.
    pub fn item_key(&self) -> ItemKey {
        ItemKey::Name {
            name: self.item_name.clone(),
            item_type: self.item_type,
        }
    }
}

/// Sort dispensed lines into processing order: medicines before supplies,
/// entry order within a type.
pub fn sort_dispensed(lines: &mut [DispensedItem]) {
    // Stable sort keeps entry order within each type.
    lines.sort_by_key(|line| line.item_type);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_dispensed_medicines_first_stable() {
        let mut lines = vec![
            DispensedItem::new("Gauze", ItemType::Supply, 1),
            DispensedItem::new("Paracetamol", ItemType::Medicine, 2),
            DispensedItem::new("Syringe", ItemType::Supply, 3),
            DispensedItem::new("Amoxicillin", ItemType::Medicine, 4),
        ];
        sort_dispensed(&mut lines);

        let names: Vec<_> = lines.iter().map(|l| l.item_name.as_str()).collect();
        assert_eq!(names, vec!["Paracetamol", "Amoxicillin", "Gauze", "Syringe"]);
    }

    #[test]
    fn test_line_key_uses_snapshot() {
        let line = DispensedItem::new("Gauze", ItemType::Supply, 1);
        assert_eq!(
            line.item_key(),
            ItemKey::Name {
                name: "Gauze".into(),
                item_type: ItemType::Supply
            }
        );
    }
}
