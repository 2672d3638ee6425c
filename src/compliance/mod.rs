//! Compliance - Required protective equipment evaluation
//!
//! Maps one frame's detection labels to a per-item status. The subject
//! (`human`) drives evaluation: without it every item is not applicable.

use crate::detector::DetectionResult;
use serde::{Deserialize, Serialize};

/// Subject label emitted by the model
pub const SUBJECT_LABEL: &str = "human";

/// Required protective equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredItem {
    Helmet,
    Vest,
    Boots,
}

impl RequiredItem {
    /// Registry order
    pub const ALL: [RequiredItem; 3] = [RequiredItem::Helmet, RequiredItem::Vest, RequiredItem::Boots];

    /// Model class label
    pub fn label(&self) -> &'static str {
        match self {
            RequiredItem::Helmet => "helmet",
            RequiredItem::Vest => "vest",
            RequiredItem::Boots => "boots",
        }
    }

    /// Name shown in alerts
    pub fn display_name(&self) -> &'static str {
        match self {
            RequiredItem::Helmet => "Casco",
            RequiredItem::Vest => "Chaleco",
            RequiredItem::Boots => "Botas",
        }
    }
}

/// Tri-state item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Present,
    Missing,
    /// No subject in frame
    NotApplicable,
}

/// Status of every required item for one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceStatus {
    pub subject_present: bool,
    /// One entry per registry item, in registry order
    pub items: Vec<(RequiredItem, ItemStatus)>,
}

impl ComplianceStatus {
    pub fn missing_items(&self) -> Vec<RequiredItem> {
        self.items
            .iter()
            .filter(|(_, status)| *status == ItemStatus::Missing)
            .map(|(item, _)| *item)
            .collect()
    }

    /// Subject present with at least one item missing
    pub fn is_violation(&self) -> bool {
        self.subject_present && self.items.iter().any(|(_, s)| *s == ItemStatus::Missing)
    }

    pub fn status_of(&self, item: RequiredItem) -> Option<ItemStatus> {
        self.items.iter().find(|(i, _)| *i == item).map(|(_, s)| *s)
    }
}

/// Evaluate a detection result against the registry
pub fn evaluate(result: &DetectionResult) -> ComplianceStatus {
    let subject_present = result.contains(SUBJECT_LABEL);

    let items = RequiredItem::ALL
        .iter()
        .map(|item| {
            let status = if !subject_present {
                ItemStatus::NotApplicable
            } else if result.contains(item.label()) {
                ItemStatus::Present
            } else {
                ItemStatus::Missing
            };
            (*item, status)
        })
        .collect();

    ComplianceStatus {
        subject_present,
        items,
    }
}

/// Display names joined the way alerts list them ("Casco, Botas")
pub fn join_display_names(items: &[RequiredItem]) -> String {
    items
        .iter()
        .map(|i| i.display_name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{BoundingBox, Detection};

    fn result(labels: &[&str]) -> DetectionResult {
        let bbox = BoundingBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 };
        DetectionResult::new(labels.iter().map(|l| Detection::new(*l, 0.9, bbox)).collect())
    }

    #[test]
    fn test_no_subject_is_not_applicable() {
        let status = evaluate(&result(&["helmet", "vest"]));
        assert!(!status.subject_present);
        assert!(status.items.iter().all(|(_, s)| *s == ItemStatus::NotApplicable));
        assert!(status.missing_items().is_empty());
        assert!(!status.is_violation());
    }

    #[test]
    fn test_fully_equipped_subject() {
        let status = evaluate(&result(&["human", "helmet", "vest", "boots"]));
        assert!(status.subject_present);
        assert!(!status.is_violation());
        assert_eq!(status.status_of(RequiredItem::Boots), Some(ItemStatus::Present));
    }

    #[test]
    fn test_missing_boots() {
        let status = evaluate(&result(&["human", "helmet", "vest"]));
        assert!(status.is_violation());
        assert_eq!(status.missing_items(), vec![RequiredItem::Boots]);
        assert_eq!(status.status_of(RequiredItem::Helmet), Some(ItemStatus::Present));
    }

    #[test]
    fn test_missing_items_keep_registry_order() {
        let status = evaluate(&result(&["vest", "human"]));
        assert_eq!(status.missing_items(), vec![RequiredItem::Helmet, RequiredItem::Boots]);
        assert_eq!(join_display_names(&status.missing_items()), "Casco, Botas");
    }

    #[test]
    fn test_empty_result() {
        let status = evaluate(&DetectionResult::empty());
        assert!(!status.subject_present);
        assert_eq!(status.items.len(), 3);
    }
}
