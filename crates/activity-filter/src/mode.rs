//! Filter modes and per-activity matching

use serde::Deserialize;
use serde_json::Value;

/// `activityType` value of cleaning activities.
pub const CLEANING_TYPE: &str = "CLEANING";

/// Subject marker of departure inventory checks.
pub const INVENTORY_CHECK_DEPARTURE: &str = "Inventory Check - Departure";

/// Which activities a deployment exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterMode {
    /// Pass upstream pages through unmodified
    None,
    /// Cleaning activities, excluding departure inventory checks
    Cleaning,
    /// Departure inventory checks only
    InventoryCheck,
}

/// Outcome of checking a single activity against the mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected {
        activity_type: Option<String>,
        criteria: &'static str,
    },
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::None => "none",
            FilterMode::Cleaning => "cleaning",
            FilterMode::InventoryCheck => "inventory-check",
        }
    }

    /// Human-readable rule reported to clients as `filterCriteria`.
    pub fn criteria(&self) -> Option<&'static str> {
        match self {
            FilterMode::None => None,
            FilterMode::Cleaning => Some(
                "activityType = CLEANING AND subject does not contain \"Inventory Check - Departure\"",
            ),
            FilterMode::InventoryCheck => Some("subject contains \"Inventory Check - Departure\""),
        }
    }

    /// Whether an activity survives list filtering.
    pub fn matches(&self, activity: &Value) -> bool {
        let subject = activity.get("subject").and_then(Value::as_str).unwrap_or("");
        match self {
            FilterMode::None => true,
            FilterMode::Cleaning => {
                activity_type(activity) == Some(CLEANING_TYPE)
                    && !subject.contains(INVENTORY_CHECK_DEPARTURE)
            }
            FilterMode::InventoryCheck => subject.contains(INVENTORY_CHECK_DEPARTURE),
        }
    }

    /// Gate for single-activity lookups. Only the cleaning mode restricts
    /// these, and only by `activityType`.
    pub fn admit(&self, activity: &Value) -> Admission {
        match self {
            FilterMode::Cleaning if activity_type(activity) != Some(CLEANING_TYPE) => {
                Admission::Rejected {
                    activity_type: activity_type(activity).map(str::to_owned),
                    criteria: self.criteria().unwrap_or_default(),
                }
            }
            _ => Admission::Allowed,
        }
    }
}

fn activity_type(activity: &Value) -> Option<&str> {
    activity.get("activityType").and_then(Value::as_str)
}
