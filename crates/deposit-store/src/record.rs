//! Deposit record and the validated update payload

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

const RETURN_COMPLETE: &str = "depositReturnComplete";
const TRANSFERRED: &str = "depositTransferredToNewStudio";

/// Deposit status for one activity, as returned to clients.
///
/// `updated_at` is absent for activities that were never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub activity_id: String,
    pub deposit_return_complete: bool,
    pub deposit_transferred_to_new_studio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DepositRecord {
    /// Record reported for an activity with no stored status.
    pub fn unset(activity_id: &str) -> Self {
        Self {
            activity_id: activity_id.to_string(),
            deposit_return_complete: false,
            deposit_transferred_to_new_studio: false,
            updated_at: None,
        }
    }
}

/// Both flags of an update; there is no partial form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositUpdate {
    pub deposit_return_complete: bool,
    pub deposit_transferred_to_new_studio: bool,
}

impl DepositUpdate {
    /// Validate a raw JSON body. Each flag must be a JSON boolean; strings,
    /// numbers, null and missing fields are rejected.
    pub fn from_json(body: &Value) -> Result<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| Error::InvalidBody(format!("expected object, got {}", kind(body))))?;

        let flag = |name: &'static str| {
            object
                .get(name)
                .and_then(Value::as_bool)
                .ok_or(Error::NotBoolean(name))
        };

        Ok(Self {
            deposit_return_complete: flag(RETURN_COMPLETE)?,
            deposit_transferred_to_new_studio: flag(TRANSFERRED)?,
        })
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
