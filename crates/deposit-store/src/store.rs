//! In-memory deposit status store
//!
//! A `RwLock` around the map gives whole-record replacement: readers see
//! either the old record or the new one, never a mix of flags.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::record::{DepositRecord, DepositUpdate};

#[derive(Default)]
pub struct DepositStore {
    records: RwLock<HashMap<String, DepositRecord>>,
}

impl DepositStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored record for `activity_id`, or the all-false default.
    pub async fn get_status(&self, activity_id: &str) -> Result<DepositRecord> {
        validate_id(activity_id)?;
        let records = self.records.read().await;
        Ok(records
            .get(activity_id)
            .cloned()
            .unwrap_or_else(|| DepositRecord::unset(activity_id)))
    }

    /// Replace the record for `activity_id` and stamp it with the current time.
    pub async fn set_status(&self, activity_id: &str, update: DepositUpdate) -> Result<DepositRecord> {
        validate_id(activity_id)?;
        let record = DepositRecord {
            activity_id: activity_id.to_string(),
            deposit_return_complete: update.deposit_return_complete,
            deposit_transferred_to_new_studio: update.deposit_transferred_to_new_studio,
            updated_at: Some(Utc::now()),
        };

        self.records
            .write()
            .await
            .insert(activity_id.to_string(), record.clone());
        debug!(
            activity_id,
            return_complete = record.deposit_return_complete,
            transferred = record.deposit_transferred_to_new_studio,
            "deposit status updated"
        );
        Ok(record)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn validate_id(activity_id: &str) -> Result<()> {
    if activity_id.trim().is_empty() {
        return Err(Error::MissingActivityId);
    }
    Ok(())
}
