//! Deposit status endpoints
//!
//! Bodies are parsed by hand instead of through `Json<T>` so malformed input
//! gets the same `400 {error}` shape as every other validation failure.

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use deposit_store::{DepositRecord, DepositUpdate};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct DepositQuery {
    #[serde(rename = "activityId")]
    activity_id: Option<String>,
}

impl DepositQuery {
    fn activity_id(&self) -> &str {
        self.activity_id.as_deref().unwrap_or_default()
    }
}

/// Turn a malformed query string (e.g. a repeated `activityId`) into the
/// usual `400 {error}` body instead of axum's plain-text rejection.
fn parse_query(
    query: Result<Query<DepositQuery>, QueryRejection>,
) -> Result<DepositQuery, ApiError> {
    query
        .map(|Query(query)| query)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

/// GET /api/activity-deposits?activityId=
pub async fn get_status(
    State(state): State<AppState>,
    query: Result<Query<DepositQuery>, QueryRejection>,
) -> Result<Json<DepositRecord>, ApiError> {
    let query = parse_query(query)?;
    let record = state.deposits.get_status(query.activity_id()).await?;
    Ok(Json(record))
}

/// PUT /api/activity-deposits?activityId=
pub async fn set_status(
    State(state): State<AppState>,
    query: Result<Query<DepositQuery>, QueryRejection>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let query = parse_query(query)?;
    let activity_id = query.activity_id();
    if activity_id.trim().is_empty() {
        return Err(deposit_store::Error::MissingActivityId.into());
    }

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| deposit_store::Error::InvalidBody(e.to_string()))?;
    let update = DepositUpdate::from_json(&value)?;

    let record = state.deposits.set_status(activity_id, update).await?;
    info!(activity_id, "deposit status saved");
    Ok(Json(json!({
        "message": "Deposit status updated successfully",
        "data": record,
    })))
}
