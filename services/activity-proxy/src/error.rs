//! Request-boundary error taxonomy
//!
//! Every handler returns `Result<_, ApiError>`; this is the single place
//! where failures become JSON responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed caller input
    #[error("{0}")]
    Validation(String),

    /// No usable upstream credential could be obtained
    #[error("authentication required: {0}")]
    Authentication(String),

    /// Upstream rejected our bearer token
    #[error("upstream rejected the access token")]
    UpstreamUnauthorized,

    /// Any other upstream failure, reported with the upstream status
    #[error("upstream error {status}: {message}")]
    Upstream { status: StatusCode, message: String },

    /// Single activity hidden by the cleaning filter
    #[error("activity is not a cleaning activity")]
    NotCleaningActivity {
        activity_type: Option<String>,
        criteria: &'static str,
    },

    /// Unexpected local fault; details are logged, never returned
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::Authentication(message) => {
                warn!(error = %message, "upstream authentication unavailable");
                (
                    StatusCode::UNAUTHORIZED,
                    json!({
                        "error": "Authentication required",
                        "message": message,
                        "requiresAuth": true,
                    }),
                )
            }
            ApiError::UpstreamUnauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Authentication failed", "requiresAuth": true }),
            ),
            ApiError::Upstream { status, message } => (status, json!({ "error": message })),
            ApiError::NotCleaningActivity {
                activity_type,
                criteria,
            } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "Activity not found or not a cleaning activity",
                    "activityType": activity_type,
                    "filterCriteria": criteria,
                }),
            ),
            ApiError::Internal(detail) => {
                error!(error = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<upstream_auth::Error> for ApiError {
    fn from(e: upstream_auth::Error) -> Self {
        match e {
            // A malformed authorize URL is a deployment fault, not a missing login
            upstream_auth::Error::AuthorizationUrl(_) => ApiError::Internal(e.to_string()),
            e => ApiError::Authentication(e.to_string()),
        }
    }
}

impl From<deposit_store::Error> for ApiError {
    fn from(e: deposit_store::Error) -> Self {
        ApiError::Validation(e.to_string())
    }
}
