//! Activity endpoints
//!
//! List and single lookups go through the configured filter mode; every
//! other `/api/*` request is forwarded to the upstream API unchanged.

use axum::Json;
use axum::extract::{Path, Query, Request, State};
use axum::http::Method;
use axum::response::Response;
use serde_json::Value;
use tracing::{debug, instrument};

use activity_filter::{Admission, apply_to_page};

use crate::AppState;
use crate::error::ApiError;
use crate::upstream::new_request_id;

const ACTIVITIES_PATH: &str = "/api/v3/activities";

/// Largest client body buffered for forwarding
const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Query parameters added to list requests unless the caller sets them.
const LIST_DEFAULTS: &[(&str, &str)] = &[
    ("dueDate", "2015-11-02"),
    ("dueDateEnd", "2035-11-02"),
    ("page", "0"),
    ("size", "100"),
];

/// True when `path` names the list or single-activity endpoint in a form
/// the filtered routes do not match, e.g. `/api//v3/activities`.
fn is_disguised_activity_path(path: &str) -> bool {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    matches!(segments.len(), 3 | 4)
        && segments
            .iter()
            .zip(["api", "v3", "activities"])
            .all(|(segment, expected)| segment.eq_ignore_ascii_case(expected))
}

fn with_list_defaults(mut params: Vec<(String, String)>) -> Vec<(String, String)> {
    for (key, value) in LIST_DEFAULTS {
        if !params.iter().any(|(k, _)| k == key) {
            params.push((key.to_string(), value.to_string()));
        }
    }
    params
}

/// GET /api/v3/activities
#[instrument(skip_all, fields(request_id = %new_request_id()))]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    let token = state.tokens.access_token().await?;
    let page = state
        .upstream
        .get_json(&token, ACTIVITIES_PATH, &with_list_defaults(params))
        .await?;
    Ok(Json(apply_to_page(state.filter_mode, page)))
}

/// GET /api/v3/activities/{id}
#[instrument(skip_all, fields(request_id = %new_request_id(), activity_id = %id))]
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // The id lands in the upstream path verbatim
    if id.is_empty() || id.contains(['/', '?', '#']) || id == "." || id == ".." {
        return Err(ApiError::Validation(format!("Invalid activity ID: {id}")));
    }

    let token = state.tokens.access_token().await?;
    let activity = state
        .upstream
        .get_json(&token, &format!("{ACTIVITIES_PATH}/{id}"), &[])
        .await?;

    match state.filter_mode.admit(&activity) {
        Admission::Allowed => Ok(Json(activity)),
        Admission::Rejected {
            activity_type,
            criteria,
        } => {
            debug!(
                ?activity_type,
                mode = state.filter_mode.as_str(),
                "activity hidden by filter"
            );
            Err(ApiError::NotCleaningActivity {
                activity_type,
                criteria,
            })
        }
    }
}

/// ANY /api/* not handled elsewhere
#[instrument(skip_all, fields(request_id = %new_request_id(), method = %request.method(), path = %request.uri().path()))]
pub async fn forward(State(state): State<AppState>, request: Request) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    // Reads of activities must go through the filter
    if (parts.method == Method::GET || parts.method == Method::HEAD)
        && is_disguised_activity_path(parts.uri.path())
    {
        return Err(ApiError::Validation(format!(
            "Invalid upstream path: {}",
            parts.uri.path()
        )));
    }
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = state.upstream.url_for(path_and_query)?;

    let body = axum::body::to_bytes(body, MAX_FORWARD_BODY)
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid request body: {e}")))?;

    let token = state.tokens.access_token().await?;
    state
        .upstream
        .forward(&token, parts.method, url, &parts.headers, body)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_fill_missing_params() {
        let params = with_list_defaults(Vec::new());
        assert_eq!(
            params,
            pairs(&[
                ("dueDate", "2015-11-02"),
                ("dueDateEnd", "2035-11-02"),
                ("page", "0"),
                ("size", "100"),
            ])
        );
    }

    #[test]
    fn disguised_activity_paths_are_detected() {
        for path in [
            "/api//v3/activities",
            "/api/v3//activities/7",
            "/API/V3/Activities",
            "//api/v3/activities//",
        ] {
            assert!(is_disguised_activity_path(path), "{path}");
        }
        for path in [
            "/api/v3/units",
            "/api/v3/activities/7/notes",
            "/api/v2/activities",
        ] {
            assert!(!is_disguised_activity_path(path), "{path}");
        }
    }

    #[test]
    fn caller_params_override_defaults_and_pass_through() {
        let params = with_list_defaults(pairs(&[("page", "4"), ("unitId", "17")]));
        assert!(params.contains(&("page".into(), "4".into())));
        assert!(!params.contains(&("page".into(), "0".into())));
        assert!(params.contains(&("unitId".into(), "17".into())));
        assert!(params.contains(&("size".into(), "100".into())));
    }
}
