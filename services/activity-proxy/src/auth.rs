//! OAuth endpoints
//!
//! `/auth/url` and `/auth/callback` exist only for the authorization code
//! flow, `/auth/test` only for client credentials. Status and logout are
//! mounted for both.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use upstream_auth::TokenStatus;

use crate::AppState;
use crate::error::ApiError;

/// GET /auth/url
pub async fn authorization_url(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let csrf_state = state.pending_states.issue().await;
    let auth_url = state.tokens.authorization_url(&csrf_state)?;
    Ok(Json(json!({ "authUrl": auth_url })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/callback
///
/// Always answers with a redirect to the frontend carrying `auth=success` or
/// `auth=error&message=...`.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, ApiError> {
    let outcome = complete_authorization(&state, params).await;
    let query: Vec<(&str, String)> = match &outcome {
        Ok(()) => vec![("auth", "success".into())],
        Err(message) => vec![("auth", "error".into()), ("message", message.clone())],
    };

    let target = reqwest::Url::parse_with_params(&state.frontend_url, &query)
        .map_err(|e| ApiError::Internal(format!("invalid frontend URL: {e}")))?;
    Ok(Redirect::to(target.as_str()))
}

async fn complete_authorization(state: &AppState, params: CallbackParams) -> Result<(), String> {
    if let Some(error) = params.error {
        let message = params.error_description.unwrap_or(error);
        warn!(error = %message, "authorization server returned an error");
        return Err(message);
    }

    let issued = match params.state.as_deref() {
        Some(csrf_state) => state.pending_states.consume(csrf_state).await,
        None => false,
    };
    if !issued {
        warn!("callback with unknown, reused or expired state");
        return Err("Invalid or expired authorization state".into());
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return Err("No authorization code received".into());
    };

    state.tokens.exchange_code(&code).await.map_err(|e| {
        warn!(error = %e, "authorization code exchange failed");
        e.to_string()
    })?;
    info!("authorization completed");
    Ok(())
}

/// GET /auth/status
pub async fn status(State(state): State<AppState>) -> Json<TokenStatus> {
    Json(state.tokens.status().await)
}

/// POST /auth/logout
pub async fn logout(State(state): State<AppState>) -> Json<Value> {
    state.tokens.logout().await;
    Json(json!({ "message": "Logged out successfully" }))
}

/// GET /auth/test
///
/// Forces a client credentials acquisition (or reuses the cached token) and
/// reports the outcome.
pub async fn test_connection(State(state): State<AppState>) -> Response {
    match state.tokens.access_token().await {
        Ok(_) => {
            let status = state.tokens.status().await;
            Json(json!({
                "authenticated": true,
                "message": "Successfully authenticated with upstream API",
                "expiresAt": status.expires_at,
            }))
            .into_response()
        }
        Err(e) => {
            warn!(error = %e, "client credentials test failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "authenticated": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
