//! Token endpoint calls
//!
//! Three grants POST to the configured token URL as form bodies, with the
//! client id and secret in the body (`client_secret_post`):
//! 1. `client_credentials` for service-to-service deployments
//! 2. `authorization_code` to complete the interactive flow
//! 3. `refresh_token` to rotate an expiring access token

use common::Secret;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::OAuthConfig;
use crate::error::{Error, Result};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Response from the token endpoint for all grants.
///
/// `expires_in` is a delta in seconds from the response time; the caller
/// turns it into an absolute instant when caching the token.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Secret<String>,
    #[serde(default)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// Request a token with the client credentials grant.
pub async fn client_credentials(
    client: &reqwest::Client,
    config: &OAuthConfig,
) -> Result<TokenResponse> {
    let mut form = vec![
        ("grant_type", "client_credentials"),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.secret()),
    ];
    if let Some(scope) = config.scope() {
        form.push(("scope", scope));
    }
    post_form(client, &config.token_url, "client_credentials", &form).await
}

/// Exchange an authorization code for the first token pair.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &OAuthConfig,
    code: &str,
) -> Result<TokenResponse> {
    let redirect_uri = config.redirect_uri.as_deref().unwrap_or_default();
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.secret()),
    ];
    post_form(client, &config.token_url, "authorization_code", &form).await
}

/// Rotate an access token using a refresh token.
pub async fn refresh(
    client: &reqwest::Client,
    config: &OAuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.secret()),
    ];
    post_form(client, &config.token_url, "refresh_token", &form).await
}

async fn post_form(
    client: &reqwest::Client,
    token_url: &str,
    grant: &'static str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    debug!(grant, "requesting token");

    let response = match client.post(token_url).form(form).send().await {
        Ok(r) => r,
        Err(e) => {
            record_outcome(grant, "transport_error");
            warn!(grant, error = %e, "token endpoint unreachable");
            return Err(Error::Http(e.to_string()));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        record_outcome(grant, "rejected");
        warn!(
            grant,
            status = status.as_u16(),
            body = %body,
            "token endpoint rejected request"
        );
        return Err(Error::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    match response.json::<TokenResponse>().await {
        Ok(token) => {
            record_outcome(grant, "success");
            Ok(token)
        }
        Err(e) => {
            record_outcome(grant, "invalid_response");
            Err(Error::InvalidResponse(e.to_string()))
        }
    }
}

fn record_outcome(grant: &'static str, outcome: &'static str) {
    metrics::counter!("upstream_token_requests_total", "grant" => grant, "outcome" => outcome)
        .increment(1);
}
