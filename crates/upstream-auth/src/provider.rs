//! Valid-access-token provider
//!
//! `TokenProvider::access_token` is the only way the proxy obtains a bearer
//! token. Token endpoint calls are serialized by `refresh_lock`, and the
//! cache is re-checked once that lock is held, so concurrent requests that
//! all find an expiring token trigger a single acquisition and then reuse
//! its result. The cache itself sits behind an `RwLock` that is never held
//! across network I/O, so `status()` stays fast while a refresh is pending.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::authorize;
use crate::config::{AuthFlow, OAuthConfig};
use crate::error::{Error, Result};
use crate::state::{TokenState, expiry_from};
use crate::token;

/// Cached tokens expiring within this many seconds are treated as expired.
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// Snapshot reported by `/auth/status` and `/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub authenticated: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct TokenProvider {
    client: reqwest::Client,
    config: OAuthConfig,
    state: RwLock<TokenState>,
    /// Held for the whole duration of a token endpoint call
    refresh_lock: Mutex<()>,
}

impl TokenProvider {
    pub fn new(client: reqwest::Client, config: OAuthConfig) -> Self {
        Self {
            client,
            config,
            state: RwLock::new(TokenState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn flow(&self) -> AuthFlow {
        self.config.flow
    }

    async fn cached_token(&self) -> Option<String> {
        let state = self.state.read().await;
        state
            .fresh_token(Utc::now(), TimeDelta::seconds(REFRESH_BUFFER_SECS))
            .map(str::to_owned)
    }

    /// Return a token valid for at least the refresh buffer, acquiring or
    /// refreshing one when needed.
    pub async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _refreshing = self.refresh_lock.lock().await;
        // Another caller may have finished a refresh while we waited
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        match self.config.flow {
            AuthFlow::ClientCredentials => {
                let response = token::client_credentials(&self.client, &self.config).await?;
                let access = response.access_token.expose().clone();
                self.state.write().await.replace(
                    response.access_token,
                    expiry_from(Utc::now(), response.expires_in),
                    None,
                );
                info!(expires_in = response.expires_in, "acquired client credentials token");
                Ok(access)
            }
            AuthFlow::AuthorizationCode => {
                let current_refresh = self.state.read().await.refresh_token().cloned();
                let Some(current_refresh) = current_refresh else {
                    warn!("access token expired and no refresh token cached");
                    return Err(Error::NoRefreshToken);
                };

                match token::refresh(&self.client, &self.config, current_refresh.expose()).await {
                    Ok(response) => {
                        let access = response.access_token.expose().clone();
                        let refresh = response.refresh_token.or(Some(current_refresh));
                        self.state.write().await.replace(
                            response.access_token,
                            expiry_from(Utc::now(), response.expires_in),
                            refresh,
                        );
                        info!(expires_in = response.expires_in, "refreshed access token");
                        Ok(access)
                    }
                    Err(e) => {
                        self.state.write().await.clear();
                        warn!(error = %e, "token refresh failed, cleared token state");
                        Err(e)
                    }
                }
            }
        }
    }

    /// Complete the authorization code flow and cache the first token pair.
    pub async fn exchange_code(&self, code: &str) -> Result<()> {
        if self.config.flow != AuthFlow::AuthorizationCode {
            return Err(Error::FlowDisabled("authorization code exchange"));
        }
        let _refreshing = self.refresh_lock.lock().await;
        let response = token::exchange_code(&self.client, &self.config, code).await?;

        self.state.write().await.replace(
            response.access_token,
            expiry_from(Utc::now(), response.expires_in),
            response.refresh_token,
        );
        info!(expires_in = response.expires_in, "authorization code exchanged");
        Ok(())
    }

    /// Authorization URL the frontend should send the user to.
    pub fn authorization_url(&self, state: &str) -> Result<String> {
        if self.config.flow != AuthFlow::AuthorizationCode {
            return Err(Error::FlowDisabled("authorization URL"));
        }
        authorize::build_authorization_url(&self.config, state)
    }

    pub async fn status(&self) -> TokenStatus {
        let state = self.state.read().await;
        TokenStatus {
            authenticated: state.is_authenticated(Utc::now()),
            expires_at: state.expires_at(),
        }
    }

    pub async fn logout(&self) {
        self.state.write().await.clear();
        info!("token state cleared by logout");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use axum::http::StatusCode;
    use common::Secret;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    struct TokenEndpoint {
        url: String,
        calls: Arc<AtomicUsize>,
    }

    impl TokenEndpoint {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    /// Token endpoint stub answering every request with the same status/body.
    async fn start_token_endpoint(status: StatusCode, body: &'static str) -> TokenEndpoint {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());

        let app = axum::Router::new().route(
            "/token",
            axum::routing::post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        status,
                        [(axum::http::header::CONTENT_TYPE, "application/json")],
                        body,
                    )
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TokenEndpoint { url, calls }
    }

    fn provider(flow: AuthFlow, endpoint: &TokenEndpoint) -> TokenProvider {
        TokenProvider::new(reqwest::Client::new(), test_config(flow, &endpoint.url))
    }

    async fn seed(provider: &TokenProvider, access: &str, ttl: TimeDelta, refresh: Option<&str>) {
        provider.state.write().await.replace(
            Secret::new(access.to_string()),
            Utc::now() + ttl,
            refresh.map(|r| Secret::new(r.to_string())),
        );
    }

    #[tokio::test]
    async fn fresh_token_makes_no_network_call() {
        let endpoint = start_token_endpoint(StatusCode::OK, r#"{"access_token":"unused"}"#).await;
        let provider = provider(AuthFlow::ClientCredentials, &endpoint);
        seed(&provider, "at_cached", TimeDelta::minutes(10), None).await;

        assert_eq!(provider.access_token().await.unwrap(), "at_cached");
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn token_inside_buffer_triggers_one_acquisition() {
        let endpoint = start_token_endpoint(
            StatusCode::OK,
            r#"{"access_token":"at_new","expires_in":3600}"#,
        )
        .await;
        let provider = provider(AuthFlow::ClientCredentials, &endpoint);
        seed(&provider, "at_stale", TimeDelta::minutes(4), None).await;

        assert_eq!(provider.access_token().await.unwrap(), "at_new");
        assert_eq!(endpoint.calls(), 1);

        // The new token is cached for later calls
        assert_eq!(provider.access_token().await.unwrap(), "at_new");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn client_credentials_never_stores_refresh_token() {
        let endpoint = start_token_endpoint(
            StatusCode::OK,
            r#"{"access_token":"at_cc","refresh_token":"rt_ignored","expires_in":600}"#,
        )
        .await;
        let provider = provider(AuthFlow::ClientCredentials, &endpoint);

        provider.access_token().await.unwrap();
        assert!(provider.state.read().await.refresh_token().is_none());
        let status = provider.status().await;
        assert!(status.authenticated);
        assert!(status.expires_at.is_some());
    }

    #[tokio::test]
    async fn client_credentials_failure_is_auth_error() {
        let endpoint =
            start_token_endpoint(StatusCode::UNAUTHORIZED, r#"{"error":"invalid_client"}"#).await;
        let provider = provider(AuthFlow::ClientCredentials, &endpoint);

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, Error::Rejected { status: 401, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_acquisition() {
        let endpoint = start_token_endpoint(
            StatusCode::OK,
            r#"{"access_token":"at_shared","expires_in":3600}"#,
        )
        .await;
        let provider = Arc::new(provider(AuthFlow::ClientCredentials, &endpoint));

        let mut handles = vec![];
        for _ in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move { provider.access_token().await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "at_shared");
        }
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn status_answers_while_token_request_is_in_flight() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        let app = axum::Router::new().route(
            "/token",
            axum::routing::post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    (
                        StatusCode::OK,
                        [(axum::http::header::CONTENT_TYPE, "application/json")],
                        r#"{"access_token":"at_slow","expires_in":3600}"#,
                    )
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let provider = Arc::new(TokenProvider::new(
            reqwest::Client::new(),
            test_config(AuthFlow::ClientCredentials, &url),
        ));
        let pending = {
            let provider = provider.clone();
            tokio::spawn(async move { provider.access_token().await })
        };
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = tokio::time::timeout(Duration::from_millis(500), provider.status())
            .await
            .expect("status blocked behind the token request");
        assert!(!status.authenticated);

        assert_eq!(pending.await.unwrap().unwrap(), "at_slow");
        assert!(provider.status().await.authenticated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn authorization_code_without_refresh_token_fails_immediately() {
        let endpoint = start_token_endpoint(StatusCode::OK, r#"{"access_token":"unused"}"#).await;
        let provider = provider(AuthFlow::AuthorizationCode, &endpoint);

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token_when_none_returned() {
        let endpoint = start_token_endpoint(
            StatusCode::OK,
            r#"{"access_token":"at_refreshed","expires_in":3600}"#,
        )
        .await;
        let provider = provider(AuthFlow::AuthorizationCode, &endpoint);
        seed(&provider, "at_old", TimeDelta::minutes(1), Some("rt_keep")).await;

        assert_eq!(provider.access_token().await.unwrap(), "at_refreshed");
        let state = provider.state.read().await;
        assert_eq!(state.refresh_token().unwrap().expose(), "rt_keep");
    }

    #[tokio::test]
    async fn refresh_rotates_refresh_token() {
        let endpoint = start_token_endpoint(
            StatusCode::OK,
            r#"{"access_token":"at_r","refresh_token":"rt_rotated","expires_in":3600}"#,
        )
        .await;
        let provider = provider(AuthFlow::AuthorizationCode, &endpoint);
        seed(&provider, "at_old", TimeDelta::minutes(2), Some("rt_old")).await;

        provider.access_token().await.unwrap();
        let state = provider.state.read().await;
        assert_eq!(state.refresh_token().unwrap().expose(), "rt_rotated");
    }

    #[tokio::test]
    async fn refresh_failure_clears_state_and_later_calls_fail() {
        let endpoint =
            start_token_endpoint(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#).await;
        let provider = provider(AuthFlow::AuthorizationCode, &endpoint);
        seed(&provider, "at_old", TimeDelta::minutes(1), Some("rt_revoked")).await;

        assert!(provider.access_token().await.is_err());
        {
            let state = provider.state.read().await;
            assert!(state.is_empty());
            assert!(state.expires_at().is_none());
        }

        // No refresh token left: fails without touching the endpoint again
        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn exchange_code_authenticates() {
        let endpoint = start_token_endpoint(
            StatusCode::OK,
            r#"{"access_token":"at_first","refresh_token":"rt_first","expires_in":3600}"#,
        )
        .await;
        let provider = provider(AuthFlow::AuthorizationCode, &endpoint);
        assert!(!provider.status().await.authenticated);

        provider.exchange_code("auth-code").await.unwrap();
        assert!(provider.status().await.authenticated);
        assert_eq!(provider.access_token().await.unwrap(), "at_first");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn exchange_code_rejected_in_client_credentials_flow() {
        let endpoint = start_token_endpoint(StatusCode::OK, r#"{"access_token":"unused"}"#).await;
        let provider = provider(AuthFlow::ClientCredentials, &endpoint);

        let err = provider.exchange_code("code").await.unwrap_err();
        assert!(matches!(err, Error::FlowDisabled(_)));
        assert!(provider.authorization_url("state").is_err());
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let endpoint = start_token_endpoint(StatusCode::OK, r#"{"access_token":"unused"}"#).await;
        let provider = provider(AuthFlow::AuthorizationCode, &endpoint);
        seed(&provider, "at", TimeDelta::hours(1), Some("rt")).await;

        provider.logout().await;
        assert_eq!(
            provider.status().await,
            TokenStatus {
                authenticated: false,
                expires_at: None
            }
        );
        assert!(provider.access_token().await.is_err());
    }

    #[test]
    fn status_serializes_camel_case() {
        let json = serde_json::to_value(TokenStatus {
            authenticated: false,
            expires_at: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"authenticated": false, "expiresAt": null}));
    }
}
