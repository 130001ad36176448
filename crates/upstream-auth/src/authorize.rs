//! Authorization code flow helpers
//!
//! `/auth/url` issues a random `state` value and the authorization URL that
//! carries it; `/auth/callback` must present the same `state` back before the
//! code is exchanged. Issued states live in memory, are single-use, and
//! expire after [`STATE_TTL`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::OAuthConfig;
use crate::error::{Error, Result};

/// How long an issued state stays redeemable.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Generate an unguessable CSRF state value (32 random bytes, base64url).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the authorization URL with all required query parameters.
pub fn build_authorization_url(config: &OAuthConfig, state: &str) -> Result<String> {
    let auth_url = config
        .auth_url
        .as_deref()
        .ok_or_else(|| Error::AuthorizationUrl("oauth.auth_url is not configured".into()))?;
    let redirect_uri = config.redirect_uri.as_deref().unwrap_or_default();

    let mut params = vec![
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", redirect_uri),
    ];
    if let Some(scope) = config.scope() {
        params.push(("scope", scope));
    }
    params.push(("state", state));

    reqwest::Url::parse_with_params(auth_url, &params)
        .map(String::from)
        .map_err(|e| Error::AuthorizationUrl(e.to_string()))
}

/// States issued by `/auth/url` that have not been redeemed yet.
pub struct PendingStates {
    ttl: Duration,
    issued: Mutex<HashMap<String, Instant>>,
}

impl Default for PendingStates {
    fn default() -> Self {
        Self::with_ttl(STATE_TTL)
    }
}

impl PendingStates {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// Issue and remember a fresh state value.
    pub async fn issue(&self) -> String {
        let state = generate_state();
        let mut issued = self.issued.lock().await;
        // Lazy cleanup while holding the lock
        issued.retain(|_, created| created.elapsed() < self.ttl);
        issued.insert(state.clone(), Instant::now());
        debug!(pending = issued.len(), "authorization state issued");
        state
    }

    /// Redeem a state. Returns false for unknown, reused or expired values.
    pub async fn consume(&self, state: &str) -> bool {
        let mut issued = self.issued.lock().await;
        match issued.remove(state) {
            Some(created) => created.elapsed() < self.ttl,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthFlow, test_config};

    #[test]
    fn state_is_url_safe_and_unique() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 43);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state must be URL-safe: {a}"
        );
        assert_ne!(a, b);
    }

    #[test]
    fn authorization_url_contains_required_params() {
        let config = test_config(AuthFlow::AuthorizationCode, "https://auth.example.com/token");
        let url = build_authorization_url(&config, "st_123").unwrap();
        let parsed = reqwest::Url::parse(&url).unwrap();
        let params: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        assert!(url.starts_with("https://auth.example.com/oauth/authorize?"));
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client-123");
        assert_eq!(params["redirect_uri"], "http://localhost:3001/auth/callback");
        assert_eq!(params["scope"], "activities:read");
        assert_eq!(params["state"], "st_123");
    }

    #[test]
    fn authorization_url_encodes_redirect_uri() {
        let config = test_config(AuthFlow::AuthorizationCode, "https://auth.example.com/token");
        let url = build_authorization_url(&config, "s").unwrap();
        assert!(
            url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3001%2Fauth%2Fcallback"),
            "got: {url}"
        );
    }

    #[test]
    fn authorization_url_requires_auth_url() {
        let mut config = test_config(AuthFlow::AuthorizationCode, "https://auth.example.com/token");
        config.auth_url = None;
        assert!(matches!(
            build_authorization_url(&config, "s"),
            Err(Error::AuthorizationUrl(_))
        ));
    }

    #[tokio::test]
    async fn issued_state_is_single_use() {
        let pending = PendingStates::default();
        let state = pending.issue().await;
        assert!(pending.consume(&state).await);
        assert!(!pending.consume(&state).await, "state must not be reusable");
    }

    #[tokio::test]
    async fn unknown_state_rejected() {
        let pending = PendingStates::default();
        pending.issue().await;
        assert!(!pending.consume("forged").await);
    }

    #[tokio::test]
    async fn expired_state_rejected() {
        let pending = PendingStates::with_ttl(Duration::ZERO);
        let state = pending.issue().await;
        assert!(!pending.consume(&state).await);
    }
}
