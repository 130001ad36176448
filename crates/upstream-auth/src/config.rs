//! OAuth client configuration
//!
//! Deserialized from the `[oauth]` table of the service config. The client
//! secret is normally supplied through the environment or a secret file and
//! resolved by the service loader before [`OAuthConfig::validate`] runs.

use common::{Secret, require_http_url, require_non_empty};
use serde::Deserialize;
use std::path::PathBuf;

/// Which OAuth grant the deployment uses to obtain access tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthFlow {
    /// Service-to-service: no user interaction, no refresh token
    ClientCredentials,
    /// Interactive authorization followed by refresh-token rotation
    AuthorizationCode,
}

impl AuthFlow {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFlow::ClientCredentials => "client-credentials",
            AuthFlow::AuthorizationCode => "authorization-code",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub flow: AuthFlow,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub token_url: String,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthConfig {
    /// Check that everything the configured flow needs is present.
    pub fn validate(&self) -> common::Result<()> {
        require_non_empty("oauth.client_id", &self.client_id)?;
        match &self.client_secret {
            Some(secret) if !secret.is_blank() => {}
            _ => return Err(common::Error::Missing("oauth.client_secret")),
        }
        require_http_url("oauth.token_url", &self.token_url)?;

        if self.flow == AuthFlow::AuthorizationCode {
            let auth_url = self
                .auth_url
                .as_deref()
                .ok_or(common::Error::Missing("oauth.auth_url"))?;
            require_http_url("oauth.auth_url", auth_url)?;
            let redirect_uri = self
                .redirect_uri
                .as_deref()
                .ok_or(common::Error::Missing("oauth.redirect_uri"))?;
            require_http_url("oauth.redirect_uri", redirect_uri)?;
        }
        Ok(())
    }

    /// Client secret as sent to the token endpoint (empty when unset).
    pub(crate) fn secret(&self) -> &str {
        self.client_secret
            .as_ref()
            .map(|s| s.expose().as_str())
            .unwrap_or_default()
    }

    /// Scope parameter, skipping blank values.
    pub(crate) fn scope(&self) -> Option<&str> {
        self.scope.as_deref().filter(|s| !s.trim().is_empty())
    }
}

#[cfg(test)]
pub(crate) fn test_config(flow: AuthFlow, token_url: &str) -> OAuthConfig {
    OAuthConfig {
        flow,
        client_id: "client-123".into(),
        client_secret: Some(Secret::new("secret-456".into())),
        client_secret_file: None,
        token_url: token_url.to_string(),
        auth_url: Some("https://auth.example.com/oauth/authorize".into()),
        redirect_uri: Some("http://localhost:3001/auth/callback".into()),
        scope: Some("activities:read".into()),
    }
}
