//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. The config file path comes
//! from `--config`, then `CONFIG_PATH`, then `activity-proxy.toml`. The OAuth
//! client secret is resolved from `UPSTREAM_CLIENT_SECRET`, then
//! `oauth.client_secret_file`, then an inline `oauth.client_secret`.

use activity_filter::FilterMode;
use common::{Secret, require_http_url};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use upstream_auth::{AuthFlow, OAuthConfig};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    pub upstream: UpstreamConfig,
}

/// HTTP listener, CORS and client transport settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Where `/auth/callback` redirects; always an allowed CORS origin
    #[serde(default)]
    pub frontend_url: String,
    /// Additional allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            frontend_url: String::new(),
            cors_origins: Vec::new(),
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

/// Upstream activity API settings
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub base_url: String,
    pub filter_mode: FilterMode,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3001))
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents, |name| std::env::var(name).ok())
    }

    /// Parse, overlay values from `env`, resolve the client secret, validate.
    pub fn from_toml(contents: &str, env: impl Fn(&str) -> Option<String>) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.apply_env(&env)?;
        config.resolve_client_secret(&env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> common::Result<()> {
        let set = |target: &mut String, name: &str| {
            if let Some(value) = env(name).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        };
        let set_opt = |target: &mut Option<String>, name: &str| {
            if let Some(value) = env(name).filter(|v| !v.trim().is_empty()) {
                *target = Some(value);
            }
        };

        set(&mut self.oauth.client_id, "UPSTREAM_CLIENT_ID");
        set(&mut self.oauth.token_url, "UPSTREAM_TOKEN_URL");
        set_opt(&mut self.oauth.auth_url, "UPSTREAM_AUTH_URL");
        set_opt(&mut self.oauth.redirect_uri, "UPSTREAM_REDIRECT_URI");
        set_opt(&mut self.oauth.scope, "UPSTREAM_SCOPE");
        set(&mut self.upstream.base_url, "UPSTREAM_API_BASE_URL");
        set(&mut self.server.frontend_url, "FRONTEND_URL");

        if let Some(addr) = env("LISTEN_ADDR") {
            self.server.listen_addr = addr.parse().map_err(|e| {
                common::Error::Config(format!("LISTEN_ADDR is not a socket address ({addr}): {e}"))
            })?;
        }
        Ok(())
    }

    fn resolve_client_secret(&mut self, env: &impl Fn(&str) -> Option<String>) -> common::Result<()> {
        if let Some(secret) = env("UPSTREAM_CLIENT_SECRET").filter(|v| !v.trim().is_empty()) {
            self.oauth.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = self.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                self.oauth.client_secret = Some(Secret::new(secret));
            }
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        self.oauth.validate()?;
        require_http_url("upstream.base_url", &self.upstream.base_url)?;

        if self.oauth.flow == AuthFlow::AuthorizationCode || !self.server.frontend_url.is_empty() {
            require_http_url("server.frontend_url", &self.server.frontend_url)?;
        }
        for origin in &self.server.cors_origins {
            require_http_url("server.cors_origins", origin)?;
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Every origin the CORS layer should accept.
    pub fn allowed_origins(&self) -> Vec<String> {
        std::iter::once(&self.server.frontend_url)
            .chain(self.server.cors_origins.iter())
            .filter(|o| !o.is_empty())
            .map(|o| o.trim_end_matches('/').to_string())
            .collect()
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("activity-proxy.toml")
    }
}
