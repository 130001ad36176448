//! In-memory token cache
//!
//! Holds at most one access token (always paired with its expiry) and an
//! optional refresh token. The cache is replaced wholesale on every
//! successful acquisition and cleared wholesale on refresh failure or
//! logout; nothing is persisted across restarts.

use chrono::{DateTime, TimeDelta, Utc};
use common::Secret;

/// Access token plus the absolute instant it stops being valid.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: Secret<String>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenState {
    token: Option<CachedToken>,
    refresh_token: Option<Secret<String>>,
}

impl TokenState {
    pub fn access_token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.access_token.expose().as_str())
    }

    pub fn refresh_token(&self) -> Option<&Secret<String>> {
        self.refresh_token.as_ref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token.as_ref().map(|t| t.expires_at)
    }

    /// The cached access token, if it stays valid for longer than `buffer`.
    pub fn fresh_token(&self, now: DateTime<Utc>, buffer: TimeDelta) -> Option<&str> {
        self.token
            .as_ref()
            .filter(|t| t.expires_at > now + buffer)
            .map(|t| t.access_token.expose().as_str())
    }

    /// Whether a token is cached and has not expired yet.
    pub fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.token.as_ref().is_some_and(|t| t.expires_at > now)
    }

    /// Overwrite all three fields at once.
    pub fn replace(
        &mut self,
        access_token: Secret<String>,
        expires_at: DateTime<Utc>,
        refresh_token: Option<Secret<String>>,
    ) {
        *self = TokenState {
            token: Some(CachedToken {
                access_token,
                expires_at,
            }),
            refresh_token,
        };
    }

    pub fn clear(&mut self) {
        *self = TokenState::default();
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.refresh_token.is_none()
    }
}

/// Absolute expiry for a token issued at `now` with lifetime `expires_in` seconds.
pub fn expiry_from(now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    i64::try_from(expires_in)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
