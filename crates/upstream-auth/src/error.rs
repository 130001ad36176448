//! Error types for token acquisition and refresh

/// Errors from OAuth token operations.
///
/// All variants mean "the proxy holds no usable upstream credential"; the
/// HTTP boundary maps every one of them to 401 with `requiresAuth`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token endpoint request failed: {0}")]
    Http(String),

    /// `body` is kept for logging and never rendered by `Display`, since
    /// `Display` output reaches API clients.
    #[error("token endpoint returned {status}")]
    Rejected { status: u16, body: String },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("no refresh token available, authorization required")]
    NoRefreshToken,

    #[error("{0} is not available with the configured OAuth flow")]
    FlowDisabled(&'static str),

    #[error("invalid authorization URL: {0}")]
    AuthorizationUrl(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
