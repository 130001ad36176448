//! OAuth2 token lifecycle for the upstream activity API
//!
//! Owns the single process-wide token cache and knows how to talk to the
//! upstream token endpoint. Two flows are supported, selected by
//! configuration:
//!
//! - client credentials: the provider re-acquires a token whenever the cached
//!   one is inside the expiry buffer
//! - authorization code + refresh: the first token pair arrives through
//!   `/auth/url` + `/auth/callback` (see [`authorize`]); afterwards the
//!   provider refreshes with the cached refresh token
//!
//! Every failure talking to the token endpoint is an [`Error`], which the
//! HTTP boundary reports as an authentication failure.

pub mod authorize;
pub mod config;
pub mod error;
pub mod provider;
pub mod state;
pub mod token;

pub use authorize::{PendingStates, build_authorization_url, generate_state};
pub use config::{AuthFlow, OAuthConfig};
pub use error::{Error, Result};
pub use provider::{REFRESH_BUFFER_SECS, TokenProvider, TokenStatus};
pub use state::TokenState;
pub use token::TokenResponse;
