//! Shared types for the activity proxy workspace

mod error;
mod secret;
mod validate;

pub use error::{Error, Result};
pub use secret::Secret;
pub use validate::{require_http_url, require_non_empty};
