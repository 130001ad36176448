//! Configuration error types shared by every crate that loads settings

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL for {field}: {value} (must start with http:// or https://)")]
    InvalidUrl { field: &'static str, value: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
