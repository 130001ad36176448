//! Small validation helpers used by config loaders

use crate::error::{Error, Result};

/// Reject values that are not absolute http(s) URLs.
pub fn require_http_url(field: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::InvalidUrl {
            field,
            value: value.to_string(),
        })
    }
}

/// Reject empty or whitespace-only values.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::Missing(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(require_http_url("x", "http://localhost:3000").is_ok());
        assert!(require_http_url("x", "https://api.example.com").is_ok());
    }

    #[test]
    fn rejects_schemeless_url() {
        let err = require_http_url("upstream.base_url", "api.example.com").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { field: "upstream.base_url", .. }));
    }

    #[test]
    fn rejects_blank_value() {
        assert!(matches!(
            require_non_empty("oauth.client_id", "   "),
            Err(Error::Missing("oauth.client_id"))
        ));
        assert!(require_non_empty("oauth.client_id", "abc").is_ok());
    }
}
