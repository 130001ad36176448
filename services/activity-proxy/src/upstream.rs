//! Upstream activity API client
//!
//! Every call carries a bearer token obtained from the token provider. Non-2xx
//! answers become [`ApiError`]s: 401 is reported as an authentication failure,
//! anything else keeps the upstream status and the upstream error message.
//! Targets are always resolved under the configured base URL.

use anyhow::Context;
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::ApiError;
use crate::metrics;

/// Headers to strip from relayed responses (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client request headers copied onto forwarded requests. Everything else,
/// cookies and the client's own Authorization included, stays local.
const FORWARDED_REQUEST_HEADERS: &[&str] = &["accept", "accept-language", "content-type"];

#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl Upstream {
    pub fn new(client: reqwest::Client, base_url: &str) -> anyhow::Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .with_context(|| format!("invalid upstream base URL: {base_url}"))?;
        Ok(Self { client, base_url })
    }

    /// Resolve a client path (with optional query) under the base URL.
    ///
    /// Rejects relative paths, `.` and `..` segments (plain or
    /// percent-encoded) and anything that would resolve to a different origin.
    pub fn url_for(&self, path_and_query: &str) -> Result<reqwest::Url, ApiError> {
        let invalid = || ApiError::Validation(format!("Invalid upstream path: {path_and_query}"));

        if !path_and_query.starts_with('/') {
            return Err(invalid());
        }
        let path = path_and_query.split(['?', '#']).next().unwrap_or_default();
        if path.split('/').any(is_dot_segment) {
            return Err(invalid());
        }

        let target = format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            path_and_query
        );
        let url = reqwest::Url::parse(&target).map_err(|_| invalid())?;
        if url.origin() != self.base_url.origin() {
            warn!(path = path_and_query, "rejected path escaping the upstream origin");
            return Err(invalid());
        }
        Ok(url)
    }

    /// GET a JSON document from the upstream API.
    pub async fn get_json(
        &self,
        token: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let url = self.url_for(path)?;
        debug!(url = %url, params = query.len(), "upstream GET");

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        response.json::<Value>().await.map_err(|e| {
            metrics::record_upstream_error("decode");
            error!(error = %e, "upstream returned a body that is not JSON");
            ApiError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Invalid response from upstream API".into(),
            }
        })
    }

    /// Reissue a client request against `url` and relay the upstream answer.
    pub async fn forward(
        &self,
        token: &str,
        method: Method,
        url: reqwest::Url,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, ApiError> {
        let mut outbound = HeaderMap::new();
        for (name, value) in headers {
            if FORWARDED_REQUEST_HEADERS.contains(&name.as_str()) {
                outbound.append(name.clone(), value.clone());
            }
        }
        debug!(method = %method, url = %url, "forwarding to upstream");

        let response = self
            .client
            .request(method, url)
            .headers(outbound)
            .bearer_auth(token)
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;

        let status = response.status();
        let relayed = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?;

        let mut builder = Response::builder().status(status);
        for (name, value) in &relayed {
            // Content-Length is recomputed from the buffered body
            if !is_hop_by_hop(name.as_str()) && *name != header::CONTENT_LENGTH {
                builder = builder.header(name, value);
            }
        }
        builder
            .body(Body::from(body))
            .map_err(|e| ApiError::Internal(format!("response build error: {e}")))
    }
}

/// Request id attached to the span of every proxied request.
pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Check if a header is hop-by-hop (should be stripped before relaying)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn is_dot_segment(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().as_str(),
        "." | "%2e" | ".." | ".%2e" | "%2e." | "%2e%2e"
    )
}

fn transport_error(e: reqwest::Error) -> ApiError {
    let error_type = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection"
    } else {
        "other"
    };
    metrics::record_upstream_error(error_type);
    error!(error = %e, error_type, "upstream request failed");
    ApiError::Upstream {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "Failed to reach upstream API".into(),
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        metrics::record_upstream_error("unauthorized");
        warn!("upstream rejected the access token");
        return Err(ApiError::UpstreamUnauthorized);
    }

    metrics::record_upstream_error("status");
    let body = response.bytes().await.unwrap_or_default();
    let message = error_message(&body)
        .unwrap_or_else(|| format!("Upstream API returned {}", status.as_u16()));
    warn!(status = status.as_u16(), upstream_message = %message, "upstream error response");
    Err(ApiError::Upstream { status, message })
}

/// `message` (or `error`) string of a JSON error body.
fn error_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}
