//! Helpers shared by the HTTP transports

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};

use crate::config::McpClientConfig;
use crate::error::{GatewayError, Result};

/// Build an HTTP client sending `headers` on every request
pub fn build_http_client(headers: &HashMap<String, String>, config: &McpClientConfig) -> Result<Client> {
    let mut default_headers = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| GatewayError::bad_request(format!("Invalid header name '{}': {}", key, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| GatewayError::bad_request(format!("Invalid value for header '{}': {}", key, e)))?;
        default_headers.insert(name, value);
    }

    Client::builder()
        .connect_timeout(config.connect_timeout())
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .default_headers(default_headers)
        .build()
        .map_err(|e| GatewayError::protocol(format!("Failed to create HTTP client: {}", e)))
}

/// Classify a transport-level reqwest failure
pub fn request_error(error: reqwest::Error, url: &str) -> GatewayError {
    if error.is_connect() {
        GatewayError::connection_refused(format!("Could not connect to {}: {}", url, error))
            .with_context("url", url)
    } else if error.is_timeout() {
        GatewayError::timeout(format!("Request to {} timed out", url)).with_context("url", url)
    } else {
        GatewayError::Http(error)
    }
}

/// Classify a non-success HTTP status
pub fn status_error(status: StatusCode, url: &str, body: &str) -> GatewayError {
    let reason = status.canonical_reason().unwrap_or("Unknown");
    let message = if body.trim().is_empty() {
        format!("HTTP {} {} from {}", status.as_u16(), reason, url)
    } else {
        format!("HTTP {} {} from {}: {}", status.as_u16(), reason, url, body.trim())
    };

    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::unauthorized(message),
        StatusCode::NOT_FOUND => GatewayError::not_found(message),
        _ => GatewayError::connection_refused(message),
    };
    error
        .with_context("url", url)
        .with_context("status", status.as_u16().to_string())
}
