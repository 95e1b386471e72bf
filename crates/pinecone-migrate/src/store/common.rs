//! HTTP helpers shared by REST-backed stores.
//!
//! Client construction, URL checks, and the mapping from HTTP status codes
//! onto the engine's error taxonomy.

use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use std::time::Duration;

/// Default HTTP timeout for all requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a configured HTTP client with timeout.
#[must_use]
pub fn create_http_client() -> Client {
    Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Validates an endpoint URL.
pub fn validate_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }
    if url.len() < 10 {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }
    Ok(())
}

/// Turns a bare host name into a base URL without trailing slash.
#[must_use]
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Reads a `Retry-After` header expressed in seconds.
#[must_use]
pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn looks_too_large(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("too large")
        || (lower.contains("exceeds") && (lower.contains("size") || lower.contains("limit")))
}

/// Handles HTTP error responses and returns appropriate errors.
///
/// `index` names the index the request targeted, for not-found errors.
pub fn handle_http_error(
    status_code: u16,
    body: &str,
    index: &str,
    retry_after: Option<u64>,
) -> Error {
    match status_code {
        429 => Error::RateLimit(retry_after),
        413 => Error::PayloadTooLarge(body.to_string()),
        400 | 422 if looks_too_large(body) => Error::PayloadTooLarge(body.to_string()),
        400 | 422 if body.to_lowercase().contains("not supported") => {
            Error::Unsupported(body.to_string())
        }
        400 | 422 => Error::Validation(body.to_string()),
        401 | 403 => Error::Authentication(format!("index '{}': {}", index, body)),
        404 => Error::IndexNotFound(index.to_string()),
        409 => Error::AlreadyExists(index.to_string()),
        500..=599 => Error::Unavailable(format!("HTTP {}: {}", status_code, body)),
        _ => Error::Store(format!("HTTP {}: {}", status_code, body)),
    }
}
