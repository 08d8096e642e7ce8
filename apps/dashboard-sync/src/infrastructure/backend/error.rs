//! Backend adapter errors.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors constructing the backend adapter.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Error body returned by the trading backend.
///
/// `detail` is usually a string but validation failures carry a list.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Message to show for a failed response.
///
/// Prefers the server's `detail`, then `message`, then the raw body, then
/// the status reason.
pub(super) fn error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok();
    let from_body = parsed.and_then(|err| match err.detail {
        Some(Value::String(detail)) => Some(detail),
        Some(Value::Null) | None => err.message,
        Some(other) => Some(other.to_string()),
    });
    if let Some(message) = from_body.filter(|m| !m.is_empty()) {
        return message;
    }

    let raw = body.trim();
    if !raw.is_empty() {
        return raw.to_string();
    }

    status
        .canonical_reason()
        .map_or_else(|| status.as_str().to_string(), str::to_string)
}
