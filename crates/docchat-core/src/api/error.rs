//! Normalized API errors.
//!
//! Every failure leaving the client collapses into [`ApiError`]. Callers are
//! expected to show `message` and only rarely branch on `kind`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used when a server error carries no usable text.
pub const SERVER_ERROR_MESSAGE: &str = "Server error";

/// Message used when a request was sent but no response arrived.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error - please check your connection";

/// Message used when a local failure has no message of its own.
pub const UNEXPECTED_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Categories of API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// HTTP 401. The session has been cleared by the time the caller sees it.
    Unauthorized,
    /// HTTP 403
    Forbidden,
    /// HTTP 5xx
    Server,
    /// Any other non-success status
    Http,
    /// 2xx envelope with `success: false`
    Rejected,
    /// Request dispatched, no response received
    Network,
    /// Failure before the request left the client
    Local,
    /// Response body did not match the expected shape
    Decode,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::Unauthorized => write!(f, "unauthorized"),
            ApiErrorKind::Forbidden => write!(f, "forbidden"),
            ApiErrorKind::Server => write!(f, "server"),
            ApiErrorKind::Http => write!(f, "http"),
            ApiErrorKind::Rejected => write!(f, "rejected"),
            ApiErrorKind::Network => write!(f, "network"),
            ApiErrorKind::Local => write!(f, "local"),
            ApiErrorKind::Decode => write!(f, "decode"),
        }
    }
}

/// The single error shape returned by the API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// One-line message suitable for display.
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Error for a non-success status. The message comes from the body's
    /// `error`, then `message`, then [`SERVER_ERROR_MESSAGE`].
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let kind = match status {
            401 => ApiErrorKind::Unauthorized,
            403 => ApiErrorKind::Forbidden,
            500..=599 => ApiErrorKind::Server,
            _ => ApiErrorKind::Http,
        };
        let parsed: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
        let message = pick_message(parsed.error.as_ref(), parsed.message.as_deref());

        Self {
            kind,
            status: Some(status),
            message,
        }
    }

    /// A 2xx envelope that reported `success: false`.
    pub fn rejected(status: u16, error: Option<&Value>, message: Option<&str>) -> Self {
        Self {
            kind: ApiErrorKind::Rejected,
            status: Some(status),
            message: pick_message(error, message),
        }
    }

    pub fn network() -> Self {
        Self::new(ApiErrorKind::Network, NETWORK_ERROR_MESSAGE)
    }

    /// A failure before dispatch. Blank messages fall back to
    /// [`UNEXPECTED_ERROR_MESSAGE`].
    pub fn local(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            return Self::new(ApiErrorKind::Local, UNEXPECTED_ERROR_MESSAGE);
        }
        Self::new(ApiErrorKind::Local, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Decode, message)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }
}

fn pick_message(error: Option<&Value>, message: Option<&str>) -> String {
    let from_error = error.and_then(|value| match value {
        Value::String(text) => Some(text.as_str()),
        Value::Object(obj) => obj.get("message").and_then(Value::as_str),
        _ => None,
    });

    [from_error, message]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .unwrap_or(SERVER_ERROR_MESSAGE)
        .to_string()
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_field_wins_over_message() {
        let err = ApiError::from_response(
            400,
            br#"{"success":false,"error":"X","message":"ignored"}"#,
        );
        assert_eq!(err.message, "X");
        assert_eq!(err.kind, ApiErrorKind::Http);
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn test_message_used_when_error_missing() {
        let err = ApiError::from_response(422, br#"{"success":false,"message":"Name taken"}"#);
        assert_eq!(err.message, "Name taken");
    }

    #[test]
    fn test_nested_error_object_message() {
        let err = ApiError::from_response(403, br#"{"error":{"message":"Plan limit reached"}}"#);
        assert_eq!(err.message, "Plan limit reached");
        assert_eq!(err.kind, ApiErrorKind::Forbidden);
    }

    #[test]
    fn test_unparseable_body_falls_back_to_server_error() {
        let err = ApiError::from_response(502, b"<html>Bad Gateway</html>");
        assert_eq!(err.message, SERVER_ERROR_MESSAGE);
        assert_eq!(err.kind, ApiErrorKind::Server);

        let err = ApiError::from_response(500, br#"{"error":""}"#);
        assert_eq!(err.message, SERVER_ERROR_MESSAGE);
    }

    #[test]
    fn test_status_401_is_unauthorized() {
        assert!(ApiError::from_response(401, b"").is_unauthorized());
    }

    #[test]
    fn test_local_blank_message_uses_generic_text() {
        assert_eq!(ApiError::local("").message, UNEXPECTED_ERROR_MESSAGE);
        assert_eq!(ApiError::local("bad path").message, "bad path");
    }

    #[test]
    fn test_display_is_message_only() {
        assert_eq!(ApiError::network().to_string(), NETWORK_ERROR_MESSAGE);
    }
}
