//! Normalized backend errors and the response handling shared by every endpoint

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

const INVALID_RESPONSE_MESSAGE: &str = "Received invalid JSON response from server.";

/// Failure of a backend call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Non-2xx status; `message` is server supplied when available
    #[error("{message}")]
    Http { status: u16, message: String },

    /// Success status but the body is not the expected JSON
    #[error("Received invalid JSON response from server.")]
    InvalidResponse { status: u16, detail: String },

    /// The request never produced a response
    #[error("{message}")]
    Network { message: String },
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(status: u16, detail: impl Into<String>) -> Self {
        Self::InvalidResponse {
            status,
            detail: detail.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// User-displayable message
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            ApiError::Http { message, .. } | ApiError::Network { message } => message,
            ApiError::InvalidResponse { .. } => INVALID_RESPONSE_MESSAGE,
        }
    }

    /// HTTP status, when a response was received
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } | ApiError::InvalidResponse { status, .. } => {
                Some(*status)
            }
            ApiError::Network { .. } => None,
        }
    }
}

/// Turn a raw response into a payload.
///
/// - 204: `Ok(None)`, the body is not read
/// - other 2xx: the body parsed as `T`, or [`ApiError::InvalidResponse`]
/// - anything else: [`ApiError::Http`] carrying the body's `error` or
///   `message` field, falling back to `"HTTP status N - Reason"`
pub fn handle_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Option<T>, ApiError> {
    if !status.is_success() {
        let message = server_message(body).unwrap_or_else(|| match status.canonical_reason() {
            Some(reason) => format!("HTTP status {} - {}", status.as_u16(), reason),
            None => format!("HTTP status {}", status.as_u16()),
        });
        warn!(status = status.as_u16(), %message, "API request failed");
        return Err(ApiError::http(status.as_u16(), message));
    }

    if status == StatusCode::NO_CONTENT {
        debug!("API request succeeded with 204 No Content");
        return Ok(None);
    }

    serde_json::from_slice(body).map(Some).map_err(|e| {
        warn!(status = status.as_u16(), error = %e, "Failed to parse success response");
        ApiError::invalid_response(status.as_u16(), e.to_string())
    })
}

fn server_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["error", "message"]
        .iter()
        .find_map(|key| value.get(key)?.as_str())
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_no_content_yields_none() {
        let result: Option<Value> = handle_response(StatusCode::NO_CONTENT, b"").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_not_found_uses_server_error_field() {
        let err = handle_response::<Value>(StatusCode::NOT_FOUND, br#"{"error":"not found"}"#)
            .unwrap_err();
        assert_eq!(err.message(), "not found");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_message_field_is_second_choice() {
        let err = handle_response::<Value>(
            StatusCode::BAD_REQUEST,
            br#"{"message":"Request body required"}"#,
        )
        .unwrap_err();
        assert_eq!(err.message(), "Request body required");
    }

    #[rstest]
    #[case(b"<html>Internal Server Error</html>".as_slice())]
    #[case(b"".as_slice())]
    #[case(br#"{"detail": 1}"#.as_slice())]
    fn test_server_error_without_message_mentions_status(#[case] body: &[u8]) {
        let err = handle_response::<Value>(StatusCode::INTERNAL_SERVER_ERROR, body).unwrap_err();
        assert!(err.message().contains("500"), "got {}", err.message());
        assert!(matches!(err, ApiError::Http { status: 500, .. }));
    }

    #[test]
    fn test_success_with_garbage_is_invalid_response() {
        let err = handle_response::<Value>(StatusCode::OK, b"{not json").unwrap_err();
        assert!(matches!(err, ApiError::InvalidResponse { status: 200, .. }));
        assert_eq!(err.message(), "Received invalid JSON response from server.");
    }

    #[test]
    fn test_success_parses_payload() {
        let value: Option<Value> =
            handle_response(StatusCode::CREATED, br#"{"routeId":"r1"}"#).unwrap();
        assert_eq!(value, Some(json!({"routeId": "r1"})));
    }

    #[test]
    fn test_network_error_has_no_status() {
        let err = ApiError::network("connection refused");
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "connection refused");
    }
}
