//! Error types for the remote gateway crate.

use fieldsync_core::sync::{classify_http_status, GatewayResponse, SyncRetryClass};
use thiserror::Error;

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Errors that can occur while talking to the remote API.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// HTTP client error (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success response from the remote API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or malformed credentials
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> SyncRetryClass {
        match self {
            Self::Api { status, .. } => classify_http_status(*status),
            Self::Http(_) => SyncRetryClass::Retryable,
            Self::Json(_) | Self::InvalidRequest(_) => SyncRetryClass::Permanent,
            Self::Auth(_) => SyncRetryClass::ReauthRequired,
        }
    }

    /// Folds the error into the engine-facing response shape. Transport
    /// failures carry `status = 0`; local request problems are reported as
    /// 400 or 401 so the engine classifies them the same way.
    pub fn into_gateway_response(self) -> GatewayResponse {
        match self {
            Self::Api { status, message } => GatewayResponse::failure(status, message),
            Self::Http(err) if err.is_timeout() => GatewayResponse::timed_out(),
            Self::Http(err) => GatewayResponse::transport_failure(err.to_string()),
            Self::Json(err) => GatewayResponse::failure(400, err.to_string()),
            Self::InvalidRequest(message) => GatewayResponse::failure(400, message),
            Self::Auth(message) => GatewayResponse::failure(401, message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = RemoteError::api(401, "unauthorized");
        assert_eq!(err.retry_class(), SyncRetryClass::ReauthRequired);
        assert_eq!(RemoteError::auth("no token").retry_class(), SyncRetryClass::ReauthRequired);
    }

    #[test]
    fn local_errors_keep_their_class_as_responses() {
        let response = RemoteError::invalid_request("empty doc id").into_gateway_response();
        assert_eq!(response.retry_class(), SyncRetryClass::Permanent);

        let response = RemoteError::api(503, "maintenance").into_gateway_response();
        assert_eq!(response.status, 503);
        assert_eq!(response.retry_class(), SyncRetryClass::Retryable);
    }
}
