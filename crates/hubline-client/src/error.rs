//! # Client Error Types
//!
//! Error types for the request engine, secure storage and auth synchronizer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Client Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Local          │  │   Transport     │  │     Credential          │ │
//! │  │                 │  │  (retryable)    │  │                         │ │
//! │  │  Validation     │  │  Timeout        │  │  Unauthorized (401)     │ │
//! │  │  RateLimited    │  │  Network        │  │  Forbidden    (403)     │ │
//! │  │                 │  │  ServerError 5xx│  │  NoSession    (404)     │ │
//! │  │                 │  │  TooManyRequests│  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Response     │  │     Storage     │  │      Config             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotFound       │  │  Storage        │  │  InvalidConfig          │ │
//! │  │  BadStatus      │  │                 │  │  ConfigLoadFailed       │ │
//! │  │  Decode         │  │                 │  │  ConfigSaveFailed       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ClientError` is `Clone` so one failure can be stored in a
//! [`RequestResult`](crate::engine::RequestResult) and handed to several
//! waiters.

use hubline_core::{CoreError, ValidationError};
use serde_json::Value;
use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Every failure the client surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    // =========================================================================
    // Local Errors (never reached the network)
    // =========================================================================
    /// Input failed a structural check.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Local admission control refused the call.
    #[error("Rate limited, retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The attempt exceeded the per-request timeout.
    #[error("Request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Connection, DNS or TLS failure.
    #[error("Network error: {0}")]
    Network(String),

    // =========================================================================
    // HTTP Status Errors
    // =========================================================================
    /// 401: the credential is invalid or expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 403: the credential is not allowed to act.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// 404 from the identity endpoint: no active session for the credential.
    #[error("No active session")]
    NoSession,

    /// 404 from any other endpoint.
    #[error("Not found: {endpoint}")]
    NotFound { endpoint: String },

    /// 429 from the server.
    #[error("Server rate limit hit")]
    TooManyRequests { retry_after_secs: Option<u64> },

    /// 5xx.
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Any other non-2xx status.
    #[error("Request failed with status {status}: {message}")]
    BadStatus { status: u16, message: String },

    /// The body could not be decoded into the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Secure storage could not be read, written or parsed.
    #[error("Secure storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Auth Errors
    // =========================================================================
    /// The server confirmed a different user than the one signing in.
    #[error("Credential belongs to '{actual}', not '{expected}'")]
    IdentityMismatch { expected: String, actual: String },

    /// The operation needs a signed-in user.
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

// =============================================================================
// Status Mapping
// =============================================================================

impl ClientError {
    /// Maps a non-2xx response into a typed error.
    ///
    /// 404 maps to [`ClientError::NotFound`]; whether that means "no session"
    /// is decided by the auth layer, not here.
    pub fn from_status(
        status: u16,
        endpoint: &str,
        body: Option<&Value>,
        retry_after_secs: Option<u64>,
    ) -> Self {
        let message = body
            .and_then(extract_message)
            .unwrap_or_else(|| format!("HTTP {}", status));

        match status {
            401 => ClientError::Unauthorized(message),
            403 => ClientError::Forbidden(message),
            404 => ClientError::NotFound {
                endpoint: endpoint.to_string(),
            },
            429 => ClientError::TooManyRequests { retry_after_secs },
            500..=599 => ClientError::ServerError { status, message },
            _ => ClientError::BadStatus { status, message },
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized(_) => Some(401),
            ClientError::Forbidden(_) => Some(403),
            ClientError::NoSession | ClientError::NotFound { .. } => Some(404),
            ClientError::TooManyRequests { .. } => Some(429),
            ClientError::ServerError { status, .. } | ClientError::BadStatus { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Pulls a human-readable message out of a forum error body.
///
/// Handles `{"errors": ["..."]}` and `{"error": "..."}`.
fn extract_message(body: &Value) -> Option<String> {
    if let Some(first) = body
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(Value::as_str)
    {
        return Some(first.to_string());
    }
    body.get("error").and_then(Value::as_str).map(str::to_string)
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => ClientError::Validation(v),
            CoreError::NoUser => ClientError::NotAuthenticated,
            other @ CoreError::MalformedPayload { .. } => ClientError::Decode(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // Exact duration is filled in by the engine, which knows its timeout.
            ClientError::Timeout { after_ms: 0 }
        } else if err.is_decode() {
            ClientError::Decode(err.to_string())
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::InvalidConfig(format!("invalid URL: {}", err))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry and auth logic)
// =============================================================================

impl ClientError {
    /// Returns true if another attempt may succeed.
    ///
    /// ## Retryable
    /// - Timeouts and transport failures
    /// - 5xx
    /// - 429
    ///
    /// ## Non-Retryable
    /// - Validation and local rate limiting
    /// - Every other 4xx
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. }
                | ClientError::Network(_)
                | ClientError::ServerError { .. }
                | ClientError::TooManyRequests { .. }
        )
    }

    /// Returns true if the server rejected the credential itself.
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, ClientError::Unauthorized(_) | ClientError::Forbidden(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidConfig(_)
                | ClientError::ConfigLoadFailed(_)
                | ClientError::ConfigSaveFailed(_)
        )
    }

    /// Message suitable for the caller of a user-facing operation.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(v) => v.to_string(),
            ClientError::RateLimited { .. } | ClientError::TooManyRequests { .. } => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            ClientError::Timeout { .. } | ClientError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ClientError::Unauthorized(_) | ClientError::Forbidden(_) => {
                "Your API key is invalid or has been revoked.".to_string()
            }
            ClientError::NoSession => "You are not signed in.".to_string(),
            ClientError::ServerError { .. } => {
                "The server is having trouble. Please try again later.".to_string()
            }
            ClientError::IdentityMismatch { expected, .. } => {
                format!("This API key does not belong to {}.", expected)
            }
            ClientError::NotAuthenticated => "Please sign in first.".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retryable_errors() {
        assert!(ClientError::Timeout { after_ms: 10_000 }.is_retryable());
        assert!(ClientError::Network("reset".into()).is_retryable());
        assert!(ClientError::ServerError {
            status: 502,
            message: "bad gateway".into()
        }
        .is_retryable());
        assert!(ClientError::TooManyRequests {
            retry_after_secs: Some(3)
        }
        .is_retryable());

        assert!(!ClientError::Unauthorized("nope".into()).is_retryable());
        assert!(!ClientError::RateLimited { retry_after_ms: 10 }.is_retryable());
        assert!(!ClientError::NotFound {
            endpoint: "/x".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_from_status_mapping() {
        let body = json!({ "errors": ["You are not permitted to view the requested resource."] });
        let err = ClientError::from_status(403, "/t/1.json", Some(&body), None);
        assert_eq!(
            err,
            ClientError::Forbidden("You are not permitted to view the requested resource.".into())
        );
        assert!(err.is_credential_rejected());

        let err = ClientError::from_status(503, "/latest.json", None, None);
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());

        let err = ClientError::from_status(429, "/latest.json", None, Some(7));
        assert_eq!(
            err,
            ClientError::TooManyRequests {
                retry_after_secs: Some(7)
            }
        );

        let err = ClientError::from_status(422, "/posts.json", Some(&json!({"error": "Title too short"})), None);
        assert_eq!(
            err,
            ClientError::BadStatus {
                status: 422,
                message: "Title too short".into()
            }
        );
    }

    #[test]
    fn test_core_error_conversion() {
        let err: ClientError = CoreError::NoUser.into();
        assert_eq!(err, ClientError::NotAuthenticated);
    }
}
