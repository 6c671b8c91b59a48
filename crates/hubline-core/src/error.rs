//! # Error Types
//!
//! Domain-specific error types for hubline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  hubline-core errors (this file)                                       │
//! │  ├── CoreError        - Domain rule failures                           │
//! │  └── ValidationError  - Input failed a structural check                │
//! │                                                                         │
//! │  hubline-client errors (separate crate)                                │
//! │  └── ClientError      - Transport, HTTP status, storage, auth          │
//! │                                                                         │
//! │  Flow: ValidationError → ClientError::Validation → RequestResult       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule failures that are not tied to a single input field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A raw backend payload could not be mapped into a domain type.
    #[error("Malformed {entity} payload: {reason}")]
    MalformedPayload { entity: String, reason: String },

    /// The operation needs a confirmed user and none is present.
    #[error("No signed-in user")]
    NoUser,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before anything reaches the network. A request that fails one of
/// these checks is never dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (bad characters, missing '@', path traversal...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooShort { field, .. }
            | ValidationError::TooLong { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "username".to_string(),
        };
        assert_eq!(err.to_string(), "username is required");

        let err = ValidationError::TooShort {
            field: "token".to_string(),
            min: 16,
        };
        assert_eq!(err.to_string(), "token must be at least 16 characters");
        assert_eq!(err.field(), "token");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "endpoint".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }

    #[test]
    fn test_malformed_payload_message() {
        let err = CoreError::MalformedPayload {
            entity: "user".into(),
            reason: "missing username".into(),
        };
        assert_eq!(err.to_string(), "Malformed user payload: missing username");
    }
}
