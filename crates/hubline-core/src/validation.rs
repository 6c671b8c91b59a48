//! # Validation Module
//!
//! Structural input checks and markup sanitization.
//!
//! ## Where Validation Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI (TypeScript)                                              │
//! │  └── Empty / length checks for immediate feedback                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: RequestEngine / AuthSynchronizer (Rust)                      │
//! │  ├── THIS MODULE: endpoint, username, email, token checks              │
//! │  └── THIS MODULE: body sanitization before dispatch                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Forum backend                                                │
//! │  └── Authoritative checks (its own 422 responses)                      │
//! │                                                                         │
//! │  A Layer 2 failure never reaches the network.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use hubline_core::validation::{validate_endpoint, sanitize_text};
//!
//! assert!(validate_endpoint("/latest.json?page=2").is_ok());
//! assert!(validate_endpoint("https://evil.example/").is_err());
//! assert_eq!(sanitize_text("a & b"), "a &amp; b");
//! ```

use serde_json::Value;

use crate::error::ValidationError;
use crate::MAX_ENDPOINT_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 60;
const EMAIL_MAX: usize = 254;
const TOKEN_MIN: usize = 16;
const TOKEN_MAX: usize = 512;

/// URL schemes that execute or embed content when rendered.
const DANGEROUS_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

// =============================================================================
// Endpoint
// =============================================================================

/// Validates an endpoint path relative to the configured base URL.
///
/// ## Rules
/// - Must start with a single `/` (no scheme, no protocol-relative `//host`)
/// - No `..` segments, no backslashes, no fragment
/// - Only URL-safe characters
/// - At most [`MAX_ENDPOINT_LEN`] characters
pub fn validate_endpoint(endpoint: &str) -> ValidationResult<()> {
    if endpoint.is_empty() {
        return Err(required("endpoint"));
    }

    if endpoint.len() > MAX_ENDPOINT_LEN {
        return Err(ValidationError::TooLong {
            field: "endpoint".to_string(),
            max: MAX_ENDPOINT_LEN,
        });
    }

    if !endpoint.starts_with('/') || endpoint.starts_with("//") {
        return Err(invalid("endpoint", "must be a path starting with '/'"));
    }

    let path = endpoint.split('?').next().unwrap_or(endpoint);
    if path.split('/').any(|segment| segment == "..") {
        return Err(invalid("endpoint", "must not contain '..' segments"));
    }

    if !endpoint.chars().all(is_endpoint_char) {
        return Err(invalid("endpoint", "contains characters not allowed in a URL path"));
    }

    Ok(())
}

fn is_endpoint_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '/' | '-' | '_' | '.' | '~' | '?' | '&' | '=' | '%' | '+' | ',' | ':' | '@'
        )
}

// =============================================================================
// Identity Fields
// =============================================================================

/// Validates a forum username.
///
/// ## Rules
/// - 3 to 60 characters after trimming
/// - Letters, numbers, `_`, `.` and `-`
/// - Must start with a letter, number or underscore
pub fn validate_username(username: &str) -> ValidationResult<()> {
    let username = username.trim();

    if username.is_empty() {
        return Err(required("username"));
    }

    let len = username.chars().count();
    if len < USERNAME_MIN {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: USERNAME_MIN,
        });
    }
    if len > USERNAME_MAX {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: USERNAME_MAX,
        });
    }

    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(invalid(
            "username",
            "must contain only letters, numbers, underscores, dots and hyphens",
        ));
    }

    if username
        .chars()
        .next()
        .map(|c| c == '.' || c == '-')
        .unwrap_or(false)
    {
        return Err(invalid("username", "must start with a letter, number or underscore"));
    }

    Ok(())
}

/// Validates an email address (structural check only).
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(required("email"));
    }

    if email.len() > EMAIL_MAX {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: EMAIL_MAX,
        });
    }

    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return Err(invalid("email", "must contain '@'")),
    };

    if local.is_empty() || domain.contains('@') {
        return Err(invalid("email", "must have exactly one '@' with a local part"));
    }

    if email.chars().any(|c| c.is_whitespace() || c.is_control() || c == '<' || c == '>') {
        return Err(invalid("email", "must not contain whitespace or angle brackets"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid("email", "domain must contain a dot-separated name"));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
    {
        return Err(invalid("email", "domain contains invalid characters"));
    }

    Ok(())
}

/// Validates a sign-in identifier: an email if it contains `@`, otherwise a username.
pub fn validate_identifier(identifier: &str) -> ValidationResult<()> {
    if identifier.contains('@') {
        validate_email(identifier)
    } else {
        validate_username(identifier)
    }
}

/// Validates an opaque API credential.
///
/// ## Rules
/// - 16 to 512 characters, no surrounding whitespace trimmed away silently
/// - Only token-safe characters (`A-Z a-z 0-9 - _ . ~ + / =`)
pub fn validate_token(token: &str) -> ValidationResult<()> {
    if token.trim().is_empty() {
        return Err(required("token"));
    }

    if token.len() < TOKEN_MIN {
        return Err(ValidationError::TooShort {
            field: "token".to_string(),
            min: TOKEN_MIN,
        });
    }

    if token.len() > TOKEN_MAX {
        return Err(ValidationError::TooLong {
            field: "token".to_string(),
            max: TOKEN_MAX,
        });
    }

    if !token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '+' | '/' | '='))
    {
        return Err(invalid("token", "contains characters not allowed in a credential"));
    }

    Ok(())
}

// =============================================================================
// Sanitization
// =============================================================================

/// Neutralizes markup and script injection in free text.
///
/// - HTML-escapes `& < > " '`
/// - Drops control characters except newline and tab
/// - Breaks `javascript:`, `vbscript:` and `data:` schemes (case-insensitive)
///
/// ```rust
/// use hubline_core::validation::sanitize_text;
///
/// assert_eq!(
///     sanitize_text("<a href=\"javascript:x()\">"),
///     "&lt;a href=&quot;javascript&#58;x()&quot;&gt;"
/// );
/// ```
pub fn sanitize_text(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());

    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '\n' | '\t' => escaped.push(c),
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }

    neutralize_schemes(&escaped)
}

/// Applies [`sanitize_text`] to every string value in a JSON document.
///
/// Object keys, numbers and booleans are left as they are.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_json(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn neutralize_schemes(input: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `input`.
    let lower = input.to_ascii_lowercase();
    let mut out = String::with_capacity(input.len());
    let mut cursor = 0;
    let mut prev: Option<char> = None;

    while cursor < input.len() {
        // A scheme only counts at the start of a token ("metadata:" is prose).
        let at_token_start = prev.map_or(true, |c| !c.is_alphanumeric());
        let hit = DANGEROUS_SCHEMES
            .iter()
            .find(|scheme| at_token_start && lower[cursor..].starts_with(*scheme));

        match hit {
            Some(scheme) => {
                let name_len = scheme.len() - 1;
                out.push_str(&input[cursor..cursor + name_len]);
                out.push_str("&#58;");
                cursor += scheme.len();
                prev = Some(':');
            }
            None => {
                let Some(ch) = input[cursor..].chars().next() else {
                    break;
                };
                out.push(ch);
                cursor += ch.len_utf8();
                prev = Some(ch);
            }
        }
    }

    out
}

// =============================================================================
// Helpers
// =============================================================================

fn required(field: &str) -> ValidationError {
    ValidationError::Required {
        field: field.to_string(),
    }
}

fn invalid(field: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
