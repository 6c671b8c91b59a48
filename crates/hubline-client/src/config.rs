//! # Client Configuration
//!
//! Configuration for the request engine, auth synchronizer and secure store.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HUBLINE_BASE_URL=https://forum.example.com                         │
//! │     HUBLINE_TIMEOUT_SECS=10                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/hubline/hubline.toml (Linux)                             │
//! │     ~/Library/Application Support/com.hubline.hubline/hubline.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [server]
//! base_url = "https://forum.example.com"
//!
//! [request]
//! timeout_secs = 10
//! max_retries = 3
//!
//! [cache]
//! ttl_secs = 300
//!
//! [rate_limit]
//! per_minute = 60
//! per_hour = 1000
//! max_wait_ms = 5000
//!
//! [auth]
//! credential_header = "User-Api-Key"
//! debounce_ms = 50
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use hubline_core::{
    AUTH_EVENT_DEBOUNCE_MS, CACHE_TTL_SECS, DEFAULT_MAX_RETRIES, RATE_LIMIT_PER_HOUR,
    RATE_LIMIT_PER_MINUTE, REQUEST_TIMEOUT_SECS, SESSION_STORAGE_KEY,
};

use crate::error::{ClientError, ClientResult};

// =============================================================================
// Server Settings
// =============================================================================

/// Where the forum lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Origin of the forum backend, e.g. `https://forum.example.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_user_agent() -> String {
    format!("hubline/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

// =============================================================================
// Request Settings
// =============================================================================

/// Per-call timeout and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSettings {
    /// Per-attempt timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt. Total attempts = max_retries + 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay (milliseconds). Doubles per retry.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_timeout() -> u64 {
    REQUEST_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    30
}

impl Default for RequestSettings {
    fn default() -> Self {
        RequestSettings {
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl RequestSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Freshness window for cached reads (seconds).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

fn default_ttl() -> u64 {
    CACHE_TTL_SECS
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            ttl_secs: default_ttl(),
        }
    }
}

// =============================================================================
// Rate Limit Settings
// =============================================================================

/// Local admission control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,

    #[serde(default = "default_per_hour")]
    pub per_hour: u32,

    /// Longest a caller will wait for capacity before failing with
    /// `RateLimited` (milliseconds).
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
}

fn default_per_minute() -> u32 {
    RATE_LIMIT_PER_MINUTE
}
fn default_per_hour() -> u32 {
    RATE_LIMIT_PER_HOUR
}
fn default_max_wait() -> u64 {
    5000
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        RateLimitSettings {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
            max_wait_ms: default_max_wait(),
        }
    }
}

impl RateLimitSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

// =============================================================================
// Auth Settings
// =============================================================================

/// Identity endpoint contract and event handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Returns `{current_user}` for a valid credential, 404 without a session.
    #[serde(default = "default_identity_endpoint")]
    pub identity_endpoint: String,

    /// Best-effort server-side revocation on sign-out.
    #[serde(default = "default_revoke_endpoint")]
    pub revoke_endpoint: String,

    /// Header carrying the credential.
    #[serde(default = "default_credential_header")]
    pub credential_header: String,

    /// Secure-storage key for the session record.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Reload reactor debounce window (milliseconds).
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,
}

fn default_identity_endpoint() -> String {
    "/session/current.json".to_string()
}
fn default_revoke_endpoint() -> String {
    "/user-api-key/revoke".to_string()
}
fn default_credential_header() -> String {
    "User-Api-Key".to_string()
}
fn default_storage_key() -> String {
    SESSION_STORAGE_KEY.to_string()
}
fn default_debounce() -> u64 {
    AUTH_EVENT_DEBOUNCE_MS
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            identity_endpoint: default_identity_endpoint(),
            revoke_endpoint: default_revoke_endpoint(),
            credential_header: default_credential_header(),
            storage_key: default_storage_key(),
            debounce_ms: default_debounce(),
        }
    }
}

impl AuthSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Secure store file. Defaults to `secure.json` in the platform data dir.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageSettings {
    /// Configured path, or the platform default.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "hubline", "hubline")
                .map(|dirs| dirs.data_dir().join("secure.json"))
        })
    }
}

// =============================================================================
// Environment Overrides
// =============================================================================

type Override = fn(&mut ClientConfig, &str) -> Result<(), String>;

/// Recognized `HUBLINE_*` variables. A value that does not parse is a
/// configuration error, never silently skipped.
const ENV_OVERRIDES: &[(&str, Override)] = &[
    ("HUBLINE_BASE_URL", |config, value| {
        config.server.base_url = value.to_string();
        Ok(())
    }),
    ("HUBLINE_TIMEOUT_SECS", |config, value| {
        config.request.timeout_secs = parse(value)?;
        Ok(())
    }),
    ("HUBLINE_MAX_RETRIES", |config, value| {
        config.request.max_retries = parse(value)?;
        Ok(())
    }),
    ("HUBLINE_CACHE_TTL_SECS", |config, value| {
        config.cache.ttl_secs = parse(value)?;
        Ok(())
    }),
    ("HUBLINE_CREDENTIAL_HEADER", |config, value| {
        config.auth.credential_header = value.to_string();
        Ok(())
    }),
    ("HUBLINE_STORAGE_PATH", |config, value| {
        config.storage.path = Some(PathBuf::from(value));
        Ok(())
    }),
];

fn parse<T>(value: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| format!("{:?} is not valid: {}", value, e))
}

// =============================================================================
// Main Client Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub request: RequestSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl ClientConfig {
    /// Default config pointed at `base_url`.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.server.base_url = base_url.into();
        config
    }

    /// Resolves the effective configuration from the process environment.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`config_path`, else hubline.toml in the platform
    ///    config dir; a missing file is not an error)
    /// 3. `HUBLINE_*` environment variables
    ///
    /// The result is validated before it is returned.
    pub fn load(config_path: Option<PathBuf>) -> ClientResult<Self> {
        Self::resolve(config_path.or_else(Self::default_config_path), |var| {
            std::env::var(var).ok()
        })
    }

    /// [`load`](Self::load) with an explicit file and environment lookup.
    pub fn resolve<F>(path: Option<PathBuf>, env: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::read_file(&path)?.unwrap_or_default(),
            None => Self::default(),
        };

        for &(var, apply) in ENV_OVERRIDES {
            if let Some(value) = env(var) {
                apply(&mut config, value.trim())
                    .map_err(|reason| ClientError::InvalidConfig(format!("{}: {}", var, reason)))?;
                debug!(var, "Config overridden from environment");
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> ClientResult<Option<Self>> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(None);
            }
            Err(e) => {
                return Err(ClientError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))
            }
        };

        info!(path = %path.display(), "Loading client config from file");
        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| ClientError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))
    }

    /// Writes the configuration as TOML. The file is replaced atomically.
    pub fn save(&self, path: &Path) -> ClientResult<()> {
        let failed = |e: std::io::Error| {
            ClientError::ConfigSaveFailed(format!("{}: {}", path.display(), e))
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(failed)?;
        }

        let contents = toml::to_string_pretty(self)?;
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, contents).map_err(failed)?;
        std::fs::rename(&temp_path, path).map_err(failed)?;

        info!(path = %path.display(), "Client config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        let url = url::Url::parse(&self.server.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ClientError::InvalidConfig(format!(
                "base_url must start with http:// or https://, got: {}",
                self.server.base_url
            )));
        }

        if self.request.timeout_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(ClientError::InvalidConfig(
                "ttl_secs must be greater than 0".into(),
            ));
        }

        if self.rate_limit.per_minute == 0 || self.rate_limit.per_hour == 0 {
            return Err(ClientError::InvalidConfig(
                "rate limits must be greater than 0".into(),
            ));
        }

        if self.rate_limit.per_minute > self.rate_limit.per_hour {
            return Err(ClientError::InvalidConfig(
                "per_minute must not exceed per_hour".into(),
            ));
        }

        if self.auth.credential_header.trim().is_empty() {
            return Err(ClientError::InvalidConfig(
                "credential_header must not be empty".into(),
            ));
        }

        hubline_core::validation::validate_endpoint(&self.auth.identity_endpoint)?;
        hubline_core::validation::validate_endpoint(&self.auth.revoke_endpoint)?;

        Ok(())
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "hubline", "hubline")
            .map(|dirs| dirs.config_dir().join("hubline.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn base_url(&self) -> &str {
        &self.server.base_url
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}
