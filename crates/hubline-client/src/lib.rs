//! # hubline-client: Data Access and Auth Sync for Hubline
//!
//! One long-lived HTTP client plus the shared authentication state built on
//! top of it.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        hubline-client                                   │
//! │                                                                         │
//! │  ┌──────────────────────┐          ┌──────────────────────────────┐    │
//! │  │   AuthSynchronizer   │          │          ForumApi            │    │
//! │  │                      │          │                              │    │
//! │  │ load / refresh       │          │ hubs, latest bytes, threads  │    │
//! │  │ sign in / sign out   │          │ comments, likes, profiles    │    │
//! │  │ watch + event bus    │          │                              │    │
//! │  └──────────┬───────────┘          └──────────────┬───────────────┘    │
//! │     ▲       │                                     │                     │
//! │     │       ▼                                     ▼                     │
//! │  ┌──┴────────────┐   ┌──────────────────────────────────────────────┐  │
//! │  │ ReloadReactor │   │               RequestEngine                  │  │
//! │  │ (debounced)   │   │  validate → cache → rate limit → dispatch    │  │
//! │  └───────────────┘   │  retries with exponential backoff            │  │
//! │                      └──────────────────────┬───────────────────────┘  │
//! │  ┌───────────────┐                          │                          │
//! │  │ SecureStore   │                          ▼                          │
//! │  │ (one record)  │                   forum REST backend                │
//! │  └───────────────┘                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`api`] - Typed forum calls
//! - [`auth`] - `AuthSynchronizer`, event bus, identity check, reload reactor
//! - [`cache`] - TTL response cache
//! - [`config`] - `ClientConfig` (TOML + `HUBLINE_*` overrides)
//! - [`engine`] - `RequestEngine`
//! - [`error`] - `ClientError`
//! - [`rate_limit`] - Minute/hour sliding windows
//! - [`storage`] - Secure credential storage
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hubline_client::{ClientConfig, HublineClient};
//!
//! let client = HublineClient::build(ClientConfig::load(None)?)?;
//! let session = client.auth.load_stored_auth().await;
//! if session.is_authenticated {
//!     let bytes = client.api.latest_bytes(0).await?;
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod rate_limit;
pub mod storage;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::ForumApi;
pub use auth::{
    AuthListener, AuthState, AuthSynchronizer, ReactorHandle, ReloadReactor, Settlement,
    Subscription,
};
pub use cache::{CacheKey, CacheStats};
pub use config::ClientConfig;
pub use engine::{CachePolicy, CredentialMode, RequestEngine, RequestOptions, RequestResult};
pub use error::{ClientError, ClientResult};
pub use rate_limit::RateLimitStatus;
pub use storage::{FileSecureStore, MemorySecureStore, SecureStore};

use std::sync::Arc;

use tracing::{info, warn};

// =============================================================================
// Client Assembly
// =============================================================================

/// The wired-up client: one engine shared by auth and the forum API.
pub struct HublineClient {
    pub config: ClientConfig,
    pub engine: Arc<RequestEngine>,
    pub auth: Arc<AuthSynchronizer>,
    pub api: ForumApi,
}

impl HublineClient {
    /// Builds the client with file-backed secure storage.
    ///
    /// Falls back to in-memory storage when no data directory exists.
    pub fn build(config: ClientConfig) -> ClientResult<Self> {
        let store: Arc<dyn SecureStore> = match config.storage.resolved_path() {
            Some(path) => {
                info!(path = %path.display(), "Using file-backed secure storage");
                Arc::new(FileSecureStore::new(path))
            }
            None => {
                warn!("No data directory available, session will not survive restarts");
                Arc::new(MemorySecureStore::new())
            }
        };
        Self::with_store(config, store)
    }

    /// Builds the client over an explicit secure store.
    pub fn with_store(config: ClientConfig, store: Arc<dyn SecureStore>) -> ClientResult<Self> {
        config.validate()?;

        let engine = Arc::new(RequestEngine::new(&config)?);
        let auth = Arc::new(AuthSynchronizer::new(
            Arc::clone(&engine),
            store,
            config.auth.clone(),
        ));
        let api = ForumApi::new(Arc::clone(&engine));

        Ok(HublineClient {
            config,
            engine,
            auth,
            api,
        })
    }

    /// Starts the debounced reload reactor with the configured window.
    pub fn spawn_reactor(&self) -> ReactorHandle {
        ReloadReactor::spawn(&self.auth, self.config.auth.debounce())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_store_rejects_invalid_config() {
        let mut config = ClientConfig::for_base_url("http://127.0.0.1:9");
        config.rate_limit.per_minute = 0;
        let result = HublineClient::with_store(config, Arc::new(MemorySecureStore::new()));
        assert!(matches!(result, Err(e) if e.is_config_error()));
    }

    #[tokio::test]
    async fn test_engine_is_shared() {
        let client = HublineClient::with_store(
            ClientConfig::for_base_url("http://127.0.0.1:9"),
            Arc::new(MemorySecureStore::new()),
        )
        .unwrap();
        assert!(Arc::ptr_eq(client.auth.engine(), &client.engine));
        assert!(Arc::ptr_eq(client.api.engine(), &client.engine));
    }
}
