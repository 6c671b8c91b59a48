//! # hubline-core: Pure Domain Logic for Hubline
//!
//! Everything the client core needs to agree on without touching the
//! network: the user and session types, the mapping from the forum's raw
//! JSON into hubs/bytes/comments, input validation, markup sanitization and
//! the snapshot/restore pair used for optimistic updates.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Hubline Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI layer (TypeScript)                        │   │
//! │  │      Feed ──► Byte detail ──► Composer ──► Profile              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │     hubline-client (AuthSynchronizer, RequestEngine, ForumApi)  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ hubline-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │  │   │   types   │  │   wire    │  │ validation │  │  staged  │  │   │
//! │  │   │  AppUser  │  │  RawUser  │  │  endpoint  │  │ Staged<T>│  │   │
//! │  │   │  Session  │  │  RawTopic │  │  sanitize  │  │          │  │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO STORAGE • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (AppUser, AuthSession, Hub, Byte, Comment)
//! - [`wire`] - Raw backend JSON shapes and their mapping into domain types
//! - [`error`] - Validation error types
//! - [`validation`] - Structural input checks and sanitization
//! - [`staged`] - Two-phase (stage, then commit or roll back) updates
//!
//! ## Example Usage
//!
//! ```rust
//! use hubline_core::validation::{sanitize_text, validate_username};
//!
//! assert!(validate_username("sam_h").is_ok());
//! assert_eq!(sanitize_text("<b>hi</b>"), "&lt;b&gt;hi&lt;/b&gt;");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod staged;
pub mod types;
pub mod validation;
pub mod wire;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use staged::Staged;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// How long a cached read stays fresh (5 minutes).
pub const CACHE_TTL_SECS: u64 = 300;

/// Requests admitted per rolling minute.
pub const RATE_LIMIT_PER_MINUTE: u32 = 60;

/// Requests admitted per rolling hour.
pub const RATE_LIMIT_PER_HOUR: u32 = 1000;

/// Per-attempt network timeout.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default retry budget for one logical request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Window used to coalesce bursts of auth events into one reload.
pub const AUTH_EVENT_DEBOUNCE_MS: u64 = 50;

/// The single secure-storage key holding the credential and user snapshot.
pub const SESSION_STORAGE_KEY: &str = "hubline.session";

/// Maximum accepted length of an endpoint path (including query).
pub const MAX_ENDPOINT_LEN: usize = 2048;
