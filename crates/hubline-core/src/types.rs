//! # Domain Types
//!
//! Core domain types shared by the client and exported to the UI layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    AppUser      │   │  AuthSession    │   │   AuthEvent     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id, username   │   │  user?          │   │  SignedIn       │       │
//! │  │  display_name   │   │  is_authenticated│  │  SignedOut      │       │
//! │  │  counters...    │   │  is_loading     │   │  Refreshed      │       │
//! │  └─────────────────┘   └─────────────────┘   │  ProfileUpdated │       │
//! │                                              └─────────────────┘       │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Hub        │   │      Byte       │   │    Comment      │       │
//! │  │  (category)     │──►│    (topic)      │──►│     (post)      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Session Invariant
//! `is_authenticated` is true only when `user` is present AND came from a
//! server-confirmed identity check. A user snapshot read from storage alone
//! never produces an authenticated session.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Credential
// =============================================================================

/// Opaque secret proving identity to the backend.
///
/// `Debug` is redacted so the value never lands in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Credential(value.into())
    }

    /// Raw value for the request header.
    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(***{})", self.0.len())
    }
}

// =============================================================================
// App User
// =============================================================================

/// Normalized identity record built from the backend's raw user JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,

    /// Bytes (topics) created.
    pub byte_count: u32,
    /// Comments (posts) written.
    pub comment_count: u32,
    pub likes_given: u32,
    pub likes_received: u32,

    pub trust_level: u8,
    pub admin: bool,
    pub moderator: bool,

    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AppUser {
    /// Returns a new snapshot with the partial update merged in.
    ///
    /// Fields absent from the update keep their current value.
    pub fn with_update(&self, update: &ProfileUpdate) -> AppUser {
        let mut next = self.clone();
        if let Some(name) = &update.display_name {
            next.display_name = name.clone();
        }
        if let Some(bio) = &update.bio {
            next.bio = Some(bio.clone());
        }
        if let Some(avatar) = &update.avatar_url {
            next.avatar_url = Some(avatar.clone());
        }
        if let Some(email) = &update.email {
            next.email = Some(email.clone());
        }
        next
    }

    /// Whether `identifier` names this user (username or email, case-insensitive).
    pub fn matches_identifier(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        if self.username.eq_ignore_ascii_case(identifier) {
            return true;
        }
        self.email
            .as_deref()
            .map(|email| email.eq_ignore_ascii_case(identifier))
            .unwrap_or(false)
    }
}

/// Partial profile update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
            && self.email.is_none()
    }
}

// =============================================================================
// Auth Phase
// =============================================================================

/// Lifecycle phase of the auth state machine.
///
/// ```text
/// Uninitialized ──► Loading ──► Authenticated
///                      ▲    └──► Unauthenticated
///                      │              │
///                      └── refresh ───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Nothing has been loaded yet in this process.
    Uninitialized,
    /// A load or refresh is in flight (the busy state).
    Loading,
    /// Server confirmed the stored credential.
    Authenticated,
    /// No confirmed identity.
    Unauthenticated,
}

impl AuthPhase {
    /// Terminal phases are the ones an operation settles into.
    pub fn is_settled(&self) -> bool {
        matches!(self, AuthPhase::Authenticated | AuthPhase::Unauthenticated)
    }
}

impl Default for AuthPhase {
    fn default() -> Self {
        AuthPhase::Uninitialized
    }
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthPhase::Uninitialized => write!(f, "uninitialized"),
            AuthPhase::Loading => write!(f, "loading"),
            AuthPhase::Authenticated => write!(f, "authenticated"),
            AuthPhase::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

// =============================================================================
// Auth Session
// =============================================================================

/// The read model every subscriber sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuthSession {
    pub user: Option<AppUser>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl AuthSession {
    /// `{null, false, false}`.
    pub fn signed_out() -> Self {
        AuthSession::default()
    }

    pub fn authenticated(user: AppUser) -> Self {
        AuthSession {
            user: Some(user),
            is_authenticated: true,
            is_loading: false,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }
}

// =============================================================================
// Auth Event
// =============================================================================

/// Notification published after an auth mutation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn { username: String },
    SignedOut,
    Refreshed { authenticated: bool },
    ProfileUpdated { username: String },
}

impl AuthEvent {
    /// Whether observers should reload auth state in response.
    ///
    /// Profile edits only touch the local snapshot.
    pub fn triggers_reload(&self) -> bool {
        !matches!(self, AuthEvent::ProfileUpdated { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn { .. } => "signed-in",
            AuthEvent::SignedOut => "signed-out",
            AuthEvent::Refreshed { .. } => "refreshed",
            AuthEvent::ProfileUpdated { .. } => "profile-updated",
        }
    }
}

impl fmt::Display for AuthEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Hub (category)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Hub {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// Hex color without the leading '#'.
    pub color: String,
    pub byte_count: u32,
    pub comment_count: u32,
}

// =============================================================================
// Byte (topic)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Byte {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub hub_id: Option<i64>,
    pub comment_count: u32,
    pub like_count: u32,
    pub views: u32,
    pub pinned: bool,
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub last_activity_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Comment (post)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub byte_id: i64,
    /// Position within the byte, starting at 1.
    pub number: u32,
    pub username: String,
    /// Server-rendered HTML.
    pub body: String,
    pub like_count: u32,
    /// Whether the current user has liked this comment.
    pub liked: bool,
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Applies a like toggle locally.
    pub fn set_liked(&mut self, liked: bool) {
        if self.liked == liked {
            return;
        }
        self.liked = liked;
        if liked {
            self.like_count = self.like_count.saturating_add(1);
        } else {
            self.like_count = self.like_count.saturating_sub(1);
        }
    }
}

/// A byte together with its loaded comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ByteThread {
    pub byte: Byte,
    pub comments: Vec<Comment>,
}

// =============================================================================
// Unit Tests
// =============================================================================
