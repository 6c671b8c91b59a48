//! # Auth Synchronizer
//!
//! Owns the single authoritative [`AuthSession`] and keeps it consistent with
//! secure storage and the server.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Auth Lifecycle                                  │
//! │                                                                         │
//! │   ┌───────────────┐  load_stored_auth   ┌───────────┐                  │
//! │   │ Uninitialized │ ──────────────────► │  Loading  │◄──── refresh ──┐ │
//! │   └───────────────┘                     └─────┬─────┘                │ │
//! │                                               │ settle               │ │
//! │                          ┌────────────────────┼────────────────┐     │ │
//! │                          ▼                    ▼                │     │ │
//! │                  ┌───────────────┐    ┌─────────────────┐      │     │ │
//! │                  │ Authenticated │    │ Unauthenticated │      │     │ │
//! │                  └───────┬───────┘    └────────┬────────┘      │     │ │
//! │                          └─────────────────────┴───────────────┴─────┘ │
//! │                                                                         │
//! │  Loading is the busy state: entering it is a single atomic             │
//! │  check-and-set on the watch channel. A second load or refresh that     │
//! │  finds it set waits for the leader to settle instead of starting a     │
//! │  redundant identity check.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settle Outcomes
//! | Identity check         | Session          | Stored record            |
//! |------------------------|------------------|--------------------------|
//! | confirmed              | Authenticated    | user snapshot refreshed  |
//! | no session (404)       | Unauthenticated  | credential kept, no user |
//! | rejected (401/403)     | Unauthenticated  | cleared (and the cache)  |
//! | network / server error | Unauthenticated¹ | untouched                |
//!
//! ¹ A refresh of an already confirmed session keeps it authenticated.
//!
//! ## Event Discipline
//! `SignedIn`, `SignedOut`, `Refreshed` and `ProfileUpdated` are emitted
//! only after both the watch state and storage reflect the change, and
//! after the operation lock is released.
//! `load_stored_auth` is what observers run in reaction to events, so it
//! emits only when it ends a confirmed session (`SignedOut`). The reload
//! that follows finds nothing left to end and stays silent.

pub mod events;
pub mod identity;
pub mod reactor;

use std::sync::Arc;

use hubline_core::validation::{validate_email, validate_identifier, validate_token};
use hubline_core::{AppUser, AuthEvent, AuthPhase, AuthSession, Credential, ProfileUpdate, Staged};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::AuthSettings;
use crate::engine::{RequestEngine, RequestOptions};
use crate::error::{ClientError, ClientResult};
use crate::storage::{CredentialVault, SecureStore, StoredAuth};

pub use events::{AuthListener, EventBus, Subscription};
pub use identity::{classify, confirm_identity, Settlement};
pub use reactor::{ReactorHandle, ReloadReactor};

// =============================================================================
// Auth State
// =============================================================================

/// Internal state published on the watch channel.
///
/// `user` is only ever set from a server-confirmed identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub phase: AuthPhase,
    pub user: Option<AppUser>,
}

impl AuthState {
    fn authenticated(user: AppUser) -> Self {
        AuthState {
            phase: AuthPhase::Authenticated,
            user: Some(user),
        }
    }

    fn unauthenticated() -> Self {
        AuthState {
            phase: AuthPhase::Unauthenticated,
            user: None,
        }
    }

    /// Read model for subscribers.
    pub fn session(&self) -> AuthSession {
        AuthSession {
            user: self.user.clone(),
            is_authenticated: self.user.is_some(),
            is_loading: self.phase == AuthPhase::Loading,
        }
    }
}

/// Settles a leader's busy state if its future is dropped mid-load.
struct LoadGuard<'a> {
    tx: &'a watch::Sender<AuthState>,
    armed: bool,
}

impl<'a> LoadGuard<'a> {
    fn new(tx: &'a watch::Sender<AuthState>) -> Self {
        LoadGuard { tx, armed: true }
    }

    fn finish(mut self, state: AuthState) {
        self.tx.send_replace(state);
        self.armed = false;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.tx.send_modify(|state| {
                if state.phase == AuthPhase::Loading {
                    state.phase = if state.user.is_some() {
                        AuthPhase::Authenticated
                    } else {
                        AuthPhase::Unauthenticated
                    };
                }
            });
        }
    }
}

// =============================================================================
// Auth Synchronizer
// =============================================================================

/// Process-wide auth service. Construct once, share via `Arc`.
pub struct AuthSynchronizer {
    engine: Arc<RequestEngine>,
    vault: CredentialVault,
    settings: AuthSettings,
    state_tx: watch::Sender<AuthState>,
    /// Serializes every mutation of session + storage.
    op_lock: Mutex<()>,
    events: EventBus,
}

impl AuthSynchronizer {
    pub fn new(
        engine: Arc<RequestEngine>,
        store: Arc<dyn SecureStore>,
        settings: AuthSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(AuthState::default());
        AuthSynchronizer {
            vault: CredentialVault::new(store, settings.storage_key.clone()),
            engine,
            settings,
            state_tx,
            op_lock: Mutex::new(()),
            events: EventBus::new(),
        }
    }

    // =========================================================================
    // Read Side
    // =========================================================================

    pub fn session(&self) -> AuthSession {
        self.state_tx.borrow().session()
    }

    pub fn phase(&self) -> AuthPhase {
        self.state_tx.borrow().phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == AuthPhase::Loading
    }

    /// Reactive view of the state; `changed()` fires on every transition.
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    /// Registers a callback listener.
    pub fn subscribe(&self, listener: impl AuthListener + 'static) -> Subscription {
        self.events.subscribe(listener)
    }

    /// A broadcast receiver of auth events.
    pub fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.receiver()
    }

    pub fn engine(&self) -> &Arc<RequestEngine> {
        &self.engine
    }

    // =========================================================================
    // Busy Gate
    // =========================================================================

    /// Enters `Loading` unless it is already set. Check and set are atomic.
    fn try_begin_load(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if state.phase == AuthPhase::Loading {
                false
            } else {
                state.phase = AuthPhase::Loading;
                true
            }
        })
    }

    async fn wait_until_settled(&self) -> AuthSession {
        let mut rx = self.state_tx.subscribe();
        let settled = rx
            .wait_for(|state| state.phase.is_settled())
            .await
            .map(|state| state.session());
        match settled {
            Ok(session) => session,
            // Sender lives as long as `self`.
            Err(_) => self.session(),
        }
    }

    /// Publishes a user change without breaking a leader's busy state.
    fn publish_user(&self, user: Option<AppUser>) {
        self.state_tx.send_modify(|state| {
            if state.phase != AuthPhase::Loading {
                state.phase = if user.is_some() {
                    AuthPhase::Authenticated
                } else {
                    AuthPhase::Unauthenticated
                };
            }
            state.user = user;
        });
    }

    // =========================================================================
    // Load / Refresh
    // =========================================================================

    /// Bootstrap: re-validates the stored credential with the server.
    ///
    /// Concurrent callers share one identity check and observe the same
    /// session. Never fails; every problem settles to Unauthenticated, except
    /// that a transient failure keeps an already confirmed session.
    pub async fn load_stored_auth(&self) -> AuthSession {
        if !self.try_begin_load() {
            debug!("Auth load already in flight, waiting for it to settle");
            return self.wait_until_settled().await;
        }

        let guard = LoadGuard::new(&self.state_tx);
        let (ended, _) = self.reconfirm(guard).await;
        if ended {
            self.events.emit(AuthEvent::SignedOut);
        }

        self.session()
    }

    /// Re-runs identity confirmation on demand.
    ///
    /// Emits `Refreshed`, or `SignedOut` when the refresh ended a confirmed
    /// session. A transient failure keeps a confirmed session and returns
    /// the error.
    pub async fn refresh_auth(&self) -> ClientResult<AuthSession> {
        if !self.try_begin_load() {
            debug!("Auth load already in flight, joining it");
            return Ok(self.wait_until_settled().await);
        }

        let guard = LoadGuard::new(&self.state_tx);
        let (ended, error) = self.reconfirm(guard).await;

        let event = if ended {
            AuthEvent::SignedOut
        } else {
            AuthEvent::Refreshed {
                authenticated: self.session().is_authenticated,
            }
        };
        info!(event = %event, "Auth refreshed");
        self.events.emit(event);

        match error {
            Some(e) => Err(e),
            None => Ok(self.session()),
        }
    }

    /// One identity check under the operation lock, settling the leader's
    /// busy state. Returns whether a confirmed session ended.
    ///
    /// The lock is released on return so callers emit outside it.
    async fn reconfirm(&self, guard: LoadGuard<'_>) -> (bool, Option<ClientError>) {
        let _op = self.op_lock.lock().await;

        let previous = self.state_tx.borrow().user.clone();
        let was_authenticated = previous.is_some();

        let (state, error) = self.resolve(previous).await;
        let ended = was_authenticated && state.user.is_none();
        info!(
            phase = %state.phase,
            user = ?state.user.as_ref().map(|u| &u.username),
            ended,
            "Stored auth confirmed"
        );
        guard.finish(state);

        (ended, error)
    }

    /// Reads the stored record, confirms it and applies the settle outcome to
    /// storage and the engine. Returns the state to publish.
    ///
    /// `keep_on_transient` is the confirmed user to keep if the server cannot
    /// be reached.
    async fn resolve(&self, keep_on_transient: Option<AppUser>) -> (AuthState, Option<ClientError>) {
        let record = match self.vault.load().await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No stored credential");
                self.engine.clear_credential().await;
                return (AuthState::unauthenticated(), Some(ClientError::NotAuthenticated));
            }
            Err(e) => {
                error!(error = %e, "Stored session unreadable, continuing signed out");
                self.engine.clear_credential().await;
                return (AuthState::unauthenticated(), Some(e));
            }
        };

        let settlement =
            confirm_identity(&self.engine, &self.settings.identity_endpoint, &record.credential)
                .await;
        debug!(outcome = settlement.name(), "Identity check settled");

        match settlement {
            Settlement::Confirmed(user) => {
                let refreshed = StoredAuth::new(record.credential.clone(), Some(user.clone()));
                if let Err(e) = self.vault.save(&refreshed).await {
                    warn!(error = %e, "Failed to persist confirmed user snapshot");
                }
                self.engine.set_credential(record.credential).await;
                (AuthState::authenticated(user), None)
            }
            Settlement::NoSession => {
                if record.user.is_some() {
                    let kept = StoredAuth::new(record.credential, None);
                    if let Err(e) = self.vault.save(&kept).await {
                        warn!(error = %e, "Failed to drop stale user snapshot");
                    }
                }
                self.engine.clear_credential().await;
                (AuthState::unauthenticated(), Some(ClientError::NoSession))
            }
            Settlement::Rejected(e) => {
                warn!(error = %e, "Stored credential rejected, clearing it");
                if let Err(clear_err) = self.vault.clear().await {
                    error!(error = %clear_err, "Failed to clear rejected credential");
                }
                self.engine.clear_credential().await;
                self.engine.clear_cache().await;
                (AuthState::unauthenticated(), Some(e))
            }
            Settlement::Transient(e) => match keep_on_transient {
                Some(user) => {
                    warn!(error = %e, "Identity check failed, keeping confirmed session");
                    (AuthState::authenticated(user), Some(e))
                }
                None => {
                    warn!(error = %e, "Identity check failed, stored credential kept for a later retry");
                    self.engine.clear_credential().await;
                    (AuthState::unauthenticated(), Some(e))
                }
            },
        }
    }

    // =========================================================================
    // Sign In / Sign Out
    // =========================================================================

    /// Confirms `secret` with the server and, if it belongs to `identifier`,
    /// persists it and signs in.
    ///
    /// On failure nothing persisted changes; the error carries a
    /// [`user_message`](ClientError::user_message).
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> ClientResult<AuthSession> {
        validate_identifier(identifier)?;
        validate_token(secret)?;
        let credential = Credential::new(secret);

        let op = self.op_lock.lock().await;

        let user =
            match confirm_identity(&self.engine, &self.settings.identity_endpoint, &credential)
                .await
            {
                Settlement::Confirmed(user) => user,
                other => {
                    let outcome = other.name();
                    let err = other.into_error().unwrap_or(ClientError::NotAuthenticated);
                    info!(outcome, error = %err, "Sign-in refused");
                    return Err(err);
                }
            };

        if !user.matches_identifier(identifier) {
            return Err(ClientError::IdentityMismatch {
                expected: identifier.trim().to_string(),
                actual: user.username,
            });
        }

        self.vault
            .save(&StoredAuth::new(credential.clone(), Some(user.clone())))
            .await?;
        self.engine.set_credential(credential).await;
        // Responses cached for a previous user must not leak into this one.
        self.engine.clear_cache().await;

        let username = user.username.clone();
        self.publish_user(Some(user));
        drop(op);

        info!(username = %username, "Signed in");
        self.events.emit(AuthEvent::SignedIn { username });

        Ok(self.session())
    }

    /// Signs out. Local state is always cleared, even if revocation fails.
    pub async fn sign_out(&self) -> AuthSession {
        let op = self.op_lock.lock().await;

        let credential = match self.vault.load().await {
            Ok(record) => record.map(|r| r.credential),
            Err(e) => {
                warn!(error = %e, "Stored session unreadable during sign-out");
                None
            }
        };
        let credential = match credential {
            Some(credential) => Some(credential),
            None => self.engine.credential().await,
        };

        if let Some(credential) = credential {
            let options = RequestOptions::with_method(reqwest::Method::POST)
                .no_cache()
                .with_credential(credential);
            let result = self
                .engine
                .request_with_retries(&self.settings.revoke_endpoint, options, 0)
                .await;
            if !result.success {
                warn!(error = ?result.error, "Credential revocation failed, clearing locally anyway");
            }
        }

        if let Err(e) = self.vault.clear().await {
            error!(error = %e, "Failed to clear stored credential");
        }
        self.engine.clear_credential().await;
        self.engine.clear_cache().await;

        self.publish_user(None);
        drop(op);

        info!("Signed out");
        self.events.emit(AuthEvent::SignedOut);

        self.session()
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// Optimistically merges `update` into the local user snapshot and
    /// persists it. No server round-trip.
    ///
    /// If persisting fails the previous snapshot is restored.
    pub async fn update_profile(&self, update: ProfileUpdate) -> ClientResult<AppUser> {
        if let Some(email) = &update.email {
            validate_email(email)?;
        }

        let op = self.op_lock.lock().await;

        let current = self
            .state_tx
            .borrow()
            .user
            .clone()
            .ok_or(ClientError::NotAuthenticated)?;
        if update.is_empty() {
            return Ok(current);
        }

        let staged = Staged::stage(&current, |user| *user = user.with_update(&update));
        self.publish_user(Some(staged.proposed().clone()));

        let outcome = self.persist_user(staged.proposed()).await;
        let (user, outcome) = staged.settle(outcome);
        if let Err(e) = outcome {
            warn!(error = %e, "Profile update not persisted, restoring previous snapshot");
            self.publish_user(Some(user));
            return Err(e);
        }
        drop(op);

        self.events.emit(AuthEvent::ProfileUpdated {
            username: user.username.clone(),
        });
        Ok(user)
    }

    /// Replaces the confirmed user snapshot for the active credential.
    pub async fn set_authenticated_user(&self, user: AppUser) -> ClientResult<()> {
        let op = self.op_lock.lock().await;

        let current = self
            .state_tx
            .borrow()
            .user
            .clone()
            .ok_or(ClientError::NotAuthenticated)?;
        if current.id != user.id {
            return Err(ClientError::IdentityMismatch {
                expected: current.username,
                actual: user.username,
            });
        }

        self.persist_user(&user).await?;
        let username = user.username.clone();
        self.publish_user(Some(user));
        drop(op);

        self.events.emit(AuthEvent::ProfileUpdated { username });
        Ok(())
    }

    async fn persist_user(&self, user: &AppUser) -> ClientResult<()> {
        let record = self
            .vault
            .load()
            .await?
            .ok_or(ClientError::NotAuthenticated)?;
        self.vault
            .save(&StoredAuth::new(record.credential, Some(user.clone())))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::storage::MemorySecureStore;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    fn synchronizer() -> AuthSynchronizer {
        let config = ClientConfig::for_base_url("http://127.0.0.1:9");
        let engine = Arc::new(RequestEngine::new(&config).unwrap());
        AuthSynchronizer::new(engine, Arc::new(MemorySecureStore::new()), config.auth)
    }

    fn sam() -> AppUser {
        AppUser {
            id: 1,
            username: "sam".into(),
            display_name: "Sam".into(),
            email: None,
            avatar_url: None,
            bio: None,
            byte_count: 0,
            comment_count: 0,
            likes_given: 0,
            likes_received: 0,
            trust_level: 0,
            admin: false,
            moderator: false,
            created_at: None,
        }
    }

    async fn signed_in_synchronizer() -> Arc<AuthSynchronizer> {
        let sync = Arc::new(synchronizer());
        sync.vault
            .save(&StoredAuth::new(Credential::new(TOKEN), Some(sam())))
            .await
            .unwrap();
        sync.publish_user(Some(sam()));
        sync
    }

    #[test]
    fn test_busy_gate_is_exclusive() {
        let sync = synchronizer();
        assert_eq!(sync.phase(), AuthPhase::Uninitialized);

        assert!(sync.try_begin_load());
        assert!(!sync.try_begin_load());
        assert!(sync.session().is_loading);
    }

    #[test]
    fn test_dropped_guard_settles_busy_state() {
        let sync = synchronizer();
        assert!(sync.try_begin_load());
        {
            let _guard = LoadGuard::new(&sync.state_tx);
        }
        assert_eq!(sync.phase(), AuthPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_update_profile_requires_user() {
        let sync = synchronizer();
        let err = sync
            .update_profile(ProfileUpdate {
                bio: Some("hi".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_sign_in_rejects_bad_input_without_state_change() {
        let sync = synchronizer();
        assert!(matches!(
            sync.sign_in("s", "0123456789abcdef0123").await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            sync.sign_in("sam", "short").await,
            Err(ClientError::Validation(_))
        ));
        assert_eq!(sync.phase(), AuthPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_listeners_run_after_operation_lock_is_released() {
        let sync = signed_in_synchronizer().await;
        let lock_free = Arc::new(std::sync::Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&sync);
        let seen = lock_free.clone();
        let _subscription = sync.subscribe(move |_event: &AuthEvent| {
            if let Some(sync) = weak.upgrade() {
                seen.lock().unwrap().push(sync.op_lock.try_lock().is_ok());
            }
        });

        sync.update_profile(ProfileUpdate {
            bio: Some("hello".into()),
            ..Default::default()
        })
        .await
        .unwrap();
        sync.sign_out().await;

        assert_eq!(*lock_free.lock().unwrap(), vec![true, true]);
    }

    #[tokio::test]
    async fn test_empty_profile_update_is_a_no_op() {
        let sync = signed_in_synchronizer().await;
        let mut events = sync.events();

        let user = sync.update_profile(ProfileUpdate::default()).await.unwrap();

        assert_eq!(user, sam());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_follower_waits_for_settled_phase() {
        let sync = Arc::new(synchronizer());
        assert!(sync.try_begin_load());

        let follower = tokio::spawn({
            let sync = sync.clone();
            async move { sync.wait_until_settled().await }
        });
        tokio::task::yield_now().await;
        assert!(!follower.is_finished());

        LoadGuard::new(&sync.state_tx).finish(AuthState::authenticated(sam()));

        let session = follower.await.unwrap();
        assert!(session.is_authenticated);
        assert!(!session.is_loading);
    }
}
