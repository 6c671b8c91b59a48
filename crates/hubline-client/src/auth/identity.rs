//! Identity confirmation against the forum and classification of the outcome.
//!
//! ```text
//!   GET /session/current.json (credential attached, cache bypassed)
//!        │
//!        ├── 200 {current_user}   → Confirmed(user)
//!        ├── 404                  → NoSession      keep credential
//!        ├── 401 / 403            → Rejected       wipe credential
//!        └── anything else        → Transient      touch nothing
//! ```
//!
//! The 404 vs 401/403 split is specific to the forum backend's error
//! contract; a different backend needs its own [`classify`].

use hubline_core::wire::CurrentUserEnvelope;
use hubline_core::{AppUser, Credential};

use crate::engine::{RequestEngine, RequestOptions};
use crate::error::ClientError;

/// How an identity check settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Confirmed(AppUser),
    NoSession,
    Rejected(ClientError),
    Transient(ClientError),
}

impl Settlement {
    pub fn name(&self) -> &'static str {
        match self {
            Settlement::Confirmed(_) => "confirmed",
            Settlement::NoSession => "no_session",
            Settlement::Rejected(_) => "rejected",
            Settlement::Transient(_) => "transient",
        }
    }

    /// Error to hand the direct caller of a user-facing operation.
    pub fn into_error(self) -> Option<ClientError> {
        match self {
            Settlement::Confirmed(_) => None,
            Settlement::NoSession => Some(ClientError::NoSession),
            Settlement::Rejected(e) | Settlement::Transient(e) => Some(e),
        }
    }
}

/// Maps an identity-endpoint error into a settlement.
pub fn classify(error: ClientError) -> Settlement {
    match error {
        ClientError::NotFound { .. } | ClientError::NoSession => Settlement::NoSession,
        e if e.is_credential_rejected() => Settlement::Rejected(e),
        e => Settlement::Transient(e),
    }
}

/// Asks the server who `credential` belongs to.
pub async fn confirm_identity(
    engine: &RequestEngine,
    identity_endpoint: &str,
    credential: &Credential,
) -> Settlement {
    let options = RequestOptions::get()
        .no_cache()
        .with_credential(credential.clone());

    let result = engine.request(identity_endpoint, options).await;

    let envelope: CurrentUserEnvelope = match result.decode() {
        Ok(envelope) => envelope,
        Err(e) => return classify(e),
    };

    match envelope.current_user.into_app_user(engine.base_url()) {
        Ok(user) => Settlement::Confirmed(user),
        Err(e) => Settlement::Transient(e.into()),
    }
}
