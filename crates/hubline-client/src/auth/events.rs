//! # Auth Event Bus
//!
//! Fan-out of [`AuthEvent`]s to callback listeners and broadcast receivers.
//!
//! ```text
//!   AuthSynchronizer ── emit(event) ──┬──► broadcast::Sender (256)
//!   (after state + storage            │        └──► events() receivers
//!    are updated)                     │
//!                                     └──► listener registry (snapshot)
//!                                              └──► on_event(&event)
//! ```
//!
//! Listeners are cloned out of the registry before dispatch, so a listener
//! may subscribe, unsubscribe or call back into the synchronizer without
//! deadlocking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use hubline_core::AuthEvent;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Receives auth events.
pub trait AuthListener: Send + Sync {
    fn on_event(&self, event: &AuthEvent);
}

impl<F> AuthListener for F
where
    F: Fn(&AuthEvent) + Send + Sync,
{
    fn on_event(&self, event: &AuthEvent) {
        self(event)
    }
}

type Registry = RwLock<Vec<(u64, Arc<dyn AuthListener>)>>;

pub struct EventBus {
    tx: broadcast::Sender<AuthEvent>,
    listeners: Arc<Registry>,
    next_id: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus {
            tx,
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a callback. Keep the returned handle to unsubscribe later.
    pub fn subscribe(&self, listener: impl AuthListener + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, Arc::new(listener)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// A broadcast receiver; lagging receivers skip the oldest events.
    pub fn receiver(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Publishes `event`. Callers must have applied the state change first.
    pub(crate) fn emit(&self, event: AuthEvent) {
        let snapshot: Vec<Arc<dyn AuthListener>> = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        debug!(event = %event, listeners = snapshot.len(), "Emitting auth event");

        for listener in snapshot {
            listener.on_event(&event);
        }

        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the listener. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut listeners = registry
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        listeners.len() != before
    }
}
