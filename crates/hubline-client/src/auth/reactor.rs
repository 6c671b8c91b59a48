//! # Reload Reactor
//!
//! Reloads auth state in response to auth events, the way UI observers do,
//! without feeding back into the event stream: a reload only emits when it
//! ends a confirmed session, and the reload after that has nothing to end.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Debounced Reload                                  │
//! │                                                                         │
//! │  events:   SignedIn ─ SignedIn ─ SignedIn ──────────────┐               │
//! │            t=0        t=10ms     t=20ms                 │               │
//! │                                                         ▼               │
//! │  timer:    [──50ms──x                                                  │
//! │                       [──50ms──x                                       │
//! │                                  [──50ms──] fire @ t=70ms              │
//! │                                                 │                       │
//! │                                                 ▼                       │
//! │                          synchronizer busy? ── yes ──► skip            │
//! │                                 │ no                                    │
//! │                                 ▼                                       │
//! │                       load_stored_auth()                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The busy check is the correctness mechanism; the debounce only trims
//! redundant work. `ProfileUpdated` never triggers a reload.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::AuthSynchronizer;

/// Far enough out that an idle timer never fires.
const IDLE: Duration = Duration::from_secs(86_400);

#[derive(Default)]
struct Counters {
    reloads: AtomicU64,
    coalesced: AtomicU64,
    skipped: AtomicU64,
}

/// Spawns the reactor task.
pub struct ReloadReactor;

impl ReloadReactor {
    /// Starts reacting to `synchronizer`'s events.
    ///
    /// Holds only a weak reference; the task ends when the synchronizer is
    /// dropped or [`ReactorHandle::shutdown`] is called.
    pub fn spawn(synchronizer: &Arc<AuthSynchronizer>, debounce: Duration) -> ReactorHandle {
        let events = synchronizer.events();
        let weak = Arc::downgrade(synchronizer);
        let counters = Arc::new(Counters::default());
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let task = tokio::spawn(run(weak, events, debounce, Arc::clone(&counters), shutdown_rx));

        ReactorHandle {
            counters,
            shutdown_tx,
            task,
        }
    }
}

async fn run(
    synchronizer: Weak<AuthSynchronizer>,
    mut events: tokio::sync::broadcast::Receiver<hubline_core::AuthEvent>,
    debounce: Duration,
    counters: Arc<Counters>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    info!(debounce_ms = debounce.as_millis() as u64, "Reload reactor started");

    let timer = sleep(IDLE);
    tokio::pin!(timer);
    let mut pending = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Reload reactor shutting down");
                break;
            }

            received = events.recv() => {
                match received {
                    Ok(event) if event.triggers_reload() => {
                        if pending {
                            counters.coalesced.fetch_add(1, Ordering::Relaxed);
                        }
                        pending = true;
                        timer.as_mut().reset(Instant::now() + debounce);
                        debug!(event = %event, "Reload scheduled");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        counters.coalesced.fetch_add(missed, Ordering::Relaxed);
                        pending = true;
                        timer.as_mut().reset(Instant::now() + debounce);
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = &mut timer, if pending => {
                pending = false;
                timer.as_mut().reset(Instant::now() + IDLE);

                let Some(synchronizer) = synchronizer.upgrade() else {
                    break;
                };
                if synchronizer.is_loading() {
                    counters.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!("Auth load already in flight, reload skipped");
                    continue;
                }

                synchronizer.load_stored_auth().await;
                counters.reloads.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Controls a running reactor.
pub struct ReactorHandle {
    counters: Arc<Counters>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl ReactorHandle {
    /// Reloads actually performed.
    pub fn reloads(&self) -> u64 {
        self.counters.reloads.load(Ordering::Relaxed)
    }

    /// Events folded into an already scheduled reload.
    pub fn coalesced(&self) -> u64 {
        self.counters.coalesced.load(Ordering::Relaxed)
    }

    /// Reloads dropped because a load was already in flight.
    pub fn skipped(&self) -> u64 {
        self.counters.skipped.load(Ordering::Relaxed)
    }

    /// Stops the task and waits for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::engine::RequestEngine;
    use crate::storage::MemorySecureStore;
    use hubline_core::AuthEvent;

    fn synchronizer() -> Arc<AuthSynchronizer> {
        let config = ClientConfig::for_base_url("http://127.0.0.1:9");
        let engine = Arc::new(RequestEngine::new(&config).unwrap());
        Arc::new(AuthSynchronizer::new(
            engine,
            Arc::new(MemorySecureStore::new()),
            config.auth,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_burst_coalesces_into_one_reload() {
        let sync = synchronizer();
        let handle = ReloadReactor::spawn(&sync, Duration::from_millis(50));

        // 10 events over 90ms
        for _ in 0..10 {
            sync.events.emit(AuthEvent::SignedIn {
                username: "sam".into(),
            });
            sleep(Duration::from_millis(10)).await;
        }
        sleep(Duration::from_millis(200)).await;

        assert_eq!(handle.reloads(), 1);
        assert_eq!(handle.coalesced(), 9);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_updates_do_not_reload() {
        let sync = synchronizer();
        let handle = ReloadReactor::spawn(&sync, Duration::from_millis(50));

        sync.events.emit(AuthEvent::ProfileUpdated {
            username: "sam".into(),
        });
        sleep(Duration::from_millis(200)).await;

        assert_eq!(handle.reloads(), 0);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_skipped_while_loading() {
        let sync = synchronizer();
        let handle = ReloadReactor::spawn(&sync, Duration::from_millis(50));

        assert!(sync.try_begin_load());
        sync.events.emit(AuthEvent::SignedOut);
        sleep(Duration::from_millis(200)).await;

        assert_eq!(handle.reloads(), 0);
        assert_eq!(handle.skipped(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_reload_separately() {
        let sync = synchronizer();
        let handle = ReloadReactor::spawn(&sync, Duration::from_millis(50));

        sync.events.emit(AuthEvent::SignedOut);
        sleep(Duration::from_millis(200)).await;
        sync.events.emit(AuthEvent::Refreshed {
            authenticated: false,
        });
        sleep(Duration::from_millis(200)).await;

        assert_eq!(handle.reloads(), 2);
        handle.shutdown().await;
    }
}
