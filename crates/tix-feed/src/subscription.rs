//! Scoped event subscriptions
//!
//! The chain client keeps one listener per event kind for the whole engine.
//! [`Listeners`] registers them when the first [`Subscription`] arrives, fans
//! each notification out to every live subscription, and removes them when
//! the last one is released. Releasing a subscription, explicitly or by
//! dropping it, stops the worker that turns its notifications into passes.

use crate::client::{ChainClient, NotificationHandler};
use crate::engine::ReconciliationEngine;
use crate::error::ChainError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tix_types::{EventKind, EventRecord, Report};
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Callback run after each notification-triggered pass commits
pub(crate) type UpdateCallback = Box<dyn Fn(&[Report], &[EventRecord]) + Send + Sync>;

/// Coalescing pass request
///
/// `Notify` keeps at most one stored permit, so any number of requests made
/// while a pass is running produce exactly one follow-up pass.
#[derive(Debug, Default)]
pub(crate) struct PassTrigger {
    notify: Notify,
    closed: AtomicBool,
    requests: AtomicU64,
}

impl PassTrigger {
    pub(crate) fn request(&self, kind: EventKind) {
        if self.is_closed() {
            trace!(%kind, "notification after unsubscribe ignored");
            return;
        }
        let total = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(%kind, total, "pass requested");
        self.notify.notify_one();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for the next request; false once closed
    async fn wait(&self) -> bool {
        self.notify.notified().await;
        !self.is_closed()
    }

    fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

/// Drive passes from notifications until the trigger closes
pub(crate) async fn run_worker(
    engine: Arc<ReconciliationEngine>,
    trigger: Arc<PassTrigger>,
    on_update: UpdateCallback,
) {
    while trigger.wait().await {
        match engine.run_pass().await {
            Ok(outcome) => {
                if trigger.is_closed() {
                    debug!(pass = outcome.pass, "pass finished after unsubscribe; update not delivered");
                    break;
                }
                on_update(&outcome.snapshot.reports, &outcome.snapshot.events);
            }
            Err(err) => {
                warn!(error = %err, recoverable = err.is_recoverable(), "notification-triggered pass failed");
            }
        }
    }
    debug!(requests = trigger.requests(), "subscription worker stopped");
}

#[derive(Debug, Default)]
struct ListenerState {
    triggers: BTreeMap<u64, Arc<PassTrigger>>,
    registered: Vec<EventKind>,
}

/// Contract listeners shared by every subscription of one engine
///
/// Registration and removal happen under the state lock, so a release racing
/// a new subscription cannot remove the listeners the newcomer relies on.
/// Chain clients must not invoke handlers from inside `on` or `off`.
pub(crate) struct Listeners {
    chain: Arc<dyn ChainClient>,
    state: Mutex<ListenerState>,
}

impl Listeners {
    pub(crate) fn new(chain: Arc<dyn ChainClient>) -> Arc<Self> {
        Arc::new(Self {
            chain,
            state: Mutex::new(ListenerState::default()),
        })
    }

    /// Add a subscription, registering the chain listeners if none are live
    ///
    /// On a registration failure the kinds registered so far are removed
    /// again and no subscription is created.
    pub(crate) fn attach(
        self: &Arc<Self>,
        trigger: Arc<PassTrigger>,
    ) -> Result<Subscription, ChainError> {
        let mut state = self.state.lock();
        if state.registered.is_empty() {
            for kind in EventKind::ALL {
                let fanout = Arc::downgrade(self);
                let handler: NotificationHandler = Arc::new(move |emitted: EventKind| {
                    if let Some(listeners) = Weak::upgrade(&fanout) {
                        listeners.notify(emitted);
                    }
                });
                if let Err(err) = self.chain.on(kind, handler) {
                    let partial = std::mem::take(&mut state.registered);
                    self.remove(&partial);
                    return Err(err);
                }
                state.registered.push(kind);
            }
            debug!(kinds = state.registered.len(), "contract listeners registered");
        }

        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        state.triggers.insert(id, Arc::clone(&trigger));
        Ok(Subscription {
            id,
            listeners: Arc::clone(self),
            trigger,
            released: AtomicBool::new(false),
        })
    }

    /// Drop a subscription; the last one out removes the chain listeners
    fn detach(&self, id: u64) {
        let mut state = self.state.lock();
        state.triggers.remove(&id);
        if state.triggers.is_empty() {
            let registered = std::mem::take(&mut state.registered);
            self.remove(&registered);
        } else {
            debug!(subscription = id, remaining = state.triggers.len(), "contract listeners kept");
        }
    }

    /// Removal failures (for example a torn-down client) are logged and the
    /// listener is treated as gone
    fn remove(&self, kinds: &[EventKind]) {
        for &kind in kinds {
            if let Err(err) = self.chain.off(kind) {
                warn!(%kind, error = %err, "listener removal failed");
            }
        }
    }

    fn notify(&self, kind: EventKind) {
        let triggers: Vec<_> = self.state.lock().triggers.values().cloned().collect();
        for trigger in triggers {
            trigger.request(kind);
        }
    }

    fn kinds(&self) -> Vec<EventKind> {
        self.state.lock().registered.clone()
    }

    pub(crate) fn subscribers(&self) -> usize {
        self.state.lock().triggers.len()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Listeners")
            .field("subscribers", &state.triggers.len())
            .field("registered", &state.registered)
            .finish_non_exhaustive()
    }
}

/// A live subscription to contract events; released on drop
pub struct Subscription {
    id: u64,
    listeners: Arc<Listeners>,
    trigger: Arc<PassTrigger>,
    released: AtomicBool,
}

impl Subscription {
    /// Process-unique identifier, for logs
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// False once released
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::SeqCst)
    }

    /// Event kinds this subscription is notified of; empty once released
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        if self.is_active() {
            self.listeners.kinds()
        } else {
            Vec::new()
        }
    }

    /// Stop delivering updates; the last live subscription also removes
    /// the chain listeners
    ///
    /// Idempotent.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            debug!(subscription = self.id, "subscription already released");
            return;
        }
        self.trigger.close();
        self.listeners.detach(self.id);
        info!(subscription = self.id, "unsubscribed from contract events");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
