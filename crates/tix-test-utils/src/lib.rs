//! Testing utilities for the Tixfeed workspace
//!
//! In-memory stand-ins for the chain client and content store, plus fixture
//! builders for contract logs and listed events.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tix_feed::{ChainClient, ChainError, ContentError, ContentStore, NotificationHandler};
use tix_types::{Address, ContentId, EventKind, OnChainEvent, RawEvent, RawTicket, TxHash};
use tokio::sync::Semaphore;

/// Scriptable in-memory chain client
#[derive(Default)]
pub struct StubChain {
    logs: RwLock<Vec<RawEvent>>,
    events: RwLock<Vec<OnChainEvent>>,
    tickets: RwLock<HashMap<Address, Vec<RawTicket>>>,
    handlers: Mutex<HashMap<EventKind, Vec<NotificationHandler>>>,
    refuse_listeners: Mutex<HashSet<EventKind>>,
    unavailable: AtomicBool,
    torn_down: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    log_reads: AtomicUsize,
    on_calls: AtomicUsize,
    off_calls: AtomicUsize,
}

impl StubChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_logs(self, logs: Vec<RawEvent>) -> Self {
        *self.logs.write() = logs;
        self
    }

    #[must_use]
    pub fn with_events(self, events: Vec<OnChainEvent>) -> Self {
        *self.events.write() = events;
        self
    }

    pub fn push_log(&self, log: RawEvent) {
        self.logs.write().push(log);
    }

    /// Replace the whole log history (for regression and drift scenarios)
    pub fn set_logs(&self, logs: Vec<RawEvent>) {
        *self.logs.write() = logs;
    }

    pub fn push_event(&self, event: OnChainEvent) {
        self.events.write().push(event);
    }

    /// Change the on-chain counters of listed event `index`
    pub fn set_counters(&self, index: usize, price: u128, remaining_tickets: u64) {
        if let Some(event) = self.events.write().get_mut(index) {
            event.price = price;
            event.remaining_tickets = remaining_tickets;
        }
    }

    pub fn give_tickets(&self, account: &Address, tickets: Vec<RawTicket>) {
        self.tickets.write().insert(account.clone(), tickets);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every later call fails with `ChainError::TornDown`
    pub fn tear_down(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
    }

    /// Make `on` fail for `kind`
    pub fn refuse_listener(&self, kind: EventKind) {
        self.refuse_listeners.lock().insert(kind);
    }

    /// Block `contract_logs` until permits are released on the returned gate
    #[must_use]
    pub fn hold_reads(&self) -> ReadGate {
        let semaphore = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&semaphore));
        ReadGate { semaphore }
    }

    /// Fire the listeners registered for `kind`, as the contract would
    pub fn emit(&self, kind: EventKind) {
        let handlers = self.handlers.lock().get(&kind).cloned().unwrap_or_default();
        for handler in handlers {
            handler(kind);
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.handlers.lock().values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn log_reads(&self) -> usize {
        self.log_reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn on_calls(&self) -> usize {
        self.on_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn off_calls(&self) -> usize {
        self.off_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ChainError> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(ChainError::TornDown);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChainError::Unavailable("stub chain offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for StubChain {
    async fn all_events(&self) -> Result<Vec<OnChainEvent>, ChainError> {
        self.check()?;
        Ok(self.events.read().clone())
    }

    async fn contract_logs(&self) -> Result<Vec<RawEvent>, ChainError> {
        self.log_reads.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(semaphore) = gate {
            if let Ok(permit) = semaphore.acquire().await {
                permit.forget();
            }
        }
        self.check()?;
        Ok(self.logs.read().clone())
    }

    async fn tickets_of(&self, account: &Address) -> Result<Vec<RawTicket>, ChainError> {
        self.check()?;
        Ok(self.tickets.read().get(account).cloned().unwrap_or_default())
    }

    fn on(&self, kind: EventKind, handler: NotificationHandler) -> Result<(), ChainError> {
        self.on_calls.fetch_add(1, Ordering::SeqCst);
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(ChainError::TornDown);
        }
        if self.refuse_listeners.lock().contains(&kind) {
            return Err(ChainError::ListenerRegistration {
                kind,
                reason: "stub refused listener".to_string(),
            });
        }
        self.handlers.lock().entry(kind).or_default().push(handler);
        Ok(())
    }

    fn off(&self, kind: EventKind) -> Result<(), ChainError> {
        self.off_calls.fetch_add(1, Ordering::SeqCst);
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(ChainError::TornDown);
        }
        self.handlers.lock().remove(&kind);
        Ok(())
    }
}

/// Releases reads held by [`StubChain::hold_reads`]
#[derive(Debug, Clone)]
pub struct ReadGate {
    semaphore: Arc<Semaphore>,
}

impl ReadGate {
    /// Let `reads` blocked or future log reads through
    pub fn release(&self, reads: usize) {
        self.semaphore.add_permits(reads);
    }
}

/// In-memory content store with call counting and scripted failures
#[derive(Default)]
pub struct StubContentStore {
    docs: RwLock<HashMap<ContentId, Value>>,
    failing: RwLock<HashSet<ContentId>>,
    calls: Mutex<HashMap<ContentId, usize>>,
    delay: Option<Duration>,
}

impl StubContentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, cid: &str, doc: Value) -> Self {
        self.insert(cid, doc);
        self
    }

    /// Sleep before answering each fetch
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, cid: &str, doc: Value) {
        self.docs.write().insert(ContentId::new(cid), doc);
    }

    /// Make fetches of `cid` fail until [`StubContentStore::recover`]
    pub fn fail(&self, cid: &str) {
        self.failing.write().insert(ContentId::new(cid));
    }

    pub fn recover(&self, cid: &str) {
        self.failing.write().remove(&ContentId::new(cid));
    }

    #[must_use]
    pub fn calls(&self, cid: &str) -> usize {
        self.calls
            .lock()
            .get(&ContentId::new(cid))
            .copied()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl ContentStore for StubContentStore {
    async fn resolve(&self, cid: &ContentId) -> Result<Value, ContentError> {
        *self.calls.lock().entry(cid.clone()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.read().contains(cid) {
            return Err(ContentError::not_available(cid, "gateway timeout"));
        }
        self.docs
            .read()
            .get(cid)
            .cloned()
            .ok_or_else(|| ContentError::not_available(cid, "not pinned"))
    }
}

/// Transaction hash made of one repeated byte
#[must_use]
pub fn tx(byte: u8) -> TxHash {
    TxHash::new([byte; 32])
}

#[must_use]
pub fn organizer_registered(byte: u8, organizer: &str, details_cid: &str) -> RawEvent {
    RawEvent::new(
        EventKind::OrganizerRegistered.as_str(),
        tx(byte),
        json!({"organizer": organizer, "detailsCid": details_cid}),
    )
    .at_block(u64::from(byte), 0)
}

#[must_use]
pub fn event_created(byte: u8, organizer: &str, event_id: u64, event_cid: &str) -> RawEvent {
    RawEvent::new(
        EventKind::EventCreated.as_str(),
        tx(byte),
        json!({"organizer": organizer, "eventId": event_id, "eventCid": event_cid}),
    )
    .at_block(u64::from(byte), 0)
}

#[must_use]
pub fn ticket_purchased(
    byte: u8,
    buyer: &str,
    event_id: u64,
    tickets_bought: u64,
    event_cid: &str,
) -> RawEvent {
    RawEvent::new(
        EventKind::TicketPurchased.as_str(),
        tx(byte),
        json!({
            "buyer": buyer,
            "eventId": event_id,
            "ticketsBought": tickets_bought,
            "eventCid": event_cid,
        }),
    )
    .at_block(u64::from(byte), 0)
}

#[must_use]
pub fn on_chain_event(name: &str, event_cid: &str, price: u128, remaining_tickets: u64) -> OnChainEvent {
    OnChainEvent {
        organizer: Address::new("0xA11CE"),
        name: name.to_string(),
        price,
        remaining_tickets,
        location: "Hall A".to_string(),
        date: "2024-05-01".to_string(),
        time: "19:30".to_string(),
        event_cid: ContentId::new(event_cid),
    }
}

#[must_use]
pub fn event_doc(name: &str) -> Value {
    json!({"eventName": name, "description": format!("{name} night"), "location": "Hall A"})
}

#[must_use]
pub fn profile_doc(name: &str) -> Value {
    json!({"name": name, "organizationName": format!("{name} Events")})
}

/// Poll `condition` until it holds or `timeout` elapses; returns the last result
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `future`, failing the test if it does not finish within a second
pub async fn within_second<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(Duration::from_secs(1), future).await {
        Ok(output) => output,
        Err(_) => panic!("operation did not finish within a second"),
    }
}
