//! Reconciliation engine
//!
//! Owns the published report and event-record sequences. Every pass is a
//! full rescan of the contract:
//! 1. Read all contract logs and all listed events
//! 2. Decode logs, skipping (and reporting) ones that are not understood
//! 3. Resolve metadata through the memoizing resolver, bounded and in order
//! 4. Normalize into reports
//! 5. Reconcile the audit log (write)
//! 6. Swap the new state in (publish)
//!
//! Passes never overlap. Chain failures keep the previous state published.

use crate::client::{ChainClient, ContentStore};
use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult, RejectedEvent};
use crate::normalizer::{build_report, decode, details_from};
use crate::query::ReportQuery;
use crate::resolver::MetadataResolver;
use crate::subscription::{run_worker, Listeners, PassTrigger, Subscription};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tix_audit::AuditLog;
use tix_types::{
    Address, ContentId, DecodedEvent, EventRecord, OnChainEvent, RawEvent, Report,
    Ticket, TxHash,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// What consumers are currently looking at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FeedStatus {
    /// No pass has finished yet
    #[default]
    Loading,
    /// Last pass committed
    Fresh,
    /// Last pass failed; previously committed data is still served
    Stale,
    /// No pass has ever committed and the chain is unreachable
    Unavailable,
}

/// Reports and event records as published by a pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub reports: Vec<Report>,
    pub events: Vec<EventRecord>,
}

/// Result of one committed pass
#[derive(Debug)]
pub struct PassOutcome {
    /// Pass number (1-based, per engine)
    pub pass: u64,
    /// Published state after the commit
    pub snapshot: FeedSnapshot,
    /// Logs left out of this pass
    pub rejected: Vec<RejectedEvent>,
    /// Re-delivered logs dropped within this pass
    pub duplicates: usize,
    /// Reports observed this pass whose details are unresolved
    pub unresolved: usize,
    /// Audit entries written by this pass
    pub appended: usize,
}

#[derive(Debug, Default)]
struct FeedState {
    reports: Vec<Report>,
    events: Vec<EventRecord>,
    status: FeedStatus,
    last_commit: Option<DateTime<Utc>>,
}

/// Single writer of the report and event-record sequences
pub struct ReconciliationEngine {
    chain: Arc<dyn ChainClient>,
    listeners: Arc<Listeners>,
    resolver: MetadataResolver,
    audit: Arc<AuditLog>,
    config: FeedConfig,
    state: RwLock<FeedState>,
    pass_lock: Mutex<()>,
    passes_started: AtomicU64,
    passes_committed: AtomicU64,
}

impl ReconciliationEngine {
    /// Create an engine with its own metadata resolver
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn ContentStore>,
        audit: Arc<AuditLog>,
        config: FeedConfig,
    ) -> Self {
        let resolver = MetadataResolver::new(store, config.metadata_cache_capacity);
        Self::with_resolver(chain, resolver, audit, config)
    }

    /// Create an engine sharing an existing resolver
    #[must_use]
    pub fn with_resolver(
        chain: Arc<dyn ChainClient>,
        resolver: MetadataResolver,
        audit: Arc<AuditLog>,
        config: FeedConfig,
    ) -> Self {
        Self {
            listeners: Listeners::new(Arc::clone(&chain)),
            chain,
            resolver,
            audit,
            config,
            state: RwLock::new(FeedState::default()),
            pass_lock: Mutex::new(()),
            passes_started: AtomicU64::new(0),
            passes_committed: AtomicU64::new(0),
        }
    }

    /// Initial backfill
    ///
    /// # Errors
    /// - `FeedError::ChainUnavailable` (recoverable): nothing is published and
    ///   the feed reports [`FeedStatus::Unavailable`]
    /// - `FeedError::Audit`: the audit log rejected the observed sequence
    pub async fn initialize(&self) -> FeedResult<PassOutcome> {
        self.run_pass().await
    }

    /// Run one full-rescan pass, waiting for any pass in flight to finish
    ///
    /// # Errors
    /// Same as [`ReconciliationEngine::initialize`], plus
    /// `FeedError::SequenceRegressed` when the chain returns fewer logs than
    /// were already committed
    pub async fn run_pass(&self) -> FeedResult<PassOutcome> {
        let _guard = self.pass_lock.lock().await;
        let pass = self.passes_started.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        debug!(pass, "reconciliation pass started");

        match self.reconcile(pass).await {
            Ok(outcome) => {
                self.passes_committed.fetch_add(1, Ordering::SeqCst);
                info!(
                    pass,
                    reports = outcome.snapshot.reports.len(),
                    events = outcome.snapshot.events.len(),
                    unresolved = outcome.unresolved,
                    rejected = outcome.rejected.len(),
                    appended = outcome.appended,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "reconciliation pass committed"
                );
                Ok(outcome)
            }
            Err(err) => {
                let status = self.mark_degraded();
                if err.is_recoverable() {
                    warn!(pass, error = %err, ?status, "reconciliation pass failed; previous feed kept");
                } else {
                    error!(pass, error = %err, ?status, "reconciliation pass aborted");
                }
                Err(err)
            }
        }
    }

    async fn reconcile(&self, pass: u64) -> FeedResult<PassOutcome> {
        let (logs, listed) =
            tokio::try_join!(self.chain.contract_logs(), self.chain.all_events())?;
        let observed_at = Utc::now();

        let Decoded {
            accepted,
            rejected,
            duplicates,
        } = decode_all(logs);
        let reports = self.build_reports(accepted, observed_at).await;
        let records = self.build_records(listed).await;
        let unresolved = reports.iter().filter(|r| r.is_unresolved()).count();

        let committed = self.state.read().reports.len();
        if reports.len() < committed {
            return Err(FeedError::SequenceRegressed {
                committed,
                observed: reports.len(),
            });
        }

        let entries: Vec<(u64, TxHash)> = reports
            .iter()
            .map(|r| (r.index as u64, r.transaction_hash))
            .collect();
        let audit = Arc::clone(&self.audit);
        let summary = tokio::task::spawn_blocking(move || audit.reconcile(&entries))
            .await
            .map_err(|e| FeedError::Internal(format!("audit task failed: {e}")))??;

        let snapshot = self.commit(reports, records, observed_at);

        Ok(PassOutcome {
            pass,
            snapshot,
            rejected,
            duplicates,
            unresolved,
            appended: summary.appended,
        })
    }

    async fn build_reports(
        &self,
        accepted: Vec<(RawEvent, DecodedEvent)>,
        observed_at: DateTime<Utc>,
    ) -> Vec<Report> {
        let cids: Vec<ContentId> = accepted
            .iter()
            .map(|(_, decoded)| decoded.content_id().clone())
            .collect();
        let metadata = self.fetch_all(cids).await;

        accepted
            .into_iter()
            .zip(metadata)
            .enumerate()
            .map(|(index, ((raw, decoded), meta))| {
                build_report(index, &raw, decoded, meta.as_deref(), observed_at)
            })
            .collect()
    }

    async fn build_records(&self, listed: Vec<OnChainEvent>) -> Vec<EventRecord> {
        let cids: Vec<ContentId> = listed.iter().map(|e| e.event_cid.clone()).collect();
        let metadata = self.fetch_all(cids).await;

        listed
            .into_iter()
            .zip(metadata)
            .enumerate()
            .map(|(index, (event, meta))| {
                EventRecord::from_chain(index, event, details_from(meta.as_deref()))
            })
            .collect()
    }

    /// Resolve in input order with at most `effective_concurrency` fetches in flight
    async fn fetch_all(&self, cids: Vec<ContentId>) -> Vec<Option<Arc<serde_json::Value>>> {
        stream::iter(cids)
            .map(|cid| self.fetch_details(cid))
            .buffered(self.config.effective_concurrency())
            .collect::<Vec<_>>()
            .await
    }

    async fn fetch_details(&self, cid: ContentId) -> Option<Arc<serde_json::Value>> {
        match self.resolver.resolve(&cid).await {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(cid = %cid, error = %err, "metadata unresolved");
                None
            }
        }
    }

    /// Publish a pass; committed reports keep their place and creation time
    fn commit(
        &self,
        reports: Vec<Report>,
        records: Vec<EventRecord>,
        at: DateTime<Utc>,
    ) -> FeedSnapshot {
        let mut state = self.state.write();

        let committed = state.reports.len();
        let mut observed = reports.into_iter();
        for (current, latest) in state.reports.iter_mut().zip(observed.by_ref()) {
            if current.is_unresolved() && !latest.is_unresolved() {
                current.body = latest.body;
            }
        }
        state.reports.extend(observed);

        let known = state.events.len();
        if records.len() < known {
            warn!(known, listed = records.len(), "contract listed fewer events than recorded");
        }
        let mut listed = records.into_iter();
        for (current, latest) in state.events.iter_mut().zip(listed.by_ref()) {
            current.refresh_counters(&latest);
        }
        state.events.extend(listed);

        debug!(
            new_reports = state.reports.len() - committed,
            new_events = state.events.len().saturating_sub(known),
            "feed state published"
        );

        state.status = FeedStatus::Fresh;
        state.last_commit = Some(at);
        FeedSnapshot {
            reports: state.reports.clone(),
            events: state.events.clone(),
        }
    }

    fn mark_degraded(&self) -> FeedStatus {
        let mut state = self.state.write();
        state.status = if state.last_commit.is_some() {
            FeedStatus::Stale
        } else {
            FeedStatus::Unavailable
        };
        state.status
    }

    /// Listen for contract events; each notification requests a pass
    ///
    /// Notifications arriving while a pass is in flight coalesce into one
    /// follow-up pass. `on_update` runs after every committed pass until the
    /// subscription is released. Subscriptions share one chain listener per
    /// event kind, removed when the last of them is released. Must be called
    /// within a tokio runtime.
    ///
    /// # Errors
    /// Returns `FeedError::ChainUnavailable` if a listener cannot be
    /// registered; listeners registered before the failure are removed again.
    pub fn subscribe<F>(self: &Arc<Self>, on_update: F) -> FeedResult<Subscription>
    where
        F: Fn(&[Report], &[EventRecord]) + Send + Sync + 'static,
    {
        let trigger = Arc::new(PassTrigger::default());
        let subscription = self.listeners.attach(Arc::clone(&trigger)).map_err(|err| {
            warn!(error = %err, "listener registration failed");
            FeedError::from(err)
        })?;

        tokio::spawn(run_worker(Arc::clone(self), trigger, Box::new(on_update)));
        info!(
            subscription = subscription.id(),
            subscribers = self.listeners.subscribers(),
            "subscribed to contract events"
        );
        Ok(subscription)
    }

    /// Release a subscription; safe to call repeatedly
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscribers(&self) -> usize {
        self.listeners.subscribers()
    }

    /// Tickets held by `account`, with event details resolved
    ///
    /// # Errors
    /// Returns `FeedError::ChainUnavailable` if the chain read fails
    pub async fn tickets_for(&self, account: &Address) -> FeedResult<Vec<Ticket>> {
        let raw = self.chain.tickets_of(account).await.map_err(|err| {
            warn!(%account, error = %err, "ticket read failed");
            FeedError::from(err)
        })?;
        let cids = raw.iter().map(|t| t.event_cid.clone()).collect();
        let metadata = self.fetch_all(cids).await;

        Ok(raw
            .iter()
            .zip(metadata)
            .map(|(ticket, meta)| Ticket::from_raw(ticket, details_from(meta.as_deref())))
            .collect())
    }

    /// Read-only view over this engine
    #[must_use]
    pub fn query(self: &Arc<Self>) -> ReportQuery {
        ReportQuery::new(Arc::clone(self))
    }

    /// Current published state
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.read();
        FeedSnapshot {
            reports: state.reports.clone(),
            events: state.events.clone(),
        }
    }

    pub(crate) fn report(&self, index: usize) -> Option<Report> {
        self.state.read().reports.get(index).cloned()
    }

    pub(crate) fn reports(&self) -> Vec<Report> {
        self.state.read().reports.clone()
    }

    pub(crate) fn events(&self) -> Vec<EventRecord> {
        self.state.read().events.clone()
    }

    /// Current feed status
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.state.read().status
    }

    /// Number of passes that committed
    #[must_use]
    pub fn passes_committed(&self) -> u64 {
        self.passes_committed.load(Ordering::SeqCst)
    }

    /// Number of passes started (committed or not)
    #[must_use]
    pub fn passes_started(&self) -> u64 {
        self.passes_started.load(Ordering::SeqCst)
    }

    /// Metadata resolver
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    /// Audit log
    #[inline]
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("status", &self.status())
            .field("passes_committed", &self.passes_committed())
            .field("subscribers", &self.subscribers())
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

struct Decoded {
    accepted: Vec<(RawEvent, DecodedEvent)>,
    rejected: Vec<RejectedEvent>,
    duplicates: usize,
}

/// Decode a pass's logs; a re-delivered (tx, log index, kind) is kept once
fn decode_all(logs: Vec<RawEvent>) -> Decoded {
    let mut seen = HashSet::with_capacity(logs.len());
    let mut decoded = Decoded {
        accepted: Vec::with_capacity(logs.len()),
        rejected: Vec::new(),
        duplicates: 0,
    };

    for raw in logs {
        if !seen.insert((raw.transaction_hash, raw.log_index, raw.kind.clone())) {
            debug!(tx = %raw.transaction_hash.short(), kind = %raw.kind, "dropping re-delivered log");
            decoded.duplicates += 1;
            continue;
        }
        match decode(&raw) {
            Ok(event) => decoded.accepted.push((raw, event)),
            Err(error) => {
                warn!(tx = %raw.transaction_hash.short(), kind = %raw.kind, %error, "skipping contract log");
                decoded.rejected.push(RejectedEvent {
                    transaction_hash: raw.transaction_hash,
                    kind: raw.kind,
                    error,
                });
            }
        }
    }
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockChainClient, MockContentStore};
    use crate::error::{ChainError, NormalizeError};
    use mockall::predicate::eq;
    use serde_json::json;
    use tix_types::EventKind;

    fn engine(chain: MockChainClient, store: MockContentStore) -> Arc<ReconciliationEngine> {
        Arc::new(ReconciliationEngine::new(
            Arc::new(chain),
            Arc::new(store),
            Arc::new(AuditLog::in_memory()),
            FeedConfig::default(),
        ))
    }

    fn log(kind: &str, byte: u8, args: serde_json::Value) -> RawEvent {
        RawEvent::new(kind, TxHash::new([byte; 32]), args)
    }

    #[tokio::test]
    async fn initialize_without_chain_publishes_nothing() {
        let mut chain = MockChainClient::new();
        chain
            .expect_contract_logs()
            .returning(|| Err(ChainError::Unavailable("connection refused".to_string())));
        chain.expect_all_events().returning(|| Ok(vec![]));
        let engine = engine(chain, MockContentStore::new());

        let err = engine.initialize().await.unwrap_err();

        assert!(matches!(err, FeedError::ChainUnavailable(_)));
        assert!(err.is_recoverable());
        assert_eq!(engine.status(), FeedStatus::Unavailable);
        assert_eq!(engine.snapshot(), FeedSnapshot::default());
        assert_eq!(engine.passes_committed(), 0);
    }

    #[tokio::test]
    async fn later_chain_failure_serves_stale_feed() {
        let mut chain = MockChainClient::new();
        let mut seq = mockall::Sequence::new();
        chain
            .expect_contract_logs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(vec![log(
                    "OrganizerRegistered",
                    1,
                    json!({"organizer": "0xA11CE", "detailsCid": "cidO"}),
                )])
            });
        chain
            .expect_contract_logs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ChainError::TornDown));
        chain.expect_all_events().returning(|| Ok(vec![]));
        let mut store = MockContentStore::new();
        store.expect_resolve().returning(|_| Ok(json!({"name": "Ada"})));
        let engine = engine(chain, store);

        engine.initialize().await.unwrap();
        assert!(engine.run_pass().await.is_err());

        assert_eq!(engine.status(), FeedStatus::Stale);
        assert_eq!(engine.snapshot().reports.len(), 1);
    }

    #[tokio::test]
    async fn unknown_kinds_are_reported_not_published() {
        let mut chain = MockChainClient::new();
        chain.expect_contract_logs().returning(|| {
            Ok(vec![
                log("TicketRefunded", 1, json!({})),
                log(
                    "EventCreated",
                    2,
                    json!({"organizer": "0xA11CE", "eventId": 1, "eventCid": "cidA"}),
                ),
            ])
        });
        chain.expect_all_events().returning(|| Ok(vec![]));
        let mut store = MockContentStore::new();
        store
            .expect_resolve()
            .returning(|_| Ok(json!({"eventName": "Concert"})));
        let engine = engine(chain, store);

        let outcome = engine.initialize().await.unwrap();

        assert_eq!(outcome.snapshot.reports.len(), 1);
        assert_eq!(outcome.snapshot.reports[0].index, 0);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(matches!(
            outcome.rejected[0].error,
            NormalizeError::UnrecognizedEventKind(_)
        ));
    }

    #[tokio::test]
    async fn redelivered_logs_are_kept_once() {
        let created = log(
            "EventCreated",
            2,
            json!({"organizer": "0xA11CE", "eventId": 1, "eventCid": "cidA"}),
        );
        let mut chain = MockChainClient::new();
        chain
            .expect_contract_logs()
            .returning(move || Ok(vec![created.clone(), created.clone()]));
        chain.expect_all_events().returning(|| Ok(vec![]));
        let mut store = MockContentStore::new();
        store.expect_resolve().returning(|_| Ok(json!({})));
        let engine = engine(chain, store);

        let outcome = engine.initialize().await.unwrap();

        assert_eq!(outcome.snapshot.reports.len(), 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(engine.audit().len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_twice_removes_listeners_once() {
        let mut chain = MockChainClient::new();
        chain.expect_on().times(3).returning(|_, _| Ok(()));
        chain.expect_off().times(3).returning(|_| Ok(()));
        let engine = engine(chain, MockContentStore::new());

        let subscription = engine.subscribe(|_, _| {}).unwrap();
        engine.unsubscribe(&subscription);
        engine.unsubscribe(&subscription);
        drop(subscription);
    }

    #[tokio::test]
    async fn failed_registration_releases_earlier_listeners() {
        let mut chain = MockChainClient::new();
        chain
            .expect_on()
            .withf(|kind, _| *kind == EventKind::OrganizerRegistered)
            .times(1)
            .returning(|_, _| Ok(()));
        chain
            .expect_on()
            .withf(|kind, _| *kind == EventKind::EventCreated)
            .times(1)
            .returning(|kind, _| {
                Err(ChainError::ListenerRegistration {
                    kind,
                    reason: "filter rejected".to_string(),
                })
            });
        chain
            .expect_off()
            .with(eq(EventKind::OrganizerRegistered))
            .times(1)
            .returning(|_| Ok(()));
        let engine = engine(chain, MockContentStore::new());

        let result = engine.subscribe(|_, _| {});
        assert!(matches!(result, Err(FeedError::ChainUnavailable(_))));
    }

    #[tokio::test]
    async fn subscriptions_share_listeners_until_the_last_release() {
        let mut chain = MockChainClient::new();
        chain.expect_on().times(3).returning(|_, _| Ok(()));
        chain.expect_off().times(3).returning(|_| Ok(()));
        let engine = engine(chain, MockContentStore::new());

        let first = engine.subscribe(|_, _| {}).unwrap();
        let second = engine.subscribe(|_, _| {}).unwrap();
        assert_eq!(engine.subscribers(), 2);

        first.unsubscribe();
        assert!(second.is_active());
        assert_eq!(second.kinds().len(), 3);
        assert_eq!(engine.subscribers(), 1);

        drop(second);
        assert_eq!(engine.subscribers(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_tolerates_torn_down_client() {
        let mut chain = MockChainClient::new();
        chain.expect_on().times(3).returning(|_, _| Ok(()));
        chain
            .expect_off()
            .times(3)
            .returning(|_| Err(ChainError::TornDown));
        let engine = engine(chain, MockContentStore::new());

        let subscription = engine.subscribe(|_, _| {}).unwrap();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }
}
