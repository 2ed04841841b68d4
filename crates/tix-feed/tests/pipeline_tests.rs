//! Reconciliation pipeline tests
//!
//! Backfill, partial failure, append-only growth and audit persistence,
//! driven through the in-memory chain and content store.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tix_audit::{AuditError, AuditLog};
use tix_feed::prelude::*;
use tix_feed::QueryError;
use tix_test_utils::*;
use tix_types::{Address, Details, EventMetadata, RawTicket};

fn engine(
    chain: &Arc<StubChain>,
    store: &Arc<StubContentStore>,
    audit: AuditLog,
) -> Arc<ReconciliationEngine> {
    engine_with_config(chain, store, audit, FeedConfig::default())
}

fn engine_with_config(
    chain: &Arc<StubChain>,
    store: &Arc<StubContentStore>,
    audit: AuditLog,
    config: FeedConfig,
) -> Arc<ReconciliationEngine> {
    Arc::new(ReconciliationEngine::new(
        Arc::clone(chain) as Arc<dyn ChainClient>,
        Arc::clone(store) as Arc<dyn ContentStore>,
        Arc::new(audit),
        config,
    ))
}

fn three_logs() -> Vec<tix_types::RawEvent> {
    vec![
        organizer_registered(1, "0xA11CE", "cidO"),
        event_created(2, "0xA11CE", 1, "cidA"),
        ticket_purchased(3, "0xB0B", 1, 2, "cidA"),
    ]
}

fn store_for_three() -> StubContentStore {
    StubContentStore::new()
        .with("cidO", profile_doc("Ada"))
        .with("cidA", event_doc("Concert"))
}

#[tokio::test]
async fn test_single_event_created_backfill() {
    let chain = Arc::new(StubChain::new().with_logs(vec![event_created(1, "0xA11CE", 1, "cidA")]));
    let store = Arc::new(StubContentStore::new().with("cidA", serde_json::json!({"eventName": "Concert"})));
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let outcome = engine.initialize().await.unwrap();

    let reports = &outcome.snapshot.reports;
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].body,
        ReportBody::EventCreated {
            organizer: Address::new("0xA11CE"),
            event_id: 1,
            details: Details::Resolved(EventMetadata::named("Concert")),
        }
    );
    let json = serde_json::to_value(&reports[0]).unwrap();
    assert_eq!(json["eventType"], "EventCreated");
    assert_eq!(json["eventId"], 1);

    assert_eq!(engine.audit().len(), 1);
    assert_eq!(engine.audit().lookup(0).unwrap(), tx(1));
    assert_eq!(engine.status(), FeedStatus::Fresh);
}

#[tokio::test]
async fn test_backfill_indexes_reports_in_log_order() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let outcome = engine.initialize().await.unwrap();

    let indices: Vec<usize> = outcome.snapshot.reports.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    let names: Vec<&str> = outcome.snapshot.reports.iter().map(Report::name).collect();
    assert_eq!(
        names,
        vec!["Organizer Registered", "Event Created", "Ticket Purchased"]
    );
    assert_eq!(engine.audit().list_all(), vec![tx(1), tx(2), tx(3)]);
    assert_eq!(outcome.appended, 3);
}

#[tokio::test]
async fn test_failed_fetch_marks_only_that_report_unresolved() {
    let chain = Arc::new(StubChain::new().with_logs(vec![
        event_created(1, "0xA11CE", 1, "cidA"),
        event_created(2, "0xA11CE", 2, "cidB"),
        event_created(3, "0xA11CE", 3, "cidC"),
    ]));
    let store = StubContentStore::new()
        .with("cidA", event_doc("Concert"))
        .with("cidC", event_doc("Play"));
    store.fail("cidB");
    let store = Arc::new(store);
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let outcome = engine.initialize().await.unwrap();

    let reports = &outcome.snapshot.reports;
    assert_eq!(reports.len(), 3);
    assert_eq!(outcome.unresolved, 1);
    assert!(!reports[0].is_unresolved());
    assert!(reports[1].is_unresolved());
    assert!(!reports[2].is_unresolved());
    assert_eq!(store.calls("cidB"), 1);
    assert_eq!(engine.audit().len(), 3);
}

#[tokio::test]
async fn test_metadata_fetched_once_across_passes() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());

    engine.initialize().await.unwrap();
    engine.run_pass().await.unwrap();
    engine.run_pass().await.unwrap();

    assert_eq!(store.calls("cidO"), 1);
    assert_eq!(store.calls("cidA"), 1);
    assert_eq!(engine.resolver().stats().fetches, 2);
    assert_eq!(engine.passes_committed(), 3);
}

#[tokio::test]
async fn test_unresolved_details_fill_in_on_later_pass() {
    let chain = Arc::new(StubChain::new().with_logs(vec![event_created(1, "0xA11CE", 1, "cidB")]));
    let store = Arc::new(StubContentStore::new().with("cidB", event_doc("Late")));
    store.fail("cidB");
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let first = engine.initialize().await.unwrap();
    assert!(first.snapshot.reports[0].is_unresolved());

    store.recover("cidB");
    let second = engine.run_pass().await.unwrap();

    let report = &second.snapshot.reports[0];
    assert!(!report.is_unresolved());
    assert_eq!(report.creation_time, first.snapshot.reports[0].creation_time);
    assert_eq!(store.calls("cidB"), 2);
}

#[tokio::test]
async fn test_new_log_appends_without_touching_prefix() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());
    let before = engine.initialize().await.unwrap().snapshot.reports;

    chain.push_log(ticket_purchased(4, "0xCA201", 1, 1, "cidA"));
    let after = engine.run_pass().await.unwrap();

    assert_eq!(after.snapshot.reports.len(), 4);
    assert_eq!(&after.snapshot.reports[..3], &before[..]);
    assert_eq!(after.snapshot.reports[3].index, 3);
    assert_eq!(after.appended, 1);
    assert_eq!(engine.audit().lookup(3).unwrap(), tx(4));
}

#[tokio::test]
async fn test_unknown_kind_is_skipped_and_reported() {
    let mut logs = three_logs();
    logs.insert(
        1,
        tix_types::RawEvent::new("TicketRefunded", tx(9), serde_json::json!({})),
    );
    let chain = Arc::new(StubChain::new().with_logs(logs));
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let outcome = engine.initialize().await.unwrap();

    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].transaction_hash, tx(9));
    let indices: Vec<usize> = outcome.snapshot.reports.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(engine.audit().list_all(), vec![tx(1), tx(2), tx(3)]);
}

#[tokio::test]
async fn test_chain_unavailable_on_startup() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    chain.set_unavailable(true);
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let err = engine.initialize().await.unwrap_err();

    assert!(matches!(err, FeedError::ChainUnavailable(_)));
    let query = engine.query();
    assert_eq!(query.status(), FeedStatus::Unavailable);
    assert!(query.list_reports().is_empty());
    assert!(query.list_events().is_empty());
    assert!(engine.audit().is_empty());
}

#[tokio::test]
async fn test_outage_serves_stale_feed_until_recovery() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());
    engine.initialize().await.unwrap();

    chain.set_unavailable(true);
    assert!(engine.run_pass().await.is_err());
    assert_eq!(engine.status(), FeedStatus::Stale);
    assert_eq!(engine.query().list_reports().len(), 3);

    chain.set_unavailable(false);
    engine.run_pass().await.unwrap();
    assert_eq!(engine.status(), FeedStatus::Fresh);
}

#[tokio::test]
async fn test_shorter_history_is_rejected() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());
    engine.initialize().await.unwrap();

    chain.set_logs(three_logs()[..2].to_vec());
    let err = engine.run_pass().await.unwrap_err();

    assert!(matches!(
        err,
        FeedError::SequenceRegressed {
            committed: 3,
            observed: 2
        }
    ));
    assert!(err.is_recoverable());
    assert_eq!(engine.status(), FeedStatus::Stale);
    assert_eq!(engine.query().list_reports().len(), 3);
}

#[tokio::test]
async fn test_reordered_history_aborts_commit() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());
    let before = engine.initialize().await.unwrap().snapshot;

    let mut reordered = three_logs();
    reordered.swap(1, 2);
    reordered.push(event_created(4, "0xA11CE", 2, "cidA"));
    chain.set_logs(reordered);
    let err = engine.run_pass().await.unwrap_err();

    assert!(matches!(
        err,
        FeedError::Audit(AuditError::IndexDrift { index: 1, .. })
    ));
    assert!(!err.is_recoverable());
    assert_eq!(engine.snapshot(), before);
    assert_eq!(engine.audit().len(), 3);
}

#[tokio::test]
async fn test_audit_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());

    {
        let engine = engine(&chain, &store, AuditLog::open(&path).unwrap());
        engine.initialize().await.unwrap();
    }

    chain.push_log(event_created(4, "0xA11CE", 2, "cidA"));
    let engine = engine(&chain, &store, AuditLog::open(&path).unwrap());
    assert_eq!(engine.audit().len(), 3);

    let outcome = engine.initialize().await.unwrap();
    assert_eq!(outcome.appended, 1);
    assert_eq!(engine.audit().list_all(), vec![tx(1), tx(2), tx(3), tx(4)]);
}

#[tokio::test]
async fn test_restart_against_different_history_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let store = Arc::new(store_for_three());

    {
        let chain = Arc::new(StubChain::new().with_logs(three_logs()));
        engine(&chain, &store, AuditLog::open(&path).unwrap())
            .initialize()
            .await
            .unwrap();
    }

    let other = Arc::new(StubChain::new().with_logs(vec![event_created(7, "0xA11CE", 1, "cidA")]));
    let engine = engine(&other, &store, AuditLog::open(&path).unwrap());

    let err = engine.initialize().await.unwrap_err();
    assert!(matches!(
        err,
        FeedError::Audit(AuditError::IndexDrift { index: 0, .. })
    ));
    assert!(engine.query().list_reports().is_empty());
}

#[tokio::test]
async fn test_event_records_follow_onchain_counters() {
    let chain = Arc::new(
        StubChain::new()
            .with_logs(three_logs())
            .with_events(vec![on_chain_event("Concert", "cidA", 100, 50)]),
    );
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let first = engine.initialize().await.unwrap();
    assert_eq!(first.snapshot.events.len(), 1);
    assert_eq!(first.snapshot.events[0].event_id(), 1);
    assert_eq!(
        first.snapshot.events[0].metadata.resolved().and_then(|m| m.event_name.as_deref()),
        Some("Concert")
    );

    chain.set_counters(0, 120, 48);
    chain.push_event(on_chain_event("Play", "cidO", 10, 5));
    let second = engine.run_pass().await.unwrap();

    let events = &second.snapshot.events;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].price, 120);
    assert_eq!(events[0].remaining_tickets, 48);
    assert_eq!(events[0].name, "Concert");
    assert_eq!(events[1].index, 1);
}

#[tokio::test]
async fn test_tickets_resolve_event_details() {
    let chain = Arc::new(StubChain::new());
    let buyer = Address::new("0xB0B");
    chain.give_tickets(
        &buyer,
        vec![RawTicket {
            event_id: 1,
            tickets_bought: 2,
            event_cid: "cidA".into(),
        }],
    );
    let store = Arc::new(store_for_three());
    let engine = engine(&chain, &store, AuditLog::in_memory());

    let tickets = engine.query().tickets_for(&buyer).await.unwrap();

    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].tickets_bought, 2);
    assert_eq!(tickets[0].event_name(), Some("Concert"));
    assert!(engine
        .tickets_for(&Address::new("0xNOBODY"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_bounded_fetches_keep_log_order() {
    let logs: Vec<_> = (1..=6u8)
        .map(|n| event_created(n, "0xA11CE", u64::from(n), &format!("cid{n}")))
        .collect();
    let chain = Arc::new(StubChain::new().with_logs(logs));
    let store = StubContentStore::new().with_delay(Duration::from_millis(5));
    for n in 1..=6 {
        store.insert(&format!("cid{n}"), event_doc(&format!("Show {n}")));
    }
    let store = Arc::new(store);
    let config = FeedConfig::default().with_fetch_concurrency(2);
    let engine = engine_with_config(&chain, &store, AuditLog::in_memory(), config);

    let outcome = engine.initialize().await.unwrap();

    let ids: Vec<Option<u64>> = outcome.snapshot.reports.iter().map(Report::event_id).collect();
    assert_eq!(ids, (1..=6).map(Some).collect::<Vec<_>>());
    assert_eq!(store.total_calls(), 6);
}

#[tokio::test]
async fn test_explorer_links() {
    let chain = Arc::new(StubChain::new().with_logs(three_logs()));
    let store = Arc::new(store_for_three());
    let config = FeedConfig::default().with_explorer_base_url("https://explorer.test/");
    let engine = engine_with_config(&chain, &store, AuditLog::in_memory(), config);
    engine.initialize().await.unwrap();
    let query = engine.query();

    let hash = format!("0x{}", "ab".repeat(32));
    assert_eq!(
        query.build_explorer_url(&hash).unwrap(),
        format!("https://explorer.test/tx/{hash}")
    );
    assert!(matches!(
        query.build_explorer_url("not-a-hash"),
        Err(QueryError::InvalidHash { .. })
    ));
    assert_eq!(
        query.explorer_url_for(1).unwrap(),
        format!("https://explorer.test/tx/{}", tx(2))
    );
}
