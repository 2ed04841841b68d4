//! JSON contract snapshots
//!
//! A snapshot captures what a chain client and content store would return,
//! so a feed can be replayed offline.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tix_feed::{ChainClient, ChainError, ContentError, ContentStore, NotificationHandler};
use tix_types::{Address, ContentId, EventKind, OnChainEvent, RawEvent, RawTicket};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct Snapshot {
    pub(crate) logs: Vec<RawEvent>,
    pub(crate) events: Vec<OnChainEvent>,
    pub(crate) documents: HashMap<ContentId, serde_json::Value>,
    pub(crate) tickets: HashMap<Address, Vec<RawTicket>>,
}

impl Snapshot {
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        debug!(
            logs = snapshot.logs.len(),
            events = snapshot.events.len(),
            documents = snapshot.documents.len(),
            "snapshot loaded"
        );
        Ok(snapshot)
    }

    pub(crate) fn split(self) -> (SnapshotChain, SnapshotStore) {
        (
            SnapshotChain {
                logs: self.logs,
                events: self.events,
                tickets: self.tickets,
            },
            SnapshotStore {
                documents: self.documents,
            },
        )
    }
}

/// Chain client answering from a snapshot; never emits notifications
pub(crate) struct SnapshotChain {
    logs: Vec<RawEvent>,
    events: Vec<OnChainEvent>,
    tickets: HashMap<Address, Vec<RawTicket>>,
}

#[async_trait]
impl ChainClient for SnapshotChain {
    async fn all_events(&self) -> Result<Vec<OnChainEvent>, ChainError> {
        Ok(self.events.clone())
    }

    async fn contract_logs(&self) -> Result<Vec<RawEvent>, ChainError> {
        Ok(self.logs.clone())
    }

    async fn tickets_of(&self, account: &Address) -> Result<Vec<RawTicket>, ChainError> {
        Ok(self.tickets.get(account).cloned().unwrap_or_default())
    }

    fn on(&self, _kind: EventKind, _handler: NotificationHandler) -> Result<(), ChainError> {
        Ok(())
    }

    fn off(&self, _kind: EventKind) -> Result<(), ChainError> {
        Ok(())
    }
}

pub(crate) struct SnapshotStore {
    documents: HashMap<ContentId, serde_json::Value>,
}

#[async_trait]
impl ContentStore for SnapshotStore {
    async fn resolve(&self, cid: &ContentId) -> Result<serde_json::Value, ContentError> {
        self.documents
            .get(cid)
            .cloned()
            .ok_or_else(|| ContentError::not_available(cid, "not in snapshot"))
    }
}
