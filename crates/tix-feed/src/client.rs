//! Collaborator seams: the chain client and the content store
//!
//! Both are black boxes to the pipeline. Implementations wrap a contract
//! binding and a content-addressed storage gateway respectively.

use crate::error::{ChainError, ContentError};
use async_trait::async_trait;
use std::sync::Arc;
use tix_types::{Address, ContentId, EventKind, OnChainEvent, RawEvent, RawTicket};

/// Callback invoked by the chain client when a contract event is emitted
pub type NotificationHandler = Arc<dyn Fn(EventKind) + Send + Sync>;

/// Read and subscription access to the ticketing contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// All ticketed events currently listed by the contract
    async fn all_events(&self) -> Result<Vec<OnChainEvent>, ChainError>;

    /// Every contract log of the three known kinds, in emission order
    async fn contract_logs(&self) -> Result<Vec<RawEvent>, ChainError>;

    /// Tickets held by an account
    async fn tickets_of(&self, account: &Address) -> Result<Vec<RawTicket>, ChainError>;

    /// Register a listener for a contract event
    fn on(&self, kind: EventKind, handler: NotificationHandler) -> Result<(), ChainError>;

    /// Remove every listener for a contract event
    fn off(&self, kind: EventKind) -> Result<(), ChainError>;
}

/// Content-addressed metadata storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch and decode the document named by `cid`
    async fn resolve(&self, cid: &ContentId) -> Result<serde_json::Value, ContentError>;
}
