//! Read-only query facade
//!
//! Consumers read the published sequences and follow reports to their
//! transactions through the audit log. Nothing here mutates feed state.

use crate::engine::{FeedStatus, ReconciliationEngine};
use crate::error::{FeedResult, QueryError};
use std::sync::Arc;
use tix_types::{Address, EventRecord, Report, Ticket, TxHash};

/// Link to a transaction on a block explorer
///
/// # Errors
/// Returns `QueryError::InvalidHash` unless `hash` is 64 hex digits with an
/// optional `0x` prefix
pub fn build_explorer_url(base: &str, hash: &str) -> Result<String, QueryError> {
    let parsed: TxHash = hash.trim().parse().map_err(|source| QueryError::InvalidHash {
        input: hash.to_string(),
        source,
    })?;
    Ok(explorer_url(base, &parsed))
}

/// Link to an already parsed transaction hash
#[must_use]
pub fn explorer_url(base: &str, hash: &TxHash) -> String {
    format!("{}/tx/{hash}", base.trim_end_matches('/'))
}

/// Queries over a [`ReconciliationEngine`]
#[derive(Debug, Clone)]
pub struct ReportQuery {
    engine: Arc<ReconciliationEngine>,
}

impl ReportQuery {
    pub(crate) fn new(engine: Arc<ReconciliationEngine>) -> Self {
        Self { engine }
    }

    /// Every committed report, in index order
    #[must_use]
    pub fn list_reports(&self) -> Vec<Report> {
        self.engine.reports()
    }

    /// Every known ticketed event, in index order
    #[must_use]
    pub fn list_events(&self) -> Vec<EventRecord> {
        self.engine.events()
    }

    /// Report at `index`
    ///
    /// # Errors
    /// Returns `QueryError::NotFound` if no report has that index
    pub fn get_report(&self, index: usize) -> Result<Report, QueryError> {
        self.engine.report(index).ok_or(QueryError::NotFound(index))
    }

    /// Transaction recorded in the audit log for a published report
    ///
    /// # Errors
    /// Returns `QueryError::NotFound` if the report is not published
    pub fn transaction_for(&self, index: usize) -> Result<TxHash, QueryError> {
        self.get_report(index)?;
        Ok(self.engine.audit().lookup(index as u64)?)
    }

    /// Explorer link for a published report's transaction
    ///
    /// # Errors
    /// Same as [`ReportQuery::transaction_for`]
    pub fn explorer_url_for(&self, index: usize) -> Result<String, QueryError> {
        let hash = self.transaction_for(index)?;
        Ok(explorer_url(&self.engine.config().explorer_base_url, &hash))
    }

    /// Explorer link for a transaction hash, using the configured explorer
    ///
    /// # Errors
    /// Returns `QueryError::InvalidHash` for malformed input
    pub fn build_explorer_url(&self, hash: &str) -> Result<String, QueryError> {
        build_explorer_url(&self.engine.config().explorer_base_url, hash)
    }

    /// Every audited transaction, in report order
    #[must_use]
    pub fn audit_trail(&self) -> Vec<TxHash> {
        self.engine.audit().list_all()
    }

    /// Tickets held by `account`
    ///
    /// # Errors
    /// Returns `FeedError::ChainUnavailable` if the chain read fails
    pub async fn tickets_for(&self, account: &Address) -> FeedResult<Vec<Ticket>> {
        self.engine.tickets_for(account).await
    }

    #[must_use]
    pub fn status(&self) -> FeedStatus {
        self.engine.status()
    }
}
