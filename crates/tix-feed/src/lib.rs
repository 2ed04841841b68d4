//! Tixfeed - ticketing contract event feed
//!
//! Turns raw contract logs into an append-only, human-readable report feed:
//! - Backfills every log on startup and rescans on each notification
//! - Resolves off-chain metadata once per content identifier
//! - Normalizes the three contract event kinds into [`Report`]s
//! - Records each report's transaction in the audit log before publishing it
//! - Serves read-only queries and explorer links
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tix_feed::prelude::*;
//!
//! # async fn example(chain: Arc<dyn ChainClient>, store: Arc<dyn ContentStore>) -> FeedResult<()> {
//! let config = FeedConfig::load("tixfeed.toml")?;
//! let audit = Arc::new(AuditLog::open(&config.audit_log_path)?);
//! let engine = Arc::new(ReconciliationEngine::new(chain, store, audit, config));
//!
//! engine.initialize().await?;
//! let subscription = engine.subscribe(|reports, _events| {
//!     println!("{} reports", reports.len());
//! })?;
//!
//! let query = engine.query();
//! println!("{}", query.explorer_url_for(0)?);
//! drop(subscription);
//! # Ok(())
//! # }
//! ```
//!
//! [`Report`]: tix_types::Report

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalizer;
pub mod query;
pub mod resolver;
pub mod subscription;

pub use client::{ChainClient, ContentStore, NotificationHandler};
pub use config::{FeedConfig, MAX_FETCH_CONCURRENCY};
pub use engine::{FeedSnapshot, FeedStatus, PassOutcome, ReconciliationEngine};
pub use error::{
    ChainError, ConfigError, ContentError, FeedError, FeedResult, NormalizeError, QueryError,
    RejectedEvent,
};
pub use normalizer::{decode, normalize};
pub use query::{build_explorer_url, explorer_url, ReportQuery};
pub use resolver::{MetadataResolver, ResolverStats, DEFAULT_CACHE_CAPACITY};
pub use subscription::Subscription;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for wiring a feed
    pub use crate::{
        ChainClient, ContentStore, FeedConfig, FeedError, FeedResult, FeedStatus, ReconciliationEngine,
        ReportQuery, Subscription,
    };
    pub use tix_audit::AuditLog;
    pub use tix_types::{EventKind, EventRecord, Report, ReportBody, TxHash};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
