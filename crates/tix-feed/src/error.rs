//! Error types for the feed pipeline
//!
//! Provides error handling for:
//! - Chain client reads and listener registration
//! - Content store resolution
//! - Normalization of contract logs
//! - Queries against the published feed
//! - Configuration loading

use tix_audit::AuditError;
use tix_types::{ContentId, EventKind, HashError, TxHash};

/// Main feed error type
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Bulk read or subscription setup failed
    #[error("chain unavailable: {0}")]
    ChainUnavailable(#[from] ChainError),

    /// A single log could not be normalized
    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),

    /// Audit log contract violation or storage failure
    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),

    /// Query against the published feed failed
    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    /// The chain returned fewer logs than already committed
    #[error("report sequence regressed: {committed} committed, {observed} observed")]
    SequenceRegressed { committed: usize, observed: usize },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A background task failed to complete
    #[error("internal error: {0}")]
    Internal(String),
}

impl FeedError {
    /// Check if the feed can keep serving (stale) data after this error
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ChainUnavailable(_) | Self::Normalize(_) | Self::SequenceRegressed { .. }
        )
    }
}

/// Chain client errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    /// Transport or node failure
    #[error("chain client unavailable: {0}")]
    Unavailable(String),

    /// Listener could not be registered
    #[error("listener registration for {kind} failed: {reason}")]
    ListenerRegistration { kind: EventKind, reason: String },

    /// Client has already been shut down
    #[error("chain client torn down")]
    TornDown,
}

/// Content store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentError {
    /// Document could not be fetched
    #[error("content {cid} not available: {reason}")]
    NotAvailable { cid: ContentId, reason: String },
}

impl ContentError {
    /// Create a not-available error
    #[inline]
    pub fn not_available(cid: &ContentId, reason: impl Into<String>) -> Self {
        Self::NotAvailable {
            cid: cid.clone(),
            reason: reason.into(),
        }
    }
}

/// Normalization errors
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The log names an event this pipeline does not know
    #[error("unrecognized event kind: {0}")]
    UnrecognizedEventKind(String),

    /// The log names a known event but its arguments do not decode
    #[error("malformed {kind} arguments: {source}")]
    MalformedArgs {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Query errors
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// No report at this index
    #[error("no report at index {0}")]
    NotFound(usize),

    /// Input is not a 32-byte hex transaction hash
    #[error("invalid transaction hash {input:?}: {source}")]
    InvalidHash {
        input: String,
        #[source]
        source: HashError,
    },

    /// Audit lookup failed
    #[error("audit lookup failed: {0}")]
    Audit(#[from] AuditError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// A log that was left out of a pass, with the reason
#[derive(Debug)]
pub struct RejectedEvent {
    /// Transaction that emitted the log
    pub transaction_hash: TxHash,
    /// Event name as delivered
    pub kind: String,
    /// Why it was rejected
    pub error: NormalizeError,
}

/// Result type alias for feed operations
pub type FeedResult<T> = Result<T, FeedError>;
