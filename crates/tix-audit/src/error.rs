//! Error types for the audit log

use std::path::PathBuf;
use tix_types::TxHash;

/// Audit log errors
///
/// All variants are contract violations or storage failures; none of them
/// should be swallowed by callers.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// An entry already exists for this index
    #[error("duplicate audit index {index} (recorded {existing})")]
    DuplicateIndex { index: u64, existing: TxHash },

    /// No entry for this index
    #[error("no audit entry for report index {0}")]
    NotFound(u64),

    /// The index is recorded with a different transaction
    #[error("audit index {index} drifted: recorded {recorded}, observed {observed}")]
    IndexDrift {
        index: u64,
        recorded: TxHash,
        observed: TxHash,
    },

    /// A persisted line could not be decoded
    #[error("corrupt audit log {path} at line {line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure
    #[error("audit log i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AuditError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type alias for audit operations
pub type AuditResult<T> = Result<T, AuditError>;
