//! Tixfeed transaction audit log
//!
//! Durable, process-local record of which transaction produced each report.
//! Keys are report indices; values are transaction hashes. The log is
//! append-only and is written before a report becomes visible to readers.
//!
//! # Example
//!
//! ```rust,ignore
//! use tix_audit::AuditLog;
//!
//! let log = AuditLog::open("tixfeed-audit.jsonl")?;
//! log.append(0, "0xabc…".parse()?)?;
//! assert_eq!(log.list_all().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod log;

pub use error::{AuditError, AuditResult};
pub use log::{AuditEntry, AuditLog, ReconcileSummary};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
