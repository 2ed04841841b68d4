//! Tixfeed data model
//!
//! Typed records flowing through the ticketing event feed.
//!
//! # Core Concepts
//!
//! - [`RawEvent`]: a contract log exactly as the chain client observed it
//! - [`DecodedEvent`]: a log whose arguments matched one of the three [`EventKind`]s
//! - [`Report`]: the normalized, append-only feed entry with resolved [`Details`]
//! - [`EventRecord`]: a ticketed event merged with its off-chain metadata
//! - [`TxHash`]: 32-byte transaction hash used by the audit log and explorer links

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod hash;
mod ids;
mod raw;
mod record;
mod report;

pub use hash::{HashError, TxHash, TX_HASH_HEX_LEN};
pub use ids::{Address, ContentId, EventKind, UnknownEventKind};
pub use raw::{
    DecodedEvent, EventCreatedArgs, OnChainEvent, OrganizerRegisteredArgs, RawEvent, RawTicket,
    TicketPurchasedArgs,
};
pub use record::{EventRecord, Ticket};
pub use report::{Details, EventMetadata, MetadataDocument, OrganizerProfile, Report, ReportBody};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
