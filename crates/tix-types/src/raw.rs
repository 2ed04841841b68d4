//! Raw records as delivered by the chain client
//!
//! These are immutable observations. Contract logs carry their arguments as
//! an untyped JSON object so that a log emitted by a newer contract version
//! still reaches the normalizer, which decides whether it is understood.

use crate::hash::TxHash;
use crate::ids::{Address, ContentId, EventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A contract log as observed on chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Contract event name
    pub kind: String,
    /// Transaction that emitted the log
    pub transaction_hash: TxHash,
    /// Block containing the transaction
    #[serde(default)]
    pub block_number: u64,
    /// Position of the log within its block
    #[serde(default)]
    pub log_index: u32,
    /// Block timestamp, when the client supplies one
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Kind-specific arguments
    pub args: serde_json::Value,
}

impl RawEvent {
    /// Create a log with the given name, transaction and arguments
    #[must_use]
    pub fn new(kind: impl Into<String>, transaction_hash: TxHash, args: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            transaction_hash,
            block_number: 0,
            log_index: 0,
            timestamp: None,
            args,
        }
    }

    /// Set block position
    #[must_use]
    pub fn at_block(mut self, block_number: u64, log_index: u32) -> Self {
        self.block_number = block_number;
        self.log_index = log_index;
        self
    }

    /// Set block timestamp
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Arguments of `OrganizerRegistered`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerRegisteredArgs {
    pub organizer: Address,
    pub details_cid: ContentId,
}

/// Arguments of `EventCreated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCreatedArgs {
    pub organizer: Address,
    pub event_id: u64,
    pub event_cid: ContentId,
}

/// Arguments of `TicketPurchased`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketPurchasedArgs {
    pub buyer: Address,
    pub event_id: u64,
    pub tickets_bought: u64,
    pub event_cid: ContentId,
}

/// A contract log whose arguments matched a known kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    OrganizerRegistered(OrganizerRegisteredArgs),
    EventCreated(EventCreatedArgs),
    TicketPurchased(TicketPurchasedArgs),
}

impl DecodedEvent {
    /// Kind of the decoded log
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::OrganizerRegistered(_) => EventKind::OrganizerRegistered,
            Self::EventCreated(_) => EventKind::EventCreated,
            Self::TicketPurchased(_) => EventKind::TicketPurchased,
        }
    }

    /// Content identifier of the off-chain details for this log
    #[must_use]
    pub fn content_id(&self) -> &ContentId {
        match self {
            Self::OrganizerRegistered(args) => &args.details_cid,
            Self::EventCreated(args) => &args.event_cid,
            Self::TicketPurchased(args) => &args.event_cid,
        }
    }
}

/// A ticketed event as returned by the contract's bulk listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainEvent {
    pub organizer: Address,
    #[serde(rename = "eventName")]
    pub name: String,
    /// Ticket price in wei
    pub price: u128,
    #[serde(rename = "remTickets")]
    pub remaining_tickets: u64,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(rename = "eventCID")]
    pub event_cid: ContentId,
}

/// A ticket held by an account, as returned by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicket {
    pub event_id: u64,
    pub tickets_bought: u64,
    /// Content identifier of the event the ticket belongs to
    pub event_cid: ContentId,
}
